use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use otcom_peer::{ClientConfig, ClientRegistry, ControlHandler};
use otcom_transport::{DeviceLink, FlowMode, SerialPortLink, TcpServer};
use tracing::{error, info, warn};

use crate::config::BridgeConfig;
use crate::console::ConsoleSink;
use crate::device::Device;
use crate::error::{BridgeError, Result};
use crate::pipeline::{Pipeline, PipelineContext};

const EVENT_POLL: Duration = Duration::from_millis(100);

/// Requests for the bridge owner, raised by peers or by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    BaudRate(u32),
    FlowMode(FlowMode),
    Reconnect,
    /// A peer asked the bridge process to exit.
    Kill,
    /// Local shutdown (signal, embedding application).
    Shutdown,
}

/// Cloneable way to reach a running bridge from other threads.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    events: Sender<BridgeEvent>,
}

impl BridgeHandle {
    /// Queue an event. Returns false once the bridge has gone away.
    pub fn send(&self, event: BridgeEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.send(BridgeEvent::Shutdown)
    }
}

/// Control requests as seen by the peer dispatcher: reads go straight to
/// the device, changes are queued for the bridge owner.
struct BridgeControl {
    device: Arc<Device>,
    events: Sender<BridgeEvent>,
}

impl BridgeControl {
    fn request(&self, event: BridgeEvent) {
        if self.events.send(event).is_err() {
            warn!(?event, "bridge event loop is gone");
        }
    }
}

impl ControlHandler for BridgeControl {
    fn is_connected(&self) -> bool {
        self.device.is_connected()
    }

    fn baud_rate(&self) -> u32 {
        self.device.baud_rate()
    }

    fn flow_mode(&self) -> FlowMode {
        self.device.flow_mode()
    }

    fn request_baud_rate(&self, baud_rate: u32) {
        self.request(BridgeEvent::BaudRate(baud_rate));
    }

    fn request_flow_mode(&self, mode: FlowMode) {
        self.request(BridgeEvent::FlowMode(mode));
    }

    fn request_reconnect(&self) {
        self.request(BridgeEvent::Reconnect);
    }

    fn request_kill(&self) {
        self.request(BridgeEvent::Kill);
    }

    fn send_as_is(&self, data: &[u8]) {
        if let Err(err) = self.device.write(data) {
            warn!(len = data.len(), error = %err, "dropping send-as-is data");
        }
    }

    fn report_status(&self) {
        info!("{}", self.device.status());
    }
}

/// The serial-to-TCP bridge.
///
/// Owns the device, the peer registry and the duty loops. Configuration
/// changes requested by peers arrive as [`BridgeEvent`]s and are applied
/// here, one at a time.
pub struct Bridge {
    config: BridgeConfig,
    device: Arc<Device>,
    registry: Arc<ClientRegistry>,
    server: Option<TcpServer>,
    local_addr: SocketAddr,
    events_tx: Sender<BridgeEvent>,
    events_rx: Receiver<BridgeEvent>,
    pipeline: Option<Pipeline>,
}

impl Bridge {
    /// Bind the peer listener and prepare a device on `link`.
    pub fn new(config: BridgeConfig, link: Box<dyn DeviceLink>) -> Result<Self> {
        let server = TcpServer::bind(&config.tcp_host, config.tcp_port)?;
        let local_addr = server.local_addr();
        let device = Arc::new(Device::new(link, config.link_settings(), config.ring_capacity));
        let registry = Arc::new(ClientRegistry::new(ClientConfig {
            ring_capacity: config.ring_capacity,
            write_timeout: config.write_timeout(),
        }));
        let (events_tx, events_rx) = mpsc::channel();
        Ok(Self {
            config,
            device,
            registry,
            server: Some(server),
            local_addr,
            events_tx,
            events_rx,
            pipeline: None,
        })
    }

    /// Bridge on a real serial port.
    pub fn with_serial(config: BridgeConfig) -> Result<Self> {
        Self::new(config, Box::new(SerialPortLink::new()))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Address peers connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Open the device (a failure is logged, not fatal), start capture and
    /// spawn the duty loops.
    pub fn start(&mut self) -> Result<()> {
        let server = self.server.take().ok_or(BridgeError::AlreadyRunning)?;

        if self.config.has_device() {
            // Already logged by the device; peers can ask for a reconnect.
            let _ = self.device.connect();
        } else {
            info!("no serial port configured, running without a device");
        }
        if let Some(path) = &self.config.capture_path {
            if let Err(err) = self.device.start_capture(path) {
                warn!(path = %path.display(), error = %err, "capture not started");
            }
        }

        let mut console = ConsoleSink::new(self.config.print_mode);
        if self.config.broadcast_decoded {
            console = console.with_broadcast(Arc::clone(&self.registry));
        }
        let context = PipelineContext {
            device: Arc::clone(&self.device),
            registry: Arc::clone(&self.registry),
            server,
            handler: Box::new(BridgeControl {
                device: Arc::clone(&self.device),
                events: self.events_tx.clone(),
            }),
            protocol: self.config.protocol,
            console,
            poll_interval: self.config.poll_interval(),
        };
        self.pipeline = Some(Pipeline::start(context, self.config.join_timeout())?);
        info!(
            addr = %self.local_addr,
            protocol = %self.config.protocol,
            print_mode = %self.config.print_mode,
            "bridge started"
        );
        Ok(())
    }

    /// Run until a kill request or shutdown event arrives, then stop.
    pub fn run(&mut self) -> Result<BridgeEvent> {
        if !self.is_running() {
            self.start()?;
        }
        let last = loop {
            match self.events_rx.recv_timeout(EVENT_POLL) {
                Ok(event) => {
                    if !self.apply(event) {
                        break event;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                // We hold a sender ourselves, so this only happens on teardown.
                Err(RecvTimeoutError::Disconnected) => break BridgeEvent::Shutdown,
            }
        };
        self.stop();
        Ok(last)
    }

    /// Apply one event. Returns false when the bridge should exit.
    pub fn apply(&mut self, event: BridgeEvent) -> bool {
        match event {
            BridgeEvent::BaudRate(baud_rate) => {
                self.config.baud_rate = baud_rate;
                if let Err(err) = self.device.set_baud_rate(baud_rate) {
                    error!(baud_rate, error = %err, "baud rate change failed");
                }
                true
            }
            BridgeEvent::FlowMode(mode) => {
                self.config.flow_mode = mode;
                if let Err(err) = self.device.set_flow_mode(mode) {
                    error!(flow = %mode, error = %err, "flow mode change failed");
                }
                true
            }
            BridgeEvent::Reconnect => {
                if self.config.has_device() {
                    let _ = self.device.reconnect();
                } else {
                    warn!("reconnect requested but no serial port is configured");
                }
                true
            }
            BridgeEvent::Kill => {
                info!("kill requested by peer");
                false
            }
            BridgeEvent::Shutdown => {
                info!("shutdown requested");
                false
            }
        }
    }

    /// Stop the loops, drop every peer and close the device.
    pub fn stop(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.shutdown();
        }
        self.registry.clear();
        self.device.stop_capture();
        self.device.disconnect();
        info!("bridge stopped");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.pipeline.is_some() {
            self.stop();
        }
    }
}
