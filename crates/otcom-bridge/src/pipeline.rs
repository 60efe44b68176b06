//! The four duty loops that move bytes through the bridge.
//!
//! ```text
//! device-reader   link -> device ring
//! device-treater  device ring -> raw broadcast, console, mpipe parser
//! peers-reader    accept + sockets -> per-peer rings
//! peers-treater   per-peer rings -> control dispatch
//! ```
//!
//! Each loop polls, sleeps for the poll interval when a pass made no
//! progress, and checks the shared stop flag at the top of every pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use otcom_mpipe::{Parser, ProtocolVersion};
use otcom_peer::{process_requests, ClientRegistry, ControlHandler};
use otcom_transport::TcpServer;
use tracing::{debug, warn};

use crate::console::{broadcast_raw, ConsoleSink};
use crate::device::Device;
use crate::error::{BridgeError, Result};

const JOIN_POLL: Duration = Duration::from_millis(1);

/// Everything the loops need. Moved into the threads on start.
pub struct PipelineContext {
    pub device: Arc<Device>,
    pub registry: Arc<ClientRegistry>,
    pub server: TcpServer,
    pub handler: Box<dyn ControlHandler + Send>,
    pub protocol: ProtocolVersion,
    pub console: ConsoleSink,
    pub poll_interval: Duration,
}

#[derive(Debug)]
struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Running duty loops.
#[derive(Debug)]
pub struct Pipeline {
    stop: Arc<AtomicBool>,
    workers: Vec<Worker>,
    join_timeout: Duration,
}

impl Pipeline {
    /// Spawn all four loops.
    pub fn start(context: PipelineContext, join_timeout: Duration) -> Result<Self> {
        let PipelineContext {
            device,
            registry,
            server,
            handler,
            protocol,
            mut console,
            poll_interval,
        } = context;

        let mut pipeline = Self {
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::with_capacity(4),
            join_timeout,
        };

        let reader_device = Arc::clone(&device);
        pipeline.spawn("device-reader", poll_interval, move || {
            matches!(reader_device.read_into_ring(), Ok(n) if n > 0)
        })?;

        let treater_registry = Arc::clone(&registry);
        let mut parser = Parser::new(protocol);
        pipeline.spawn("device-treater", poll_interval, move || {
            let data = device.take_pending();
            if data.is_empty() {
                return false;
            }
            broadcast_raw(&treater_registry, &data);
            console.raw(&data);
            parser.parse(&data, &mut console);
            true
        })?;

        let reader_registry = Arc::clone(&registry);
        pipeline.spawn("peers-reader", poll_interval, move || {
            read_peers(&server, &reader_registry)
        })?;

        pipeline.spawn("peers-treater", poll_interval, move || {
            treat_peers(&registry, handler.as_ref())
        })?;

        Ok(pipeline)
    }

    fn spawn(
        &mut self,
        name: &'static str,
        poll_interval: Duration,
        mut pass: impl FnMut() -> bool + Send + 'static,
    ) -> Result<()> {
        let stop = Arc::clone(&self.stop);
        let spawned = thread::Builder::new()
            .name(format!("otcom-{name}"))
            .spawn(move || {
                debug!(duty_loop = name, "duty loop started");
                while !stop.load(Ordering::Acquire) {
                    if !pass() {
                        thread::sleep(poll_interval);
                    }
                }
                debug!(duty_loop = name, "duty loop stopped");
            });
        match spawned {
            Ok(handle) => {
                self.workers.push(Worker { name, handle });
                Ok(())
            }
            Err(source) => {
                self.shutdown();
                Err(BridgeError::Spawn { name, source })
            }
        }
    }

    /// Shared stop flag; setting it ends every loop within one pass.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty() && self.workers.iter().all(|w| !w.handle.is_finished())
    }

    /// Stop all loops and wait for them up to the join timeout.
    ///
    /// Returns the names of loops that did not finish in time; those threads
    /// are left detached.
    pub fn shutdown(&mut self) -> Vec<&'static str> {
        self.stop.store(true, Ordering::Release);
        let deadline = Instant::now() + self.join_timeout;
        let mut stuck = Vec::new();
        for worker in self.workers.drain(..) {
            while !worker.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL);
            }
            if !worker.handle.is_finished() {
                warn!(duty_loop = worker.name, "duty loop did not stop in time");
                stuck.push(worker.name);
            } else if worker.handle.join().is_err() {
                warn!(duty_loop = worker.name, "duty loop panicked");
            }
        }
        stuck
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

fn read_peers(server: &TcpServer, registry: &ClientRegistry) -> bool {
    let mut progress = false;
    loop {
        match server.accept() {
            Ok(Some(stream)) => match registry.register(stream) {
                Ok(_) => progress = true,
                Err(err) => warn!(error = %err, "failed to register peer"),
            },
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "accept failed");
                break;
            }
        }
    }

    for client in registry.snapshot() {
        if !client.is_alive() {
            continue;
        }
        match client.read_available() {
            Ok(n) => progress |= n > 0,
            Err(err) => debug!(peer_id = client.id(), error = %err, "peer read ended"),
        }
    }

    if !registry.reap_dead().is_empty() {
        progress = true;
    }
    progress
}

fn treat_peers(registry: &ClientRegistry, handler: &dyn ControlHandler) -> bool {
    let mut progress = false;
    for client in registry.snapshot() {
        if !client.is_alive() {
            continue;
        }
        match process_requests(&client, handler) {
            Ok(handled) => progress |= handled > 0,
            Err(err) => warn!(peer_id = client.id(), error = %err, "reply to peer failed"),
        }
    }
    progress
}
