use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use otcom_frame::RingBuffer;
use otcom_transport::{
    CaptureFile, DeviceLink, FlowMode, LinkSettings, Result, TransportError, XonXoffCodec,
};
use tracing::{debug, error, info, warn};

const READ_CHUNK_SIZE: usize = 4096;
const DUMP_LINE_WIDTH: usize = 16;

#[derive(Debug, Default)]
struct RxState {
    codec: XonXoffCodec,
    scratch: Vec<u8>,
}

/// Single owner of the serial link and everything tied to it.
///
/// The device reader loop fills the inbound ring, the device treater loop
/// drains it, and control requests reach the link only through the methods
/// here. Each piece of state has its own lock.
pub struct Device {
    link: Mutex<Box<dyn DeviceLink>>,
    settings: Mutex<LinkSettings>,
    ring: Mutex<RingBuffer>,
    rx: Mutex<RxState>,
    tx_codec: Mutex<XonXoffCodec>,
    capture: Mutex<Option<CaptureFile>>,
    connected: AtomicBool,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("settings", &*lock(&self.settings))
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Device {
    pub fn new(link: Box<dyn DeviceLink>, settings: LinkSettings, ring_capacity: usize) -> Self {
        Self {
            link: Mutex::new(link),
            settings: Mutex::new(settings),
            ring: Mutex::new(RingBuffer::new(ring_capacity)),
            rx: Mutex::new(RxState::default()),
            tx_codec: Mutex::new(XonXoffCodec::new()),
            capture: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Open the link with the current settings.
    pub fn connect(&self) -> Result<()> {
        let settings = self.settings();
        if settings.port.is_empty() {
            return Err(TransportError::NotOpen);
        }
        let result = lock(&self.link).open(&settings);
        match &result {
            Ok(()) => {
                lock(&self.rx).codec.reset();
                self.connected.store(true, Ordering::Release);
                info!(
                    port = %settings.port,
                    baud_rate = settings.baud_rate,
                    flow = %settings.flow_mode,
                    "device connected"
                );
            }
            Err(err) => {
                self.connected.store(false, Ordering::Release);
                error!(port = %settings.port, error = %err, "device open failed");
            }
        }
        result
    }

    pub fn disconnect(&self) {
        lock(&self.link).close();
        if self.connected.swap(false, Ordering::AcqRel) {
            info!(port = %lock(&self.settings).port, "device disconnected");
        }
    }

    /// Close and reopen with the current settings.
    pub fn reconnect(&self) -> Result<()> {
        self.disconnect();
        self.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && lock(&self.link).is_open()
    }

    pub fn settings(&self) -> LinkSettings {
        lock(&self.settings).clone()
    }

    pub fn baud_rate(&self) -> u32 {
        lock(&self.settings).baud_rate
    }

    pub fn flow_mode(&self) -> FlowMode {
        lock(&self.settings).flow_mode
    }

    /// Point the device at another port. Takes effect on the next connect.
    pub fn set_port(&self, port: impl Into<String>) {
        lock(&self.settings).port = port.into();
    }

    /// Record the new speed and apply it to an open link.
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        lock(&self.settings).baud_rate = baud_rate;
        let mut link = lock(&self.link);
        if link.is_open() {
            link.set_baud_rate(baud_rate)?;
        }
        info!(baud_rate, "baud rate set");
        Ok(())
    }

    /// Record the new flow mode and apply it to an open link. Any
    /// half-received escape sequence is dropped.
    pub fn set_flow_mode(&self, mode: FlowMode) -> Result<()> {
        lock(&self.settings).flow_mode = mode;
        lock(&self.rx).codec.reset();
        let mut link = lock(&self.link);
        if link.is_open() {
            link.set_flow_mode(mode)?;
        }
        info!(flow = %mode, "flow mode set");
        Ok(())
    }

    /// Pull pending device bytes into the inbound ring.
    ///
    /// Returns the number of bytes stored. A read failure closes the link
    /// and is returned so the caller can log the status change.
    pub fn read_into_ring(&self) -> Result<usize> {
        if !self.connected.load(Ordering::Acquire) {
            return Ok(0);
        }
        let free = lock(&self.ring).free_space();
        if free == 0 {
            return Ok(0);
        }

        let xonxoff = self.flow_mode() == FlowMode::XonXoff;
        let mut rx = lock(&self.rx);
        let RxState { codec, scratch } = &mut *rx;
        // A pending escape followed by an unknown byte decodes to two bytes.
        let budget = free - usize::from(xonxoff && codec.has_pending_escape());
        if budget == 0 {
            return Ok(0);
        }
        scratch.resize(budget.min(READ_CHUNK_SIZE), 0);

        let read = lock(&self.link).read(scratch);
        let read = match read {
            Ok(0) => return Ok(0),
            Ok(n) => n,
            Err(err) => {
                self.fail("read", &err);
                return Err(err);
            }
        };

        let raw = &scratch[..read];
        if let Some(capture) = lock(&self.capture).as_mut() {
            capture.record(raw);
        }
        let data = if xonxoff { codec.decode(raw) } else { raw };
        let stored = lock(&self.ring).write(data);
        if stored < data.len() {
            warn!(stored, len = data.len(), "device ring overflow, bytes dropped");
        }
        Ok(stored)
    }

    /// Copy out and consume every byte waiting in the inbound ring.
    pub fn take_pending(&self) -> Vec<u8> {
        lock(&self.ring).drain()
    }

    /// Write `data` to the device, stuffing it first under XON/XOFF.
    ///
    /// Returns `data.len()` once every byte is on the link. A link that stops
    /// accepting bytes yields [`TransportError::Stalled`] with the wire count.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::NotOpen);
        }
        let xonxoff = self.flow_mode() == FlowMode::XonXoff;
        let mut codec = lock(&self.tx_codec);
        let wire = if xonxoff { codec.encode(data) } else { data };

        let mut link = lock(&self.link);
        let mut offset = 0usize;
        while offset < wire.len() {
            match link.write(&wire[offset..]) {
                Ok(0) => {
                    warn!(written = offset, len = wire.len(), "device write stalled");
                    return Err(TransportError::Stalled {
                        written: offset,
                        len: wire.len(),
                    });
                }
                Ok(n) => offset += n,
                Err(err) => {
                    drop(link);
                    self.fail("write", &err);
                    return Err(err);
                }
            }
        }
        debug!(len = data.len(), wire_len = offset, "wrote to device");
        Ok(data.len())
    }

    /// Discard OS queues and everything buffered but not yet treated.
    pub fn flush(&self) -> Result<()> {
        {
            let mut link = lock(&self.link);
            if link.is_open() {
                link.flush()?;
            }
        }
        lock(&self.ring).reinit();
        lock(&self.rx).codec.reset();
        debug!("device buffers flushed");
        Ok(())
    }

    pub fn send_break(&self, duration: Duration) -> Result<()> {
        let mut link = lock(&self.link);
        if !link.is_open() {
            return Err(TransportError::NotOpen);
        }
        link.send_break(duration)
    }

    /// Start appending raw device input to `path`.
    pub fn start_capture(&self, path: impl Into<PathBuf>) -> Result<()> {
        let mut slot = lock(&self.capture);
        let mut capture = CaptureFile::new(path);
        capture.start()?;
        if let Some(mut previous) = slot.replace(capture) {
            previous.stop();
        }
        Ok(())
    }

    pub fn stop_capture(&self) {
        if let Some(mut capture) = lock(&self.capture).take() {
            capture.stop();
        }
    }

    pub fn is_capturing(&self) -> bool {
        lock(&self.capture)
            .as_ref()
            .is_some_and(CaptureFile::is_active)
    }

    /// Snapshot of link settings and inbound ring state.
    pub fn status(&self) -> DeviceStatus {
        let settings = self.settings();
        let ring = lock(&self.ring);
        DeviceStatus {
            connected: self.connected.load(Ordering::Acquire),
            port: settings.port,
            baud_rate: settings.baud_rate,
            flow_mode: settings.flow_mode,
            capacity: ring.capacity(),
            feed: ring.feed(),
            consumed: ring.consumed(),
            pending: ring.copy_from(ring.consumed(), ring.len()),
        }
    }

    fn fail(&self, op: &'static str, err: &TransportError) {
        error!(op, error = %err, "device I/O failed, closing link");
        lock(&self.link).close();
        self.connected.store(false, Ordering::Release);
    }
}

/// Point-in-time view of the device for status reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub connected: bool,
    pub port: String,
    pub baud_rate: u32,
    pub flow_mode: FlowMode,
    pub capacity: usize,
    pub feed: usize,
    pub consumed: usize,
    /// Bytes read from the device but not yet treated.
    pub pending: Vec<u8>,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let port = if self.port.is_empty() { "-" } else { &self.port };
        writeln!(
            f,
            "device {port} {} baud={} flow={}",
            if self.connected { "connected" } else { "disconnected" },
            self.baud_rate,
            self.flow_mode
        )?;
        write!(
            f,
            "ring capacity={} feed={} consumed={} pending={}",
            self.capacity,
            self.feed,
            self.consumed,
            self.pending.len()
        )?;
        for (line, chunk) in self.pending.chunks(DUMP_LINE_WIDTH).enumerate() {
            write!(f, "\n{:04X} ", line * DUMP_LINE_WIDTH)?;
            for byte in chunk {
                write!(f, " {byte:02X}")?;
            }
        }
        Ok(())
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
