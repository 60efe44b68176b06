use std::io::{ErrorKind, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use otcom_frame::{next_request, Packet, PacketConfig, PacketWriter, RingBuffer, DEFAULT_RING_CAPACITY};
use otcom_transport::{PeerStream, TransportError};
use tracing::debug;

use crate::error::{PeerError, Result};

/// Network-assigned peer identifier.
pub type ClientId = u64;

/// Reserved for the bridge's own console.
pub const CONSOLE_ID: ClientId = 0;

const READ_CHUNK_SIZE: usize = 4096;

/// Per-peer resource limits.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ring_capacity: usize,
    /// Bound on how long one outbound packet may wait on a full socket.
    pub write_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            write_timeout: Duration::from_secs(3),
        }
    }
}

/// One connected control-socket peer.
///
/// The read half and the inbound ring are used by the peer reader and
/// treater loops. The write half has its own lock because broadcasts and
/// replies to this peer's requests can race.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    addr: Option<SocketAddr>,
    reader: Mutex<PeerStream>,
    ring: Mutex<RingBuffer>,
    writer: Mutex<PacketWriter<PeerStream>>,
    alive: AtomicBool,
}

impl Client {
    /// Wrap an accepted, non-blocking stream.
    pub fn new(id: ClientId, stream: PeerStream, config: &ClientConfig) -> Result<Self> {
        let write_half = stream.try_clone()?;
        let packet_config = PacketConfig {
            read_timeout: None,
            write_timeout: Some(config.write_timeout),
        };
        Ok(Self {
            id,
            addr: stream.peer_addr(),
            reader: Mutex::new(stream),
            ring: Mutex::new(RingBuffer::new(config.ring_capacity)),
            writer: Mutex::new(PacketWriter::with_config(write_half, packet_config)),
            alive: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Flag the peer for removal. The registry reaps it later.
    pub fn mark_dead(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            debug!(peer_id = self.id, "peer marked dead");
        }
    }

    /// Move whatever the socket holds right now into the inbound ring.
    ///
    /// Returns the number of bytes stored; `Ok(0)` when nothing was pending
    /// or the ring is full. EOF and socket errors mark the peer dead.
    pub fn read_available(&self) -> Result<usize> {
        let free = lock(&self.ring).free_space();
        if free == 0 {
            return Ok(0);
        }

        let mut chunk = vec![0u8; free.min(READ_CHUNK_SIZE)];
        let read = {
            let mut stream = lock(&self.reader);
            loop {
                match stream.read(&mut chunk) {
                    Ok(n) => break n,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                        return Ok(0)
                    }
                    Err(err) => {
                        self.mark_dead();
                        return Err(TransportError::Io(err).into());
                    }
                }
            }
        };

        if read == 0 {
            self.mark_dead();
            return Err(PeerError::Disconnected(format!("peer {} closed", self.id)));
        }

        // Only this peer's reader feeds the ring, so the space is still there.
        let stored = lock(&self.ring).write(&chunk[..read]);
        Ok(stored)
    }

    /// Pop the next complete request from the inbound ring.
    pub fn next_request(&self) -> Option<Packet> {
        next_request(&mut lock(&self.ring))
    }

    /// Run `f` with the inbound ring locked.
    pub fn with_ring<R>(&self, f: impl FnOnce(&mut RingBuffer) -> R) -> R {
        f(&mut lock(&self.ring))
    }

    /// Send one control packet. A failed write marks the peer dead.
    pub fn send(&self, command: u8, payload: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(PeerError::Disconnected(format!("peer {} is closed", self.id)));
        }
        let result = lock(&self.writer).send(command, payload);
        if let Err(err) = result {
            self.mark_dead();
            return Err(err.into());
        }
        Ok(())
    }

    pub fn send_packet(&self, packet: &Packet) -> Result<()> {
        self.send(packet.command, packet.payload.as_ref())
    }

    /// Mark dead and shut the socket down.
    pub fn close(&self) {
        self.mark_dead();
        lock(&self.reader).shutdown();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
