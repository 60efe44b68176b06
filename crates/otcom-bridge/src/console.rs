use std::sync::Arc;

use otcom_frame::{DECODED_TEXT, MAX_PAYLOAD, RAW_DATA};
use otcom_mpipe::{render, to_hex, Message, MessageSink, ParseError};
use otcom_peer::ClientRegistry;
use tracing::info;

use crate::config::PrintMode;

/// `tracing` target for device traffic shown on the console.
pub const CONSOLE_TARGET: &str = "otcom::console";

/// Where treated device data goes: the local console and, optionally, the
/// peers as rendered text.
#[derive(Debug)]
pub struct ConsoleSink {
    print_mode: PrintMode,
    registry: Option<Arc<ClientRegistry>>,
    delivered: u64,
    rejected: u64,
}

impl ConsoleSink {
    pub fn new(print_mode: PrintMode) -> Self {
        Self {
            print_mode,
            registry: None,
            delivered: 0,
            rejected: 0,
        }
    }

    /// Also send each rendered line to every peer as decoded text.
    pub fn with_broadcast(mut self, registry: Arc<ClientRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn print_mode(&self) -> PrintMode {
        self.print_mode
    }

    /// Messages that passed the integrity check.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Messages dropped for framing or CRC errors.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Show raw device bytes when in raw mode.
    pub fn raw(&self, data: &[u8]) {
        if self.print_mode == PrintMode::Raw && !data.is_empty() {
            info!(target: CONSOLE_TARGET, len = data.len(), "{}", to_hex(data).trim_end());
        }
    }
}

impl MessageSink for ConsoleSink {
    fn on_message(&mut self, message: Message) {
        self.delivered += 1;
        let line = render(&message);
        if self.print_mode == PrintMode::Decoded {
            info!(target: CONSOLE_TARGET, crc = "ok", "{line}");
        }
        if let Some(registry) = &self.registry {
            registry.broadcast(DECODED_TEXT, line.as_bytes());
        }
    }

    fn on_error(&mut self, error: &ParseError) {
        self.rejected += 1;
        if self.print_mode == PrintMode::Decoded {
            info!(target: CONSOLE_TARGET, crc = "bad", "{error}");
        }
    }
}

/// Send device bytes to every peer as raw-data packets, split to fit the
/// 16-bit length field. Returns the number of packets sent per peer.
pub fn broadcast_raw(registry: &ClientRegistry, data: &[u8]) -> usize {
    if registry.is_empty() {
        return 0;
    }
    let mut packets = 0usize;
    for chunk in data.chunks(MAX_PAYLOAD) {
        registry.broadcast(RAW_DATA, chunk);
        packets += 1;
    }
    packets
}
