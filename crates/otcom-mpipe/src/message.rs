use bytes::Bytes;

use crate::error::ParseError;

/// Message-begin flag.
pub const FLAG_MB: u8 = 0x80;
/// Message-end flag.
pub const FLAG_ME: u8 = 0x40;
/// Chunk flag.
pub const FLAG_CF: u8 = 0x20;
/// ID-length-present flag (legacy framing only).
pub const FLAG_IL: u8 = 0x08;

const CHUNK_MASK: u8 = FLAG_MB | FLAG_ME | FLAG_CF;

/// Position of one wire message inside a logical directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkCode {
    /// Whole directive in one message.
    #[default]
    No,
    First,
    Continue,
    Last,
}

impl ChunkCode {
    /// The fixed sync/flags byte used on the wire for this code.
    pub fn sync_byte(self) -> u8 {
        match self {
            Self::No => 0xDD,
            Self::First => 0xBD,
            Self::Continue => 0x36,
            Self::Last => 0x56,
        }
    }

    /// Exact match against the four wire constants.
    pub fn from_sync_byte(byte: u8) -> Option<Self> {
        match byte {
            0xDD => Some(Self::No),
            0xBD => Some(Self::First),
            0x36 => Some(Self::Continue),
            0x56 => Some(Self::Last),
            _ => None,
        }
    }

    /// Decode from the MB/ME/CF bits only; the low bits are ignored.
    pub fn from_flags(byte: u8) -> Option<Self> {
        match byte & CHUNK_MASK {
            b if b == FLAG_MB | FLAG_ME => Some(Self::No),
            b if b == FLAG_MB | FLAG_CF => Some(Self::First),
            FLAG_CF => Some(Self::Continue),
            FLAG_ME => Some(Self::Last),
            _ => None,
        }
    }

    /// Whether a message with this code may arrive while the stream is in
    /// chunk state `state`.
    pub fn can_follow(self, state: ChunkCode) -> bool {
        match state {
            Self::No | Self::Last => matches!(self, Self::No | Self::First),
            Self::First | Self::Continue => matches!(self, Self::Continue | Self::Last),
        }
    }

    /// True once a logical directive is complete in this state.
    pub fn completes(self) -> bool {
        matches!(self, Self::No | Self::Last)
    }

    /// Legacy framing carries the directive id only on these codes.
    pub fn carries_id(self) -> bool {
        self.sync_byte() & FLAG_IL != 0
    }
}

/// An application-level command or response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Directive {
    pub id: u8,
    pub cmd: u8,
    pub payload: Bytes,
}

impl Directive {
    pub fn new(id: u8, cmd: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            cmd,
            payload: payload.into(),
        }
    }
}

/// A complete, CRC-verified directive delivered by a parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sequence number of the message that completed the directive.
    pub seq: u16,
    /// `No` for single messages, `Last` for reassembled chunks.
    pub chunk: ChunkCode,
    pub directive: Directive,
}

/// Receives what a parser extracts from the byte stream.
pub trait MessageSink {
    fn on_message(&mut self, message: Message);

    /// Called for every recoverable framing or integrity error.
    fn on_error(&mut self, _error: &ParseError) {}
}

impl<F: FnMut(Message)> MessageSink for F {
    fn on_message(&mut self, message: Message) {
        self(message)
    }
}

impl MessageSink for Vec<Message> {
    fn on_message(&mut self, message: Message) {
        self.push(message);
    }
}

/// Collects messages and errors; handy for tools and tests.
#[derive(Debug, Default)]
pub struct Collector {
    pub messages: Vec<Message>,
    pub errors: Vec<ParseError>,
}

impl MessageSink for Collector {
    fn on_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn on_error(&mut self, error: &ParseError) {
        self.errors.push(error.clone());
    }
}

/// Accumulates chunk payloads until the directive is complete.
#[derive(Debug, Default)]
pub(crate) struct Assembly {
    id: u8,
    cmd: u8,
    payload: Vec<u8>,
}

impl Assembly {
    /// Apply one verified message. Returns the finished directive when the
    /// chunk code completes it.
    pub(crate) fn push(
        &mut self,
        chunk: ChunkCode,
        id: Option<(u8, u8)>,
        payload: &[u8],
    ) -> Option<Directive> {
        match chunk {
            ChunkCode::No => {
                self.clear();
                let (id, cmd) = id.unwrap_or_default();
                Some(Directive::new(id, cmd, payload.to_vec()))
            }
            ChunkCode::First => {
                self.clear();
                let (id, cmd) = id.unwrap_or_default();
                self.id = id;
                self.cmd = cmd;
                self.payload.extend_from_slice(payload);
                None
            }
            ChunkCode::Continue => {
                self.payload.extend_from_slice(payload);
                None
            }
            ChunkCode::Last => {
                self.payload.extend_from_slice(payload);
                let directive = Directive::new(self.id, self.cmd, std::mem::take(&mut self.payload));
                self.clear();
                Some(directive)
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.payload.clear();
        self.id = 0;
        self.cmd = 0;
    }
}
