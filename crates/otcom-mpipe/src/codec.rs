use std::fmt;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{ChunkCode, Directive, MessageSink};
use crate::mpipe2::{self, Mpipe2Parser};
use crate::ndef::{self, NdefParser};

/// Which device framing a link speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// Sync word + CRC + ALP sub-header.
    #[default]
    Mpipe2,
    /// Legacy NDEF-style records.
    Ndef,
}

impl ProtocolVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mpipe2 => "mpipe2",
            Self::Ndef => "ndef",
        }
    }

    /// Largest payload a single wire message can carry.
    pub fn max_payload(self) -> usize {
        match self {
            Self::Mpipe2 => mpipe2::MAX_PAYLOAD,
            Self::Ndef => ndef::MAX_PAYLOAD,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mpipe2" | "mpipe" => Ok(Self::Mpipe2),
            "ndef" | "legacy" => Ok(Self::Ndef),
            other => Err(format!("unknown protocol {other:?} (expected mpipe2 or ndef)")),
        }
    }
}

/// Serializes directives into wire messages for one protocol version.
#[derive(Debug, Clone, Copy, Default)]
pub struct Builder {
    version: ProtocolVersion,
}

impl Builder {
    pub fn new(version: ProtocolVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Build a single unchunked message.
    pub fn build(&self, id: u8, cmd: u8, seq: u16, payload: &[u8]) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        let directive = Directive::new(id, cmd, payload.to_vec());
        self.build_chunk(&directive, seq, ChunkCode::No, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Append one message with an explicit chunk code.
    pub fn build_chunk(
        &self,
        directive: &Directive,
        seq: u16,
        chunk: ChunkCode,
        dst: &mut BytesMut,
    ) -> Result<()> {
        match self.version {
            ProtocolVersion::Mpipe2 => mpipe2::encode(directive, seq, chunk, dst),
            ProtocolVersion::Ndef => ndef::encode(directive, seq, chunk, dst),
        }
    }

    /// Split a directive of any size into consecutive messages.
    ///
    /// Sequence numbers count up from `seq`. A payload that fits in one
    /// message is sent unchunked.
    pub fn build_chunked(&self, directive: &Directive, seq: u16, max_chunk: usize) -> Result<Bytes> {
        let max_chunk = max_chunk.clamp(1, self.version.max_payload());
        let mut dst = BytesMut::new();
        if directive.payload.len() <= max_chunk {
            self.build_chunk(directive, seq, ChunkCode::No, &mut dst)?;
            return Ok(dst.freeze());
        }

        let pieces: Vec<&[u8]> = directive.payload.chunks(max_chunk).collect();
        let last = pieces.len() - 1;
        for (index, piece) in pieces.into_iter().enumerate() {
            let chunk = match index {
                0 => ChunkCode::First,
                i if i == last => ChunkCode::Last,
                _ => ChunkCode::Continue,
            };
            let part = Directive::new(directive.id, directive.cmd, piece.to_vec());
            self.build_chunk(&part, seq.wrapping_add(index as u16), chunk, &mut dst)?;
        }
        Ok(dst.freeze())
    }
}

/// Stateful device-stream parser for either protocol version.
#[derive(Debug)]
pub enum Parser {
    Mpipe2(Mpipe2Parser),
    Ndef(NdefParser),
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(ProtocolVersion::default())
    }
}

impl Parser {
    pub fn new(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::Mpipe2 => Self::Mpipe2(Mpipe2Parser::new()),
            ProtocolVersion::Ndef => Self::Ndef(NdefParser::new()),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        match self {
            Self::Mpipe2(_) => ProtocolVersion::Mpipe2,
            Self::Ndef(_) => ProtocolVersion::Ndef,
        }
    }

    /// Feed bytes; returns the number of messages delivered to `sink`.
    pub fn parse<S: MessageSink + ?Sized>(&mut self, input: &[u8], sink: &mut S) -> usize {
        match self {
            Self::Mpipe2(parser) => parser.parse(input, sink),
            Self::Ndef(parser) => parser.parse(input, sink),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Mpipe2(parser) => parser.reset(),
            Self::Ndef(parser) => parser.reset(),
        }
    }

    pub fn superstate(&self) -> ChunkCode {
        match self {
            Self::Mpipe2(parser) => parser.superstate(),
            Self::Ndef(parser) => parser.superstate(),
        }
    }
}
