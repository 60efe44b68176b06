//! Current device framing: sync word, CRC, length header and ALP sub-header.
//!
//! ```text
//! ┌───────────┬──────────┬──────────┬─────┬──────┬────────────┬──────┬────┬─────┬───────────┐
//! │ FF 55     │ CRC      │ LEN      │ SEQ │ CTRL │ CHUNK_SYNC │ PLEN │ ID │ CMD │ PAYLOAD   │
//! │ (2B)      │ (2B BE)  │ (2B BE)  │ 1B  │ 0x00 │ 1B         │ 1B   │ 1B │ 1B  │ PLEN B    │
//! └───────────┴──────────┴──────────┴─────┴──────┴────────────┴──────┴────┴─────┴───────────┘
//! ```
//!
//! `LEN` counts the sub-header and payload (`4 + PLEN`). The CRC covers
//! every byte from `LEN` to the end of the payload.

use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};

use crate::crc::crc16;
use crate::error::{MpipeError, ParseError, Result};
use crate::message::{Assembly, ChunkCode, Directive, Message, MessageSink};

pub const SYNC: [u8; 2] = [0xFF, 0x55];

/// Sync (2) + CRC (2) + LEN (2) + SEQ (1) + CTRL (1).
pub const HEADER_SIZE: usize = 8;

/// CHUNK_SYNC (1) + PLEN (1) + ID (1) + CMD (1).
pub const SUBHEADER_SIZE: usize = 4;

pub const MAX_PAYLOAD: usize = u8::MAX as usize;

// Offsets into the bytes buffered after the sync word.
const CRC_END: usize = 2;
const HEADER_END: usize = HEADER_SIZE - SYNC.len();
const SUBHEADER_END: usize = HEADER_END + SUBHEADER_SIZE;

/// Append one framed message to `dst`.
pub fn encode(directive: &Directive, seq: u16, chunk: ChunkCode, dst: &mut BytesMut) -> Result<()> {
    let plen = directive.payload.len();
    if plen > MAX_PAYLOAD {
        return Err(MpipeError::PayloadTooLarge {
            size: plen,
            max: MAX_PAYLOAD,
        });
    }

    let start = dst.len();
    dst.reserve(HEADER_SIZE + SUBHEADER_SIZE + plen);
    dst.put_slice(&SYNC);
    dst.put_u16(0);
    dst.put_u16((SUBHEADER_SIZE + plen) as u16);
    dst.put_u8(seq as u8);
    dst.put_u8(0);
    dst.put_u8(chunk.sync_byte());
    dst.put_u8(plen as u8);
    dst.put_u8(directive.id);
    dst.put_u8(directive.cmd);
    dst.put_slice(&directive.payload);

    let crc = crc16(&dst[start + SYNC.len() + CRC_END..]);
    dst[start + SYNC.len()..start + SYNC.len() + CRC_END].copy_from_slice(&crc.to_be_bytes());
    Ok(())
}

/// Parser states. `Done` and `Error` are transient: they are handled as soon
/// as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Sync1,
    Sync2,
    Header,
    AlpSubheader,
    Data,
    Done,
    Error,
}

/// Incremental parser for the current framing.
///
/// Bytes can be fed in arbitrary slices; partially received fields are kept
/// between calls and parsing resumes where it stopped.
#[derive(Debug)]
pub struct Mpipe2Parser {
    state: ParserState,
    superstate: ChunkCode,
    staged: ChunkCode,
    /// Everything received after the sync word for the current frame.
    frame: Vec<u8>,
    target: usize,
    error: Option<ParseError>,
    assembly: Assembly,
}

impl Default for Mpipe2Parser {
    fn default() -> Self {
        Self {
            state: ParserState::Sync1,
            superstate: ChunkCode::No,
            staged: ChunkCode::No,
            frame: Vec::with_capacity(HEADER_SIZE + SUBHEADER_SIZE + MAX_PAYLOAD),
            target: 0,
            error: None,
            assembly: Assembly::default(),
        }
    }
}

impl Mpipe2Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Chunk state carried across messages.
    pub fn superstate(&self) -> ChunkCode {
        self.superstate
    }

    /// Drop any partial frame and chunk assembly.
    pub fn reset(&mut self) {
        self.state = ParserState::Sync1;
        self.superstate = ChunkCode::No;
        self.frame.clear();
        self.error = None;
        self.assembly.clear();
    }

    /// Consume `input`, delivering every completed directive to `sink`.
    ///
    /// Returns the number of messages delivered.
    pub fn parse<S: MessageSink + ?Sized>(&mut self, mut input: &[u8], sink: &mut S) -> usize {
        let mut delivered = 0usize;
        while !input.is_empty() {
            match self.state {
                ParserState::Sync1 => {
                    if input[0] == SYNC[0] {
                        self.state = ParserState::Sync2;
                    }
                    input = &input[1..];
                }
                ParserState::Sync2 => {
                    self.state = match input[0] {
                        b if b == SYNC[1] => {
                            self.frame.clear();
                            self.target = HEADER_END;
                            ParserState::Header
                        }
                        b if b == SYNC[0] => ParserState::Sync2,
                        _ => ParserState::Sync1,
                    };
                    input = &input[1..];
                }
                ParserState::Header => {
                    if self.fill(&mut input) {
                        self.on_header();
                    }
                }
                ParserState::AlpSubheader => {
                    if self.fill(&mut input) {
                        self.on_subheader();
                    }
                }
                ParserState::Data => {
                    if self.fill(&mut input) {
                        self.state = ParserState::Done;
                    }
                }
                ParserState::Done | ParserState::Error => {}
            }

            match self.state {
                ParserState::Done => delivered += self.finish(sink),
                ParserState::Error => self.fail(sink),
                _ => {}
            }
        }
        delivered
    }

    fn fill(&mut self, input: &mut &[u8]) -> bool {
        let take = (self.target - self.frame.len()).min(input.len());
        self.frame.extend_from_slice(&input[..take]);
        *input = &input[take..];
        self.frame.len() == self.target
    }

    fn declared_len(&self) -> usize {
        usize::from(u16::from_be_bytes([self.frame[2], self.frame[3]]))
    }

    fn on_header(&mut self) {
        let len = self.declared_len();
        if len == 0 {
            // Keep-alive: no sub-header, chunk state untouched.
            self.staged = self.superstate;
            self.state = ParserState::Done;
        } else if len < SUBHEADER_SIZE {
            self.reject(ParseError::LengthMismatch {
                declared: len,
                actual: SUBHEADER_SIZE,
            });
        } else {
            self.target = SUBHEADER_END;
            self.state = ParserState::AlpSubheader;
        }
    }

    fn on_subheader(&mut self) {
        let flags = self.frame[HEADER_END];
        let plen = usize::from(self.frame[HEADER_END + 1]);
        let len = self.declared_len();

        let Some(chunk) = ChunkCode::from_flags(flags) else {
            return self.reject(ParseError::InvalidChunkFlags(flags));
        };
        if len != SUBHEADER_SIZE + plen {
            return self.reject(ParseError::LengthMismatch {
                declared: len,
                actual: SUBHEADER_SIZE + plen,
            });
        }
        if !chunk.can_follow(self.superstate) {
            return self.reject(ParseError::ChunkSequence {
                state: self.superstate,
                found: chunk,
            });
        }

        self.staged = chunk;
        self.target = SUBHEADER_END + plen;
        self.state = if plen == 0 {
            ParserState::Done
        } else {
            ParserState::Data
        };
    }

    fn reject(&mut self, error: ParseError) {
        self.error = Some(error);
        self.state = ParserState::Error;
    }

    fn finish<S: MessageSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let received = u16::from_be_bytes([self.frame[0], self.frame[1]]);
        let computed = crc16(&self.frame[CRC_END..]);
        let seq = u16::from(self.frame[4]);

        if received != computed {
            self.reject(ParseError::CrcMismatch {
                seq,
                received,
                computed,
            });
            self.fail(sink);
            return 0;
        }

        let message = if self.frame.len() == HEADER_END {
            self.superstate.completes().then(|| Message {
                seq,
                chunk: ChunkCode::No,
                directive: Directive::default(),
            })
        } else {
            self.superstate = self.staged;
            let id = (self.frame[HEADER_END + 2], self.frame[HEADER_END + 3]);
            self.assembly
                .push(self.staged, Some(id), &self.frame[SUBHEADER_END..])
                .map(|directive| Message {
                    seq,
                    chunk: self.staged,
                    directive,
                })
        };

        self.frame.clear();
        self.state = ParserState::Sync1;
        match message {
            Some(message) => {
                debug!(
                    seq = message.seq,
                    id = message.directive.id,
                    cmd = message.directive.cmd,
                    len = message.directive.payload.len(),
                    "mpipe message"
                );
                sink.on_message(message);
                1
            }
            None => 0,
        }
    }

    fn fail<S: MessageSink + ?Sized>(&mut self, sink: &mut S) {
        if let Some(error) = self.error.take() {
            warn!(%error, "mpipe frame dropped");
            sink.on_error(&error);
        }
        self.superstate = ChunkCode::No;
        self.assembly.clear();
        self.frame.clear();
        self.state = ParserState::Sync1;
    }
}
