//! Legacy NDEF-style framing (restricted OpenTag subset).
//!
//! ```text
//! FLAGS  TLEN=0  PLEN  [IDLEN=2  ID  CMD]  PAYLOAD  SEQ(2B BE)  CRC(2B BE)
//! ```
//!
//! `FLAGS` is one of the four chunk sync bytes. The id section is present
//! only when the IL bit is set, i.e. on unchunked and first-chunk records.
//! The CRC covers everything from `FLAGS` through `SEQ`.

use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};

use crate::crc::crc16;
use crate::error::{MpipeError, ParseError, Result};
use crate::message::{Assembly, ChunkCode, Directive, Message, MessageSink};

pub const MAX_PAYLOAD: usize = u8::MAX as usize;

const ID_LENGTH: u8 = 2;
const FOOTER_SIZE: usize = 4;

/// Append one record to `dst`.
///
/// Continue and last chunks do not carry the directive id.
pub fn encode(directive: &Directive, seq: u16, chunk: ChunkCode, dst: &mut BytesMut) -> Result<()> {
    let plen = directive.payload.len();
    if plen > MAX_PAYLOAD {
        return Err(MpipeError::PayloadTooLarge {
            size: plen,
            max: MAX_PAYLOAD,
        });
    }

    let start = dst.len();
    dst.reserve(6 + plen + FOOTER_SIZE);
    dst.put_u8(chunk.sync_byte());
    dst.put_u8(0);
    dst.put_u8(plen as u8);
    if chunk.carries_id() {
        dst.put_u8(ID_LENGTH);
        dst.put_u8(directive.id);
        dst.put_u8(directive.cmd);
    }
    dst.put_slice(&directive.payload);
    dst.put_u16(seq);
    let crc = crc16(&dst[start..]);
    dst.put_u16(crc);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Flags,
    Header,
    Body,
}

/// Incremental parser for the legacy framing.
#[derive(Debug)]
pub struct NdefParser {
    state: State,
    superstate: ChunkCode,
    chunk: ChunkCode,
    record: Vec<u8>,
    target: usize,
    assembly: Assembly,
}

impl Default for NdefParser {
    fn default() -> Self {
        Self {
            state: State::Flags,
            superstate: ChunkCode::No,
            chunk: ChunkCode::No,
            record: Vec::with_capacity(6 + MAX_PAYLOAD + FOOTER_SIZE),
            target: 0,
            assembly: Assembly::default(),
        }
    }
}

impl NdefParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn superstate(&self) -> ChunkCode {
        self.superstate
    }

    pub fn reset(&mut self) {
        self.state = State::Flags;
        self.superstate = ChunkCode::No;
        self.record.clear();
        self.assembly.clear();
    }

    /// True when the parser is between records.
    pub fn is_idle(&self) -> bool {
        self.state == State::Flags
    }

    /// Consume `input`, delivering every completed directive to `sink`.
    pub fn parse<S: MessageSink + ?Sized>(&mut self, mut input: &[u8], sink: &mut S) -> usize {
        let mut delivered = 0usize;
        while !input.is_empty() {
            match self.state {
                State::Flags => {
                    let byte = input[0];
                    input = &input[1..];
                    let Some(chunk) = ChunkCode::from_sync_byte(byte) else {
                        continue;
                    };
                    if !chunk.can_follow(self.superstate) {
                        self.fail(
                            sink,
                            ParseError::ChunkSequence {
                                state: self.superstate,
                                found: chunk,
                            },
                        );
                        continue;
                    }
                    self.chunk = chunk;
                    self.record.clear();
                    self.record.push(byte);
                    // TLEN, PLEN and, with an id, IDLEN
                    self.target = if chunk.carries_id() { 4 } else { 3 };
                    self.state = State::Header;
                }
                State::Header => {
                    if self.fill(&mut input) {
                        self.on_header(sink);
                    }
                }
                State::Body => {
                    if self.fill(&mut input) {
                        delivered += self.finish(sink);
                    }
                }
            }
        }
        delivered
    }

    fn fill(&mut self, input: &mut &[u8]) -> bool {
        let take = (self.target - self.record.len()).min(input.len());
        self.record.extend_from_slice(&input[..take]);
        *input = &input[take..];
        self.record.len() == self.target
    }

    fn on_header<S: MessageSink + ?Sized>(&mut self, sink: &mut S) {
        let type_len = self.record[1];
        if type_len != 0 {
            return self.fail(
                sink,
                ParseError::InvalidField {
                    field: "type length",
                    value: type_len,
                },
            );
        }
        let mut body = usize::from(self.record[2]) + FOOTER_SIZE;
        if self.chunk.carries_id() {
            let id_len = self.record[3];
            if id_len != ID_LENGTH {
                return self.fail(
                    sink,
                    ParseError::InvalidField {
                        field: "id length",
                        value: id_len,
                    },
                );
            }
            body += usize::from(ID_LENGTH);
        }
        self.target = self.record.len() + body;
        self.state = State::Body;
    }

    fn finish<S: MessageSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let len = self.record.len();
        let received = u16::from_be_bytes([self.record[len - 2], self.record[len - 1]]);
        let computed = crc16(&self.record[..len - 2]);
        let seq = u16::from_be_bytes([self.record[len - 4], self.record[len - 3]]);
        if received != computed {
            self.fail(
                sink,
                ParseError::CrcMismatch {
                    seq,
                    received,
                    computed,
                },
            );
            return 0;
        }

        let (id, payload_start) = if self.chunk.carries_id() {
            (Some((self.record[4], self.record[5])), 6)
        } else {
            (None, 3)
        };
        self.superstate = self.chunk;
        let message = self
            .assembly
            .push(self.chunk, id, &self.record[payload_start..len - FOOTER_SIZE])
            .map(|directive| Message {
                seq,
                chunk: self.chunk,
                directive,
            });

        self.record.clear();
        self.state = State::Flags;
        match message {
            Some(message) => {
                debug!(
                    seq = message.seq,
                    id = message.directive.id,
                    cmd = message.directive.cmd,
                    "ndef message"
                );
                sink.on_message(message);
                1
            }
            None => 0,
        }
    }

    fn fail<S: MessageSink + ?Sized>(&mut self, sink: &mut S, error: ParseError) {
        warn!(%error, "ndef record dropped");
        sink.on_error(&error);
        self.superstate = ChunkCode::No;
        self.assembly.clear();
        self.record.clear();
        self.state = State::Flags;
    }
}
