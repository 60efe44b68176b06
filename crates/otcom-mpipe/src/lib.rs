//! Device-side protocol for OpenTag-style targets.
//!
//! Directives (`id`, `cmd`, payload) travel over the serial link inside
//! CRC-16 protected messages. Two framings exist and are selected with
//! [`ProtocolVersion`]:
//! - `Mpipe2`: `FF 55` sync word, CRC, length header and ALP sub-header
//! - `Ndef`: legacy NDEF-style records with trailing sequence and CRC
//!
//! Both support splitting one directive across several chunked messages.
//! [`Parser`] is incremental and can be fed whatever the device produced
//! so far.

pub mod alp;
pub mod codec;
pub mod crc;
pub mod error;
pub mod message;
pub mod mpipe2;
pub mod ndef;

pub use alp::{parse_hex, render, to_hex};
pub use codec::{Builder, Parser, ProtocolVersion};
pub use crc::crc16;
pub use error::{MpipeError, ParseError, Result};
pub use message::{ChunkCode, Collector, Directive, Message, MessageSink};
pub use mpipe2::{Mpipe2Parser, ParserState};
pub use ndef::NdefParser;
