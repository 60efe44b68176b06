use crate::message::ChunkCode;

/// Errors returned by the message builders.
#[derive(Debug, thiserror::Error)]
pub enum MpipeError {
    /// Directive payloads are limited to one length byte.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Hex text could not be decoded.
    #[error("invalid hex input: {0}")]
    InvalidHex(String),
}

pub type Result<T> = std::result::Result<T, MpipeError>;

/// Recoverable problems found while parsing the device stream.
///
/// None of these stop the parser; each one drops the current message and
/// resynchronises on the following bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The chunk flags do not decode to a known chunk code.
    #[error("invalid chunk flags 0x{0:02X}")]
    InvalidChunkFlags(u8),

    /// A chunk arrived that cannot follow the current chunk state.
    #[error("chunk {found:?} cannot follow {state:?}")]
    ChunkSequence { state: ChunkCode, found: ChunkCode },

    /// Header length fields disagree with each other.
    #[error("length mismatch (header says {declared}, sub-header implies {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// A fixed header field carried an unexpected value.
    #[error("invalid header field {field}: 0x{value:02X}")]
    InvalidField { field: &'static str, value: u8 },

    /// The received CRC does not match the computed one.
    #[error("crc mismatch on seq {seq} (received 0x{received:04X}, computed 0x{computed:04X})")]
    CrcMismatch { seq: u16, received: u16, computed: u16 },
}
