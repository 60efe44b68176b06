//! Byte buffering and control-socket framing for the otcom bridge.
//!
//! Two pieces live here:
//! - [`RingBuffer`], the fixed-capacity store that sits between every raw
//!   byte source (device or peer socket) and its parser
//! - the control packet format spoken between peers and the bridge:
//!   a `0xBB` sync byte, a 2-byte big-endian length, a command byte and the
//!   payload, with no checksum

pub mod codec;
pub mod command;
pub mod error;
pub mod reader;
pub mod ring;
pub mod writer;

pub use codec::{
    decode_packet, encode_packet, header_status, next_request, packet_status, Packet,
    PacketConfig, PacketStatus, HEADER_SIZE, MAX_PAYLOAD,
};
pub use command::{
    command_name, BAUDRATE_CHANGE, DECODED_TEXT, FLOWMODE_CHANGE, KILL, RAW_DATA, RECONNECT,
    SEND_AS_IS, STATUS, STATUS_REPLY, SYNC,
};
pub use error::{PacketError, Result};
pub use reader::PacketReader;
pub use ring::{RingBuffer, DEFAULT_RING_CAPACITY};
pub use writer::PacketWriter;
