use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::command::{command_name, is_request, is_response, STATUS_REPLY, SYNC};
use crate::error::{PacketError, Result};
use crate::ring::RingBuffer;

/// Packet header: sync (1) + length (2) + command (1) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// A control-socket packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Packet carrying a single little-endian `u32` (baud rate, flow mode).
    pub fn with_u32(command: u8, value: u32) -> Self {
        Self::new(command, value.to_le_bytes().to_vec())
    }

    /// Reply to a status request.
    pub fn status_reply(connected: bool) -> Self {
        Self::new(STATUS_REPLY, vec![u8::from(connected)])
    }

    /// First four payload bytes as a little-endian `u32`.
    pub fn u32_le(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.payload.get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }

    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn name(&self) -> &'static str {
        command_name(self.command)
    }
}

/// Encode a packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬─────────────┬──────────┬──────────────────┐
/// │ Sync     │ Length      │ Command  │ Payload          │
/// │ 0xBB     │ (2B BE)     │ (1B)     │ (Length bytes)   │
/// └──────────┴─────────────┴──────────┴──────────────────┘
/// ```
pub fn encode_packet(command: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(PacketError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(SYNC);
    dst.put_u16(payload.len() as u16);
    dst.put_u8(command);
    dst.put_slice(payload);
    Ok(())
}

/// Outcome of inspecting the bytes at a candidate packet position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    /// Not enough bytes yet; nothing may be consumed.
    NotReady,
    /// No packet starts here; skip one byte.
    Bad,
    /// Header is valid. Carries the declared payload length.
    Ready(usize),
}

fn classify(byte_at: impl Fn(usize) -> Option<u8>, accept: fn(u8) -> bool) -> PacketStatus {
    match byte_at(0) {
        None => return PacketStatus::NotReady,
        Some(SYNC) => {}
        Some(_) => return PacketStatus::Bad,
    }
    let (Some(hi), Some(lo), Some(command)) = (byte_at(1), byte_at(2), byte_at(3)) else {
        return PacketStatus::NotReady;
    };
    if !accept(command) {
        return PacketStatus::Bad;
    }
    PacketStatus::Ready(usize::from(u16::from_be_bytes([hi, lo])))
}

fn ring_byte(ring: &RingBuffer, pos: usize) -> impl Fn(usize) -> Option<u8> + '_ {
    let available = ring.bytes_available_from(pos);
    move |offset| (offset < available).then(|| ring.at(pos + offset))
}

/// Validate the sync byte and request command at ring cursor `pos`.
pub fn header_status(ring: &RingBuffer, pos: usize) -> PacketStatus {
    classify(ring_byte(ring, pos), is_request)
}

/// Like [`header_status`], but only `Ready` once the whole declared payload
/// is buffered. A packet larger than the ring can ever hold is `Bad`, so the
/// stream resyncs instead of waiting forever.
pub fn packet_status(ring: &RingBuffer, pos: usize) -> PacketStatus {
    match header_status(ring, pos) {
        PacketStatus::Ready(len) if HEADER_SIZE + len > ring.capacity() - 1 => PacketStatus::Bad,
        PacketStatus::Ready(len) if ring.bytes_available_from(pos) < HEADER_SIZE + len => {
            PacketStatus::NotReady
        }
        status => status,
    }
}

/// Pull the next complete request out of a peer ring.
///
/// Bad positions are skipped one byte at a time. Returns `None` when the
/// ring holds no complete packet; partial packets are left in place.
pub fn next_request(ring: &mut RingBuffer) -> Option<Packet> {
    loop {
        let pos = ring.consumed();
        match packet_status(ring, pos) {
            PacketStatus::NotReady => return None,
            PacketStatus::Bad => {
                debug!(byte = ring.at(pos), "skipping byte outside control packet");
                ring.consume(1);
            }
            PacketStatus::Ready(len) => {
                let command = ring.at(pos + 3);
                let payload = ring.copy_from(pos + HEADER_SIZE, len);
                ring.consume(HEADER_SIZE + len);
                return Some(Packet::new(command, payload));
            }
        }
    }
}

/// Decode a packet from a contiguous buffer.
///
/// Accepts any known command in either direction. Leading bytes that cannot
/// start a packet are discarded. Returns `None` if the buffer does not hold a
/// complete packet yet.
pub fn decode_packet(src: &mut BytesMut) -> Option<Packet> {
    loop {
        let status = {
            let view = &src[..];
            classify(|i| view.get(i).copied(), |c| is_request(c) || is_response(c))
        };
        match status {
            PacketStatus::NotReady => return None,
            PacketStatus::Bad => {
                debug!(byte = src[0], "skipping byte outside control packet");
                src.advance(1);
            }
            PacketStatus::Ready(len) => {
                if src.len() < HEADER_SIZE + len {
                    return None;
                }
                let command = src[3];
                src.advance(HEADER_SIZE);
                let payload = src.split_to(len).freeze();
                return Some(Packet { command, payload });
            }
        }
    }
}

/// Configuration for packet readers and writers.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Upper bound on how long a write may keep retrying a full socket.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            write_timeout: Some(std::time::Duration::from_secs(3)),
        }
    }
}
