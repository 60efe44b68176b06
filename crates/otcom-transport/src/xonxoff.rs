//! XON/XOFF byte-stuffing.
//!
//! With software flow control the line reserves 0x11 and 0x13, so payload
//! bytes that collide with them (and the escape byte itself) travel as
//! two-byte escape sequences.

const ESCAPE: u8 = b'\\';
const XON: u8 = 0x11;
const XOFF: u8 = 0x13;
const NOT_ESCAPE: u8 = 0xA3;
const NOT_XON: u8 = 0xEE;
const NOT_XOFF: u8 = 0xEC;

/// Stateful stuffer/unstuffer for one device stream.
///
/// Scratch buffers belong to the codec, so independent links never share
/// state. An escape byte that ends one read is remembered and completed by
/// the next.
#[derive(Debug, Default)]
pub struct XonXoffCodec {
    pending_escape: bool,
    encoded: Vec<u8>,
    decoded: Vec<u8>,
}

impl XonXoffCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stuff `data` for transmission. The returned slice is valid until the
    /// next call.
    pub fn encode(&mut self, data: &[u8]) -> &[u8] {
        self.encoded.clear();
        self.encoded.reserve(data.len() + data.len() / 8);
        for &byte in data {
            match byte {
                ESCAPE => self.encoded.extend_from_slice(&[ESCAPE, NOT_ESCAPE]),
                XON => self.encoded.extend_from_slice(&[ESCAPE, NOT_XON]),
                XOFF => self.encoded.extend_from_slice(&[ESCAPE, NOT_XOFF]),
                other => self.encoded.push(other),
            }
        }
        &self.encoded
    }

    /// Undo stuffing on bytes received from the line.
    ///
    /// An unknown escape pair is passed through unchanged. Because of that,
    /// an escape left pending by the previous call can add one byte: the
    /// output is at most `data.len() + 1` bytes long, and never longer than
    /// `data.len()` when [`has_pending_escape`](Self::has_pending_escape) was
    /// false on entry.
    pub fn decode(&mut self, data: &[u8]) -> &[u8] {
        self.decoded.clear();
        self.decoded.reserve(data.len());
        for &byte in data {
            if self.pending_escape {
                self.pending_escape = false;
                match byte {
                    NOT_ESCAPE => self.decoded.push(ESCAPE),
                    NOT_XON => self.decoded.push(XON),
                    NOT_XOFF => self.decoded.push(XOFF),
                    other => self.decoded.extend_from_slice(&[ESCAPE, other]),
                }
            } else if byte == ESCAPE {
                self.pending_escape = true;
            } else {
                self.decoded.push(byte);
            }
        }
        &self.decoded
    }

    /// True if the last decoded chunk ended on an escape byte.
    pub fn has_pending_escape(&self) -> bool {
        self.pending_escape
    }

    /// Forget any half-received escape sequence.
    pub fn reset(&mut self) {
        self.pending_escape = false;
    }
}
