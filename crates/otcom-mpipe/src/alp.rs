//! ALP directive identifiers and the human-readable log rendering.

use std::fmt::Write as _;

use crate::error::{MpipeError, Result};
use crate::message::Message;

pub const ID_NULL: u8 = 0x00;
pub const ID_FILE_DATA: u8 = 0x01;
pub const ID_SENSOR: u8 = 0x02;
pub const ID_DASHFORTH: u8 = 0x03;
pub const ID_LOG: u8 = 0x04;
pub const ID_SESSION: u8 = 0x80;
pub const ID_SYSTEM: u8 = 0x81;
pub const ID_M2QP: u8 = 0x82;

/// Log body formats, selected by the two low bits of `cmd`.
pub const LOG_RAW: u8 = 0x00;
pub const LOG_UTF8: u8 = 0x01;
pub const LOG_UTF16: u8 = 0x02;
pub const LOG_UTF8HEX: u8 = 0x03;
/// Body is prefixed with a space-terminated label.
pub const LOG_MSG: u8 = 0x04;
pub const LOG_ECHO: u8 = 0x10;

/// Set on commands that echo an earlier request.
pub const CMD_FLAG_ECHO: u8 = 0x40;
/// Set on commands that request a response.
pub const CMD_FLAG_REQ: u8 = 0x80;

const BODY_MASK: u8 = 0x03;

pub fn id_name(id: u8) -> Option<&'static str> {
    Some(match id {
        ID_NULL => "null",
        ID_FILE_DATA => "filedata",
        ID_SENSOR => "sensor",
        ID_DASHFORTH => "dashforth",
        ID_LOG => "log",
        ID_SESSION => "session",
        ID_SYSTEM => "system",
        ID_M2QP => "m2qp",
        _ => return None,
    })
}

/// Render one decoded message as a single console line.
///
/// ```text
/// [ 12 ]  [ 04 01 ]  [ label body ]
/// [ 13 ]  [ LOG ]  [ text ]
/// ```
pub fn render(message: &Message) -> String {
    let directive = &message.directive;
    let mut line = format!("[ {} ]  [ ", message.seq);
    if directive.id == ID_LOG {
        line.push_str(if directive.cmd == LOG_ECHO { "ECHO " } else { "LOG " });
    } else {
        let _ = write!(line, "{:02X} {:02X} ", directive.id, directive.cmd);
    }
    line.push_str("]  [ ");
    render_body(directive.cmd, &directive.payload, &mut line);
    line.push(']');
    line
}

fn render_body(cmd: u8, payload: &[u8], out: &mut String) {
    let mut body = payload;
    if cmd & LOG_MSG != 0 {
        let end = body
            .iter()
            .position(|&b| b == b' ')
            .map_or(body.len(), |space| space + 1);
        push_text(&body[..end], out);
        body = &body[end..];
    }

    match cmd & BODY_MASK {
        LOG_RAW => out.push_str(&to_hex(body)),
        LOG_UTF8 => push_text(body, out),
        LOG_UTF16 => {
            let units = body
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            for c in char::decode_utf16(units) {
                out.push(match c.unwrap_or(char::REPLACEMENT_CHARACTER) {
                    '\n' => ' ',
                    c => c,
                });
            }
        }
        _ => {
            for pair in body.chunks(2) {
                out.push_str(&String::from_utf8_lossy(pair));
                out.push(' ');
            }
        }
    }
}

fn push_text(bytes: &[u8], out: &mut String) {
    out.extend(
        String::from_utf8_lossy(bytes)
            .chars()
            .map(|c| if c == '\n' { ' ' } else { c }),
    );
}

/// Uppercase hex with a trailing space after every byte.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        let _ = write!(out, "{b:02X} ");
    }
    out
}

/// Parse hex text. Whitespace, `:` and `,` separators and a `0x` prefix on
/// each group are accepted.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let mut digits = String::with_capacity(text.len());
    for group in text.split(|c: char| c.is_whitespace() || c == ':' || c == ',') {
        let group = group
            .strip_prefix("0x")
            .or_else(|| group.strip_prefix("0X"))
            .unwrap_or(group);
        digits.push_str(group);
    }
    if digits.len() % 2 != 0 {
        return Err(MpipeError::InvalidHex(format!(
            "odd number of hex digits ({})",
            digits.len()
        )));
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).unwrap_or("??");
            u8::from_str_radix(pair, 16)
                .map_err(|_| MpipeError::InvalidHex(format!("bad byte {pair:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChunkCode, Directive};

    fn message(id: u8, cmd: u8, payload: &[u8]) -> Message {
        Message {
            seq: 9,
            chunk: ChunkCode::No,
            directive: Directive::new(id, cmd, payload.to_vec()),
        }
    }

    #[test]
    fn renders_raw_directive_as_hex() {
        let line = render(&message(ID_SENSOR, 0x00, &[0x01, 0xAB]));
        assert_eq!(line, "[ 9 ]  [ 02 00 ]  [ 01 AB ]");
    }

    #[test]
    fn renders_utf8_log_with_newlines_flattened() {
        let line = render(&message(ID_LOG, LOG_UTF8, b"hello\nworld"));
        assert_eq!(line, "[ 9 ]  [ LOG ]  [ hello world]");
    }

    #[test]
    fn renders_label_then_hex_body() {
        let line = render(&message(ID_LOG, LOG_MSG | LOG_RAW, b"temp \x01\x02"));
        assert_eq!(line, "[ 9 ]  [ LOG ]  [ temp 01 02 ]");
    }

    #[test]
    fn renders_utf16_big_endian() {
        let line = render(&message(ID_LOG, LOG_UTF16, &[0x00, b'h', 0x00, b'i']));
        assert_eq!(line, "[ 9 ]  [ LOG ]  [ hi]");
    }

    #[test]
    fn renders_utf8hex_pairs() {
        let line = render(&message(ID_LOG, LOG_UTF8HEX, b"0A1F"));
        assert_eq!(line, "[ 9 ]  [ LOG ]  [ 0A 1F ]");
    }

    #[test]
    fn echo_marker() {
        let line = render(&message(ID_LOG, LOG_ECHO, b"x"));
        assert!(line.starts_with("[ 9 ]  [ ECHO ]"));
    }

    #[test]
    fn parse_hex_accepts_common_separators() {
        assert_eq!(parse_hex("04 01 ff").unwrap(), vec![0x04, 0x01, 0xFF]);
        assert_eq!(parse_hex("0x04,0x01").unwrap(), vec![0x04, 0x01]);
        assert_eq!(parse_hex("dead:BEEF").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn id_names() {
        assert_eq!(id_name(ID_LOG), Some("log"));
        assert_eq!(id_name(0x42), None);
    }
}
