use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use otcom_frame::{command_name, Packet, DECODED_TEXT};
use otcom_mpipe::alp::id_name;
use otcom_mpipe::{render, to_hex, Message, ParseError, ProtocolVersion};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    bridge: &'a str,
    connected: bool,
    timestamp: String,
}

pub fn print_status(bridge: &str, connected: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&StatusOutput {
            bridge,
            connected,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["BRIDGE", "DEVICE"]);
            table.add_row(vec![bridge.to_string(), device_state(connected).to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("bridge={bridge} device={}", device_state(connected));
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    command: u8,
    command_name: &'a str,
    size: usize,
    payload: String,
    timestamp: String,
}

/// Print a packet received from the bridge (raw data or decoded text).
pub fn print_packet(packet: &Packet, format: OutputFormat) {
    let preview = packet_preview(packet);
    match format {
        OutputFormat::Json => print_json(&PacketOutput {
            command: packet.command,
            command_name: command_name(packet.command),
            size: packet.payload.len(),
            payload: preview,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "SIZE", "PAYLOAD"]);
            table.add_row(vec![
                command_name(packet.command).to_string(),
                packet.payload.len().to_string(),
                preview,
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{preview}"),
        OutputFormat::Raw => print_raw(packet.payload.as_ref()),
    }
}

#[derive(Serialize)]
struct WireOutput<'a> {
    protocol: &'a str,
    size: usize,
    hex: String,
}

/// Print a framed device message.
pub fn print_wire(protocol: ProtocolVersion, wire: &[u8], format: OutputFormat) {
    let hex = to_hex(wire).trim_end().to_string();
    match format {
        OutputFormat::Json => print_json(&WireOutput {
            protocol: protocol.as_str(),
            size: wire.len(),
            hex,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PROTOCOL", "SIZE", "BYTES"]);
            table.add_row(vec![protocol.to_string(), wire.len().to_string(), hex]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{hex}"),
        OutputFormat::Raw => print_raw(wire),
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    seq: u16,
    chunk: String,
    id: u8,
    id_name: Option<&'a str>,
    cmd: u8,
    payload_size: usize,
    payload: String,
    text: String,
}

#[derive(Serialize)]
struct DecodeOutput<'a> {
    protocol: &'a str,
    messages: Vec<MessageOutput<'a>>,
    errors: Vec<String>,
}

/// Print everything a parser pulled out of some input.
pub fn print_decoded(
    protocol: ProtocolVersion,
    messages: &[Message],
    errors: &[ParseError],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&DecodeOutput {
            protocol: protocol.as_str(),
            messages: messages
                .iter()
                .map(|message| MessageOutput {
                    seq: message.seq,
                    chunk: format!("{:?}", message.chunk).to_lowercase(),
                    id: message.directive.id,
                    id_name: id_name(message.directive.id),
                    cmd: message.directive.cmd,
                    payload_size: message.directive.payload.len(),
                    payload: to_hex(&message.directive.payload).trim_end().to_string(),
                    text: render(message),
                })
                .collect(),
            errors: errors.iter().map(ToString::to_string).collect(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["SEQ", "ID", "CMD", "SIZE", "TEXT"]);
            for message in messages {
                let id = message.directive.id;
                table.add_row(vec![
                    message.seq.to_string(),
                    id_name(id).map_or_else(|| format!("{id:02X}"), str::to_string),
                    format!("{:02X}", message.directive.cmd),
                    message.directive.payload.len().to_string(),
                    render(message),
                ]);
            }
            println!("{table}");
            for error in errors {
                println!("error: {error}");
            }
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for message in messages {
                println!("{}", render(message));
            }
            for error in errors {
                println!("error: {error}");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn device_state(connected: bool) -> &'static str {
    if connected {
        "connected"
    } else {
        "disconnected"
    }
}

fn packet_preview(packet: &Packet) -> String {
    if packet.command == DECODED_TEXT {
        return String::from_utf8_lossy(&packet.payload).into_owned();
    }
    to_hex(&packet.payload).trim_end().to_string()
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use otcom_frame::RAW_DATA;

    use super::*;

    #[test]
    fn raw_data_previews_as_hex() {
        let packet = Packet::new(RAW_DATA, vec![0xFF, 0x55, 0x01]);
        assert_eq!(packet_preview(&packet), "FF 55 01");
    }

    #[test]
    fn decoded_text_previews_as_text() {
        let packet = Packet::new(DECODED_TEXT, b"[ 1 ]  [ LOG ]  [ hi]".to_vec());
        assert_eq!(packet_preview(&packet), "[ 1 ]  [ LOG ]  [ hi]");
    }
}
