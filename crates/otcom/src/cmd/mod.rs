use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use otcom_bridge::PrintMode;
use otcom_mpipe::ProtocolVersion;
use otcom_transport::FlowMode;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod build;
pub mod control;
pub mod decode;
pub mod listen;
pub mod send;
pub mod serve;
pub mod version;

/// Bridge address used when neither `--addr` nor `OTCOM_ADDR` is set.
pub const DEFAULT_ADDR: &str = "127.0.0.1:7700";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge between a serial device and TCP peers.
    Serve(ServeArgs),
    /// Ask a running bridge whether its device is connected.
    Status(StatusArgs),
    /// Change the device baud rate.
    Baud(BaudArgs),
    /// Change the device flow-control mode.
    Flow(FlowArgs),
    /// Reopen the device.
    Reconnect(ConnectArgs),
    /// Stop a running bridge.
    Kill(ConnectArgs),
    /// Write bytes to the device as-is.
    Send(SendArgs),
    /// Print data broadcast by a running bridge.
    Listen(ListenArgs),
    /// Frame a directive for the device and print it as hex.
    Build(BuildArgs),
    /// Parse device bytes given as hex and print the messages.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Status(args) => control::status(args, format),
        Command::Baud(args) => control::baud(args),
        Command::Flow(args) => control::flow(args),
        Command::Reconnect(args) => control::reconnect(args),
        Command::Kill(args) => control::kill(args),
        Command::Send(args) => send::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Build(args) => build::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Bridge address (host:port).
    #[arg(long, env = "OTCOM_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,
    /// Connect and reply timeout (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// TOML config file; flags below override its values.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Serial device, e.g. /dev/ttyUSB0. Empty runs without a device.
    #[arg(long)]
    pub port: Option<String>,
    #[arg(long)]
    pub baud: Option<u32>,
    /// none, hardware or xonxoff.
    #[arg(long)]
    pub flow: Option<FlowMode>,
    /// mpipe2 or ndef.
    #[arg(long)]
    pub protocol: Option<ProtocolVersion>,
    /// Address to listen on for peers.
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub tcp_port: Option<u16>,
    /// hide, raw or decoded.
    #[arg(long)]
    pub print: Option<PrintMode>,
    /// Append raw device bytes to this file.
    #[arg(long, value_name = "FILE")]
    pub capture: Option<PathBuf>,
    /// Also send rendered messages to peers as decoded text.
    #[arg(long)]
    pub broadcast_decoded: bool,
    /// Write the effective config to FILE and exit.
    #[arg(long, value_name = "FILE")]
    pub write_config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Also have the bridge log its buffer state.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct BaudArgs {
    pub rate: u32,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct FlowArgs {
    /// none, hardware or xonxoff.
    pub mode: FlowMode,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Bytes as hex, e.g. "FF 55 01".
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Text sent as UTF-8.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Send the contents of a file.
    #[arg(long, conflicts_with_all = ["hex", "data"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Print decoded text instead of raw device bytes.
    #[arg(long)]
    pub decoded: bool,
    /// Exit after N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Protocol version to frame for.
    #[arg(long, default_value = "mpipe2")]
    pub protocol: ProtocolVersion,
    /// Directive id (decimal or 0x hex).
    #[arg(long, value_parser = parse_byte)]
    pub id: u8,
    /// Directive command (decimal or 0x hex).
    #[arg(long, value_parser = parse_byte)]
    pub cmd: u8,
    #[arg(long, default_value = "0")]
    pub seq: u16,
    /// Payload as hex.
    #[arg(long, conflicts_with = "data")]
    pub hex: Option<String>,
    /// Payload text.
    #[arg(long, conflicts_with = "hex")]
    pub data: Option<String>,
    /// Split the payload into chunks of at most N bytes.
    #[arg(long, value_name = "N")]
    pub chunk: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Protocol version of the input.
    #[arg(long, default_value = "mpipe2")]
    pub protocol: ProtocolVersion,
    /// Hex input. Read from stdin when omitted.
    pub hex: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Accept `12` or `0x0C`.
pub fn parse_byte(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("not a byte value: {input}"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
    }

    #[test]
    fn byte_values_in_decimal_or_hex() {
        assert_eq!(parse_byte("4"), Ok(4));
        assert_eq!(parse_byte("0x81"), Ok(0x81));
        assert!(parse_byte("0x100").is_err());
        assert!(parse_byte("-1").is_err());
    }
}
