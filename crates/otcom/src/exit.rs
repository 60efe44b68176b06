use std::fmt;
use std::io;

use otcom_bridge::{BridgeError, ConfigError};
use otcom_frame::PacketError;
use otcom_mpipe::MpipeError;
use otcom_peer::PeerError;
use otcom_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn packet_error(context: &str, err: PacketError) -> CliError {
    match err {
        PacketError::Io(source) => io_error(context, source),
        PacketError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PacketError::WriteTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PacketError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Packet(err) => packet_error(context, err),
        PeerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::Disconnected(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn mpipe_error(context: &str, err: MpipeError) -> CliError {
    match err {
        MpipeError::InvalidHex(_) => CliError::new(USAGE, format!("{context}: {err}")),
        MpipeError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    match err {
        ConfigError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => {
            CliError::new(USAGE, format!("{context}: config file not found"))
        }
        ConfigError::Io { source, .. } => io_error(context, source),
        ConfigError::Parse(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ConfigError::Serialize(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn bridge_error(context: &str, err: BridgeError) -> CliError {
    match err {
        BridgeError::Config(err) => config_error(context, err),
        BridgeError::Transport(err) => transport_error(context, err),
        BridgeError::Peer(err) => peer_error(context, err),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn refused_connect_is_a_plain_failure() {
        let err = peer_error(
            "connect failed",
            PeerError::Transport(TransportError::Connect {
                addr: "127.0.0.1:1".into(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            }),
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.starts_with("connect failed: "));
    }

    #[test]
    fn reply_timeout_maps_to_124() {
        let err = peer_error("status failed", PeerError::Timeout(Duration::from_secs(3)));
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn bad_hex_is_a_usage_error() {
        let err = mpipe_error("bad payload", MpipeError::InvalidHex("zz".into()));
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn device_errors_are_transport_errors() {
        let err = transport_error("open failed", TransportError::NotOpen);
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
