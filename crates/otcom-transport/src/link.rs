use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default serial speed used when nothing else is configured.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial flow-control discipline.
///
/// The numeric codes are the ones carried in `flowmode-change` control
/// packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowMode {
    #[default]
    None,
    Hardware,
    XonXoff,
}

impl FlowMode {
    /// Decode a wire code (0 none, 1 hardware, 2 xon/xoff).
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Hardware),
            2 => Some(Self::XonXoff),
            _ => None,
        }
    }

    /// Wire code for this mode.
    pub fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Hardware => 1,
            Self::XonXoff => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Hardware => "hardware",
            Self::XonXoff => "xonxoff",
        }
    }
}

impl fmt::Display for FlowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlowMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hardware" | "rtscts" => Ok(Self::Hardware),
            "xonxoff" | "software" => Ok(Self::XonXoff),
            other => Err(format!("unknown flow mode: {other}")),
        }
    }
}

/// Everything needed to (re)open a device link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
    pub flow_mode: FlowMode,
    /// Upper bound for a single blocking read. Reads that see no data in
    /// this window return `Ok(0)`.
    pub read_timeout: Duration,
    /// Upper bound for a single write call.
    pub write_timeout: Duration,
}

impl LinkSettings {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            flow_mode: FlowMode::None,
            read_timeout: Duration::from_millis(1),
            write_timeout: Duration::from_millis(3000),
        }
    }
}

/// Access to the device on the far side of the serial line.
///
/// The bridge never touches OS serial details directly; it only drives this
/// trait. Implementations are used from several threads but always behind
/// the owner's lock, so they only need to be `Send`.
pub trait DeviceLink: Send {
    /// Open the link with the given settings, closing any previous handle.
    fn open(&mut self, settings: &LinkSettings) -> Result<()>;

    /// Close the link. Closing an already closed link is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    fn set_flow_mode(&mut self, mode: FlowMode) -> Result<()>;

    /// Read whatever is available, waiting at most the configured read
    /// timeout. Returns `Ok(0)` when nothing arrived.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write as much of `data` as the device accepts within the write
    /// timeout.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Discard anything pending in the OS input and output queues.
    fn flush(&mut self) -> Result<()>;

    fn send_break(&mut self, duration: Duration) -> Result<()>;
}

impl DeviceLink for Box<dyn DeviceLink> {
    fn open(&mut self, settings: &LinkSettings) -> Result<()> {
        (**self).open(settings)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        (**self).set_baud_rate(baud_rate)
    }

    fn set_flow_mode(&mut self, mode: FlowMode) -> Result<()> {
        (**self).set_flow_mode(mode)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn send_break(&mut self, duration: Duration) -> Result<()> {
        (**self).send_break(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_mode_codes_round_trip() {
        for mode in [FlowMode::None, FlowMode::Hardware, FlowMode::XonXoff] {
            assert_eq!(FlowMode::from_code(mode.code()), Some(mode));
        }
        assert_eq!(FlowMode::from_code(3), None);
    }

    #[test]
    fn flow_mode_parses_aliases() {
        assert_eq!("XONXOFF".parse::<FlowMode>(), Ok(FlowMode::XonXoff));
        assert_eq!("rtscts".parse::<FlowMode>(), Ok(FlowMode::Hardware));
        assert!("odd".parse::<FlowMode>().is_err());
    }

    #[test]
    fn settings_defaults() {
        let settings = LinkSettings::new("/dev/ttyUSB0");
        assert_eq!(settings.port, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.flow_mode, FlowMode::None);
        assert_eq!(settings.write_timeout, Duration::from_secs(3));
    }
}
