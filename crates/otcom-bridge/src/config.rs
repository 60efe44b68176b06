//! Bridge configuration, persisted as TOML.
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! flow_mode = "none"
//! protocol = "mpipe2"
//! tcp_port = 7700
//! print_mode = "decoded"
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use otcom_frame::DEFAULT_RING_CAPACITY;
use otcom_mpipe::ProtocolVersion;
use otcom_transport::{FlowMode, LinkSettings, DEFAULT_BAUD_RATE, DEFAULT_TCP_PORT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// What the console shows of device traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintMode {
    Hide,
    /// Hex dump of every byte read from the device.
    Raw,
    /// One rendered line per parsed message.
    #[default]
    Decoded,
}

impl PrintMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hide => "hide",
            Self::Raw => "raw",
            Self::Decoded => "decoded",
        }
    }
}

impl fmt::Display for PrintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrintMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hide" | "none" | "off" => Ok(Self::Hide),
            "raw" | "hex" => Ok(Self::Raw),
            "decoded" | "decode" => Ok(Self::Decoded),
            other => Err(format!("unknown print mode {other:?} (expected hide, raw or decoded)")),
        }
    }
}

/// Everything the bridge needs to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Serial device path. Empty runs the bridge without a device.
    pub port: String,
    pub baud_rate: u32,
    pub flow_mode: FlowMode,
    pub protocol: ProtocolVersion,
    pub tcp_host: String,
    pub tcp_port: u16,
    pub print_mode: PrintMode,
    /// Raw capture of device input, appended to while set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_path: Option<PathBuf>,
    pub write_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub join_timeout_ms: u64,
    pub ring_capacity: usize,
    /// Also send rendered text to peers as decoded-text packets.
    pub broadcast_decoded: bool,
    /// `tracing` level for the binary: `error` .. `trace`.
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            flow_mode: FlowMode::None,
            protocol: ProtocolVersion::Mpipe2,
            tcp_host: "127.0.0.1".to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            print_mode: PrintMode::Decoded,
            capture_path: None,
            write_timeout_ms: 3000,
            poll_interval_ms: 1,
            join_timeout_ms: 1000,
            ring_capacity: DEFAULT_RING_CAPACITY,
            broadcast_decoded: false,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Write the config, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_toml_string()?).map_err(io_err)
    }

    pub fn has_device(&self) -> bool {
        !self.port.is_empty()
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            flow_mode: self.flow_mode,
            write_timeout: self.write_timeout(),
            ..LinkSettings::default()
        }
    }

    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.tcp_host, self.tcp_port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}
