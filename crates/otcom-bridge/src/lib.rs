//! Serial-to-TCP bridge runtime.
//!
//! A [`Bridge`] owns one serial [`Device`] and any number of TCP peers.
//! Bytes from the device are broadcast raw to every peer and parsed for the
//! console; peers steer the bridge with control packets (baud rate, flow
//! mode, reconnect, kill) and write to the device with send-as-is.
//!
//! ```no_run
//! use otcom_bridge::{Bridge, BridgeConfig};
//!
//! let config = BridgeConfig {
//!     port: "/dev/ttyUSB0".into(),
//!     ..BridgeConfig::default()
//! };
//! let mut bridge = Bridge::with_serial(config)?;
//! bridge.run()?;
//! # Ok::<(), otcom_bridge::BridgeError>(())
//! ```

pub mod bridge;
pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod pipeline;

pub use bridge::{Bridge, BridgeEvent, BridgeHandle};
pub use config::{BridgeConfig, ConfigError, PrintMode};
pub use console::{broadcast_raw, ConsoleSink, CONSOLE_TARGET};
pub use device::{Device, DeviceStatus};
pub use error::{BridgeError, Result};
pub use pipeline::{Pipeline, PipelineContext};
