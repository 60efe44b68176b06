//! Device and network transports for the otcom serial bridge.
//!
//! Two kinds of endpoint live here:
//! - a [`DeviceLink`], the only access the bridge has to the physical device
//!   (backed by `serialport`, or by [`MemoryLink`] in tests)
//! - [`PeerStream`] / [`TcpServer`], the TCP side where control peers connect
//!
//! Helpers for XON/XOFF byte-stuffing and raw capture files sit alongside,
//! since both operate on the raw device byte stream.

pub mod capture;
pub mod error;
pub mod link;
pub mod memory;
pub mod serial;
pub mod stream;
pub mod tcp;
pub mod xonxoff;

pub use capture::CaptureFile;
pub use error::{Result, TransportError};
pub use link::{DeviceLink, FlowMode, LinkSettings, DEFAULT_BAUD_RATE};
pub use memory::{MemoryLink, MemoryLinkHandle};
pub use serial::SerialPortLink;
pub use stream::PeerStream;
pub use tcp::{connect, TcpServer, DEFAULT_TCP_PORT};
pub use xonxoff::XonXoffCodec;
