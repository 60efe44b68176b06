//! Serial-to-TCP bridge for devices speaking the Mpipe protocol.
//!
//! One process owns the serial port; any number of TCP peers receive
//! everything the device sends and may push bytes back or reconfigure the
//! link through a small control protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial links, TCP listener and peer streams, XON/XOFF
//! - [`frame`]: ring buffer and control-socket packets
//! - [`mpipe`]: device protocol builder and parser (Mpipe2, legacy NDEF)
//! - [`peer`]: peer registry, control dispatch, bridge client (`bridge` feature)
//! - [`bridge`]: configuration, device owner and duty loops (`bridge` feature)

/// Re-export transport types.
pub mod transport {
    pub use otcom_transport::*;
}

/// Re-export control-socket framing.
pub mod frame {
    pub use otcom_frame::*;
}

/// Re-export the device protocol codec.
pub mod mpipe {
    pub use otcom_mpipe::*;
}

/// Re-export peer types (requires `bridge` feature).
#[cfg(feature = "bridge")]
pub mod peer {
    pub use otcom_peer::*;
}

/// Re-export the bridge (requires `bridge` feature).
#[cfg(feature = "bridge")]
pub mod bridge {
    pub use otcom_bridge::*;
}
