//! Peer side of the otcom bridge.
//!
//! Every TCP peer becomes a [`Client`] with its own inbound ring and a
//! locked write half. The [`ClientRegistry`] hands out ids and fans device
//! data out to all peers. Requests are routed to the bridge through the
//! [`ControlHandler`] trait. [`BridgeClient`] is the other end of the same
//! socket, used by command-line tools.

pub mod client;
pub mod connector;
pub mod control;
pub mod error;
pub mod registry;

pub use client::{Client, ClientConfig, ClientId, CONSOLE_ID};
pub use connector::{BridgeClient, DEFAULT_TIMEOUT};
pub use control::{dispatch, process_requests, ControlHandler};
pub use error::{PeerError, Result};
pub use registry::ClientRegistry;
