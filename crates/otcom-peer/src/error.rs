/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] otcom_transport::TransportError),

    /// Packet-level error.
    #[error("packet error: {0}")]
    Packet(#[from] otcom_frame::PacketError),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The bridge answered with something other than the expected reply.
    #[error("unexpected reply command 0x{0:02X}")]
    UnexpectedReply(u8),
}

pub type Result<T> = std::result::Result<T, PeerError>;
