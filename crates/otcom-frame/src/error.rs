/// Errors that can occur while reading or writing control packets.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The payload does not fit the 16-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing packets.
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side stayed unwritable for longer than the write timeout.
    #[error("write timed out after {0:?}")]
    WriteTimeout(std::time::Duration),

    /// The connection was closed before a complete packet was received.
    #[error("connection closed (incomplete packet)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, PacketError>;
