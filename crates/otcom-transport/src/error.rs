/// Errors that can occur on device links and peer transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the peer listener.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to a running bridge.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// Failed to open the serial device.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },

    /// The serial driver rejected a setting or operation.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The device link is not open.
    #[error("device link is not open")]
    NotOpen,

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device stopped accepting bytes part way through a write.
    #[error("device write stalled after {written} of {len} bytes")]
    Stalled { written: usize, len: usize },

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
