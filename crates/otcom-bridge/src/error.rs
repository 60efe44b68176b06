use crate::config::ConfigError;

/// Errors that stop the bridge from starting or running.
///
/// Device I/O faults at runtime are not in here: they only change the
/// connectivity status.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] otcom_transport::TransportError),

    #[error("peer error: {0}")]
    Peer(#[from] otcom_peer::PeerError),

    /// A duty loop thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    #[error("bridge is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, BridgeError>;
