use std::net::SocketAddr;

/// Errors that can occur in channel transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel has no live connection yet.
    #[error("channel '{0}' is not connected")]
    NotConnected(String),

    /// `connect` was called on a channel that already holds a connection.
    #[error("channel '{0}' is already connected")]
    AlreadyConnected(String),

    /// The channel has been closed.
    #[error("channel '{0}' is closed")]
    Closed(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
