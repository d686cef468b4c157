/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] packetline_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] packetline_frame::FrameError),

    /// Registry build error.
    #[error("registry error: {0}")]
    Registry(#[from] packetline_registry::RegistryError),

    /// `initialize` was called while a channel is already bound.
    #[error("helper already bound to channel {0}")]
    AlreadyBound(packetline_transport::ChannelId),

    /// No channel is bound.
    #[error("no channel bound")]
    NotBound,

    /// The bound channel is closed.
    #[error("channel {0} is closed")]
    Closed(packetline_transport::ChannelId),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
