/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The packet does not carry a usable id and cannot be framed.
    #[error("invalid packet '{name}' (id {id})")]
    InvalidPacket { id: i32, name: &'static str },

    /// The body exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The packet body could not be serialized.
    #[error("failed to encode packet body: {0}")]
    Encode(String),

    /// The body bytes do not match the packet type.
    #[error("failed to decode packet body: {0}")]
    Decode(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
