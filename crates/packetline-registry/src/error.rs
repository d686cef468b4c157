use packetline_frame::PacketId;

/// Errors that can occur while building a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two packet types declare the same id.
    #[error("packet id {id} already registered by '{existing}', cannot register '{rejected}'")]
    DuplicateId {
        id: PacketId,
        existing: &'static str,
        rejected: &'static str,
    },

    /// A packet type declares an id that cannot appear in a valid header.
    #[error("packet '{name}' declares invalid id {id}")]
    InvalidId { id: PacketId, name: &'static str },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
