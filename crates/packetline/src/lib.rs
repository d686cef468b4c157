//! Client-side binary protocol layer for games.
//!
//! packetline frames, serializes and dispatches messages exchanged with a
//! game server over one persistent connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: channel abstraction, lifecycle events, TCP channel
//! - [`frame`]: packet ids, headers and length-prefixed bodies
//! - [`registry`]: packet id to packet type mapping
//! - [`channel`]: packet codec, lifecycle handling and heartbeats (behind
//!   `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use packetline_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use packetline_frame::*;
}

/// Re-export registry types.
pub mod registry {
    pub use packetline_registry::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use packetline_channel::*;
}
