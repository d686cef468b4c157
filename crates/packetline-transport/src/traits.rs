use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one channel instance.
///
/// Two channels never share an id, even when they carry the same name, so
/// lifecycle consumers can tell a rebound channel apart from a stale one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A persistent, stateful connection that packetline frames are sent over.
///
/// Implementations own the socket. The protocol layer only references a
/// channel: it hands it encoded frames, asks it to close, and listens to the
/// lifecycle events the channel publishes.
pub trait NetworkChannel: Send + Sync {
    /// Identity of this channel instance.
    fn id(&self) -> ChannelId;

    /// Human-readable channel name used in logs.
    fn name(&self) -> &str;

    /// Local endpoint, if connected.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Remote endpoint, if connected.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Send one fully encoded frame.
    ///
    /// Must fail, not panic or silently drop, once the channel is closed.
    fn send_bytes(&self, frame: &[u8]) -> Result<()>;

    /// Close the channel. Closing an already closed channel is a no-op.
    fn close(&self);

    /// Whether [`close`](Self::close) has taken effect.
    fn is_closed(&self) -> bool;

    /// Configure socket receive/send buffer sizes in bytes.
    ///
    /// Intended to be called once before connecting.
    fn set_buffer_sizes(&self, receive: usize, send: usize) -> Result<()>;
}

impl fmt::Debug for dyn NetworkChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkChannel")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_are_unique_and_increasing() {
        let first = ChannelId::next();
        let second = ChannelId::next();
        assert_ne!(first, second);
        assert!(second.get() > first.get());
    }

    #[test]
    fn channel_id_display() {
        let id = ChannelId(7);
        assert_eq!(id.to_string(), "#7");
    }
}
