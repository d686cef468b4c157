//! Network channel abstraction for packetline.
//!
//! This is the lowest layer of packetline. It describes the persistent
//! connection the protocol runs over without owning any protocol logic:
//! - [`NetworkChannel`]: send raw frames, close, report endpoints
//! - [`EventBus`]: lifecycle events tagged with the originating channel
//! - [`HeartbeatState`]: keep-alive timer bookkeeping for the host scheduler
//! - [`TcpChannel`]: a blocking TCP implementation of [`NetworkChannel`]

pub mod error;
pub mod event;
pub mod heartbeat;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use event::{
    ChannelEvent, EventBus, EventKind, Listener, NetworkErrorCode, SubscriptionId, UserData,
};
pub use heartbeat::{HeartbeatConfig, HeartbeatState, HeartbeatTick};
pub use tcp::TcpChannel;
pub use traits::{ChannelId, NetworkChannel};
