//! Client-side protocol layer for packetline.
//!
//! Ties the frame format and the packet registry to a live channel:
//! - [`PacketEncoder`] / [`PacketDecoder`]: packets to frames and back
//! - [`ChannelHelper`]: lifecycle events, close policy and heartbeats
//! - [`Receiver`]: background receive loop feeding decoded packets and
//!   receive-side events to the main context
//! - [`Dispatcher`]: per-type packet handlers on the main context

pub mod codec;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod helper;
pub mod receiver;

pub use codec::{CustomErrorData, Decoded, PacketDecoder, PacketEncoder};
pub use control::{control_descriptors, Heartbeat, HEARTBEAT_ID};
pub use dispatcher::Dispatcher;
pub use error::{ChannelError, Result};
pub use helper::{
    ChannelHelper, HelperConfig, DEFAULT_MISSED_HEARTBEAT_LIMIT, DEFAULT_SOCKET_BUFFER_SIZE,
};
pub use receiver::{Incoming, ReceiveSummary, Receiver};
