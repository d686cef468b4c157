//! Channel lifecycle events and the bus that delivers them.
//!
//! One bus may be shared by many channels; every event is delivered together
//! with the channel that raised it, and listeners decide whether it concerns
//! them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::traits::NetworkChannel;

/// Opaque application payload attached to connect and custom-error events.
pub type UserData = serde_json::Value;

/// Classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorCode {
    /// The address family is not supported.
    AddressFamily,
    /// Socket configuration failed.
    Socket,
    /// Connecting to the remote endpoint failed.
    Connect,
    /// Writing to the socket failed.
    Send,
    /// Reading from the socket failed.
    Receive,
    /// A packet could not be serialized.
    Serialize,
    /// A packet header could not be read.
    DeserializePacketHeader,
    /// A packet body could not be read.
    DeserializePacket,
    /// Anything else.
    Unknown,
}

impl NetworkErrorCode {
    /// Stable lowercase name used in logs and JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkErrorCode::AddressFamily => "address_family",
            NetworkErrorCode::Socket => "socket",
            NetworkErrorCode::Connect => "connect",
            NetworkErrorCode::Send => "send",
            NetworkErrorCode::Receive => "receive",
            NetworkErrorCode::Serialize => "serialize",
            NetworkErrorCode::DeserializePacketHeader => "deserialize_packet_header",
            NetworkErrorCode::DeserializePacket => "deserialize_packet",
            NetworkErrorCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NetworkErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event raised by a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel finished connecting.
    Connected { user_data: Option<UserData> },
    /// The channel closed.
    Closed,
    /// The keep-alive timer elapsed `miss_count` times without inbound traffic.
    MissedHeartbeat { miss_count: u32 },
    /// The transport failed.
    TransportError {
        code: NetworkErrorCode,
        socket_error: Option<std::io::ErrorKind>,
        message: String,
    },
    /// Protocol-specific out-of-band error payload.
    CustomError { payload: UserData },
}

impl ChannelEvent {
    /// The kind used to route this event to subscribers.
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::Connected { .. } => EventKind::Connected,
            ChannelEvent::Closed => EventKind::Closed,
            ChannelEvent::MissedHeartbeat { .. } => EventKind::MissedHeartbeat,
            ChannelEvent::TransportError { .. } => EventKind::TransportError,
            ChannelEvent::CustomError { .. } => EventKind::CustomError,
        }
    }
}

/// Subscription key for [`EventBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Closed,
    MissedHeartbeat,
    TransportError,
    CustomError,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [EventKind; 5] = [
        EventKind::Connected,
        EventKind::Closed,
        EventKind::MissedHeartbeat,
        EventKind::TransportError,
        EventKind::CustomError,
    ];
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked for each published event of the subscribed kind.
pub type Listener = Arc<dyn Fn(&dyn NetworkChannel, &ChannelEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    listener: Listener,
}

/// Fan-out of channel lifecycle events to registered listeners.
///
/// Safe to share between the main context and the receive context.
/// Listeners run outside the bus lock, so a listener may close the channel
/// (which publishes `Closed`) or unsubscribe itself.
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&dyn NetworkChannel, &ChannelEvent) + Send + Sync + 'static,
    {
        self.subscribe_shared(kind, Arc::new(listener))
    }

    /// Register an already shared listener for one event kind.
    pub fn subscribe_shared(&self, kind: EventKind, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription { id, kind, listener });
        trace!(?kind, ?id, "listener subscribed");
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.id != id);
        before != subscriptions.len()
    }

    /// Deliver an event raised by `channel` to every listener of its kind.
    ///
    /// Returns the number of listeners invoked.
    pub fn publish(&self, channel: &dyn NetworkChannel, event: &ChannelEvent) -> usize {
        let kind = event.kind();
        let listeners: Vec<Listener> = self
            .lock()
            .iter()
            .filter(|sub| sub.kind == kind)
            .map(|sub| Arc::clone(&sub.listener))
            .collect();

        trace!(channel = %channel.id(), ?kind, listeners = listeners.len(), "publishing event");
        for listener in &listeners {
            listener(channel, event);
        }
        listeners.len()
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().iter().filter(|sub| sub.kind == kind).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.lock().len())
            .finish()
    }
}
