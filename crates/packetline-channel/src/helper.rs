//! Binds the protocol to one network channel and enforces the close policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use packetline_frame::{FrameConfig, Packet, DEFAULT_MAX_BODY, DEFAULT_SCRATCH_CAPACITY};
use packetline_registry::PacketRegistry;
use packetline_transport::{
    ChannelEvent, ChannelId, EventBus, EventKind, HeartbeatTick, Listener, NetworkChannel,
    SubscriptionId,
};
use tracing::{debug, error, info, warn};

use crate::codec::{PacketDecoder, PacketEncoder};
use crate::control::Heartbeat;
use crate::error::{ChannelError, Result};

/// Default socket buffer size for each direction: 64 KiB.
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 64 * 1024;

/// Consecutive missed heartbeats after which the channel is closed.
pub const DEFAULT_MISSED_HEARTBEAT_LIMIT: u32 = 2;

/// Configuration for [`ChannelHelper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperConfig {
    /// Socket receive buffer size applied before connecting.
    pub receive_buffer_size: usize,
    /// Socket send buffer size applied before connecting.
    pub send_buffer_size: usize,
    /// Miss count at which a `MissedHeartbeat` event closes the channel.
    pub missed_heartbeat_limit: u32,
    /// Maximum body size for both directions.
    pub max_body_size: usize,
}

impl HelperConfig {
    /// Frame configuration derived from this helper configuration.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_body_size: self.max_body_size,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
        }
    }
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            send_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            missed_heartbeat_limit: DEFAULT_MISSED_HEARTBEAT_LIMIT,
            max_body_size: DEFAULT_MAX_BODY,
        }
    }
}

struct Binding {
    channel: Arc<dyn NetworkChannel>,
    bus: Arc<EventBus>,
    subscriptions: Vec<SubscriptionId>,
}

/// Protocol glue for a single bound channel.
///
/// Reacts to lifecycle events of the bound channel only:
/// - `Connected` and `Closed` are logged
/// - `MissedHeartbeat` closes the channel once the miss count reaches
///   [`HelperConfig::missed_heartbeat_limit`]
/// - `TransportError` always closes the channel
/// - `CustomError` is logged and left to the application
///
/// The helper closes a channel at most once per binding and never closes a
/// channel that is already closed.
///
/// ```ignore
/// let helper = ChannelHelper::new(registry, HelperConfig::default());
/// helper.initialize(channel.clone(), &bus)?;
/// helper.prepare_for_connecting()?;
/// channel.connect(addr, None)?;
/// helper.send_heartbeat();
/// ```
pub struct ChannelHelper {
    registry: Arc<PacketRegistry>,
    config: HelperConfig,
    encoder: Mutex<PacketEncoder>,
    binding: Mutex<Option<Binding>>,
    force_closed: AtomicBool,
}

impl ChannelHelper {
    /// Create an unbound helper.
    pub fn new(registry: Arc<PacketRegistry>, config: HelperConfig) -> Arc<Self> {
        let encoder = PacketEncoder::with_config(config.frame_config());
        Arc::new(Self {
            registry,
            config,
            encoder: Mutex::new(encoder),
            binding: Mutex::new(None),
            force_closed: AtomicBool::new(false),
        })
    }

    /// Bind to `channel` and subscribe to all lifecycle events on `bus`.
    ///
    /// Fails with [`ChannelError::AlreadyBound`] while another binding is
    /// active; call [`shutdown`](Self::shutdown) first to rebind.
    pub fn initialize(self: &Arc<Self>, channel: Arc<dyn NetworkChannel>, bus: &Arc<EventBus>) -> Result<()> {
        let mut binding = self.lock_binding();
        if let Some(existing) = binding.as_ref() {
            warn!(
                bound = %existing.channel.id(),
                requested = %channel.id(),
                "helper already bound"
            );
            return Err(ChannelError::AlreadyBound(existing.channel.id()));
        }

        let weak = Arc::downgrade(self);
        let listener: Listener = Arc::new(move |channel: &dyn NetworkChannel, event: &ChannelEvent| {
            if let Some(helper) = weak.upgrade() {
                helper.handle_event(channel, event);
            }
        });
        let subscriptions = EventKind::ALL
            .iter()
            .map(|kind| bus.subscribe_shared(*kind, Arc::clone(&listener)))
            .collect();

        self.force_closed.store(false, Ordering::SeqCst);
        info!(channel = %channel.id(), name = channel.name(), "helper bound");
        *binding = Some(Binding {
            channel,
            bus: Arc::clone(bus),
            subscriptions,
        });
        Ok(())
    }

    /// Unsubscribe from all lifecycle events and release the channel.
    ///
    /// Does nothing when no channel is bound.
    pub fn shutdown(&self) {
        let Some(binding) = self.lock_binding().take() else {
            debug!("helper shutdown while unbound");
            return;
        };

        for id in binding.subscriptions {
            binding.bus.unsubscribe(id);
        }
        info!(channel = %binding.channel.id(), "helper unbound");
    }

    /// Apply the configured socket buffer sizes to the bound channel.
    ///
    /// Call once before the channel connects.
    pub fn prepare_for_connecting(&self) -> Result<()> {
        let channel = self.bound_channel().ok_or(ChannelError::NotBound)?;
        channel.set_buffer_sizes(self.config.receive_buffer_size, self.config.send_buffer_size)?;
        debug!(
            channel = %channel.id(),
            receive = self.config.receive_buffer_size,
            send = self.config.send_buffer_size,
            "socket buffer sizes configured"
        );
        Ok(())
    }

    /// React to a lifecycle event raised by `channel`.
    ///
    /// Events from any channel other than the bound one are ignored.
    pub fn handle_event(&self, channel: &dyn NetworkChannel, event: &ChannelEvent) {
        let Some(bound) = self.bound_channel() else {
            debug!(channel = %channel.id(), kind = ?event.kind(), "ignoring event while unbound");
            return;
        };
        if bound.id() != channel.id() {
            debug!(
                channel = %channel.id(),
                bound = %bound.id(),
                kind = ?event.kind(),
                "ignoring event for another channel"
            );
            return;
        }

        match event {
            ChannelEvent::Connected { user_data } => {
                info!(
                    channel = %bound.id(),
                    local = ?bound.local_addr(),
                    remote = ?bound.peer_addr(),
                    user_data = ?user_data,
                    "channel connected"
                );
            }
            ChannelEvent::Closed => {
                info!(channel = %bound.id(), "channel closed");
            }
            ChannelEvent::MissedHeartbeat { miss_count } => {
                warn!(channel = %bound.id(), miss_count, "heartbeat missed");
                if *miss_count >= self.config.missed_heartbeat_limit {
                    self.force_close(bound.as_ref(), "missed heartbeats");
                }
            }
            ChannelEvent::TransportError {
                code,
                socket_error,
                message,
            } => {
                error!(
                    channel = %bound.id(),
                    %code,
                    socket_error = ?socket_error,
                    message = %message,
                    "transport error"
                );
                self.force_close(bound.as_ref(), "transport error");
            }
            ChannelEvent::CustomError { payload } => {
                debug!(channel = %bound.id(), %payload, "custom error");
            }
        }
    }

    /// Encode `packet` and hand it to the bound channel.
    pub fn send<P: Packet>(&self, packet: P) -> Result<()> {
        let channel = self.bound_channel().ok_or(ChannelError::NotBound)?;
        if channel.is_closed() {
            return Err(ChannelError::Closed(channel.id()));
        }

        let mut encoder = self.encoder.lock().unwrap_or_else(PoisonError::into_inner);
        let frame = encoder.stage(packet)?;
        channel.send_bytes(frame)?;
        Ok(())
    }

    /// Send a keep-alive message.
    ///
    /// Returns whether the channel accepted it for transmission.
    pub fn send_heartbeat(&self) -> bool {
        match self.send(Heartbeat) {
            Ok(()) => {
                debug!("heartbeat sent");
                true
            }
            Err(err) => {
                warn!(error = %err, "heartbeat not sent");
                false
            }
        }
    }

    /// Act on a heartbeat timer tick.
    ///
    /// Sends the due heartbeat. A miss count is published as
    /// `MissedHeartbeat` only after that heartbeat was accepted; a failed
    /// send has already gone through the transport error path.
    pub fn on_heartbeat_tick(&self, tick: HeartbeatTick) -> bool {
        if !tick.send || !self.send_heartbeat() {
            return false;
        }
        let Some(miss_count) = tick.missed else {
            return true;
        };

        let bound = self
            .lock_binding()
            .as_ref()
            .map(|binding| (Arc::clone(&binding.channel), Arc::clone(&binding.bus)));
        if let Some((channel, bus)) = bound {
            bus.publish(&*channel, &ChannelEvent::MissedHeartbeat { miss_count });
        }
        true
    }

    /// A decoder for the receive context of the bound channel.
    pub fn decoder(&self) -> PacketDecoder {
        PacketDecoder::with_config(Arc::clone(&self.registry), self.config.frame_config())
    }

    /// Id of the bound channel, if any.
    pub fn bound_channel_id(&self) -> Option<ChannelId> {
        self.lock_binding().as_ref().map(|binding| binding.channel.id())
    }

    /// Whether a channel is bound.
    pub fn is_bound(&self) -> bool {
        self.lock_binding().is_some()
    }

    /// Registry shared with decoders.
    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    /// Active configuration.
    pub fn config(&self) -> &HelperConfig {
        &self.config
    }

    fn force_close(&self, channel: &dyn NetworkChannel, reason: &str) {
        if channel.is_closed() {
            debug!(channel = %channel.id(), reason, "channel already closed");
            return;
        }
        if self.force_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(channel = %channel.id(), reason, "closing channel");
        channel.close();
    }

    // The binding lock is never held while calling into a channel: closing
    // a channel publishes events that re-enter `handle_event`.
    fn bound_channel(&self) -> Option<Arc<dyn NetworkChannel>> {
        self.lock_binding()
            .as_ref()
            .map(|binding| Arc::clone(&binding.channel))
    }

    fn lock_binding(&self) -> MutexGuard<'_, Option<Binding>> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ChannelHelper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ChannelHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHelper")
            .field("bound", &self.bound_channel_id())
            .field("config", &self.config)
            .finish()
    }
}
