use std::collections::HashMap;

use packetline_frame::{DecodedPacket, Packet, PacketId};
use tracing::{trace, warn};

type HandlerFn = dyn FnMut(DecodedPacket) + Send + 'static;

/// Routes decoded packets to per-type handlers on the main context.
pub struct Dispatcher {
    handlers: HashMap<PacketId, Box<HandlerFn>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Handle every packet of type `P` with `handler`, replacing any previous
    /// handler for `P::ID`.
    pub fn on<P, F>(&mut self, mut handler: F) -> &mut Self
    where
        P: Packet,
        F: FnMut(P) + Send + 'static,
    {
        let routed: Box<HandlerFn> = Box::new(move |packet: DecodedPacket| match packet.downcast::<P>() {
            Ok(packet) => handler(packet),
            Err(other) => warn!(
                id = %P::ID,
                expected = P::NAME,
                actual = other.name(),
                "packet type does not match handler"
            ),
        });
        if self.handlers.insert(P::ID, routed).is_some() {
            warn!(id = %P::ID, packet = P::NAME, "replacing packet handler");
        }
        self
    }

    /// Run the handler registered for `packet`.
    ///
    /// Returns `false` when no handler is registered for its id.
    pub fn dispatch(&mut self, packet: DecodedPacket) -> bool {
        let id = packet.id();
        match self.handlers.get_mut(&id) {
            Some(handler) => {
                trace!(%id, packet = packet.name(), "dispatching packet");
                handler(packet);
                true
            }
            None => {
                trace!(%id, packet = packet.name(), "no handler for packet");
                false
            }
        }
    }

    /// Whether a handler is registered for `id`.
    pub fn handles(&self, id: PacketId) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<PacketId> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("Dispatcher").field("handlers", &ids).finish()
    }
}
