use std::collections::HashMap;
use std::fmt;

use packetline_frame::{decode_packet, DecodedPacket, Packet, PacketId};
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};

/// Decodes a body (without its length prefix) into the described packet type.
pub type DecodeFn = fn(&[u8], usize) -> packetline_frame::Result<DecodedPacket>;

/// Immutable `(id, type)` pair for one packet type.
#[derive(Clone, Copy)]
pub struct PacketDescriptor {
    id: PacketId,
    name: &'static str,
    decode: DecodeFn,
}

impl PacketDescriptor {
    /// Describe packet type `T`.
    pub fn of<T: Packet>() -> Self {
        Self {
            id: T::ID,
            name: T::NAME,
            decode: decode_packet::<T>,
        }
    }

    /// Declared wire id.
    pub fn id(&self) -> PacketId {
        self.id
    }

    /// Type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decode `body` as this packet type, rejecting bodies over `max_body`.
    pub fn decode(&self, body: &[u8], max_body: usize) -> packetline_frame::Result<DecodedPacket> {
        (self.decode)(body, max_body)
    }
}

impl fmt::Debug for PacketDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Build a descriptor array from a list of packet types.
///
/// ```ignore
/// let registry = PacketRegistry::from_descriptors(&packet_descriptors![Heartbeat, Chat])?;
/// ```
#[macro_export]
macro_rules! packet_descriptors {
    ($($packet:ty),* $(,)?) => {
        [$($crate::PacketDescriptor::of::<$packet>()),*]
    };
}

/// A registration dropped because its id was already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdConflict {
    /// The contested id.
    pub id: PacketId,
    /// Type that keeps the id.
    pub kept: &'static str,
    /// Type whose registration was dropped.
    pub ignored: &'static str,
}

/// Collects packet registrations in order, then builds a [`PacketRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<PacketDescriptor>,
    config: RegistryConfig,
}

impl RegistryBuilder {
    /// Create an empty builder with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty builder with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            descriptors: Vec::new(),
            config,
        }
    }

    /// Queue packet type `T`.
    pub fn register<T: Packet>(self) -> Self {
        self.descriptor(PacketDescriptor::of::<T>())
    }

    /// Queue an already built descriptor.
    pub fn descriptor(mut self, descriptor: PacketDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Queue several descriptors, in order.
    pub fn descriptors(mut self, descriptors: &[PacketDescriptor]) -> Self {
        self.descriptors.extend_from_slice(descriptors);
        self
    }

    /// Insert every queued descriptor; the first registration of an id wins.
    pub fn build(self) -> Result<PacketRegistry> {
        let mut entries: HashMap<PacketId, PacketDescriptor> =
            HashMap::with_capacity(self.descriptors.len());
        let mut conflicts = Vec::new();

        for descriptor in self.descriptors {
            if !descriptor.id.is_valid() {
                if self.config.reject_duplicates {
                    return Err(RegistryError::InvalidId {
                        id: descriptor.id,
                        name: descriptor.name,
                    });
                }
                warn!(id = %descriptor.id, packet = descriptor.name, "skipping packet with invalid id");
                continue;
            }

            if let Some(existing) = entries.get(&descriptor.id) {
                if self.config.reject_duplicates {
                    return Err(RegistryError::DuplicateId {
                        id: descriptor.id,
                        existing: existing.name,
                        rejected: descriptor.name,
                    });
                }
                warn!(
                    id = %descriptor.id,
                    existing = existing.name,
                    rejected = descriptor.name,
                    "packet id already registered"
                );
                conflicts.push(IdConflict {
                    id: descriptor.id,
                    kept: existing.name,
                    ignored: descriptor.name,
                });
                continue;
            }

            debug!(id = %descriptor.id, packet = descriptor.name, "packet registered");
            entries.insert(descriptor.id, descriptor);
        }

        Ok(PacketRegistry { entries, conflicts })
    }
}

/// Read-only mapping from packet id to packet type.
#[derive(Debug, Default)]
pub struct PacketRegistry {
    entries: HashMap<PacketId, PacketDescriptor>,
    conflicts: Vec<IdConflict>,
}

impl PacketRegistry {
    /// Start a registration list.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Build from descriptors with default config.
    pub fn from_descriptors(descriptors: &[PacketDescriptor]) -> Result<Self> {
        RegistryBuilder::new().descriptors(descriptors).build()
    }

    /// Resolve a wire id. Unknown ids return `None`.
    pub fn lookup(&self, id: PacketId) -> Option<&PacketDescriptor> {
        self.entries.get(&id)
    }

    /// Whether `id` has a registered type.
    pub fn contains(&self, id: PacketId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Registered ids, sorted ascending.
    pub fn ids(&self) -> Vec<PacketId> {
        let mut ids: Vec<PacketId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Registered descriptors, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &PacketDescriptor> {
        self.entries.values()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registrations dropped during the build, in registration order.
    pub fn conflicts(&self) -> &[IdConflict] {
        &self.conflicts
    }
}
