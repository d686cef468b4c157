use packetline_frame::{Packet, PacketId};
use packetline_registry::PacketDescriptor;
use serde::{Deserialize, Serialize};

/// Packet id reserved for keep-alive messages.
pub const HEARTBEAT_ID: PacketId = PacketId(1);

/// Keep-alive message. Carries no payload; its body is empty on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat;

impl Packet for Heartbeat {
    const ID: PacketId = HEARTBEAT_ID;
    const NAME: &'static str = "Heartbeat";
}

/// Descriptors for packets every channel understands.
pub fn control_descriptors() -> [PacketDescriptor; 1] {
    [PacketDescriptor::of::<Heartbeat>()]
}
