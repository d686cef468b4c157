use std::fmt;

use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Encoded header size: the packet id as a big-endian `i32`.
pub const HEADER_SIZE: usize = 4;

/// Numeric tag identifying a packet's concrete type on the wire.
///
/// Ids are assigned once, when the packet type is defined. Only strictly
/// positive ids name a packet; `0` and negative values mark an invalid header.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PacketId(pub i32);

impl PacketId {
    /// Wrap a raw id.
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Raw numeric value.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Whether this id can name a packet type.
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl From<i32> for PacketId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-width frame header.
///
/// Wire format:
/// ```text
/// ┌──────────────────────┐
/// │ Packet id (4B BE)    │
/// └──────────────────────┘
/// ```
///
/// The header is valid when its id is valid; a reader that finds an invalid
/// header still consumes the body that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    id: PacketId,
}

impl PacketHeader {
    /// Header announcing a body of packet `id`.
    pub fn new(id: PacketId) -> Self {
        Self { id }
    }

    /// Id of the body that follows.
    pub fn id(&self) -> PacketId {
        self.id
    }

    /// Whether the header names a packet type.
    pub fn is_valid(&self) -> bool {
        self.id.is_valid()
    }

    /// Encode into the fixed wire representation.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        self.id.0.to_be_bytes()
    }

    /// Decode from the fixed wire representation.
    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        Self {
            id: PacketId(i32::from_be_bytes(bytes)),
        }
    }

    /// Append the wire representation to `dst`.
    pub fn put(&self, dst: &mut impl BufMut) {
        dst.put_i32(self.id.0);
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn header_is_big_endian() {
        let header = PacketHeader::new(PacketId(0x0102_0304));
        assert_eq!(header.to_bytes(), [0x01, 0x02, 0x03, 0x04]);

        let mut buf = BytesMut::new();
        header.put(&mut buf);
        assert_eq!(buf.as_ref(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn header_from_bytes() {
        let header = PacketHeader::from_bytes([0x00, 0x00, 0x00, 0x07]);
        assert_eq!(header.id(), PacketId(7));
        assert!(header.is_valid());
    }

    #[test]
    fn non_positive_ids_are_invalid() {
        assert!(!PacketId(0).is_valid());
        assert!(!PacketId(-3).is_valid());
        assert!(!PacketHeader::from_bytes([0xFF, 0xFF, 0xFF, 0xFF]).is_valid());
        assert!(PacketId(1).is_valid());
    }

    #[test]
    fn packet_id_display() {
        assert_eq!(PacketId(42).to_string(), "42");
        assert_eq!(PacketId::from(-1).get(), -1);
    }
}
