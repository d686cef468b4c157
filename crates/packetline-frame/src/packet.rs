use std::any::Any;
use std::fmt;

use bincode::Options;
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::BODY_PREFIX_SIZE;
use crate::error::{FrameError, Result};
use crate::header::PacketId;

/// A message type that can travel in a frame body.
///
/// Construction of a packet value must stay cheap and side-effect free; the
/// id and name are declared on the type so that a registry never has to
/// build an instance to learn them.
///
/// ```
/// use packetline_frame::{Packet, PacketId};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct PlayerMoved {
///     x: i32,
///     y: i32,
/// }
///
/// impl Packet for PlayerMoved {
///     const ID: PacketId = PacketId(7);
///     const NAME: &'static str = "PlayerMoved";
/// }
/// ```
pub trait Packet: Serialize + DeserializeOwned + fmt::Debug + Send + 'static {
    /// Wire id of this packet type.
    const ID: PacketId;
    /// Type name used in logs.
    const NAME: &'static str;
}

/// A decoded incoming packet whose concrete type is only known at runtime.
pub struct DecodedPacket {
    id: PacketId,
    name: &'static str,
    inner: Box<dyn Any + Send>,
    debug: fn(&(dyn Any + Send), &mut fmt::Formatter<'_>) -> fmt::Result,
}

impl DecodedPacket {
    /// Wrap a concrete packet.
    pub fn new<T: Packet>(packet: T) -> Self {
        Self {
            id: T::ID,
            name: T::NAME,
            inner: Box::new(packet),
            debug: debug_packet::<T>,
        }
    }

    /// Wire id of the wrapped packet.
    pub fn id(&self) -> PacketId {
        self.id
    }

    /// Type name of the wrapped packet.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the wrapped packet is a `T`.
    pub fn is<T: Packet>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Borrow the wrapped packet as `T`.
    pub fn downcast_ref<T: Packet>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Take the wrapped packet as `T`, or get `self` back on a type mismatch.
    pub fn downcast<T: Packet>(self) -> std::result::Result<T, Self> {
        let Self {
            id,
            name,
            inner,
            debug,
        } = self;
        match inner.downcast::<T>() {
            Ok(packet) => Ok(*packet),
            Err(inner) => Err(Self {
                id,
                name,
                inner,
                debug,
            }),
        }
    }
}

impl fmt::Debug for DecodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.debug)(self.inner.as_ref(), f)
    }
}

fn debug_packet<T: Packet>(value: &(dyn Any + Send), f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.downcast_ref::<T>() {
        Some(packet) => fmt::Debug::fmt(packet, f),
        None => f.write_str(T::NAME),
    }
}

fn body_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Append `[length prefix][body]` for `packet` to `dst`.
///
/// Returns the body size. `dst` is left untouched when the body would exceed
/// `max_body` or cannot be serialized.
pub fn encode_packet_body<T: Packet>(packet: &T, dst: &mut BytesMut, max_body: usize) -> Result<usize> {
    let size = body_options()
        .serialized_size(packet)
        .map_err(|err| FrameError::Encode(err.to_string()))?;
    let size = usize::try_from(size).unwrap_or(usize::MAX);
    let limit = max_body.min(u32::MAX as usize);
    if size > limit {
        return Err(FrameError::PayloadTooLarge { size, max: limit });
    }

    let start = dst.len();
    dst.reserve(BODY_PREFIX_SIZE + size);
    dst.put_u32(size as u32);
    if let Err(err) = body_options().serialize_into((&mut *dst).writer(), packet) {
        dst.truncate(start);
        return Err(FrameError::Encode(err.to_string()));
    }

    Ok(size)
}

/// Decode a body into a `T`, rejecting bodies longer than `max_body`.
pub fn decode_packet<T: Packet>(body: &[u8], max_body: usize) -> Result<DecodedPacket> {
    if body.len() > max_body {
        return Err(FrameError::PayloadTooLarge {
            size: body.len(),
            max: max_body,
        });
    }

    let packet: T = body_options()
        .with_limit(max_body as u64)
        .deserialize(body)
        .map_err(|err| FrameError::Decode(format!("{}: {err}", T::NAME)))?;
    Ok(DecodedPacket::new(packet))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::codec::DEFAULT_MAX_BODY;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Chat {
        from: u32,
        text: String,
    }

    impl Packet for Chat {
        const ID: PacketId = PacketId(20);
        const NAME: &'static str = "Chat";
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping;

    impl Packet for Ping {
        const ID: PacketId = PacketId(1);
        const NAME: &'static str = "Ping";
    }

    #[test]
    fn body_is_length_prefixed_big_endian() {
        let mut buf = BytesMut::new();
        let chat = Chat {
            from: 42,
            text: String::new(),
        };
        let size = encode_packet_body(&chat, &mut buf, DEFAULT_MAX_BODY).unwrap();

        assert_eq!(buf.len(), BODY_PREFIX_SIZE + size);
        assert_eq!(&buf[..4], &(size as u32).to_be_bytes());
        // from: u32 big-endian fixed width
        assert_eq!(&buf[4..8], &[0, 0, 0, 42]);
    }

    #[test]
    fn decode_restores_packet() {
        let chat = Chat {
            from: 9,
            text: "gg".to_string(),
        };
        let mut buf = BytesMut::new();
        encode_packet_body(&chat, &mut buf, DEFAULT_MAX_BODY).unwrap();

        let decoded = decode_packet::<Chat>(&buf[BODY_PREFIX_SIZE..], DEFAULT_MAX_BODY).unwrap();
        assert_eq!(decoded.id(), PacketId(20));
        assert_eq!(decoded.name(), "Chat");
        assert_eq!(decoded.downcast_ref::<Chat>(), Some(&chat));
    }

    #[test]
    fn unit_packet_has_empty_body() {
        let mut buf = BytesMut::new();
        let size = encode_packet_body(&Ping, &mut buf, DEFAULT_MAX_BODY).unwrap();
        assert_eq!(size, 0);
        assert_eq!(buf.as_ref(), &[0, 0, 0, 0]);
    }

    #[test]
    fn oversized_body_leaves_buffer_untouched() {
        let chat = Chat {
            from: 1,
            text: "x".repeat(64),
        };
        let mut buf = BytesMut::from(&b"keep"[..]);
        let err = encode_packet_body(&chat, &mut buf, 16).unwrap_err();

        assert!(matches!(err, FrameError::PayloadTooLarge { max: 16, .. }));
        assert_eq!(buf.as_ref(), b"keep");
    }

    #[test]
    fn truncated_body_fails_to_decode() {
        let err = decode_packet::<Chat>(&[0, 0, 0], DEFAULT_MAX_BODY).unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let err = decode_packet::<Ping>(&[0xAA], DEFAULT_MAX_BODY).unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }

    #[test]
    fn downcast_mismatch_returns_original() {
        let decoded = DecodedPacket::new(Ping);
        assert!(decoded.is::<Ping>());
        assert!(!decoded.is::<Chat>());

        let decoded = decoded.downcast::<Chat>().unwrap_err();
        assert_eq!(decoded.name(), "Ping");
        assert_eq!(decoded.downcast::<Ping>().unwrap(), Ping);
    }

    #[test]
    fn debug_uses_concrete_type() {
        let decoded = DecodedPacket::new(Chat {
            from: 3,
            text: "hi".to_string(),
        });
        let rendered = format!("{decoded:?}");
        assert!(rendered.contains("Chat"));
        assert!(rendered.contains("hi"));
    }
}
