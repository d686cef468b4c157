//! Packet-level encode and decode on top of the raw frame format.
//!
//! [`PacketEncoder`] runs on the main context and owns the scratch buffer.
//! [`PacketDecoder`] runs on the receive context; it only reads the shared
//! registry, so the two never contend.

use std::io::{Read, Write};
use std::sync::Arc;

use bytes::BytesMut;
use packetline_frame::writer::write_all;
use packetline_frame::{
    encode_packet_body, read_body, read_header, DecodedPacket, FrameConfig, FrameError, Packet,
    PacketHeader, RawFrame, Result,
};
use packetline_registry::PacketRegistry;
use serde_json::json;
use tracing::{debug, trace, warn};

/// Out-of-band description of why a frame produced no packet.
pub type CustomErrorData = serde_json::Value;

/// Result of a decode step together with its custom error data.
///
/// `custom_error` is `None` on the happy path.
#[derive(Debug)]
pub struct Decoded<T> {
    pub value: T,
    pub custom_error: Option<CustomErrorData>,
}

impl<T> Decoded<T> {
    /// A decode step that produced `value` without incident.
    pub fn ok(value: T) -> Self {
        Self {
            value,
            custom_error: None,
        }
    }

    /// Discard the custom error data.
    pub fn into_value(self) -> T {
        self.value
    }
}

impl Decoded<Option<DecodedPacket>> {
    fn dropped(custom_error: CustomErrorData) -> Self {
        Self {
            value: None,
            custom_error: Some(custom_error),
        }
    }
}

/// Serializes outgoing packets into complete frames.
///
/// Frames are staged in a reusable scratch buffer and only copied to the
/// destination once fully built, so a failed encode writes nothing.
#[derive(Debug)]
pub struct PacketEncoder {
    scratch: BytesMut,
    config: FrameConfig,
}

impl PacketEncoder {
    /// Create an encoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create an encoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            scratch: BytesMut::with_capacity(config.scratch_capacity),
            config,
        }
    }

    /// Encode `packet` and write the frame to `dst`.
    ///
    /// Returns the number of bytes written.
    pub fn encode<P: Packet, W: Write + ?Sized>(&mut self, packet: P, dst: &mut W) -> Result<usize> {
        let len = self.stage(packet)?.len();
        write_all(dst, &self.scratch)?;
        Ok(len)
    }

    /// Encode `packet` into a freshly allocated frame.
    pub fn encode_to_vec<P: Packet>(&mut self, packet: P) -> Result<Vec<u8>> {
        Ok(self.stage(packet)?.to_vec())
    }

    /// Build the frame for `packet` in the scratch buffer and borrow it.
    ///
    /// The borrowed bytes stay valid until the next call on this encoder.
    pub fn stage<P: Packet>(&mut self, packet: P) -> Result<&[u8]> {
        if !P::ID.is_valid() {
            warn!(id = %P::ID, packet = P::NAME, "refusing to encode packet with invalid id");
            return Err(FrameError::InvalidPacket {
                id: P::ID.get(),
                name: P::NAME,
            });
        }

        self.scratch.clear();
        self.scratch.reserve(self.config.scratch_capacity);
        PacketHeader::new(P::ID).put(&mut self.scratch);
        if let Err(err) = encode_packet_body(&packet, &mut self.scratch, self.config.max_body_size) {
            self.scratch.clear();
            warn!(id = %P::ID, packet = P::NAME, error = %err, "failed to encode packet");
            return Err(err);
        }

        trace!(id = %P::ID, packet = P::NAME, bytes = self.scratch.len(), "packet encoded");
        Ok(&self.scratch)
    }

    /// Current encoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for PacketEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes incoming frames into registered packet types.
#[derive(Debug, Clone)]
pub struct PacketDecoder {
    registry: Arc<PacketRegistry>,
    config: FrameConfig,
}

impl PacketDecoder {
    /// Create a decoder with default configuration.
    pub fn new(registry: Arc<PacketRegistry>) -> Self {
        Self::with_config(registry, FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(registry: Arc<PacketRegistry>, config: FrameConfig) -> Self {
        Self { registry, config }
    }

    /// Read exactly one header from `src`.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at end of stream.
    pub fn decode_header<R: Read + ?Sized>(&self, src: &mut R) -> Result<Decoded<PacketHeader>> {
        let header = read_header(src)?;
        trace!(id = %header.id(), "header decoded");
        Ok(Decoded::ok(header))
    }

    /// Read the body announced by `header` and decode it.
    ///
    /// The body is always consumed. Invalid headers, unknown ids and
    /// malformed bodies yield `value: None` with a description in
    /// `custom_error`; only stream failures are errors.
    pub fn decode_body<R: Read + ?Sized>(
        &self,
        header: PacketHeader,
        src: &mut R,
    ) -> Result<Decoded<Option<DecodedPacket>>> {
        let body = read_body(src, self.config.max_body_size)?;
        Ok(self.resolve(header, &body))
    }

    /// Decode a frame already split off the stream.
    pub fn decode_raw(&self, frame: &RawFrame) -> Decoded<Option<DecodedPacket>> {
        self.resolve(frame.header, &frame.body)
    }

    /// Registry used to resolve packet ids.
    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn resolve(&self, header: PacketHeader, body: &[u8]) -> Decoded<Option<DecodedPacket>> {
        let id = header.id();
        if !header.is_valid() {
            warn!(%id, "dropping frame with invalid header");
            return Decoded::dropped(json!({ "reason": "invalid_header", "id": id.get() }));
        }

        let Some(descriptor) = self.registry.lookup(id) else {
            warn!(%id, bytes = body.len(), "dropping frame with unknown packet id");
            return Decoded::dropped(json!({ "reason": "unknown_packet_id", "id": id.get() }));
        };

        match descriptor.decode(body, self.config.max_body_size) {
            Ok(packet) => {
                debug!(%id, packet = descriptor.name(), "packet decoded");
                Decoded::ok(Some(packet))
            }
            Err(err) => {
                warn!(%id, packet = descriptor.name(), error = %err, "dropping malformed packet body");
                Decoded::dropped(json!({
                    "reason": "malformed_body",
                    "id": id.get(),
                    "packet": descriptor.name(),
                    "error": err.to_string(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use packetline_frame::{PacketId, BODY_PREFIX_SIZE, HEADER_SIZE};
    use packetline_registry::{packet_descriptors, RegistryBuilder};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::control::Heartbeat;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TypeA {
        x: i32,
    }

    impl Packet for TypeA {
        const ID: PacketId = PacketId(7);
        const NAME: &'static str = "TypeA";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TypeB {
        label: String,
    }

    impl Packet for TypeB {
        const ID: PacketId = PacketId(7);
        const NAME: &'static str = "TypeB";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Unregistered {
        a: u8,
    }

    impl Packet for Unregistered {
        const ID: PacketId = PacketId(55);
        const NAME: &'static str = "Unregistered";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Unset;

    impl Packet for Unset {
        const ID: PacketId = PacketId(0);
        const NAME: &'static str = "Unset";
    }

    fn decoder(descriptors: &[packetline_registry::PacketDescriptor]) -> PacketDecoder {
        let registry = RegistryBuilder::new().descriptors(descriptors).build().unwrap();
        PacketDecoder::new(Arc::new(registry))
    }

    fn decode_one(decoder: &PacketDecoder, src: &mut Cursor<Vec<u8>>) -> Decoded<Option<DecodedPacket>> {
        let header = decoder.decode_header(src).unwrap().into_value();
        decoder.decode_body(header, src).unwrap()
    }

    #[test]
    fn encode_then_decode_reconstructs_packet() {
        let mut encoder = PacketEncoder::new();
        let mut wire = Vec::new();
        let written = encoder.encode(TypeA { x: 42 }, &mut wire).unwrap();
        assert_eq!(written, wire.len());
        assert_eq!(&wire[..HEADER_SIZE], &7i32.to_be_bytes());

        let decoder = decoder(&packet_descriptors![TypeA]);
        let decoded = decode_one(&decoder, &mut Cursor::new(wire));

        assert!(decoded.custom_error.is_none());
        let packet = decoded.value.unwrap();
        assert_eq!(packet.id(), PacketId(7));
        assert_eq!(packet.downcast::<TypeA>().unwrap(), TypeA { x: 42 });
    }

    #[test]
    fn duplicate_registration_still_decodes_first_type() {
        let decoder = decoder(&packet_descriptors![TypeA, TypeB]);
        assert_eq!(decoder.registry().conflicts().len(), 1);

        let wire = PacketEncoder::new().encode_to_vec(TypeA { x: 42 }).unwrap();
        let packet = decode_one(&decoder, &mut Cursor::new(wire)).value.unwrap();
        assert_eq!(packet.downcast_ref::<TypeA>(), Some(&TypeA { x: 42 }));
    }

    #[test]
    fn unknown_id_is_dropped_and_stream_stays_aligned() {
        let mut encoder = PacketEncoder::new();
        let mut wire = Vec::new();
        encoder.encode(Unregistered { a: 1 }, &mut wire).unwrap();
        encoder.encode(TypeA { x: 5 }, &mut wire).unwrap();

        let decoder = decoder(&packet_descriptors![TypeA]);
        let mut src = Cursor::new(wire);

        let dropped = decode_one(&decoder, &mut src);
        assert!(dropped.value.is_none());
        assert_eq!(
            dropped.custom_error,
            Some(json!({ "reason": "unknown_packet_id", "id": 55 }))
        );

        let next = decode_one(&decoder, &mut src).value.unwrap();
        assert_eq!(next.downcast_ref::<TypeA>(), Some(&TypeA { x: 5 }));
    }

    #[test]
    fn invalid_header_is_dropped() {
        let mut wire = (-4i32).to_be_bytes().to_vec();
        wire.extend_from_slice(&[0, 0, 0, 1, 0xFF]);
        let decoder = decoder(&packet_descriptors![TypeA]);
        let mut src = Cursor::new(wire);

        let header = decoder.decode_header(&mut src).unwrap().into_value();
        assert!(!header.is_valid());
        let decoded = decoder.decode_body(header, &mut src).unwrap();
        assert!(decoded.value.is_none());
        assert_eq!(decoded.custom_error.unwrap()["reason"], "invalid_header");
        assert_eq!(src.position() as usize, HEADER_SIZE + BODY_PREFIX_SIZE + 1);
    }

    #[test]
    fn malformed_body_is_dropped() {
        let mut wire = 7i32.to_be_bytes().to_vec();
        wire.extend_from_slice(&[0, 0, 0, 2, 0xAA, 0xBB]);
        let decoder = decoder(&packet_descriptors![TypeA]);

        let decoded = decode_one(&decoder, &mut Cursor::new(wire));
        assert!(decoded.value.is_none());
        let error = decoded.custom_error.unwrap();
        assert_eq!(error["reason"], "malformed_body");
        assert_eq!(error["packet"], "TypeA");
    }

    #[test]
    fn oversized_prefix_is_an_error() {
        let mut wire = 7i32.to_be_bytes().to_vec();
        wire.extend_from_slice(&u32::MAX.to_be_bytes());
        let decoder = decoder(&packet_descriptors![TypeA]);
        let mut src = Cursor::new(wire);

        let header = decoder.decode_header(&mut src).unwrap().into_value();
        let err = decoder.decode_body(header, &mut src).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn header_at_eof_reports_closed() {
        let decoder = decoder(&[]);
        let err = decoder.decode_header(&mut Cursor::new(vec![0u8; 2])).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn invalid_packet_writes_nothing() {
        let mut encoder = PacketEncoder::new();
        let mut wire = Vec::new();
        let err = encoder.encode(Unset, &mut wire).unwrap_err();

        assert!(matches!(err, FrameError::InvalidPacket { id: 0, name: "Unset" }));
        assert!(wire.is_empty());
    }

    #[test]
    fn oversized_packet_writes_nothing() {
        let mut encoder = PacketEncoder::with_config(FrameConfig {
            max_body_size: 8,
            ..FrameConfig::default()
        });
        let mut wire = Vec::new();
        let err = encoder
            .encode(
                TypeB {
                    label: "far too long for the limit".to_string(),
                },
                &mut wire,
            )
            .unwrap_err();

        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(wire.is_empty());
    }

    #[test]
    fn scratch_is_reused_between_packets() {
        let mut encoder = PacketEncoder::new();
        let first = encoder.encode_to_vec(TypeB { label: "long label".into() }).unwrap();
        let second = encoder.encode_to_vec(Heartbeat).unwrap();

        assert!(first.len() > second.len());
        assert_eq!(second, vec![0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn decode_raw_frame() {
        let decoder = decoder(&packet_descriptors![TypeA]);
        let frame = RawFrame::new(PacketId(7), vec![0, 0, 0, 9]);
        let packet = decoder.decode_raw(&frame).value.unwrap();
        assert_eq!(packet.downcast_ref::<TypeA>(), Some(&TypeA { x: 9 }));
    }

    #[test]
    fn decoder_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<PacketDecoder>();
    }
}
