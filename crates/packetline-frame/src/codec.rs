use std::io::{ErrorKind, Read};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::header::{PacketHeader, PacketId, HEADER_SIZE};

/// Body length prefix: `u32` big-endian.
pub const BODY_PREFIX_SIZE: usize = 4;

/// Default maximum body size: 1 MiB.
pub const DEFAULT_MAX_BODY: usize = 1024 * 1024;

/// Default capacity of the outbound scratch buffer: 8 KiB.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 8 * 1024;

/// A complete frame whose body has not been decoded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Header that preceded the body.
    pub header: PacketHeader,
    /// Body bytes, without the length prefix.
    pub body: Bytes,
}

impl RawFrame {
    /// Create a new raw frame.
    pub fn new(id: PacketId, body: impl Into<Bytes>) -> Self {
        Self {
            header: PacketHeader::new(id),
            body: body.into(),
        }
    }

    /// Id carried by the header.
    pub fn id(&self) -> PacketId {
        self.header.id()
    }

    /// The total wire size of this frame (header + prefix + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + BODY_PREFIX_SIZE + self.body.len()
    }
}

/// Encode a raw frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────────┐
/// │ Packet id    │ Body length  │ Body             │
/// │ (4B BE i32)  │ (4B BE u32)  │ (Length bytes)   │
/// └──────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_frame(frame: &RawFrame, dst: &mut BytesMut) -> Result<()> {
    if frame.body.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: frame.body.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(frame.wire_size());
    frame.header.put(dst);
    dst.put_u32(frame.body.len() as u32);
    dst.put_slice(&frame.body);
    Ok(())
}

/// Decode a raw frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. The header id is not
/// checked here; see [`PacketHeader::is_valid`].
pub fn decode_frame(src: &mut BytesMut, max_body: usize) -> Result<Option<RawFrame>> {
    if src.len() < HEADER_SIZE + BODY_PREFIX_SIZE {
        return Ok(None);
    }

    let header = PacketHeader::from_bytes([src[0], src[1], src[2], src[3]]);
    let body_len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;

    if body_len > max_body {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: max_body,
        });
    }

    let total = HEADER_SIZE + BODY_PREFIX_SIZE + body_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE + BODY_PREFIX_SIZE);
    let body = src.split_to(body_len).freeze();

    Ok(Some(RawFrame { header, body }))
}

/// Read exactly one header from a blocking stream.
///
/// Returns `Err(FrameError::ConnectionClosed)` when the stream ends first.
pub fn read_header<R: Read + ?Sized>(src: &mut R) -> Result<PacketHeader> {
    let mut bytes = [0u8; HEADER_SIZE];
    read_exact(src, &mut bytes)?;
    Ok(PacketHeader::from_bytes(bytes))
}

/// Read one length-prefixed body from a blocking stream.
///
/// The whole body is consumed before returning, so the stream is positioned
/// on the next header. A prefix above `max_body` is an error and leaves the
/// stream misaligned.
pub fn read_body<R: Read + ?Sized>(src: &mut R, max_body: usize) -> Result<Bytes> {
    let mut prefix = [0u8; BODY_PREFIX_SIZE];
    read_exact(src, &mut prefix)?;
    let body_len = u32::from_be_bytes(prefix) as usize;

    if body_len > max_body {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: max_body,
        });
    }

    let mut body = vec![0u8; body_len];
    read_exact(src, &mut body)?;
    Ok(Bytes::from(body))
}

fn read_exact<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> Result<()> {
    src.read_exact(buf).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => FrameError::ConnectionClosed,
        _ => FrameError::Io(err),
    })
}

/// Configuration for the frame codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 1 MiB.
    pub max_body_size: usize,
    /// Initial capacity of the outbound scratch buffer. Default: 8 KiB.
    pub scratch_capacity: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
        }
    }
}
