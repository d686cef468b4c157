//! Async framing for tokio streams.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, RawFrame, BODY_PREFIX_SIZE, DEFAULT_MAX_BODY};
use crate::error::{FrameError, Result};
use crate::header::{PacketHeader, HEADER_SIZE};

/// `tokio_util` codec splitting a byte stream into [`RawFrame`]s.
#[derive(Debug, Clone)]
pub struct RawFrameCodec {
    max_body: usize,
}

impl RawFrameCodec {
    /// Codec with the default maximum body size.
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY)
    }

    /// Codec rejecting bodies larger than `max_body`.
    pub fn with_max_body(max_body: usize) -> Self {
        Self { max_body }
    }

    /// Maximum accepted body size.
    pub fn max_body(&self) -> usize {
        self.max_body
    }
}

impl Default for RawFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RawFrameCodec {
    type Item = RawFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        decode_frame(src, self.max_body)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<RawFrame> for RawFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: RawFrame, dst: &mut BytesMut) -> Result<()> {
        if item.body.len() > self.max_body {
            return Err(FrameError::PayloadTooLarge {
                size: item.body.len(),
                max: self.max_body,
            });
        }
        encode_frame(&item, dst)
    }
}

/// Read exactly one frame from an async stream without over-reading.
pub async fn read_raw_frame<R>(src: &mut R, max_body: usize) -> Result<RawFrame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_SIZE];
    read_exact(src, &mut header).await?;

    let mut prefix = [0u8; BODY_PREFIX_SIZE];
    read_exact(src, &mut prefix).await?;
    let body_len = u32::from_be_bytes(prefix) as usize;
    if body_len > max_body {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: max_body,
        });
    }

    let mut body = vec![0u8; body_len];
    read_exact(src, &mut body).await?;

    Ok(RawFrame {
        header: PacketHeader::from_bytes(header),
        body: Bytes::from(body),
    })
}

async fn read_exact<R>(src: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match src.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(FrameError::ConnectionClosed)
        }
        Err(err) => Err(FrameError::Io(err)),
    }
}
