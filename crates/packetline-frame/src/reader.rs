use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_frame, FrameConfig, RawFrame};
use crate::error::{FrameError, Result};

/// Bytes requested from the stream per refill.
const REFILL_SIZE: usize = 8 * 1024;

/// Splits a blocking byte stream into [`RawFrame`]s.
///
/// Reads ahead into an internal buffer. When the stream must stay positioned
/// on a frame boundary (a socket shared with another reader, say) use
/// [`crate::read_header`] and [`crate::read_body`] instead.
pub struct FrameReader<R> {
    stream: R,
    pending: BytesMut,
    config: FrameConfig,
}

impl<R: Read> FrameReader<R> {
    pub fn new(stream: R) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: R, config: FrameConfig) -> Self {
        Self {
            stream,
            pending: BytesMut::with_capacity(config.scratch_capacity),
            config,
        }
    }

    /// Next frame, or `None` once the stream ends on a frame boundary.
    ///
    /// A stream that ends inside a frame is `FrameError::ConnectionClosed`;
    /// [`buffered`](Self::buffered) then reports how many bytes were left.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            if let Some(frame) = decode_frame(&mut self.pending, self.config.max_body_size)? {
                trace!(id = %frame.id(), body = frame.body.len(), "frame split");
                return Ok(Some(frame));
            }
            if !self.refill()? {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    /// Next frame; any end of stream is `FrameError::ConnectionClosed`.
    pub fn read_frame(&mut self) -> Result<RawFrame> {
        self.next_frame()?.ok_or(FrameError::ConnectionClosed)
    }

    /// Bytes read from the stream that do not yet form a whole frame.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.stream
    }

    pub fn into_inner(self) -> R {
        self.stream
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    // Returns false at end of stream.
    fn refill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; REFILL_SIZE];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}
