//! Blocking frame output.

use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, FrameConfig, RawFrame};
use crate::error::{FrameError, Result};

fn is_transient(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

/// Push every byte of `bytes` into `dst`, then flush it.
///
/// Transient errors (`Interrupted`, `WouldBlock`) are retried. A sink that
/// accepts zero bytes is treated as closed.
pub fn write_all<W: Write + ?Sized>(dst: &mut W, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        match dst.write(bytes) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => bytes = &bytes[n..],
            Err(err) if is_transient(err.kind()) => {}
            Err(err) => return Err(err.into()),
        }
    }
    flush(dst)
}

/// Flush `dst`, retrying transient errors.
pub fn flush<W: Write + ?Sized>(dst: &mut W) -> Result<()> {
    loop {
        match dst.flush() {
            Ok(()) => return Ok(()),
            Err(err) if is_transient(err.kind()) => {}
            Err(err) => return Err(err.into()),
        }
    }
}

/// Serializes [`RawFrame`]s onto a blocking stream.
///
/// Each frame is assembled in a reused buffer and handed to the stream in
/// one [`write_all`] call.
pub struct FrameWriter<W> {
    stream: W,
    staging: BytesMut,
    config: FrameConfig,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(stream: W) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: W, config: FrameConfig) -> Self {
        Self {
            stream,
            staging: BytesMut::with_capacity(config.scratch_capacity),
            config,
        }
    }

    /// Send one frame. Bodies over the configured maximum are refused
    /// before anything is written.
    pub fn write_frame(&mut self, frame: &RawFrame) -> Result<()> {
        let size = frame.body.len();
        if size > self.config.max_body_size {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.config.max_body_size,
            });
        }

        self.staging.clear();
        encode_frame(frame, &mut self.staging)?;
        write_all(&mut self.stream, &self.staging)
    }

    pub fn get_ref(&self) -> &W {
        &self.stream
    }

    pub fn into_inner(self) -> W {
        self.stream
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::codec::decode_frame;
    use crate::header::PacketId;

    /// Scripted sink: each write or flush first pops a queued error, if any.
    #[derive(Default)]
    struct Sink {
        write_errors: VecDeque<ErrorKind>,
        flush_errors: VecDeque<ErrorKind>,
        accepts_nothing: bool,
        data: Vec<u8>,
        flushes: usize,
    }

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.write_errors.pop_front() {
                return Err(kind.into());
            }
            if self.accepts_nothing {
                return Ok(0);
            }
            // Accept at most three bytes per call to force partial writes.
            let n = buf.len().min(3);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if let Some(kind) = self.flush_errors.pop_front() {
                return Err(kind.into());
            }
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn frames_survive_partial_writes() {
        let mut writer = FrameWriter::new(Sink::default());
        writer.write_frame(&RawFrame::new(PacketId(3), &b"logout"[..])).unwrap();
        writer.write_frame(&RawFrame::new(PacketId(1), &b""[..])).unwrap();

        let sink = writer.into_inner();
        assert_eq!(sink.flushes, 2);

        let mut wire = BytesMut::from(&sink.data[..]);
        let first = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        let second = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!((first.id(), &first.body[..]), (PacketId(3), &b"logout"[..]));
        assert_eq!((second.id(), second.body.len()), (PacketId(1), 0));
        assert!(wire.is_empty());
    }

    #[test]
    fn oversized_body_writes_nothing() {
        let config = FrameConfig {
            max_body_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Sink::default(), config);

        let err = writer
            .write_frame(&RawFrame::new(PacketId(5), &b"inventory"[..]))
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));
        assert!(writer.get_ref().data.is_empty());
    }

    #[test]
    fn transient_errors_are_retried() {
        let mut sink = Sink {
            write_errors: VecDeque::from([ErrorKind::Interrupted, ErrorKind::WouldBlock]),
            flush_errors: VecDeque::from([ErrorKind::WouldBlock]),
            ..Sink::default()
        };

        write_all(&mut sink, b"retry").unwrap();
        assert_eq!(sink.data, b"retry");
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn zero_length_write_means_closed() {
        let mut sink = Sink {
            accepts_nothing: true,
            ..Sink::default()
        };
        assert!(matches!(
            write_all(&mut sink, b"x"),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn hard_errors_surface() {
        let mut sink = Sink {
            write_errors: VecDeque::from([ErrorKind::BrokenPipe]),
            ..Sink::default()
        };
        let err = write_all(&mut sink, b"x").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }
}
