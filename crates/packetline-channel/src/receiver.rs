//! Background receive context.

use std::io::Read;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use packetline_frame::{DecodedPacket, FrameError};
use packetline_transport::{ChannelEvent, NetworkChannel, NetworkErrorCode};
use tracing::{debug, info, warn};

use crate::codec::PacketDecoder;
use crate::error::Result;

/// Counters reported when a receive loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveSummary {
    /// Packets handed to the sink.
    pub packets: u64,
    /// Frames dropped as invalid, unknown or malformed.
    pub dropped: u64,
}

/// Item handed from the receive context to the main context.
#[derive(Debug)]
pub enum Incoming {
    Packet(DecodedPacket),
    /// `CustomError` or `TransportError` raised while reading. Publish it on
    /// the bus from the main context so lifecycle handling stays there.
    Event(ChannelEvent),
}

/// Handle to a receive loop running on its own thread.
#[derive(Debug)]
pub struct Receiver {
    handle: JoinHandle<ReceiveSummary>,
}

impl Receiver {
    /// Start reading frames from `stream` on a named thread.
    ///
    /// Decoded packets go to `sink` as [`Incoming::Packet`]. Dropped frames
    /// and stream failures go to `sink` as [`Incoming::Event`]; nothing is
    /// published from this thread. The loop ends when the stream ends (the
    /// channel is then closed), when the stream fails, or when `sink` is
    /// disconnected. A failure that cannot be handed over closes the channel.
    pub fn spawn<R>(
        channel: Arc<dyn NetworkChannel>,
        stream: R,
        decoder: PacketDecoder,
        sink: Sender<Incoming>,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let name = format!("packetline-recv-{}", channel.id().get());
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(channel.as_ref(), stream, &decoder, &sink))
            .map_err(packetline_transport::TransportError::Io)?;
        Ok(Self { handle })
    }

    /// Whether the receive loop has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the receive loop to end.
    pub fn join(self) -> thread::Result<ReceiveSummary> {
        self.handle.join()
    }
}

fn run<R: Read>(
    channel: &dyn NetworkChannel,
    mut stream: R,
    decoder: &PacketDecoder,
    sink: &Sender<Incoming>,
) -> ReceiveSummary {
    let mut summary = ReceiveSummary::default();
    debug!(channel = %channel.id(), "receive loop started");

    loop {
        let decoded = decoder
            .decode_header(&mut stream)
            .and_then(|header| decoder.decode_body(header.into_value(), &mut stream));

        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(err) => {
                on_stream_error(channel, sink, err);
                break;
            }
        };

        let mut handed_over = true;
        if let Some(payload) = decoded.custom_error {
            summary.dropped += 1;
            let event = ChannelEvent::CustomError { payload };
            handed_over = sink.send(Incoming::Event(event)).is_ok();
        }
        if let Some(packet) = decoded.value {
            summary.packets += 1;
            handed_over = sink.send(Incoming::Packet(packet)).is_ok();
        }
        if !handed_over {
            debug!(channel = %channel.id(), "packet sink dropped");
            break;
        }
    }

    debug!(
        channel = %channel.id(),
        packets = summary.packets,
        dropped = summary.dropped,
        "receive loop ended"
    );
    summary
}

fn on_stream_error(channel: &dyn NetworkChannel, sink: &Sender<Incoming>, err: FrameError) {
    if channel.is_closed() {
        debug!(channel = %channel.id(), error = %err, "receive ended on closed channel");
        return;
    }

    let (code, socket_error) = match &err {
        FrameError::ConnectionClosed => {
            info!(channel = %channel.id(), "remote closed the connection");
            channel.close();
            return;
        }
        FrameError::Io(io) => (NetworkErrorCode::Receive, Some(io.kind())),
        FrameError::PayloadTooLarge { .. } | FrameError::Decode(_) => {
            (NetworkErrorCode::DeserializePacket, None)
        }
        _ => (NetworkErrorCode::Unknown, None),
    };

    warn!(channel = %channel.id(), %code, error = %err, "receive failed");
    let event = ChannelEvent::TransportError {
        code,
        socket_error,
        message: err.to_string(),
    };
    if sink.send(Incoming::Event(event)).is_err() {
        channel.close();
    }
}
