//! Packet framing for packetline.
//!
//! Every frame on the wire is:
//! - a 4-byte big-endian header carrying the [`PacketId`] of the body
//! - a 4-byte big-endian body length prefix
//! - the body, `bincode`-encoded with big-endian fixed-width integers
//!
//! The header width never changes, so a reader always knows how many bytes to
//! consume before it can tell which packet type follows.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod header;
pub mod packet;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::{read_raw_frame, RawFrameCodec};
pub use codec::{
    decode_frame, encode_frame, read_body, read_header, FrameConfig, RawFrame, BODY_PREFIX_SIZE,
    DEFAULT_MAX_BODY, DEFAULT_SCRATCH_CAPACITY,
};
pub use error::{FrameError, Result};
pub use header::{PacketHeader, PacketId, HEADER_SIZE};
pub use packet::{decode_packet, encode_packet_body, DecodedPacket, Packet};
pub use reader::FrameReader;
pub use writer::FrameWriter;
