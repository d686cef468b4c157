//! Async receive path: split a tokio TCP stream into frames and decode them.
//!
//! Run with:
//!   cargo run --example async-capture --features async

use std::sync::Arc;

use packetline::channel::{control_descriptors, Heartbeat, PacketDecoder, PacketEncoder};
use packetline::frame::{read_raw_frame, FrameError, Packet, PacketId, DEFAULT_MAX_BODY};
use packetline::registry::PacketRegistry;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Serialize, Deserialize)]
struct PlayerMoved {
    player: u32,
    x: f32,
    y: f32,
}

impl Packet for PlayerMoved {
    const ID: PacketId = PacketId(200);
    const NAME: &'static str = "PlayerMoved";
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;
        let mut encoder = PacketEncoder::new();
        for step in 0..3u32 {
            let frame = encoder.encode_to_vec(PlayerMoved {
                player: 7,
                x: step as f32,
                y: 1.5,
            })?;
            stream.write_all(&frame).await?;
        }
        stream.write_all(&encoder.encode_to_vec(Heartbeat)?).await?;
        stream.shutdown().await?;
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    });

    let registry = PacketRegistry::builder()
        .descriptors(&control_descriptors())
        .register::<PlayerMoved>()
        .build()?;
    let decoder = PacketDecoder::new(Arc::new(registry));

    let mut stream = TcpStream::connect(addr).await?;
    loop {
        let frame = match read_raw_frame(&mut stream, DEFAULT_MAX_BODY).await {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(err.into()),
        };
        let decoded = decoder.decode_raw(&frame);
        match (decoded.value, decoded.custom_error) {
            (Some(packet), _) => println!("{} -> {packet:?}", packet.name()),
            (None, Some(error)) => println!("dropped frame: {error}"),
            (None, None) => {}
        }
    }

    if let Err(err) = server.await? {
        eprintln!("server failed: {err}");
    }
    Ok(())
}
