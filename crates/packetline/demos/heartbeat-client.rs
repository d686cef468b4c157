//! Client that keeps a channel alive and dispatches incoming packets.
//!
//! Run with:
//!   cargo run --example heartbeat-client
//!
//! Without an address a throwaway local server is started that sends a
//! greeting, echoes one heartbeat and hangs up. Pass `host:port` to talk to a
//! real server instead.

use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use packetline::channel::{
    control_descriptors, ChannelHelper, Dispatcher, Heartbeat, HelperConfig, Incoming,
    PacketEncoder, Receiver,
};
use packetline::frame::{FrameReader, Packet, PacketId};
use packetline::registry::PacketRegistry;
use packetline::transport::{EventBus, HeartbeatConfig, HeartbeatState, NetworkChannel, TcpChannel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Greeting {
    motd: String,
    players_online: u32,
}

impl Packet for Greeting {
    const ID: PacketId = PacketId(100);
    const NAME: &'static str = "Greeting";
}

fn spawn_local_server() -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    thread::spawn(move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (mut stream, peer) = listener.accept()?;
        eprintln!("[server] client connected from {peer}");

        let mut encoder = PacketEncoder::new();
        encoder.encode(
            Greeting {
                motd: "welcome to the arena".to_string(),
                players_online: 3,
            },
            &mut stream,
        )?;

        let mut reader = FrameReader::new(stream.try_clone()?);
        let frame = reader.read_frame()?;
        eprintln!("[server] got frame id={}", frame.id());
        encoder.encode(Heartbeat, &mut stream)?;
        stream.flush()?;

        thread::sleep(Duration::from_millis(200));
        eprintln!("[server] hanging up");
        Ok(())
    });

    Ok(addr)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = match std::env::args().nth(1) {
        Some(addr) => addr.parse()?,
        None => spawn_local_server()?,
    };

    let registry = PacketRegistry::builder()
        .descriptors(&control_descriptors())
        .register::<Greeting>()
        .build()?;
    let helper = ChannelHelper::new(Arc::new(registry), HelperConfig::default());

    let bus = Arc::new(EventBus::new());
    let channel = Arc::new(TcpChannel::new("demo").with_event_bus(Arc::clone(&bus)));
    helper.initialize(channel.clone(), &bus)?;
    helper.prepare_for_connecting()?;
    channel.connect(addr, None)?;
    eprintln!("[client] connected to {addr}");

    let (tx, rx) = mpsc::channel();
    let receiver = Receiver::spawn(channel.clone(), channel.reader()?, helper.decoder(), tx)?;

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .on::<Greeting, _>(|greeting| {
            eprintln!(
                "[client] {} ({} online)",
                greeting.motd, greeting.players_online
            );
        })
        .on::<Heartbeat, _>(|_| eprintln!("[client] heartbeat from server"));

    let mut heartbeat = HeartbeatState::new(HeartbeatConfig {
        interval: Duration::from_millis(250),
        reset_on_receive: true,
    });
    let mut last_tick = Instant::now();

    while !channel.is_closed() {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(Incoming::Packet(packet)) => {
                heartbeat.on_packet_received();
                dispatcher.dispatch(packet);
            }
            Ok(Incoming::Event(event)) => {
                bus.publish(&*channel, &event);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        let tick = heartbeat.update(now - last_tick);
        last_tick = now;
        helper.on_heartbeat_tick(tick);
    }

    helper.shutdown();
    if let Ok(summary) = receiver.join() {
        eprintln!(
            "[client] done: {} packets, {} dropped",
            summary.packets, summary.dropped
        );
    }
    Ok(())
}
