use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use packetline_channel::{ChannelHelper, HelperConfig, Incoming, Receiver};
use packetline_transport::{EventBus, HeartbeatConfig, HeartbeatState, NetworkChannel, TcpChannel};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cmd::{builtin_registry, parse_duration, ConnectArgs};
use crate::exit::{
    channel_error, transport_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS,
};
use crate::output::{print_packet, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.heartbeat_interval)?;
    let connect_timeout = parse_duration(&args.connect_timeout)?;

    let registry = Arc::new(builtin_registry()?);
    let config = HelperConfig {
        max_body_size: args.max_body,
        ..HelperConfig::default()
    };
    let helper = ChannelHelper::new(registry, config);

    let bus = Arc::new(EventBus::new());
    let channel = Arc::new(
        TcpChannel::new(format!("cli:{}", args.addr)).with_event_bus(Arc::clone(&bus)),
    );
    helper
        .initialize(channel.clone(), &bus)
        .map_err(|err| channel_error("bind failed", err))?;
    helper
        .prepare_for_connecting()
        .map_err(|err| channel_error("socket setup failed", err))?;

    channel
        .connect_with_timeout(
            args.addr,
            Some(connect_timeout),
            Some(json!({ "client": "packetline-cli" })),
        )
        .map_err(|err| transport_error(&format!("connect to {} failed", args.addr), err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel();
    let stream = channel
        .reader()
        .map_err(|err| transport_error("receive setup failed", err))?;
    let receiver = Receiver::spawn(channel.clone(), stream, helper.decoder(), tx)
        .map_err(|err| channel_error("receive setup failed", err))?;

    let peer = args.addr.to_string();
    let mut heartbeat = HeartbeatState::new(HeartbeatConfig {
        interval,
        reset_on_receive: true,
    });
    let mut printed = 0usize;
    let mut last_tick = Instant::now();
    let mut code = SUCCESS;

    while running.load(Ordering::SeqCst) && !channel.is_closed() {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Incoming::Event(event)) => {
                bus.publish(&*channel, &event);
            }
            Ok(Incoming::Packet(packet)) => {
                heartbeat.on_packet_received();
                print_packet(&packet, &peer, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                debug!("receive loop ended");
                break;
            }
        }

        let now = Instant::now();
        let tick = heartbeat.update(now.duration_since(last_tick));
        last_tick = now;
        helper.on_heartbeat_tick(tick);
    }

    if args.count.is_some_and(|count| printed < count) {
        info!(received = printed, "connection ended before the requested packet count");
        code = FAILURE;
    }

    channel.close();
    helper.shutdown();
    match receiver.join() {
        Ok(summary) => debug!(
            packets = summary.packets,
            dropped = summary.dropped,
            "receiver joined"
        ),
        Err(_) => warn!("receive thread panicked"),
    }

    Ok(code)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
