#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use packetline::channel::{Heartbeat, PacketEncoder};
use packetline::frame::{FrameReader, Packet};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "packetline-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn packetline() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_packetline"));
    cmd.arg("--log-level").arg("error");
    cmd
}

#[test]
fn version_prints_package_version() {
    let output = packetline().arg("version").output().expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn packets_lists_heartbeat_as_json() {
    let output = packetline()
        .arg("--format")
        .arg("json")
        .arg("packets")
        .output()
        .expect("packets should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"id\":1"));
    assert!(stdout.contains("\"name\":\"Heartbeat\""));
}

#[test]
fn heartbeat_file_round_trips_through_inspect() {
    let dir = unique_temp_dir("inspect");
    let capture = dir.join("heartbeat.bin");

    let status = packetline()
        .arg("heartbeat")
        .arg("--output")
        .arg(&capture)
        .status()
        .expect("heartbeat should run");
    assert!(status.success());

    let bytes = std::fs::read(&capture).expect("capture should exist");
    assert_eq!(&bytes[..4], &[0, 0, 0, 1]);

    let output = packetline()
        .arg("--format")
        .arg("json")
        .arg("inspect")
        .arg(&capture)
        .output()
        .expect("inspect should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"packet\":\"Heartbeat\""));
    assert!(stdout.contains("\"status\":\"ok\""));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn inspect_reports_unknown_ids_and_truncation() {
    let mut wire = Vec::new();
    PacketEncoder::new()
        .encode(Heartbeat, &mut wire)
        .expect("heartbeat should encode");
    // Unknown id 99 with an empty body.
    wire.extend_from_slice(&[0, 0, 0, 99, 0, 0, 0, 0]);
    // Header only.
    wire.extend_from_slice(&[0, 0, 0, 1]);

    let mut child = packetline()
        .arg("--format")
        .arg("json")
        .arg("inspect")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("inspect should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(&wire)
        .expect("stdin write");
    let output = child.wait_with_output().expect("inspect should finish");

    assert_eq!(output.status.code(), Some(60));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"status\":\"unknown_packet_id\""));
    assert_eq!(stdout.lines().count(), 2);
}

#[test]
fn connect_prints_server_packet_and_sends_heartbeat() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener.local_addr().expect("listener addr");

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept should succeed");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let mut reader = FrameReader::new(stream.try_clone().expect("stream clone"));
        let frame = reader.read_frame().expect("client heartbeat should arrive");

        PacketEncoder::new()
            .encode(Heartbeat, &mut stream)
            .expect("reply should encode");

        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
        frame.id()
    });

    let output = packetline()
        .arg("--format")
        .arg("json")
        .arg("connect")
        .arg(addr.to_string())
        .arg("--heartbeat-interval")
        .arg("200ms")
        .arg("--count")
        .arg("1")
        .output()
        .expect("connect should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"packet\":\"Heartbeat\""));
    assert!(stdout.contains(&addr.to_string()));
    assert_eq!(server.join().expect("server thread"), Heartbeat::ID);
}

#[test]
fn connect_refused_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener.local_addr().expect("listener addr");
    drop(listener);

    let output = packetline()
        .arg("connect")
        .arg(addr.to_string())
        .arg("--connect-timeout")
        .arg("1s")
        .output()
        .expect("connect should run");

    assert_eq!(output.status.code(), Some(1));
}
