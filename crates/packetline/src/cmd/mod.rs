use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use packetline_channel::control_descriptors;
use packetline_frame::DEFAULT_MAX_BODY;
use packetline_registry::PacketRegistry;

use crate::exit::{channel_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod connect;
pub mod heartbeat;
pub mod inspect;
pub mod packets;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the packet types this client understands.
    Packets(PacketsArgs),
    /// Write one encoded heartbeat frame.
    Heartbeat(HeartbeatArgs),
    /// Decode a captured frame stream.
    Inspect(InspectArgs),
    /// Connect to a server, keep the channel alive and print received packets.
    Connect(ConnectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Packets(args) => packets::run(args, format),
        Command::Heartbeat(args) => heartbeat::run(args),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Connect(args) => connect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct PacketsArgs {}

#[derive(Args, Debug)]
pub struct HeartbeatArgs {
    /// Write the frame to a file instead of stdout.
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Capture file to read, or `-` for stdin.
    pub input: PathBuf,
    /// Maximum accepted body size in bytes.
    #[arg(long, env = "PACKETLINE_MAX_BODY", default_value_t = DEFAULT_MAX_BODY)]
    pub max_body: usize,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server address (host:port).
    pub addr: SocketAddr,
    /// Keep-alive interval (e.g. 30s, 500ms).
    #[arg(long, env = "PACKETLINE_HEARTBEAT_INTERVAL", default_value = "30s")]
    pub heartbeat_interval: String,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, env = "PACKETLINE_CONNECT_TIMEOUT", default_value = "5s")]
    pub connect_timeout: String,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Maximum accepted body size in bytes.
    #[arg(long, env = "PACKETLINE_MAX_BODY", default_value_t = DEFAULT_MAX_BODY)]
    pub max_body: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Registry of packet types built into the CLI.
pub fn builtin_registry() -> CliResult<PacketRegistry> {
    PacketRegistry::from_descriptors(&control_descriptors())
        .map_err(|err| channel_error("registry build failed", err.into()))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn builtin_registry_has_heartbeat() {
        let registry = builtin_registry().unwrap();
        assert!(registry.contains(packetline_channel::HEARTBEAT_ID));
    }
}
