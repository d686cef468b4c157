use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use packetline_channel::CustomErrorData;
use packetline_frame::{DecodedPacket, PacketId};
use packetline_registry::PacketRegistry;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketTypeOutput<'a> {
    id: i32,
    name: &'a str,
}

pub fn print_registry(registry: &PacketRegistry, format: OutputFormat) {
    let mut rows: Vec<PacketTypeOutput<'_>> = registry
        .iter()
        .map(|descriptor| PacketTypeOutput {
            id: descriptor.id().get(),
            name: descriptor.name(),
        })
        .collect();
    rows.sort_unstable_by_key(|row| row.id);

    match format {
        OutputFormat::Json => {
            for row in &rows {
                print_json(row);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["ID", "PACKET"]);
            for row in &rows {
                table.add_row(vec![row.id.to_string(), row.name.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!("id={} packet={}", row.id, row.name);
            }
        }
    }
}

/// One frame as seen by `inspect`.
#[derive(Debug, Serialize)]
pub struct FrameRow {
    pub index: usize,
    pub id: i32,
    pub packet: Option<&'static str>,
    pub body_size: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_error: Option<CustomErrorData>,
}

pub fn print_frame_rows(rows: &[FrameRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                print_json(row);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["#", "ID", "PACKET", "SIZE", "STATUS", "DETAIL"]);
            for row in rows {
                table.add_row(vec![
                    row.index.to_string(),
                    row.id.to_string(),
                    row.packet.unwrap_or("-").to_string(),
                    row.body_size.to_string(),
                    row.status.to_string(),
                    row_detail(row),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "#{} id={} packet={} size={} status={} {}",
                    row.index,
                    row.id,
                    row.packet.unwrap_or("-"),
                    row.body_size,
                    row.status,
                    row_detail(row)
                );
            }
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    id: i32,
    packet: &'a str,
    peer: &'a str,
    value: String,
    timestamp: String,
}

pub fn print_packet(packet: &DecodedPacket, peer: &str, format: OutputFormat) {
    let out = PacketOutput {
        id: packet.id().get(),
        packet: packet.name(),
        peer,
        value: format!("{packet:?}"),
        timestamp: now_unix_seconds(),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ID", "PACKET", "PEER", "VALUE"]);
            table.add_row(vec![
                out.id.to_string(),
                out.packet.to_string(),
                out.peer.to_string(),
                out.value,
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "id={} packet={} peer={} value={}",
                out.id, out.packet, out.peer, out.value
            );
        }
    }
}

pub fn packet_name(registry: &PacketRegistry, id: PacketId) -> Option<&'static str> {
    registry.lookup(id).map(|descriptor| descriptor.name())
}

fn row_detail(row: &FrameRow) -> String {
    match (&row.value, &row.custom_error) {
        (Some(value), _) => value.clone(),
        (None, Some(error)) => error.to_string(),
        (None, None) => String::new(),
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
