use std::fs::File;
use std::io::{self, BufReader, Read};
use std::sync::Arc;

use packetline_channel::{CustomErrorData, PacketDecoder};
use packetline_frame::{FrameConfig, FrameError, FrameReader, DEFAULT_SCRATCH_CAPACITY};
use tracing::{debug, warn};

use crate::cmd::{builtin_registry, InspectArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{packet_name, print_frame_rows, FrameRow, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let input: Box<dyn Read> = if args.input.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(&args.input)
            .map_err(|err| io_error(&format!("cannot open {}", args.input.display()), err))?;
        Box::new(BufReader::new(file))
    };

    let config = FrameConfig {
        max_body_size: args.max_body,
        scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
    };
    let registry = Arc::new(builtin_registry()?);
    let decoder = PacketDecoder::with_config(Arc::clone(&registry), config.clone());
    let mut reader = FrameReader::with_config(input, config);

    let mut rows = Vec::new();
    let mut truncated = None;
    loop {
        let frame = match reader.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(FrameError::ConnectionClosed) => {
                truncated = Some(reader.buffered());
                break;
            }
            Err(err) => {
                print_frame_rows(&rows, format);
                return Err(frame_error(&format!("frame {}", rows.len()), err));
            }
        };

        let decoded = decoder.decode_raw(&frame);
        let status = match (&decoded.value, &decoded.custom_error) {
            (Some(_), _) => "ok",
            (None, Some(error)) => drop_status(error),
            (None, None) => "dropped",
        };
        debug!(index = rows.len(), id = %frame.id(), status, "frame inspected");

        rows.push(FrameRow {
            index: rows.len(),
            id: frame.id().get(),
            packet: packet_name(&registry, frame.id()),
            body_size: frame.body.len(),
            status,
            value: decoded.value.as_ref().map(|packet| format!("{packet:?}")),
            custom_error: decoded.custom_error,
        });
    }

    print_frame_rows(&rows, format);

    if let Some(leftover) = truncated {
        warn!(bytes = leftover, "input ends inside a frame");
        return Err(CliError::new(
            DATA_INVALID,
            format!("truncated frame: {leftover} trailing bytes"),
        ));
    }
    Ok(SUCCESS)
}

fn drop_status(error: &CustomErrorData) -> &'static str {
    match error["reason"].as_str() {
        Some("invalid_header") => "invalid_header",
        Some("unknown_packet_id") => "unknown_packet_id",
        Some("malformed_body") => "malformed_body",
        _ => "dropped",
    }
}
