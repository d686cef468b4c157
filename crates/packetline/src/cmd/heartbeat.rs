use std::fs::File;
use std::io::Write;

use packetline_channel::{Heartbeat, PacketEncoder};
use tracing::info;

use crate::cmd::HeartbeatArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};

pub fn run(args: HeartbeatArgs) -> CliResult<i32> {
    let mut encoder = PacketEncoder::new();

    let written = match &args.output {
        Some(path) => {
            let mut file = File::create(path)
                .map_err(|err| io_error(&format!("cannot create {}", path.display()), err))?;
            encoder
                .encode(Heartbeat, &mut file)
                .map_err(|err| frame_error("encode failed", err))?
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            let written = encoder
                .encode(Heartbeat, &mut stdout)
                .map_err(|err| frame_error("encode failed", err))?;
            stdout
                .flush()
                .map_err(|err| io_error("stdout flush failed", err))?;
            written
        }
    };

    info!(bytes = written, "heartbeat frame written");
    Ok(SUCCESS)
}
