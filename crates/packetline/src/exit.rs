//! Process exit codes and the mapping from library errors onto them.

use std::fmt;
use std::io;

use packetline_channel::ChannelError;
use packetline_frame::FrameError;
use packetline_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
/// Channel state problem that is not an OS error (closed, not connected).
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
/// Bytes on the wire or in a capture could not be understood.
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

/// Error carried up to `main`, already resolved to an exit code.
#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        Self { code, message }
    }

    fn in_context(code: i32, context: &str, cause: impl fmt::Display) -> Self {
        Self::new(code, format!("{context}: {cause}"))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

fn code_for_io(kind: io::ErrorKind) -> i32 {
    use io::ErrorKind::*;

    match kind {
        PermissionDenied => PERMISSION_DENIED,
        TimedOut | WouldBlock => TIMEOUT,
        ConnectionRefused | ConnectionReset | ConnectionAborted => FAILURE,
        NotFound => USAGE,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::in_context(code_for_io(err.kind()), context, err)
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    if let TransportError::Connect { source, .. } | TransportError::Io(source) = err {
        return io_error(context, source);
    }
    CliError::in_context(TRANSPORT_ERROR, context, err)
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match &err {
        FrameError::Io(source) => code_for_io(source.kind()),
        FrameError::PayloadTooLarge { .. } | FrameError::Decode(_) => DATA_INVALID,
        FrameError::ConnectionClosed => FAILURE,
        _ => INTERNAL,
    };
    CliError::in_context(code, context, err)
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    let code = match err {
        ChannelError::Transport(inner) => return transport_error(context, inner),
        ChannelError::Frame(inner) => return frame_error(context, inner),
        ChannelError::Registry(_) => DATA_INVALID,
        ChannelError::Closed(_) => FAILURE,
        _ => INTERNAL,
    };
    CliError::in_context(code, context, err)
}
