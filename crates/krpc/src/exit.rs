use std::fmt;
use std::io;

use krpc_agent::KrpcError;
use krpc_frame::FrameError;
use krpc_transport::TransportError;

// Exit codes follow sysexits.h where one fits.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const UNAVAILABLE: i32 = 69;
pub const TEMPFAIL: i32 = 75;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn krpc_error(context: &str, err: KrpcError) -> CliError {
    match err {
        KrpcError::Transport(err) => transport_error(context, err),
        KrpcError::Frame(err) => frame_error(context, err),
        KrpcError::Spawn(source) => io_error(context, source),
        KrpcError::NotReady(_) => CliError::new(TEMPFAIL, format!("{context}: {err}")),
        KrpcError::NoDevice(_) => CliError::new(UNAVAILABLE, format!("{context}: {err}")),
        KrpcError::InvalidArgument(_) => CliError::new(USAGE, format!("{context}: {err}")),
        KrpcError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        KrpcError::EndpointClosed(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}
