use std::fmt;
use std::io;

use cd11_frame::FrameError;
use cd11_station::StationError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
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
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Timeout => CliError::new(TIMEOUT, format!("{context}: {err}")),
        FrameError::ConnectionClosed | FrameError::IncompleteFrame { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        FrameError::FrameTooLarge { .. }
        | FrameError::InvalidHeader(_)
        | FrameError::TrailerOffsetMismatch { .. }
        | FrameError::MalformedField { .. }
        | FrameError::MalformedTimestamp(_)
        | FrameError::UnexpectedFrameType { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn station_error(context: &str, err: StationError) -> CliError {
    match err {
        StationError::Frame(err) => frame_error(context, err),
        StationError::Io(err) => io_error(context, err),
        StationError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        StationError::Json(_) | StationError::Config(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        StationError::HandshakeFailed(_)
        | StationError::UnknownStation(_)
        | StationError::IgnoredStation(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        StationError::SinkClosed => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_map_to_exit_codes() {
        assert_eq!(frame_error("x", FrameError::Timeout).code, TIMEOUT);
        assert_eq!(
            frame_error("x", FrameError::ConnectionClosed).code,
            TRANSPORT_ERROR
        );
        assert_eq!(
            frame_error("x", FrameError::InvalidHeader("bad".into())).code,
            DATA_INVALID
        );
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(frame_error("x", FrameError::Io(refused)).code, TRANSPORT_ERROR);
    }

    #[test]
    fn station_errors_unwrap_nested_causes() {
        let err = station_error("connect failed", StationError::Frame(FrameError::Timeout));
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("connect failed: "));

        let missing = io::Error::new(io::ErrorKind::NotFound, "no such file");
        assert_eq!(station_error("load", StationError::Io(missing)).code, USAGE);
        assert_eq!(
            station_error("load", StationError::Config("dup".into())).code,
            USAGE
        );
    }
}
