use std::fmt;
use std::io;

use qtalk_mux::MuxError;
use qtalk_peer::PeerError;
use qtalk_rpc::RpcError;
use qtalk_transport::TransportError;

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

fn io_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AlreadyExists => TRANSPORT_ERROR,
        io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(&err), format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    CliError::new(io_code(err.io()), format!("{context}: {err}"))
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    match err {
        MuxError::Io(source) => io_error(context, source),
        MuxError::UnknownKind(_)
        | MuxError::Truncated { .. }
        | MuxError::PayloadTooLarge { .. }
        | MuxError::WindowExceeded { .. }
        | MuxError::InvalidWindowAdjust(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    match err {
        RpcError::Mux(err) => mux_error(context, err),
        RpcError::Json(_) | RpcError::FrameTooLarge { .. } | RpcError::TruncatedFrame { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        RpcError::AlreadyResponded => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Mux(err) => mux_error(context, err),
        PeerError::Rpc(err) => rpc_error(context, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_are_plain_failures() {
        let err = peer_error(
            "call failed",
            PeerError::Rpc(RpcError::Remote("not found: x".into())),
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.contains("not found: x"));
    }

    #[test]
    fn protocol_violations_are_invalid_data() {
        let err = peer_error("call failed", PeerError::Mux(MuxError::UnknownKind(42)));
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn missing_socket_is_a_transport_error() {
        let err = transport_error(
            "connect failed",
            TransportError::Connect {
                path: "/tmp/none.sock".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
