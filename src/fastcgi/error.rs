//! FastCGI failure taxonomy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FastCgiError {
    /// The Unix socket path does not exist. Nothing was sent.
    #[error("backend socket {0:?} does not exist")]
    SocketMissing(PathBuf),

    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("backend timed out during {stage}")]
    Timeout { stage: &'static str },

    #[error("backend I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed framing from the backend.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// END_REQUEST with a protocol status other than "request complete".
    #[error("backend rejected request (protocol status {0})")]
    Rejected(u8),

    #[error("parameter {0:?} is too long to encode")]
    ParamTooLong(String),
}

impl FastCgiError {
    /// Short label for metrics and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SocketMissing(_) => "socket_missing",
            Self::Connect { .. } => "connect",
            Self::Timeout { .. } => "timeout",
            Self::Io(_) => "io",
            Self::Protocol(_) => "protocol",
            Self::Rejected(_) => "rejected",
            Self::ParamTooLong(_) => "param_too_long",
        }
    }
}
