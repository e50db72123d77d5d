//! Request-scoped failures and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::fastcgi::FastCgiError;
use crate::files::ResolveError;
use crate::http::response::text;
use crate::vhost::RegistryError;

/// Everything that can end a request early. Each variant maps to exactly
/// one status code.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no virtual hosts configured")]
    NoVirtualHosts,

    #[error("no virtual host for {0:?}")]
    UnknownHost(String),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("not found")]
    NotFound,

    #[error("PHP version {version} not available")]
    InterpreterUnavailable { version: String },

    #[error("backend failure: {0}")]
    Backend(#[from] FastCgiError),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoVirtualHosts => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnknownHost(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InterpreterUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing body. Internal detail is only exposed where it helps the
    /// operator and reveals nothing about the filesystem.
    fn public_message(&self) -> String {
        match self {
            Self::InterpreterUnavailable { .. } => self.to_string(),
            Self::Forbidden(_) => "Forbidden".to_string(),
            Self::NotFound | Self::UnknownHost(_) => "Not Found".to_string(),
            Self::PayloadTooLarge { .. } => "Payload Too Large".to_string(),
            Self::NoVirtualHosts | Self::Backend(_) | Self::Io(_) => "Internal Server Error".to_string(),
        }
    }
}

impl From<RegistryError> for DispatchError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NoVirtualHosts => Self::NoVirtualHosts,
            RegistryError::UnknownHost(host) => Self::UnknownHost(host),
        }
    }
}

impl From<ResolveError> for DispatchError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Forbidden(reason) => Self::Forbidden(reason),
            ResolveError::NotFound => Self::NotFound,
            ResolveError::Io(e) => Self::Io(e),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        text(self.status(), self.public_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        let cases = [
            (DispatchError::NoVirtualHosts, 500),
            (DispatchError::UnknownHost("x".into()), 404),
            (DispatchError::Forbidden("x"), 403),
            (DispatchError::NotFound, 404),
            (DispatchError::InterpreterUnavailable { version: "8.1".into() }, 500),
            (DispatchError::Backend(FastCgiError::Timeout { stage: "read" }), 500),
            (DispatchError::Backend(FastCgiError::Protocol("bad".into())), 500),
            (DispatchError::PayloadTooLarge { limit: 1 }, 413),
            (DispatchError::Io(std::io::Error::other("disk")), 500),
        ];
        for (error, status) in cases {
            assert_eq!(error.status().as_u16(), status, "{error}");
        }
    }

    #[test]
    fn interpreter_message_names_version() {
        let error = DispatchError::InterpreterUnavailable { version: "7.4".into() };
        assert_eq!(error.public_message(), "PHP version 7.4 not available");
        assert_eq!(DispatchError::Forbidden("path traversal").public_message(), "Forbidden");
    }
}
