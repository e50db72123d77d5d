//! FastCGI responder client.
//!
//! # Responsibilities
//! - Open one backend connection per request (Unix socket or TCP)
//! - Frame BEGIN_REQUEST, PARAMS and STDIN streams
//! - Collect STDOUT and STDERR until END_REQUEST or EOF
//! - Bound every connect/read/write with a timeout
//! - Cap the output buffered for one request
//!
//! # Design Decisions
//! - No pooling, no multiplexing: request id is always 1
//! - A missing socket file is reported before any connect attempt
//! - Failures are never retried

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::fastcgi::error::FastCgiError;
use crate::fastcgi::params::CgiParams;
use crate::fastcgi::record::{encode_stream, EndRequest, Record, RecordType, REQUEST_COMPLETE};

/// In-protocol request id used on every connection.
pub const REQUEST_ID: u16 = 1;

/// Connectivity probes use a short fixed bound.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on stdout plus stderr for one request.
pub const DEFAULT_MAX_OUTPUT: usize = 64 * 1024 * 1024;

/// Where an interpreter listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendAddress {
    Unix(PathBuf),
    Tcp(String),
}

impl BackendAddress {
    /// `tcp://host:port` selects TCP, anything else is a Unix socket path.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix("tcp://") {
            Some(addr) => Self::Tcp(addr.to_string()),
            None => Self::Unix(PathBuf::from(raw)),
        }
    }

    /// False only for a Unix socket path that does not exist.
    pub fn is_present(&self) -> bool {
        match self {
            Self::Unix(path) => path.exists(),
            Self::Tcp(_) => true,
        }
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Everything the backend produced for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastCgiOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the backend closed without END_REQUEST.
    pub app_status: Option<u32>,
}

/// Client bound to one interpreter socket.
#[derive(Debug, Clone)]
pub struct FastCgiClient {
    address: BackendAddress,
    timeout: Duration,
    max_output: usize,
}

impl FastCgiClient {
    pub fn new(address: BackendAddress, timeout: Duration) -> Self {
        Self {
            address,
            timeout,
            max_output: DEFAULT_MAX_OUTPUT,
        }
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    pub fn address(&self) -> &BackendAddress {
        &self.address
    }

    /// Run one request through the backend.
    pub async fn execute(&self, params: &CgiParams, body: &[u8]) -> Result<FastCgiOutput, FastCgiError> {
        match &self.address {
            BackendAddress::Unix(path) => {
                let mut stream = self.connect_unix(path, self.timeout).await?;
                exchange(&mut stream, params, body, self.timeout, self.max_output).await
            }
            BackendAddress::Tcp(addr) => {
                let mut stream = self.connect_tcp(addr, self.timeout).await?;
                exchange(&mut stream, params, body, self.timeout, self.max_output).await
            }
        }
    }

    /// Open and immediately close a connection.
    pub async fn test_connection(&self) -> bool {
        let result = match &self.address {
            BackendAddress::Unix(path) => self.connect_unix(path, PROBE_TIMEOUT).await.map(drop),
            BackendAddress::Tcp(addr) => self.connect_tcp(addr, PROBE_TIMEOUT).await.map(drop),
        };
        if let Err(e) = &result {
            tracing::debug!(backend = %self.address, error = %e, "Interpreter probe failed");
        }
        result.is_ok()
    }

    #[cfg(unix)]
    async fn connect_unix(
        &self,
        path: &std::path::Path,
        bound: Duration,
    ) -> Result<tokio::net::UnixStream, FastCgiError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(FastCgiError::SocketMissing(path.to_path_buf()));
        }
        bounded("connect", bound, tokio::net::UnixStream::connect(path))
            .await?
            .map_err(|source| FastCgiError::Connect {
                address: self.address.to_string(),
                source,
            })
    }

    #[cfg(not(unix))]
    async fn connect_unix(&self, path: &std::path::Path, _bound: Duration) -> Result<TcpStream, FastCgiError> {
        Err(FastCgiError::SocketMissing(path.to_path_buf()))
    }

    async fn connect_tcp(&self, addr: &str, bound: Duration) -> Result<TcpStream, FastCgiError> {
        bounded("connect", bound, TcpStream::connect(addr))
            .await?
            .map_err(|source| FastCgiError::Connect {
                address: self.address.to_string(),
                source,
            })
    }
}

async fn bounded<F: Future>(stage: &'static str, bound: Duration, fut: F) -> Result<F::Output, FastCgiError> {
    timeout(bound, fut)
        .await
        .map_err(|_| FastCgiError::Timeout { stage })
}

/// Drive one request over an established stream.
pub async fn exchange<S>(
    stream: &mut S,
    params: &CgiParams,
    body: &[u8],
    io_timeout: Duration,
    max_output: usize,
) -> Result<FastCgiOutput, FastCgiError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = Vec::with_capacity(64 + body.len());
    Record::begin_request(REQUEST_ID).encode_into(&mut request)?;
    encode_stream(RecordType::Params, REQUEST_ID, &params.encode()?, &mut request)?;
    encode_stream(RecordType::Stdin, REQUEST_ID, body, &mut request)?;

    bounded("write", io_timeout, stream.write_all(&request)).await??;
    bounded("write", io_timeout, stream.flush()).await??;

    let mut output = FastCgiOutput::default();
    loop {
        let Some(record) = bounded("read", io_timeout, Record::read_from(stream)).await?? else {
            tracing::debug!("Backend closed connection without END_REQUEST");
            break;
        };
        if record.request_id != REQUEST_ID {
            tracing::debug!(request_id = record.request_id, "Ignoring record for another request");
            continue;
        }

        let buffered = output.stdout.len() + output.stderr.len();
        match record.record_type {
            RecordType::Stdout | RecordType::Stderr if buffered + record.content.len() > max_output => {
                return Err(FastCgiError::Protocol(format!(
                    "backend output exceeds {max_output} bytes"
                )));
            }
            RecordType::Stdout => output.stdout.extend_from_slice(&record.content),
            RecordType::Stderr => output.stderr.extend_from_slice(&record.content),
            RecordType::EndRequest => {
                let end = EndRequest::parse(&record.content)?;
                if end.protocol_status != REQUEST_COMPLETE {
                    return Err(FastCgiError::Rejected(end.protocol_status));
                }
                output.app_status = Some(end.app_status);
                break;
            }
            other => {
                tracing::debug!(record_type = ?other, "Ignoring unexpected record type");
            }
        }
    }

    Ok(output)
}
