//! FastCGI gateway subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher (resolved .php file)
//!     → cgi.rs (HTTP request → CGI/1.1 parameters)
//!     → pool.rs (php_version → FastCgiClient)
//!     → client.rs (connect, frame, exchange)
//!         → params.rs (name-value pair encoding)
//!         → record.rs (8-byte header + content + padding)
//!     → stdout / stderr buffers
//!     → cgi.rs (split headers and body, Status → HTTP status)
//! ```
//!
//! # Design Decisions
//! - One connection per request; no multiplexing, no keep-alive
//! - Each connect/read/write has its own timeout
//! - stderr never reaches the client

pub mod cgi;
pub mod client;
pub mod error;
pub mod params;
pub mod pool;
pub mod record;

pub use cgi::{build_params, parse_response, protocol_name, script_name, CgiResponse, ScriptRequest};
pub use client::{BackendAddress, FastCgiClient, FastCgiOutput};
pub use error::FastCgiError;
pub use params::CgiParams;
pub use pool::InterpreterPool;
pub use record::{Record, RecordType};
