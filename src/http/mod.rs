//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, one router per listener)
//!     → dispatcher.rs
//!         → vhost registry (Host header, listening port)
//!         → HTTPS redirect, or
//!         → rewrite engine → static path resolver
//!         → fastcgi gateway (.php) or static file
//!     → response.rs (status pages, redirects, files, CGI output)
//!     → telemetry sink (one access event per request)
//!     → Send to client
//! ```
//!
//! # Design Decisions
//! - Routing is by Host header, never by path structure
//! - The dispatcher never fails; errors are turned into responses
//! - client_ip.rs is shared by the dispatcher and the rate limiter

pub mod client_ip;
pub mod dispatcher;
pub mod response;
pub mod server;

pub use dispatcher::{DispatchSettings, ListenerContext, RequestContext, RequestDispatcher};
pub use server::{HttpServer, ServerOptions};
