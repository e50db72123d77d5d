//! Tech Web Server
//!
//! Virtual-host web server with TLS termination, URL rewriting, safe static
//! file serving and a FastCGI gateway to PHP-FPM.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ http::dispatcher
//!                 (axum, TLS)          │
//!                                      ├─▶ vhost     (Host → VirtualHost)
//!                                      ├─▶ rewrite   (path, query → path', query')
//!                                      ├─▶ files     (containment, blocklist, index)
//!                                      ├─▶ fastcgi   (.php → PHP-FPM socket)
//!                                      └─▶ observability (access event)
//!
//!     Cross-cutting: config, tls, security, health, lifecycle
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod fastcgi;
pub mod files;
pub mod http;
pub mod rewrite;
pub mod tls;
pub mod vhost;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::ServerConfig;
pub use error::DispatchError;
pub use http::{HttpServer, RequestDispatcher};
pub use lifecycle::Shutdown;
