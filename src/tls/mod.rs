//! TLS material subsystem.
//!
//! # Data Flow
//! ```text
//! <cert_dir>/certs/{domain}-cert.pem + <cert_dir>/private/{domain}-key.pem
//!     → store.rs (exact pair, else wildcard-local for local domains)
//!     → rustls ServerConfig (TLS 1.2–1.3, AEAD suites, ALPN http/1.1)
//!     → cache (DashMap, single-flight build)
//!
//! At listener start:
//!     primary.rs picks one context for the whole HTTPS listener
//!     → axum-server RustlsConfig
//! ```
//!
//! # Design Decisions
//! - One certificate per listener; no per-connection SNI switching
//! - A missing certificate disables HTTPS, never the process
//! - Renewal is external; the cache is only cleared explicitly

pub mod primary;
pub mod store;

pub use primary::{select_primary, PrimaryCertificate, PrimarySource};
pub use store::{build_server_config, CertificateInfo, TlsContextStore, TlsError};
