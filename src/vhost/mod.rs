//! Virtual host subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig.virtual_hosts (loose TOML values)
//!     → registry.rs (decode each entry, skip malformed ones)
//!     → host.rs (VirtualHost with compiled RewriteEngine)
//!     → VirtualHostRegistry shared behind ArcSwap
//!
//! Per request:
//!     Host header (+ listening port in multi-port mode)
//!     → normalize (strip port, lowercase)
//!     → exact match, else FallbackPolicy
//! ```
//!
//! # Design Decisions
//! - Registry is immutable; reload swaps the whole set
//! - The default-host fallback is an explicit, configurable policy

pub mod host;
pub mod registry;

pub use host::{normalize_host, VirtualHost};
pub use registry::{RegistryError, VirtualHostRegistry};
