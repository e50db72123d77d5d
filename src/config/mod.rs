//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → virtual_hosts entries decoded one by one by vhost::VirtualHostRegistry
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new registry built and swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - A malformed virtual host or rewrite rule drops only itself

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    FallbackPolicy, HealthConfig, ListenerConfig, ObservabilityConfig, PhpConfig,
    RateLimitConfig, RewriteRuleConfig, RoutingConfig, SecurityConfig, ServerConfig, TlsConfig,
    VirtualHostConfig,
};
