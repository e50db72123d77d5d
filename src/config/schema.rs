//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.
//! Virtual hosts are kept loosely typed here (`toml::Value`) so that one
//! malformed entry can be skipped without rejecting the whole file; the
//! strongly-typed form lives in [`crate::vhost`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the web server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind host, ports, limits).
    pub listener: ListenerConfig,

    /// Certificate directory layout.
    pub tls: TlsConfig,

    /// Interpreter pool (version -> FastCGI socket).
    pub php: PhpConfig,

    /// Request hardening.
    pub security: SecurityConfig,

    /// Virtual host resolution policy.
    pub routing: RoutingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Interpreter health probing.
    pub health: HealthConfig,

    /// Raw virtual host entries, decoded one by one at registry build time.
    pub virtual_hosts: Vec<toml::Value>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub bind_host: String,

    /// Plaintext port.
    pub http_port: u16,

    /// TLS port, also used for scheme-upgrade redirects.
    pub https_port: u16,

    /// Bind one plaintext listener per distinct virtual host port.
    pub multi_port: bool,

    /// Maximum concurrent in-flight requests per listener (backpressure).
    pub max_connections: usize,

    /// Total time allowed for a single request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            http_port: 3080,
            https_port: 3453,
            multi_port: false,
            max_connections: 300,
            request_timeout_secs: 60,
        }
    }
}

/// TLS material layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Start the HTTPS listener when a certificate is available.
    pub enabled: bool,

    /// Base directory holding `certs/` and `private/`.
    pub cert_dir: String,

    /// Domain suffix served by the wildcard local certificate.
    pub local_suffix: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_dir: "ssl".to_string(),
            local_suffix: ".local".to_string(),
        }
    }
}

/// Interpreter pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PhpConfig {
    /// Per read/write/connect timeout against a backend, in seconds.
    pub timeout_secs: u64,

    /// Cap on combined stdout and stderr bytes accepted from one request.
    pub max_response_size: usize,

    /// Version key -> socket address (Unix socket path or `tcp://host:port`).
    pub sockets: BTreeMap<String, String>,
}

impl Default for PhpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_response_size: 64 * 1024 * 1024,
            sockets: BTreeMap::new(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Resolve the client address from proxy headers (X-Forwarded-For, ...).
    pub trust_proxy_headers: bool,

    /// Omit the `Server` response header.
    pub hide_server_header: bool,

    /// Maximum request body forwarded to an interpreter, in bytes.
    pub max_body_size: usize,

    /// Per-client request rate limiting.
    pub rate_limit: RateLimitConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trust_proxy_headers: false,
            hide_server_header: true,
            max_body_size: 8 * 1024 * 1024, // 8MB
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained requests per minute per client IP.
    pub requests_per_minute: u32,

    /// Burst capacity.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: 60,
            burst: 20,
        }
    }
}

/// What to do when no virtual host matches the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Serve the first configured virtual host.
    #[default]
    FirstConfigured,
    /// Answer 404 for unknown hosts.
    Reject,
}

/// Virtual host resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RoutingConfig {
    pub fallback: FallbackPolicy,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Append access events as JSON lines to this file.
    pub access_log_path: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
            access_log_path: None,
        }
    }
}

/// Interpreter health probing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Enable periodic interpreter probes.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

/// One `[[virtual_hosts]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirtualHostConfig {
    pub domain: String,

    /// Listening port, only meaningful in multi-port mode.
    #[serde(default)]
    pub port: Option<u16>,

    pub document_root: String,

    #[serde(default)]
    pub php_enabled: bool,

    #[serde(default = "default_php_version")]
    pub php_version: String,

    #[serde(default)]
    pub ssl_enabled: bool,

    #[serde(default)]
    pub ssl_redirect: bool,

    /// Rules stay loose so that a broken rule only drops itself.
    #[serde(default)]
    pub rewrite_rules: Vec<RewriteRuleConfig>,
}

fn default_php_version() -> String {
    "8.3".to_string()
}

/// One rewrite rule as written in the config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteRuleConfig {
    pub pattern: Option<String>,
    pub target: Option<String>,
    pub query_string: String,
    /// Either `"file_not_exists"` or `{ type = "file_not_exists" }`.
    pub conditions: Vec<toml::Value>,
    pub flags: Vec<String>,
}
