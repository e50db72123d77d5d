//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Detect conflicting listener ports
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Individual virtual hosts are not validated here; broken entries are
//!   skipped when the registry is built

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("http_port and https_port are both {0}")]
    PortConflict(u16),

    #[error("unknown log_format {0:?} (expected \"pretty\" or \"json\")")]
    LogFormat(String),

    #[error("invalid metrics_address {0:?}")]
    MetricsAddress(String),
}

/// Check a parsed configuration, returning every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if listener.http_port == 0 {
        errors.push(ValidationError::Zero { field: "listener.http_port" });
    }
    if listener.https_port == 0 {
        errors.push(ValidationError::Zero { field: "listener.https_port" });
    }
    if listener.http_port != 0 && listener.http_port == listener.https_port {
        errors.push(ValidationError::PortConflict(listener.http_port));
    }
    if listener.max_connections == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_connections" });
    }
    if listener.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "listener.request_timeout_secs" });
    }
    if config.php.timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "php.timeout_secs" });
    }
    if config.php.max_response_size == 0 {
        errors.push(ValidationError::Zero { field: "php.max_response_size" });
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero { field: "security.max_body_size" });
    }
    if config.security.rate_limit.enabled && config.security.rate_limit.requests_per_minute == 0 {
        errors.push(ValidationError::Zero { field: "security.rate_limit.requests_per_minute" });
    }
    if config.health.enabled && config.health.interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "health.interval_secs" });
    }

    let format = config.observability.log_format.as_str();
    if format != "pretty" && format != "json" {
        errors.push(ValidationError::LogFormat(format.to_string()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
