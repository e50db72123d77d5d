//! Strongly-typed virtual host definition.

use std::path::{Path, PathBuf};

use crate::config::VirtualHostConfig;
use crate::rewrite::RewriteEngine;

/// A site served by this process.
#[derive(Debug, Clone)]
pub struct VirtualHost {
    /// Lowercased domain, the registry key.
    pub domain: String,
    /// Listening port in multi-port mode.
    pub port: Option<u16>,
    pub document_root: PathBuf,
    pub php_enabled: bool,
    /// Key into the interpreter pool.
    pub php_version: String,
    pub ssl_enabled: bool,
    /// Redirect plaintext requests to the HTTPS listener.
    pub ssl_redirect: bool,
    pub rewrite: RewriteEngine,
}

impl VirtualHost {
    /// Build a virtual host, compiling its rewrite rules.
    pub fn from_config(config: &VirtualHostConfig) -> Self {
        let domain = config.domain.trim().to_ascii_lowercase();
        let document_root = PathBuf::from(&config.document_root);
        let rewrite = RewriteEngine::from_config(&document_root, &config.rewrite_rules, &domain);

        Self {
            domain,
            port: config.port,
            document_root,
            php_enabled: config.php_enabled,
            php_version: config.php_version.clone(),
            ssl_enabled: config.ssl_enabled,
            ssl_redirect: config.ssl_redirect,
            rewrite,
        }
    }

    pub fn document_root(&self) -> &Path {
        &self.document_root
    }

    /// Plaintext requests must be bounced to HTTPS.
    pub fn requires_tls_redirect(&self) -> bool {
        self.ssl_enabled && self.ssl_redirect
    }
}

/// Strip any port suffix from a `Host` header value and lowercase it.
///
/// `example.com:3080` → `example.com`, `[::1]:80` → `::1`.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();

    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_ascii_lowercase();
        }
    }

    let name = match host.rsplit_once(':') {
        // a bare IPv6 address has more than one colon
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    name.trim_end_matches('.').to_ascii_lowercase()
}
