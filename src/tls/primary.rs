//! Choice of the one certificate the HTTPS listener presents.
//!
//! The listener does not switch certificates per connection, so every HTTPS
//! virtual host shares the certificate picked here at startup.

use std::sync::Arc;

use rustls::ServerConfig;
use serde::Serialize;

use crate::tls::store::{TlsContextStore, WILDCARD_LOCAL};
use crate::vhost::VirtualHostRegistry;

/// Which rule picked the primary certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimarySource {
    PublicVirtualHost,
    WildcardLocal,
    Localhost,
    Other,
}

#[derive(Clone)]
pub struct PrimaryCertificate {
    /// Certificate stem or domain the context was built for.
    pub name: String,
    pub source: PrimarySource,
    pub config: Arc<ServerConfig>,
}

impl std::fmt::Debug for PrimaryCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryCertificate")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// Preference order: an SSL-enabled public virtual host with its own
/// certificate, the wildcard local pair, `localhost`, then any other pair.
pub fn select_primary(store: &TlsContextStore, registry: &VirtualHostRegistry) -> Option<PrimaryCertificate> {
    let public = registry.hosts().filter(|vhost| {
        vhost.ssl_enabled && !store.is_local_domain(&vhost.domain) && vhost.domain != "localhost"
    });
    for vhost in public {
        if let Some(config) = store.get_context(&vhost.domain) {
            return Some(pick(&vhost.domain, PrimarySource::PublicVirtualHost, config));
        }
    }

    if let Some(config) = store.wildcard_context() {
        return Some(pick(WILDCARD_LOCAL, PrimarySource::WildcardLocal, config));
    }

    if let Some(config) = store.get_context("localhost") {
        return Some(pick("localhost", PrimarySource::Localhost, config));
    }

    for info in store.list_available_certificates() {
        if !info.key_present {
            continue;
        }
        if let Some(config) = store.get_context(&info.domain) {
            return Some(pick(&info.domain, PrimarySource::Other, config));
        }
    }

    tracing::warn!("No usable certificate found; HTTPS listener will not start");
    None
}

fn pick(name: &str, source: PrimarySource, config: Arc<ServerConfig>) -> PrimaryCertificate {
    tracing::info!(certificate = %name, source = ?source, "Primary TLS certificate selected");
    PrimaryCertificate {
        name: name.to_string(),
        source,
        config,
    }
}
