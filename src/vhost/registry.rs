//! Host header → virtual host resolution.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{FallbackPolicy, ServerConfig, VirtualHostConfig};
use crate::vhost::host::{normalize_host, VirtualHost};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no virtual hosts configured")]
    NoVirtualHosts,

    #[error("no virtual host for {0:?}")]
    UnknownHost(String),
}

/// Immutable set of virtual hosts. A config reload builds a new registry.
#[derive(Debug, Clone)]
pub struct VirtualHostRegistry {
    hosts: Vec<Arc<VirtualHost>>,
    fallback: FallbackPolicy,
    multi_port: bool,
    /// Port assumed for virtual hosts that do not name one.
    default_port: u16,
}

impl VirtualHostRegistry {
    pub fn new(
        hosts: Vec<VirtualHost>,
        fallback: FallbackPolicy,
        multi_port: bool,
        default_port: u16,
    ) -> Self {
        Self {
            hosts: hosts.into_iter().map(Arc::new).collect(),
            fallback,
            multi_port,
            default_port,
        }
    }

    /// Decode every `[[virtual_hosts]]` entry, skipping the broken ones.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut hosts: Vec<VirtualHost> = Vec::with_capacity(config.virtual_hosts.len());
        let multi_port = config.listener.multi_port;
        let default_port = config.listener.http_port;

        for (index, raw) in config.virtual_hosts.iter().enumerate() {
            let entry: VirtualHostConfig = match raw.clone().try_into() {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(entry = index, error = %e, "Skipping malformed virtual host");
                    continue;
                }
            };
            if entry.domain.trim().is_empty() {
                tracing::warn!(entry = index, "Skipping virtual host with empty domain");
                continue;
            }

            let vhost = VirtualHost::from_config(&entry);
            let duplicate = hosts.iter().any(|h| {
                h.domain == vhost.domain
                    && (!multi_port
                        || h.port.unwrap_or(default_port) == vhost.port.unwrap_or(default_port))
            });
            if duplicate {
                tracing::warn!(domain = %vhost.domain, "Duplicate virtual host ignored");
                continue;
            }

            hosts.push(vhost);
        }

        Self::new(hosts, config.routing.fallback, multi_port, default_port)
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Arc<VirtualHost>> {
        self.hosts.iter()
    }

    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    /// Distinct plaintext ports to bind in multi-port mode.
    pub fn listen_ports(&self) -> BTreeSet<u16> {
        self.hosts
            .iter()
            .map(|h| h.port.unwrap_or(self.default_port))
            .collect()
    }

    /// Resolve a `Host` header (and, in multi-port mode, the listening port).
    ///
    /// An exact match wins. Otherwise the fallback policy decides between the
    /// first configured virtual host and [`RegistryError::UnknownHost`].
    pub fn resolve(&self, host: Option<&str>, port: Option<u16>) -> Result<Arc<VirtualHost>, RegistryError> {
        let first = self.hosts.first().ok_or(RegistryError::NoVirtualHosts)?;
        let name = host.map(normalize_host).unwrap_or_default();

        let exact = self.hosts.iter().find(|h| {
            h.domain == name
                && match (self.multi_port, port) {
                    (true, Some(port)) => h.port.unwrap_or(self.default_port) == port,
                    _ => true,
                }
        });
        if let Some(vhost) = exact {
            return Ok(Arc::clone(vhost));
        }

        match self.fallback {
            FallbackPolicy::FirstConfigured => {
                tracing::debug!(host = %name, fallback = %first.domain, "Unknown host, using default virtual host");
                Ok(Arc::clone(first))
            }
            FallbackPolicy::Reject => Err(RegistryError::UnknownHost(name)),
        }
    }
}
