//! Interpreter pool: version key → FastCGI client.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::config::PhpConfig;
use crate::fastcgi::client::{BackendAddress, FastCgiClient};

/// One client per configured interpreter version.
#[derive(Debug, Clone, Default)]
pub struct InterpreterPool {
    clients: BTreeMap<String, FastCgiClient>,
}

impl InterpreterPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every configured socket. Missing Unix sockets are still
    /// registered so the version works once the backend comes up.
    pub fn from_config(config: &PhpConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut pool = Self::new();

        for (version, raw) in &config.sockets {
            let address = BackendAddress::parse(raw);
            if address.is_present() {
                tracing::info!(version = %version, socket = %address, "Interpreter registered");
            } else {
                tracing::warn!(version = %version, socket = %address, "Interpreter socket not found, registered as unavailable");
            }
            let client = FastCgiClient::new(address, timeout).with_max_output(config.max_response_size);
            pool.insert(version.clone(), client);
        }
        pool
    }

    pub fn insert(&mut self, version: impl Into<String>, client: FastCgiClient) {
        self.clients.insert(version.into(), client);
    }

    pub fn get(&self, version: &str) -> Option<&FastCgiClient> {
        self.clients.get(version)
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Versions whose socket is currently present.
    pub fn available_versions(&self) -> Vec<String> {
        self.clients
            .iter()
            .filter(|(_, client)| client.address().is_present())
            .map(|(version, _)| version.clone())
            .collect()
    }

    /// Probe every interpreter concurrently.
    pub async fn test_all_connections(&self) -> BTreeMap<String, bool> {
        let mut probes = JoinSet::new();
        for (version, client) in &self.clients {
            let (version, client) = (version.clone(), client.clone());
            probes.spawn(async move { (version, client.test_connection().await) });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((version, up)) => {
                    results.insert(version, up);
                }
                Err(e) => tracing::error!(error = %e, "Interpreter probe task failed"),
            }
        }
        results
    }
}
