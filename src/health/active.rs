//! Active interpreter health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered interpreter socket
//! - Log availability transitions and export the `interpreter_up` gauge

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthConfig;
use crate::fastcgi::InterpreterPool;
use crate::observability::metrics;

pub struct HealthMonitor {
    interpreters: Arc<InterpreterPool>,
    config: HealthConfig,
    /// Last observed state per version; absent until the first probe.
    last: BTreeMap<String, bool>,
}

impl HealthMonitor {
    pub fn new(interpreters: Arc<InterpreterPool>, config: HealthConfig) -> Self {
        Self {
            interpreters,
            config,
            last: BTreeMap::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Interpreter health checks disabled");
            return;
        }
        if self.interpreters.is_empty() {
            tracing::info!("No interpreters configured, health monitor idle");
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Health monitor starting");

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe once and return the versions whose state changed.
    pub async fn check_all(&mut self) -> Vec<(String, bool)> {
        let results = self.interpreters.test_all_connections().await;
        let mut transitions = Vec::new();

        for (version, up) in results {
            metrics::record_interpreter_health(&version, up);
            let previous = self.last.insert(version.clone(), up);
            if previous == Some(up) {
                continue;
            }
            match (previous, up) {
                (Some(_), true) => tracing::info!(version = %version, "Interpreter became available"),
                (Some(_), false) => tracing::warn!(version = %version, "Interpreter became unavailable"),
                (None, true) => tracing::info!(version = %version, "Interpreter available"),
                (None, false) => tracing::warn!(version = %version, "Interpreter unavailable"),
            }
            transitions.push((version, up));
        }
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fastcgi::{BackendAddress, FastCgiClient};
    use tokio::net::TcpListener;

    fn monitor(address: BackendAddress) -> HealthMonitor {
        let mut pool = InterpreterPool::new();
        pool.insert("8.3", FastCgiClient::new(address, Duration::from_secs(1)));
        HealthMonitor::new(Arc::new(pool), HealthConfig::default())
    }

    #[tokio::test]
    async fn reports_only_transitions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let mut monitor = monitor(BackendAddress::Tcp(addr.to_string()));
        assert_eq!(monitor.check_all().await, vec![("8.3".to_string(), true)]);
        assert!(monitor.check_all().await.is_empty());
    }

    #[tokio::test]
    async fn missing_socket_is_down() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut monitor = monitor(BackendAddress::Unix(dir.path().join("php.sock")));
        assert_eq!(monitor.check_all().await, vec![("8.3".to_string(), false)]);
    }

    #[tokio::test]
    async fn exits_on_shutdown() {
        let dir = tempfile::TempDir::new().unwrap();
        let monitor = monitor(BackendAddress::Unix(dir.path().join("php.sock")));
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(monitor.run(rx));
        tx.send(()).unwrap();
        time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
