//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every subsystem once, in dependency order
//! - Bind listeners and start background tasks
//! - Apply hot-reloaded virtual hosts
//! - Drain listeners on shutdown
//!
//! # Design Decisions
//! - Only an empty virtual host set is fatal
//! - A missing certificate disables HTTPS, not the server
//! - Listeners start last (traffic only when ready)

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use crate::config::watcher::ConfigWatcher;
use crate::config::ServerConfig;
use crate::fastcgi::InterpreterPool;
use crate::health::HealthMonitor;
use crate::http::{DispatchSettings, HttpServer, RequestDispatcher, ServerOptions};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::observability::{metrics, BasicGeoLookup, FanoutSink, JsonLinesSink, LogSink, TelemetrySink};
use crate::tls::{select_primary, PrimaryCertificate, TlsContextStore};
use crate::vhost::VirtualHostRegistry;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no virtual hosts configured")]
    NoVirtualHosts,

    #[error("invalid bind host {host:?}: {source}")]
    BindHost { host: String, source: AddrParseError },

    #[error("no listener could be bound")]
    NoListeners,
}

/// Every long-lived component, constructed once.
pub struct Services {
    pub config: ServerConfig,
    pub registry: Arc<ArcSwap<VirtualHostRegistry>>,
    pub tls: Arc<TlsContextStore>,
    pub primary: Option<PrimaryCertificate>,
    pub interpreters: Arc<InterpreterPool>,
    pub dispatcher: Arc<RequestDispatcher>,
}

impl Services {
    /// Must be called inside the Tokio runtime when an access log file is
    /// configured.
    pub fn build(config: ServerConfig) -> Result<Self, StartupError> {
        let registry = VirtualHostRegistry::from_config(&config);
        if registry.is_empty() {
            return Err(StartupError::NoVirtualHosts);
        }
        for vhost in registry.hosts() {
            tracing::info!(
                domain = %vhost.domain,
                root = %vhost.document_root.display(),
                php = vhost.php_enabled,
                php_version = %vhost.php_version,
                ssl = vhost.ssl_enabled,
                rewrite_rules = vhost.rewrite.rules_count(),
                "Virtual host loaded"
            );
        }

        let tls = Arc::new(TlsContextStore::from_config(&config.tls));
        let primary = if config.tls.enabled {
            select_primary(&tls, &registry)
        } else {
            None
        };

        let interpreters = Arc::new(InterpreterPool::from_config(&config.php));
        tracing::info!(versions = ?interpreters.available_versions(), "Interpreter pool ready");

        let telemetry: Arc<dyn TelemetrySink> = match &config.observability.access_log_path {
            Some(path) => Arc::new(FanoutSink::new(vec![
                Box::new(LogSink),
                Box::new(JsonLinesSink::spawn(path)),
            ])),
            None => Arc::new(LogSink),
        };

        let registry = Arc::new(ArcSwap::from_pointee(registry));
        let dispatcher = Arc::new(RequestDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&interpreters),
            telemetry,
            Arc::new(BasicGeoLookup),
            DispatchSettings::from_config(&config),
        ));

        Ok(Self {
            config,
            registry,
            tls,
            primary,
            interpreters,
            dispatcher,
        })
    }

    pub fn server(&self) -> HttpServer {
        HttpServer::new(Arc::clone(&self.dispatcher), ServerOptions::from_config(&self.config))
    }

    /// One address normally; one per distinct vhost port in multi-port mode.
    pub fn plaintext_addrs(&self) -> Result<Vec<SocketAddr>, StartupError> {
        let ip = self.bind_ip()?;
        let listener = &self.config.listener;
        if listener.multi_port {
            Ok(self
                .registry
                .load()
                .listen_ports()
                .into_iter()
                .map(|port| SocketAddr::new(ip, port))
                .collect())
        } else {
            Ok(vec![SocketAddr::new(ip, listener.http_port)])
        }
    }

    pub fn https_addr(&self) -> Result<SocketAddr, StartupError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.config.listener.https_port))
    }

    fn bind_ip(&self) -> Result<IpAddr, StartupError> {
        let host = &self.config.listener.bind_host;
        host.parse().map_err(|source| StartupError::BindHost {
            host: host.clone(),
            source,
        })
    }
}

/// Run the server until SIGINT/SIGTERM.
pub async fn run(config: ServerConfig, config_path: &Path) -> Result<(), StartupError> {
    let services = Services::build(config)?;
    let observability = &services.config.observability;
    if observability.metrics_enabled {
        match observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let server = services.server();
    let mut listeners = JoinSet::new();

    for addr in services.plaintext_addrs()? {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let server = server.clone();
                let rx = shutdown.subscribe();
                listeners.spawn(async move { server.serve(listener, rx).await });
            }
            Err(e) => tracing::error!(address = %addr, error = %e, "Failed to bind HTTP listener"),
        }
    }

    match &services.primary {
        Some(primary) => {
            let addr = services.https_addr()?;
            tracing::info!(certificate = %primary.name, source = ?primary.source, "Using primary certificate");
            let server = server.clone();
            let config = Arc::clone(&primary.config);
            let rx = shutdown.subscribe();
            listeners.spawn(async move { server.serve_tls(addr, config, axum_server::Handle::new(), rx).await });
        }
        None => tracing::warn!("HTTPS listener not started, serving HTTP only"),
    }

    if listeners.is_empty() {
        return Err(StartupError::NoListeners);
    }

    let mut background = JoinSet::new();
    let monitor = HealthMonitor::new(Arc::clone(&services.interpreters), services.config.health.clone());
    background.spawn(monitor.run(shutdown.subscribe()));

    let (watcher, updates) = ConfigWatcher::new(config_path);
    // Dropping the notify handle stops watching.
    let _watch_guard = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, path = ?config_path, "Config watcher unavailable, hot reload disabled");
            None
        }
    };
    background.spawn(reload_virtual_hosts(
        updates,
        Arc::clone(&services.registry),
        shutdown.subscribe(),
    ));

    tokio::select! {
        _ = signals::wait_for_shutdown(&shutdown) => {}
        Some(result) = listeners.join_next() => {
            // A listener died on its own; take the rest down with it.
            if let Ok(Err(e)) = result {
                tracing::error!(error = %e, "Listener failed");
            }
            shutdown.trigger();
        }
    }

    while let Some(result) = listeners.join_next().await {
        match result {
            Ok(Err(e)) => tracing::error!(error = %e, "Listener failed during shutdown"),
            Err(e) => tracing::error!(error = %e, "Listener task panicked"),
            Ok(Ok(())) => {}
        }
    }
    while background.join_next().await.is_some() {}

    services.tls.clear_cache();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Swap in a freshly built registry for every reloaded configuration.
pub async fn reload_virtual_hosts(
    mut updates: mpsc::UnboundedReceiver<ServerConfig>,
    registry: Arc<ArcSwap<VirtualHostRegistry>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                let next = VirtualHostRegistry::from_config(&config);
                if next.is_empty() {
                    tracing::warn!("Reloaded config has no usable virtual hosts, keeping current set");
                    continue;
                }
                tracing::info!(virtual_hosts = next.len(), "Virtual hosts reloaded");
                registry.store(Arc::new(next));
            }
            _ = shutdown.recv() => break,
        }
    }
}
