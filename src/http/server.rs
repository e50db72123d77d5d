//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all dispatch handler
//! - Wire up middleware (tracing, request ID, timeout, concurrency, rate limit)
//! - Serve plaintext listeners and the single HTTPS listener
//! - Stop accepting and drain on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    middleware,
    response::Response,
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::fastcgi::cgi::SERVER_SOFTWARE;
use crate::http::dispatcher::{ListenerContext, RequestContext, RequestDispatcher};
use crate::security::{rate_limit_middleware, RateLimiterState};

/// How long in-flight TLS connections may drain after shutdown.
const TLS_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Router-level settings shared by every listener.
#[derive(Clone)]
pub struct ServerOptions {
    pub request_timeout: Duration,
    pub max_connections: usize,
    pub hide_server_header: bool,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        let security = &config.security;
        Self {
            request_timeout: Duration::from_secs(config.listener.request_timeout_secs),
            max_connections: config.listener.max_connections,
            hide_server_header: security.hide_server_header,
            rate_limiter: security
                .rate_limit
                .enabled
                .then(|| Arc::new(RateLimiterState::new(&security.rate_limit, security.trust_proxy_headers))),
        }
    }
}

/// Application state injected into the handler.
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<RequestDispatcher>,
    listener: ListenerContext,
}

/// The web server. One router is built per listener so the dispatcher
/// knows which port and scheme a request arrived on.
#[derive(Clone)]
pub struct HttpServer {
    dispatcher: Arc<RequestDispatcher>,
    options: ServerOptions,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<RequestDispatcher>, options: ServerOptions) -> Self {
        Self { dispatcher, options }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self, listener: ListenerContext) -> Router {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            listener,
        };

        let mut router = Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state);

        if let Some(limiter) = &self.options.rate_limiter {
            router = router.layer(middleware::from_fn_with_state(Arc::clone(limiter), rate_limit_middleware));
        }
        if !self.options.hide_server_header {
            router = router.layer(SetResponseHeaderLayer::if_not_present(
                header::SERVER,
                HeaderValue::from_static(SERVER_SOFTWARE),
            ));
        }

        router
            .layer(ConcurrencyLimitLayer::new(self.options.max_connections.max(1)))
            .layer(TimeoutLayer::new(self.options.request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve plaintext HTTP until shutdown is signalled.
    pub async fn serve(&self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        let app = self
            .router(ListenerContext {
                port: addr.port(),
                secure: false,
            })
            .into_make_service_with_connect_info::<SocketAddr>();

        tracing::info!(address = %addr, "HTTP listener started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(address = %addr, "HTTP listener stopped");
        Ok(())
    }

    /// Serve HTTPS with one certificate for every virtual host.
    ///
    /// `handle` can be used by the caller to learn the bound address.
    pub async fn serve_tls(
        &self,
        addr: SocketAddr,
        tls: Arc<rustls::ServerConfig>,
        handle: Handle,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let app = self
            .router(ListenerContext {
                port: addr.port(),
                secure: true,
            })
            .into_make_service_with_connect_info::<SocketAddr>();

        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            drain.graceful_shutdown(Some(TLS_GRACE_PERIOD));
        });

        tracing::info!(address = %addr, "HTTPS listener started");

        axum_server::bind_rustls(addr, RustlsConfig::from_config(tls))
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!(address = %addr, "HTTPS listener stopped");
        Ok(())
    }
}

async fn dispatch_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state
        .dispatcher
        .dispatch(
            request,
            RequestContext {
                peer,
                listener: state.listener,
            },
        )
        .await
}
