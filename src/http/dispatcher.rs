//! Per-request state machine.
//!
//! # Responsibilities
//! - Resolve the virtual host from `Host` (and listening port)
//! - Upgrade plaintext requests to HTTPS where the vhost demands it
//! - Rewrite, then resolve the path inside the document root
//! - Hand `.php` scripts to the interpreter pool, serve everything else
//! - Emit exactly one access event per request, success or failure

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, Request};
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::config::ServerConfig;
use crate::error::DispatchError;
use crate::fastcgi::{self, InterpreterPool, ScriptRequest};
use crate::files::{self, ResolvedPath};
use crate::http::client_ip::resolve_client_ip;
use crate::http::response;
use crate::observability::metrics;
use crate::observability::{AccessEvent, GeoLookup, RequestType, TelemetrySink};
use crate::vhost::{VirtualHost, VirtualHostRegistry};

/// Interpreter extension, compared case-insensitively.
const SCRIPT_EXTENSION: &str = "php";

/// Dispatcher knobs taken from the server configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub https_port: u16,
    pub trust_proxy_headers: bool,
    pub max_body_size: usize,
}

impl DispatchSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            https_port: config.listener.https_port,
            trust_proxy_headers: config.security.trust_proxy_headers,
            max_body_size: config.security.max_body_size,
        }
    }
}

/// The listener a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerContext {
    pub port: u16,
    pub secure: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    /// Transport peer.
    pub peer: SocketAddr,
    pub listener: ListenerContext,
}

pub struct RequestDispatcher {
    registry: Arc<ArcSwap<VirtualHostRegistry>>,
    interpreters: Arc<InterpreterPool>,
    telemetry: Arc<dyn TelemetrySink>,
    geo: Arc<dyn GeoLookup>,
    settings: DispatchSettings,
}

impl RequestDispatcher {
    pub fn new(
        registry: Arc<ArcSwap<VirtualHostRegistry>>,
        interpreters: Arc<InterpreterPool>,
        telemetry: Arc<dyn TelemetrySink>,
        geo: Arc<dyn GeoLookup>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            interpreters,
            telemetry,
            geo,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Serve one request. Never fails: every error becomes a response.
    pub async fn dispatch(&self, request: Request<Body>, ctx: RequestContext) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let client_ip = resolve_client_ip(&parts.headers, ctx.peer, self.settings.trust_proxy_headers);

        let mut virtual_host = String::new();
        let (response, request_type) =
            match self.handle(&parts, body, &ctx, client_ip, &mut virtual_host).await {
                Ok(served) => served,
                Err(e) => {
                    self.log_failure(&parts, &virtual_host, &e);
                    if let DispatchError::Backend(backend) = &e {
                        metrics::record_fastcgi_error(backend.kind());
                    }
                    (e.into_response(), RequestType::Error)
                }
            };

        let status = response.status().as_u16();
        metrics::record_request(parts.method.as_str(), status, request_type.as_str(), start);

        let ip = client_ip.to_string();
        self.telemetry.record(AccessEvent {
            timestamp: Utc::now(),
            country_code: self.geo.country_code_for(&ip),
            ip,
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            status_code: status,
            request_type,
            virtual_host,
            user_agent: header_string(&parts, header::USER_AGENT),
            response_time: start.elapsed().as_secs_f64() * 1000.0,
            referer: header_string(&parts, header::REFERER),
            protocol: fastcgi::protocol_name(parts.version).to_string(),
        });

        response
    }

    async fn handle(
        &self,
        parts: &Parts,
        body: Body,
        ctx: &RequestContext,
        client_ip: IpAddr,
        virtual_host: &mut String,
    ) -> Result<(Response, RequestType), DispatchError> {
        let host = request_host(parts);
        // The HTTPS listener serves every vhost, so only plaintext
        // listeners narrow the match by port.
        let port = (!ctx.listener.secure).then_some(ctx.listener.port);
        let vhost = self.registry.load().resolve(host, port)?;
        virtual_host.clone_from(&vhost.domain);

        let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        if !ctx.listener.secure && vhost.requires_tls_redirect() {
            let location = response::https_location(&vhost.domain, self.settings.https_port, path_and_query);
            tracing::debug!(domain = %vhost.domain, location = %location, "Redirecting to HTTPS");
            return Ok((response::permanent_redirect(&location), RequestType::Redirect));
        }

        let decoded = files::decode_request_path(parts.uri.path())?;
        let (path, query) = vhost.rewrite.process(&decoded, parts.uri.query().unwrap_or("")).await;
        if path != decoded {
            tracing::debug!(domain = %vhost.domain, from = %decoded, to = %path, query = %query, "Rewrote request");
        }

        let resolved = files::resolve(vhost.document_root(), &path).await?;

        if vhost.php_enabled && is_script(&resolved.file_path) {
            let request = ScriptDispatch {
                parts,
                vhost: &vhost,
                resolved: &resolved,
                path: &path,
                query: &query,
                request_uri: path_and_query,
                remote: SocketAddr::new(client_ip, ctx.peer.port()),
                listener: ctx.listener,
            };
            let response = self.run_script(request, body).await?;
            return Ok((response, RequestType::Php));
        }

        let file = tokio::fs::File::open(&resolved.file_path).await?;
        let len = file.metadata().await?.len();
        Ok((response::static_file(&resolved.file_path, file, len), RequestType::Static))
    }

    async fn run_script(&self, request: ScriptDispatch<'_>, body: Body) -> Result<Response, DispatchError> {
        let vhost = request.vhost;
        let client = self
            .interpreters
            .get(&vhost.php_version)
            .ok_or_else(|| DispatchError::InterpreterUnavailable {
                version: vhost.php_version.clone(),
            })?;

        let limit = self.settings.max_body_size;
        let declared = request
            .parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(DispatchError::PayloadTooLarge { limit });
        }
        let body = axum::body::to_bytes(body, limit)
            .await
            .map_err(|_| DispatchError::PayloadTooLarge { limit })?;

        let script_name = fastcgi::script_name(request.path, request.resolved.index_file);
        let params = fastcgi::build_params(&ScriptRequest {
            method: &request.parts.method,
            version: request.parts.version,
            headers: &request.parts.headers,
            request_uri: request.request_uri,
            query_string: request.query,
            script_filename: &request.resolved.file_path,
            script_name: &script_name,
            document_root: &request.resolved.document_root,
            server_name: &vhost.domain,
            server_port: request.listener.port,
            remote: request.remote,
            secure: request.listener.secure,
            content_length: body.len(),
        });

        let output = client.execute(&params, &body).await?;
        if !output.stderr.is_empty() {
            tracing::warn!(
                domain = %vhost.domain,
                script = %script_name,
                stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                "Interpreter wrote to stderr"
            );
        }
        Ok(response::from_cgi(fastcgi::parse_response(&output.stdout)))
    }

    fn log_failure(&self, parts: &Parts, virtual_host: &str, error: &DispatchError) {
        let path = parts.uri.path();
        match error {
            DispatchError::Forbidden(reason) => {
                tracing::warn!(domain = %virtual_host, path = %path, reason = %reason, "Path security violation");
            }
            DispatchError::NotFound | DispatchError::UnknownHost(_) => {
                tracing::debug!(domain = %virtual_host, path = %path, error = %error, "Not found");
            }
            DispatchError::PayloadTooLarge { .. } => {
                tracing::warn!(domain = %virtual_host, path = %path, error = %error, "Request body rejected");
            }
            _ => {
                tracing::error!(domain = %virtual_host, path = %path, error = %error, "Request failed");
            }
        }
    }
}

/// Borrowed facts for one interpreter call.
struct ScriptDispatch<'a> {
    parts: &'a Parts,
    vhost: &'a VirtualHost,
    resolved: &'a ResolvedPath,
    path: &'a str,
    query: &'a str,
    request_uri: &'a str,
    remote: SocketAddr,
    listener: ListenerContext,
}

/// `Host` header, else the authority of an absolute-form target.
fn request_host(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(|a| a.as_str()))
}

fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION))
}

fn header_string(parts: &Parts, name: header::HeaderName) -> String {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use axum::http::StatusCode;
    use tempfile::TempDir;

    use crate::config::{parse_config, FallbackPolicy};
    use crate::observability::BasicGeoLookup;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<AccessEvent>>);

    impl TelemetrySink for Recorder {
        fn record(&self, event: AccessEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct Fixture {
        root: TempDir,
        dispatcher: RequestDispatcher,
        events: Arc<Recorder>,
    }

    fn fixture(extra_vhost: &str) -> Fixture {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("index.html"), "home").unwrap();
        std::fs::write(root.path().join("app.php"), "<?php").unwrap();
        std::fs::write(root.path().join(".env"), "SECRET=1").unwrap();

        let config = parse_config(&format!(
            r#"
            [[virtual_hosts]]
            domain = "site.test"
            document_root = "{root}"
            php_enabled = true
            php_version = "8.1"
            {extra_vhost}

            [[virtual_hosts.rewrite_rules]]
            pattern = "^/pretty/(.*)$"
            target = "/index.html"
            flags = ["L"]
            "#,
            root = root.path().display()
        ))
        .unwrap();
        let (dispatcher, events) = dispatcher_for(&config);
        assert_eq!(dispatcher.registry.load().fallback(), FallbackPolicy::FirstConfigured);
        Fixture {
            root,
            dispatcher,
            events,
        }
    }

    fn dispatcher_for(config: &ServerConfig) -> (RequestDispatcher, Arc<Recorder>) {
        let events = Arc::new(Recorder::default());
        let dispatcher = RequestDispatcher::new(
            Arc::new(ArcSwap::from_pointee(VirtualHostRegistry::from_config(config))),
            Arc::new(InterpreterPool::new()),
            events.clone(),
            Arc::new(BasicGeoLookup),
            DispatchSettings::from_config(config),
        );
        (dispatcher, events)
    }

    fn ctx(secure: bool) -> RequestContext {
        ctx_on(3080, secure)
    }

    fn ctx_on(port: u16, secure: bool) -> RequestContext {
        RequestContext {
            peer: "127.0.0.1:50000".parse().unwrap(),
            listener: ListenerContext { port, secure },
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::HOST, "site.test:3080")
            .header(header::USER_AGENT, "curl/8.0")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn serves_directory_index() {
        let f = fixture("");
        let response = f.dispatcher.dispatch(get("/"), ctx(false)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(body_text(response).await, "home");

        let events = f.events.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_type, RequestType::Static);
        assert_eq!(events[0].virtual_host, "site.test");
        assert_eq!(events[0].user_agent, "curl/8.0");
        assert_eq!(events[0].country_code, "LOCAL");
        assert_eq!(events[0].protocol, "HTTP/1.1");
    }

    #[tokio::test]
    async fn rewrite_runs_before_resolution() {
        let f = fixture("");
        let response = f.dispatcher.dispatch(get("/pretty/anything"), ctx(false)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "home");
    }

    #[tokio::test]
    async fn blocked_and_missing_paths() {
        let f = fixture("");
        let forbidden = f.dispatcher.dispatch(get("/.env"), ctx(false)).await;
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let missing = f.dispatcher.dispatch(get("/nope.html"), ctx(false)).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let events = f.events.0.lock().unwrap();
        assert!(events.iter().all(|e| e.request_type == RequestType::Error));
        assert_eq!(events.iter().map(|e| e.status_code).collect::<Vec<_>>(), vec![403, 404]);
    }

    #[tokio::test]
    async fn plaintext_redirects_to_https() {
        let f = fixture("ssl_enabled = true\nssl_redirect = true");
        let response = f.dispatcher.dispatch(get("/a?b=1"), ctx(false)).await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "https://site.test:3453/a?b=1");

        let secure = f.dispatcher.dispatch(get("/"), ctx(true)).await;
        assert_eq!(secure.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn https_listener_resolves_by_domain_in_multi_port_mode() {
        let alpha = TempDir::new().unwrap();
        let beta = TempDir::new().unwrap();
        std::fs::write(alpha.path().join("index.html"), "alpha").unwrap();
        std::fs::write(beta.path().join("index.html"), "beta").unwrap();
        let config = parse_config(&format!(
            r#"
            [listener]
            multi_port = true

            [[virtual_hosts]]
            domain = "alpha.test"
            port = 8001
            document_root = "{alpha}"

            [[virtual_hosts]]
            domain = "beta.test"
            port = 8002
            document_root = "{beta}"
            "#,
            alpha = alpha.path().display(),
            beta = beta.path().display()
        ))
        .unwrap();
        let (dispatcher, _) = dispatcher_for(&config);

        let request = |host: &str| {
            Request::builder()
                .uri("/")
                .header(header::HOST, host)
                .body(Body::empty())
                .unwrap()
        };

        let secure = dispatcher.dispatch(request("beta.test"), ctx_on(3453, true)).await;
        assert_eq!(body_text(secure).await, "beta");

        let plain = dispatcher.dispatch(request("beta.test:8002"), ctx_on(8002, false)).await;
        assert_eq!(body_text(plain).await, "beta");

        // Plaintext still matches on the listening port.
        let wrong_port = dispatcher.dispatch(request("beta.test"), ctx_on(8001, false)).await;
        assert_eq!(body_text(wrong_port).await, "alpha");
    }

    #[tokio::test]
    async fn unconfigured_interpreter_is_500() {
        let f = fixture("");
        let response = f.dispatcher.dispatch(get("/app.php"), ctx(false)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "PHP version 8.1 not available");
        assert_eq!(f.events.0.lock().unwrap()[0].request_type, RequestType::Error);
    }

    #[tokio::test]
    async fn php_disabled_serves_source_as_static() {
        let f = fixture("");
        let registry = VirtualHostRegistry::from_config(
            &parse_config(&format!(
                "[[virtual_hosts]]\ndomain = \"site.test\"\ndocument_root = \"{}\"\n",
                f.root.path().display()
            ))
            .unwrap(),
        );
        f.dispatcher.registry.store(Arc::new(registry));

        let response = f.dispatcher.dispatch(get("/app.php"), ctx(false)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<?php");
    }

    #[test]
    fn script_extension_is_case_insensitive() {
        assert!(is_script(Path::new("/srv/a.php")));
        assert!(is_script(Path::new("/srv/a.PHP")));
        assert!(!is_script(Path::new("/srv/a.phps")));
        assert!(!is_script(Path::new("/srv/php")));
    }
}
