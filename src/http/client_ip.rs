//! Client address resolution.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Proxy headers consulted in order when they are trusted.
pub const TRUSTED_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "cf-connecting-ip",
    "true-client-ip",
    "x-cluster-client-ip",
    "fastly-client-ip",
];

/// The client IP: the first syntactically valid proxy header value when
/// `trust_proxy_headers` is set, else the transport peer.
pub fn resolve_client_ip(headers: &HeaderMap, peer: SocketAddr, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        for name in TRUSTED_HEADERS {
            let Some(raw) = headers.get(*name).and_then(|v| v.to_str().ok()) else {
                continue;
            };
            // X-Forwarded-For: client, proxy1, proxy2
            let candidate = raw.split(',').next().unwrap_or("").trim();
            if let Ok(ip) = candidate.parse::<IpAddr>() {
                return ip;
            }
            tracing::debug!(header = %name, value = %raw, "Ignoring invalid client IP header");
        }
    }
    peer.ip()
}
