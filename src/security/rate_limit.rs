//! Per-client rate limiting middleware.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::RateLimitConfig;
use crate::http::client_ip::resolve_client_ip;
use crate::http::response::text;
use crate::observability::metrics;

/// Bucket count above which idle, full buckets are evicted.
const PRUNE_THRESHOLD: usize = 10_000;
const IDLE_AFTER: Duration = Duration::from_secs(300);

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared limiter state, one bucket per client IP.
pub struct RateLimiterState {
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
    /// Tokens per second.
    refill_rate: f64,
    burst: f64,
    trust_proxy_headers: bool,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig, trust_proxy_headers: bool) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            refill_rate: f64::from(config.requests_per_minute) / 60.0,
            burst: f64::from(config.burst.max(1)),
            trust_proxy_headers,
        }
    }

    pub fn check(&self, client: IpAddr) -> bool {
        let Ok(mut buckets) = self.buckets.lock() else {
            // A panicked holder must not take the server down with it.
            return true;
        };
        if buckets.len() > PRUNE_THRESHOLD {
            let now = Instant::now();
            buckets.retain(|_, b| now.duration_since(b.last_update) < IDLE_AFTER);
        }
        buckets
            .entry(client)
            .or_insert_with(|| TokenBucket::new(self.burst))
            .try_acquire(self.burst, self.refill_rate)
    }
}

pub async fn rate_limit_middleware(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = resolve_client_ip(request.headers(), peer, state.trust_proxy_headers);

    if state.check(client) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
        metrics::record_rate_limited();
        text(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests_per_minute: u32, burst: u32) -> RateLimiterState {
        RateLimiterState::new(
            &RateLimitConfig {
                enabled: true,
                requests_per_minute,
                burst,
            },
            false,
        )
    }

    #[test]
    fn burst_then_reject() {
        let limiter = limiter(60, 3);
        let client: IpAddr = "192.0.2.1".parse().unwrap();
        assert!(limiter.check(client));
        assert!(limiter.check(client));
        assert!(limiter.check(client));
        assert!(!limiter.check(client));
    }

    #[test]
    fn clients_are_independent() {
        let limiter = limiter(60, 1);
        assert!(limiter.check("192.0.2.1".parse().unwrap()));
        assert!(!limiter.check("192.0.2.1".parse().unwrap()));
        assert!(limiter.check("192.0.2.2".parse().unwrap()));
    }

    #[test]
    fn tokens_refill_over_time() {
        let mut bucket = TokenBucket::new(1.0);
        assert!(bucket.try_acquire(1.0, 1.0));
        assert!(!bucket.try_acquire(1.0, 1.0));
        bucket.last_update -= Duration::from_secs(2);
        assert!(bucket.try_acquire(1.0, 1.0));
    }
}
