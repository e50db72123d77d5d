//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client token bucket, 429 when empty)
//!     → Dispatcher (path containment and blocklist live in files/)
//! ```
//!
//! # Design Decisions
//! - Buckets are keyed by the same client IP the CGI layer sees
//! - Rate limiting is opt-in; disabled means the layer is never installed

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiterState};
