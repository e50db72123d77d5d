//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Dispatcher, once per request:
//!     → geo.rs (country code for the client IP)
//!     → telemetry.rs (AccessEvent → TelemetrySink)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → access log file (JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all subsystems
//! - Telemetry is fire-and-forget; it can never fail a response
//! - Sinks and geo lookup are traits so tests can substitute fakes

pub mod geo;
pub mod logging;
pub mod metrics;
pub mod telemetry;

pub use geo::{BasicGeoLookup, GeoLookup};
pub use telemetry::{AccessEvent, FanoutSink, JsonLinesSink, LogSink, RequestType, TelemetrySink};
