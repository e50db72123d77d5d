//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Registry (fatal if empty) → TLS store + primary cert
//!         → Interpreter pool → Telemetry → Dispatcher → Listeners
//!         → Health monitor, config watcher
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Clear TLS cache
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: stop accept, drain, close
//! - Config reload swaps the registry only; listeners stay bound

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, Services, StartupError};
