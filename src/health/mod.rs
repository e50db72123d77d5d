//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Interval timer
//!     → active.rs (connect to each interpreter socket, close immediately)
//!     → logs on state transitions
//!     → interpreter_up{version} gauge
//! ```
//!
//! # Design Decisions
//! - Reporting only: request handling never consults health state
//! - A probe is a bare connect, no FastCGI traffic is sent

pub mod active;

pub use active::HealthMonitor;
