//! URL rewrite subsystem.
//!
//! # Data Flow
//! ```text
//! (path, query) from the dispatcher
//!     → engine.rs (rules in configured order)
//!         → rule.rs (start-anchored match, capture groups)
//!         → condition.rs (filesystem checks against the current path)
//!         → substitute target, fill query template, QSA append
//!         → stop on `L`, else feed result to the next rule
//!     → (path', query') to the static resolver
//! ```
//!
//! # Design Decisions
//! - Rules are compiled once when the virtual host is built
//! - A rule that fails to compile drops itself, never the engine
//! - Conditions are a closed enum, evaluated with a single match

pub mod condition;
pub mod engine;
pub mod rule;

pub use condition::Condition;
pub use engine::RewriteEngine;
pub use rule::{RewriteRule, RuleError, RuleFlags};
