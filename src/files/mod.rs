//! Static path resolution subsystem.
//!
//! # Data Flow
//! ```text
//! rewritten request path
//!     → resolver.rs (decode, reject traversal)
//!     → blocklist.rs (sensitive names and extensions)
//!     → canonicalize + containment check against the document root
//!     → directory? probe index.html, index.php, index.htm
//!     → ResolvedPath | Forbidden | NotFound
//! ```
//!
//! # Design Decisions
//! - Forbidden is returned before existence is revealed for blocked names
//! - Containment compares canonical paths component by component

pub mod blocklist;
pub mod resolver;

pub use resolver::{decode_request_path, resolve, ResolveError, ResolvedPath, INDEX_FILES};
