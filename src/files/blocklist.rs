//! Sensitive path segments that are never served.

use std::path::{Component, Path};

/// Exact names refused anywhere in a path.
const BLOCKED_NAMES: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".env",
    ".htaccess",
    ".htpasswd",
    ".DS_Store",
];

/// Backup and editor temp-file extensions.
const BLOCKED_EXTENSIONS: &[&str] = &[
    ".bak", ".backup", ".old", ".orig", ".save", ".swp", ".swo", ".tmp", ".temp", ".dist",
];

/// Dot-directories that may be served.
const ALLOWED_DOT_SEGMENTS: &[&str] = &[".well-known"];

/// True if a single path segment must not be served.
pub fn is_blocked_segment(segment: &str) -> bool {
    if segment.is_empty() || segment == "." {
        return false;
    }
    if BLOCKED_NAMES.iter().any(|name| segment.eq_ignore_ascii_case(name)) {
        return true;
    }
    if segment.starts_with('.') && !ALLOWED_DOT_SEGMENTS.contains(&segment) {
        return true;
    }
    if segment.ends_with('~') {
        return true;
    }

    let lower = segment.to_ascii_lowercase();
    BLOCKED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// The first blocked segment of `path`, if any.
pub fn blocked_segment(path: &Path) -> Option<String> {
    path.components().find_map(|component| match component {
        Component::Normal(segment) => {
            let segment = segment.to_string_lossy();
            is_blocked_segment(&segment).then(|| segment.into_owned())
        }
        _ => None,
    })
}
