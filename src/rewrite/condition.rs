//! Filesystem-state conditions attached to rewrite rules.

use std::fs::Metadata;
use std::path::Path;

/// A condition that must hold for a rewrite rule to apply.
///
/// Conditions look at the *current* request path joined onto the document
/// root. Anything that cannot be resolved, or that resolves outside the
/// document root, counts as "does not exist".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// No regular file at the path.
    FileNotExists,
    /// No directory at the path.
    DirNotExists,
}

impl Condition {
    /// Parse a condition type name (`file_not_exists`, `dir_not_exists`).
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "file_not_exists" => Some(Self::FileNotExists),
            "dir_not_exists" => Some(Self::DirNotExists),
            _ => None,
        }
    }

    /// Accepts both `"file_not_exists"` and `{ type = "file_not_exists" }`.
    pub fn from_config(value: &toml::Value) -> Result<Self, String> {
        let kind = match value {
            toml::Value::String(s) => s.as_str(),
            toml::Value::Table(table) => match table.get("type") {
                Some(toml::Value::String(s)) => s.as_str(),
                _ => return Err("condition table without a string `type`".to_string()),
            },
            other => return Err(format!("unsupported condition value {other}")),
        };
        Self::parse(kind).ok_or_else(|| format!("unknown condition type {kind:?}"))
    }

    /// Evaluate against `request_path` under `document_root`.
    pub async fn evaluate(&self, request_path: &str, document_root: &Path) -> bool {
        let Some(meta) = contained_metadata(request_path, document_root).await else {
            return true;
        };
        match self {
            Self::FileNotExists => !meta.is_file(),
            Self::DirNotExists => !meta.is_dir(),
        }
    }
}

/// Metadata for the request path if it exists inside the document root.
async fn contained_metadata(request_path: &str, document_root: &Path) -> Option<Metadata> {
    let candidate = document_root.join(request_path.trim_start_matches('/'));
    let resolved = tokio::fs::canonicalize(candidate).await.ok()?;
    let root = tokio::fs::canonicalize(document_root).await.ok()?;
    if !resolved.starts_with(&root) {
        return None;
    }
    tokio::fs::metadata(resolved).await.ok()
}
