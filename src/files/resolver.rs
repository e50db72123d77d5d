//! Request path → file under the document root.
//!
//! # Responsibilities
//! - Percent-decode request paths
//! - Reject traversal, absolute components and blocklisted segments
//! - Confine canonical paths to the canonical document root
//! - Pick a directory index in fixed priority order
//!
//! # Design Decisions
//! - The blocklist runs on the requested path and again on the canonical
//!   path, so a symlink cannot smuggle a sensitive file out
//! - Directories never produce a listing

use std::io;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use thiserror::Error;

use crate::files::blocklist::blocked_segment;

/// Directory index candidates, highest priority first.
pub const INDEX_FILES: &[&str] = &["index.html", "index.php", "index.htm"];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("not found")]
    NotFound,

    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),
}

/// A file the dispatcher may serve or execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Canonical path of the file.
    pub file_path: PathBuf,
    /// Index file name when the request named a directory.
    pub index_file: Option<&'static str>,
    /// Canonical document root the file was confined to.
    pub document_root: PathBuf,
}

impl ResolvedPath {
    pub fn is_directory_indexed(&self) -> bool {
        self.index_file.is_some()
    }
}

/// Percent-decode the path component of a request URI.
pub fn decode_request_path(raw: &str) -> Result<String, ResolveError> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ResolveError::Forbidden("path is not valid UTF-8"))?;
    if decoded.contains('\0') {
        return Err(ResolveError::Forbidden("NUL byte in path"));
    }
    Ok(decoded.into_owned())
}

/// Resolve `request_path` under `document_root`.
pub async fn resolve(document_root: &Path, request_path: &str) -> Result<ResolvedPath, ResolveError> {
    let relative = relative_path(request_path)?;

    if let Some(segment) = blocked_segment(&relative) {
        tracing::warn!(path = %request_path, segment = %segment, "Blocked sensitive path");
        return Err(ResolveError::Forbidden("sensitive path"));
    }

    let root = tokio::fs::canonicalize(document_root).await?;
    let canonical = canonicalize(&root.join(&relative)).await?;

    confine(&root, &canonical, request_path)?;

    let metadata = tokio::fs::metadata(&canonical).await.map_err(map_io)?;
    if !metadata.is_dir() {
        return Ok(ResolvedPath {
            file_path: canonical,
            index_file: None,
            document_root: root,
        });
    }

    for &index in INDEX_FILES {
        // The index may itself be a symlink; it gets the same checks.
        let candidate = match canonicalize(&canonical.join(index)).await {
            Ok(candidate) => candidate,
            Err(ResolveError::NotFound) => continue,
            Err(e) => return Err(e),
        };
        confine(&root, &candidate, request_path)?;
        if tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Ok(ResolvedPath {
                file_path: candidate,
                index_file: Some(index),
                document_root: root,
            });
        }
    }

    Err(ResolveError::Forbidden("directory without index"))
}

/// `canonical` must sit under `root` and carry no blocklisted segment.
fn confine(root: &Path, canonical: &Path, request_path: &str) -> Result<(), ResolveError> {
    let Ok(inside) = canonical.strip_prefix(root) else {
        tracing::warn!(path = %request_path, resolved = ?canonical, "Path escapes document root");
        return Err(ResolveError::Forbidden("outside document root"));
    };
    if let Some(segment) = blocked_segment(inside) {
        tracing::warn!(path = %request_path, segment = %segment, "Blocked sensitive path after resolution");
        return Err(ResolveError::Forbidden("sensitive path"));
    }
    Ok(())
}

/// Turn the URL path into a relative filesystem path, refusing `..` and
/// anything that would re-root the join.
fn relative_path(request_path: &str) -> Result<PathBuf, ResolveError> {
    let trimmed = request_path.trim_start_matches('/');
    let mut relative = PathBuf::new();

    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(segment) => relative.push(segment),
            Component::CurDir => {}
            Component::ParentDir => return Err(ResolveError::Forbidden("path traversal")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(ResolveError::Forbidden("absolute path component"))
            }
        }
    }
    Ok(relative)
}

async fn canonicalize(path: &Path) -> Result<PathBuf, ResolveError> {
    tokio::fs::canonicalize(path).await.map_err(map_io)
}

fn map_io(e: io::Error) -> ResolveError {
    match e.kind() {
        io::ErrorKind::NotFound => ResolveError::NotFound,
        io::ErrorKind::PermissionDenied => ResolveError::Forbidden("permission denied"),
        _ => ResolveError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(root.join("index.php"), "<?php echo 1;").unwrap();
        fs::create_dir(root.join("app")).unwrap();
        fs::write(root.join("app/index.php"), "<?php").unwrap();
        fs::write(root.join("app/index.htm"), "old").unwrap();
        fs::create_dir(root.join("empty")).unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        fs::write(root.join(".git/config"), "[core]").unwrap();
        fs::write(root.join(".env"), "SECRET=1").unwrap();
        fs::write(root.join("wp-config.php.bak"), "x").unwrap();
        fs::create_dir_all(root.join(".well-known/acme-challenge")).unwrap();
        fs::write(root.join(".well-known/acme-challenge/token"), "t").unwrap();
        dir
    }

    #[tokio::test]
    async fn plain_file_resolves() {
        let dir = site();
        let resolved = resolve(dir.path(), "/index.php").await.unwrap();
        assert!(resolved.file_path.ends_with("index.php"));
        assert!(!resolved.is_directory_indexed());
        assert_eq!(resolved.document_root, fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn index_priority_prefers_html() {
        let dir = site();
        let resolved = resolve(dir.path(), "/").await.unwrap();
        assert_eq!(resolved.index_file, Some("index.html"));

        let resolved = resolve(dir.path(), "/app/").await.unwrap();
        assert_eq!(resolved.index_file, Some("index.php"));
    }

    #[tokio::test]
    async fn directory_without_index_is_forbidden() {
        let dir = site();
        assert!(matches!(
            resolve(dir.path(), "/empty").await,
            Err(ResolveError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = site();
        assert!(matches!(
            resolve(dir.path(), "/nope.html").await,
            Err(ResolveError::NotFound)
        ));
    }

    #[tokio::test]
    async fn traversal_is_forbidden() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("www");
        fs::create_dir(&root).unwrap();
        fs::write(outer.path().join("secret.txt"), "s").unwrap();

        for path in ["/../secret.txt", "/a/../../secret.txt", "/..", "//../secret.txt", "/./../secret.txt"] {
            assert!(
                matches!(resolve(&root, path).await, Err(ResolveError::Forbidden(_))),
                "{path} should be forbidden"
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_out_of_root_is_forbidden() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("www");
        fs::create_dir(&root).unwrap();
        fs::write(outer.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outer.path().join("secret.txt"), root.join("link.txt")).unwrap();

        assert!(matches!(
            resolve(&root, "/link.txt").await,
            Err(ResolveError::Forbidden(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_index_out_of_root_is_forbidden() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("www");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(outer.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outer.path().join("secret.txt"), root.join("docs/index.html")).unwrap();

        assert!(matches!(
            resolve(&root, "/docs/").await,
            Err(ResolveError::Forbidden(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_index_inside_root_resolves() {
        let dir = site();
        fs::create_dir(dir.path().join("alias")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("index.html"), dir.path().join("alias/index.html")).unwrap();

        let resolved = resolve(dir.path(), "/alias/").await.unwrap();
        assert_eq!(resolved.index_file, Some("index.html"));
        assert_eq!(resolved.file_path, fs::canonicalize(dir.path().join("index.html")).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_onto_sensitive_file_is_forbidden() {
        let dir = site();
        std::os::unix::fs::symlink(dir.path().join(".env"), dir.path().join("env.txt")).unwrap();
        assert!(matches!(
            resolve(dir.path(), "/env.txt").await,
            Err(ResolveError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn blocklist_wins_even_when_file_exists() {
        let dir = site();
        for path in ["/.git/config", "/.env", "/wp-config.php.bak", "/.git"] {
            assert!(
                matches!(resolve(dir.path(), path).await, Err(ResolveError::Forbidden(_))),
                "{path} should be forbidden"
            );
        }
        assert!(resolve(dir.path(), "/.well-known/acme-challenge/token").await.is_ok());
    }

    #[test]
    fn decoding_rejects_nul() {
        assert_eq!(decode_request_path("/a%20b").unwrap(), "/a b");
        assert!(matches!(
            decode_request_path("/a%00.php"),
            Err(ResolveError::Forbidden(_))
        ));
        assert!(matches!(
            decode_request_path("/%2e%2e/etc/passwd").map(|p| p.contains("..")),
            Ok(true)
        ));
    }
}
