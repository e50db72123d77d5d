//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself: editors and
//! deploy tools usually replace the file by rename, which silently ends a
//! watch on the old inode.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::ServerConfig;

/// Watches one configuration file and publishes every valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ServerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ServerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(OsString::from);
        let reloader = Reloader {
            path: self.path.clone(),
            // The running config was loaded from the current contents.
            last: Mutex::new(std::fs::read_to_string(&self.path).ok()),
            tx: self.update_tx,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(OsString::from) == file_name);
                    if relevant && ours {
                        reloader.reload();
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

struct Reloader {
    path: PathBuf,
    /// Contents of the last version that was published (or loaded at start).
    last: Mutex<Option<String>>,
    tx: mpsc::UnboundedSender<ServerConfig>,
}

impl Reloader {
    fn reload(&self) {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            // Mid-rename; the create event for the new file follows.
            Err(e) => {
                tracing::debug!(path = ?self.path, error = %e, "Config file not readable yet");
                return;
            }
        };

        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if last.as_deref() == Some(content.as_str()) {
            tracing::debug!(path = ?self.path, "Config unchanged, skipping reload");
            return;
        }

        tracing::info!(path = ?self.path, "Config file change detected, reloading");
        match parse_config(&content) {
            Ok(config) => {
                *last = Some(content);
                let _ = self.tx.send(config);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config, keeping current virtual hosts");
            }
        }
    }
}
