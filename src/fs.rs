//! Filesystem collaborators.
//!
//! Existence checks, reads and file watching are injected behind traits so
//! the settings resolver and orchestrator can run against in-memory doubles.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Read-only filesystem access
#[tower_lsp::async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;
    async fn read_to_string(&self, path: &Path) -> Result<String>;
}

/// The real filesystem, through `tokio::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFileSystem;

#[tower_lsp::async_trait]
impl FileSystem for TokioFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

/// An installed watch. Disposing (or dropping) it stops the watch.
pub struct WatchHandle {
    path: PathBuf,
    disposer: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    pub fn new(path: PathBuf, disposer: impl FnOnce() + Send + 'static) -> Self {
        Self {
            path,
            disposer: Some(Box::new(disposer)),
        }
    }

    /// The watched file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("path", &self.path)
            .field("active", &self.disposer.is_some())
            .finish()
    }
}

/// Installs watches on single files
pub trait FileWatcher: Send + Sync {
    fn watch(&self, path: &Path) -> Result<WatchHandle>;
}

/// `notify` backed watcher that forwards changed paths to a channel.
///
/// The parent directory is watched non-recursively so editors that save by
/// renaming a temporary file over the target are still observed.
#[derive(Debug, Clone)]
pub struct NotifyWatcher {
    events: mpsc::UnboundedSender<PathBuf>,
}

impl NotifyWatcher {
    pub fn new(events: mpsc::UnboundedSender<PathBuf>) -> Self {
        Self { events }
    }
}

impl FileWatcher for NotifyWatcher {
    fn watch(&self, path: &Path) -> Result<WatchHandle> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .with_context(|| format!("Cannot watch {}: no file name", path.display()))?;

        let tx = self.events.clone();
        let target = path.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) =
                        event.kind
                    {
                        if event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str()))
                        {
                            let _ = tx.send(target.clone());
                        }
                    }
                }
                Err(e) => log::warn!("Rule-set watcher error: {}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", parent.display()))?;
        log::debug!("Watching rule-set file {}", path.display());

        let watched = path.to_path_buf();
        Ok(WatchHandle::new(path.to_path_buf(), move || {
            drop(watcher);
            log::debug!("Stopped watching {}", watched.display());
        }))
    }
}
