//! Settings Resolver
//!
//! Precedence, highest first:
//! 1. `.spectral.yaml` in the workspace root
//! 2. the host-configured rule-set path, when it exists on disk
//! 3. the embedded default
//!
//! The resolver also owns the single rule-set file watch. Every resolution
//! disposes the previous watch before installing the next one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock};
use tower_lsp::lsp_types::Url;

use super::{
    ConfigurationProvider, HostSettings, RulesetSource, Settings, WORKSPACE_OVERRIDE_FILE,
};
use crate::fs::{FileSystem, FileWatcher, WatchHandle};

/// What the host told us this time around
enum HostReport {
    /// Handshake not complete; host configuration is unavailable by contract
    Unavailable,
    /// Fetch failed; keep the last known good settings
    Failed,
    Reported(HostSettings),
}

pub struct SettingsResolver {
    fs: Arc<dyn FileSystem>,
    provider: Arc<dyn ConfigurationProvider>,
    watcher: Arc<dyn FileWatcher>,
    workspace_root: RwLock<Option<PathBuf>>,
    initialized: AtomicBool,
    watch: Mutex<Option<WatchHandle>>,
}

impl SettingsResolver {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        provider: Arc<dyn ConfigurationProvider>,
        watcher: Arc<dyn FileWatcher>,
    ) -> Self {
        Self {
            fs,
            provider,
            watcher,
            workspace_root: RwLock::new(None),
            initialized: AtomicBool::new(false),
            watch: Mutex::new(None),
        }
    }

    pub async fn set_workspace_root(&self, root: Option<PathBuf>) {
        *self.workspace_root.write().await = root;
    }

    pub async fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace_root.read().await.clone()
    }

    /// Record that the initialization handshake has completed
    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Path of the workspace override file, whether or not it exists
    pub async fn override_file(&self) -> Option<PathBuf> {
        self.workspace_root()
            .await
            .map(|root| root.join(WORKSPACE_OVERRIDE_FILE))
    }

    /// The file currently under watch, if any
    pub async fn watched_file(&self) -> Option<PathBuf> {
        self.watch
            .lock()
            .await
            .as_ref()
            .map(|handle| handle.path().to_path_buf())
    }

    /// Produce the effective settings and rebind the rule-set watch.
    ///
    /// `last_known_good` is reused when the host configuration cannot be
    /// fetched.
    pub async fn resolve(&self, last_known_good: &Settings) -> Settings {
        let report = self.host_report().await;

        let validate_files = match &report {
            HostReport::Unavailable => Vec::new(),
            HostReport::Failed => last_known_good.validate_files.clone(),
            HostReport::Reported(host) => host.validate_files.clone(),
        };

        let ruleset = if let Some(path) = self.existing_override().await {
            RulesetSource::File(path)
        } else {
            match &report {
                HostReport::Unavailable => RulesetSource::Embedded,
                HostReport::Failed => last_known_good.ruleset.clone(),
                HostReport::Reported(host) => self
                    .host_ruleset(host)
                    .await
                    .unwrap_or(RulesetSource::Embedded),
            }
        };

        let settings = Settings {
            ruleset,
            validate_files,
        };
        self.rebind_watch(&settings.ruleset).await;
        settings
    }

    async fn host_report(&self) -> HostReport {
        if !self.is_initialized() {
            return HostReport::Unavailable;
        }
        match self.provider.fetch().await {
            Ok(host) => HostReport::Reported(host),
            Err(e) => {
                log::warn!("Failed to fetch host configuration, keeping last settings: {e:#}");
                HostReport::Failed
            }
        }
    }

    async fn existing_override(&self) -> Option<PathBuf> {
        let path = self.override_file().await?;
        self.fs.exists(&path).await.then_some(path)
    }

    async fn host_ruleset(&self, host: &HostSettings) -> Option<RulesetSource> {
        let raw = host.spectral_rulesets_file.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(url) = Url::parse(raw) {
            match url.scheme() {
                "http" | "https" => return Some(RulesetSource::Remote(url)),
                "file" => {
                    let path = url.to_file_path().ok()?;
                    return self.existing_file(path).await;
                }
                // Windows drive letters parse as a scheme
                _ => {}
            }
        }

        let path = self.absolutize(raw).await;
        self.existing_file(path).await
    }

    async fn existing_file(&self, path: PathBuf) -> Option<RulesetSource> {
        if self.fs.exists(&path).await {
            Some(RulesetSource::File(path))
        } else {
            log::debug!(
                "Configured rule-set {} not found, using the default",
                path.display()
            );
            None
        }
    }

    async fn absolutize(&self, raw: &str) -> PathBuf {
        let path = match raw.strip_prefix("~/") {
            Some(rest) => match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => PathBuf::from(raw),
            },
            None => PathBuf::from(raw),
        };
        if path.is_absolute() {
            return path;
        }
        match self.workspace_root().await {
            Some(root) => root.join(path),
            None => path,
        }
    }

    async fn rebind_watch(&self, source: &RulesetSource) {
        let mut slot = self.watch.lock().await;
        if let Some(previous) = slot.take() {
            previous.dispose();
        }
        if let Some(path) = source.file_path() {
            match self.watcher.watch(path) {
                Ok(handle) => *slot = Some(handle),
                Err(e) => log::warn!("Failed to watch rule-set {}: {e:#}", path.display()),
            }
        }
    }

    /// True when `path` is the workspace override file
    pub async fn is_override_file(&self, path: &Path) -> bool {
        self.override_file().await.as_deref() == Some(path)
    }
}
