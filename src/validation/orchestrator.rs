//! Validation Orchestrator
//!
//! Owns the engine handle, the settings and the view of open documents.
//! Every run bumps a generation number; a run only publishes while its
//! generation is still the document's latest, so a slow run can never
//! overwrite the diagnostics of a newer one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tower_lsp::lsp_types::{Diagnostic, MessageType, Url};

use super::mapper::{failure_diagnostic, to_diagnostic};
use super::selector::ValidationSelector;
use super::EditorClient;
use crate::engine::{Document, RuleEngine};
use crate::ruleset::RulesetCache;
use crate::settings::{RulesetSource, Settings, SettingsResolver};

/// Settings plus the selector compiled from them
struct ActiveSettings {
    settings: Settings,
    selector: ValidationSelector,
}

impl ActiveSettings {
    fn new(settings: Settings) -> Self {
        let selector = ValidationSelector::from_settings(&settings);
        Self { settings, selector }
    }
}

/// The orchestrator's view of an open document
#[derive(Debug)]
struct TrackedDocument {
    text: String,
    generation: u64,
}

struct Inner {
    client: Arc<dyn EditorClient>,
    resolver: SettingsResolver,
    rulesets: RulesetCache,
    engine: Arc<dyn RuleEngine>,
    active: ArcSwap<ActiveSettings>,
    documents: RwLock<HashMap<Url, TrackedDocument>>,
    /// Shared across documents so a reopened URI never reuses a number
    generations: AtomicU64,
    reload: Mutex<()>,
}

/// Cheap to clone; clones share state
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn EditorClient>,
        resolver: SettingsResolver,
        rulesets: RulesetCache,
        engine: Arc<dyn RuleEngine>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                resolver,
                rulesets,
                engine,
                active: ArcSwap::from_pointee(ActiveSettings::new(Settings::default())),
                documents: RwLock::new(HashMap::new()),
                generations: AtomicU64::new(0),
                reload: Mutex::new(()),
            }),
        }
    }

    pub fn settings(&self) -> Settings {
        self.inner.active.load().settings.clone()
    }

    pub fn resolver(&self) -> &SettingsResolver {
        &self.inner.resolver
    }

    pub fn rulesets(&self) -> &RulesetCache {
        &self.inner.rulesets
    }

    pub fn engine(&self) -> Arc<dyn RuleEngine> {
        self.inner.engine.clone()
    }

    /// URIs currently tracked
    pub async fn tracked(&self) -> Vec<Url> {
        self.inner.documents.read().await.keys().cloned().collect()
    }

    /// Record the workspace root reported by `initialize`
    pub async fn initialize(&self, workspace_root: Option<PathBuf>) {
        self.inner.resolver.set_workspace_root(workspace_root).await;
    }

    /// The handshake is complete: host configuration becomes available
    pub async fn initialized(&self) {
        self.inner.resolver.mark_initialized();
        self.reload().await;
    }

    pub async fn did_open(&self, uri: Url, text: String) {
        self.track(uri.clone(), text).await;
        self.validate(&uri).await;
    }

    pub async fn did_change(&self, uri: Url, text: String) {
        self.track(uri.clone(), text).await;
        self.validate(&uri).await;
    }

    /// Revalidate documents that mention the saved file by name.
    ///
    /// This is a substring heuristic, not a reference graph: it fires on
    /// coincidental matches and misses references that do not spell out the
    /// file name.
    pub async fn did_save(&self, uri: &Url) {
        if self.is_ruleset_file(uri).await {
            log::info!("Rule-set saved, reloading");
            self.inner.rulesets.purge().await;
            self.reload().await;
            return;
        }

        let Some(name) = bare_name(uri) else {
            return;
        };
        let dependents: Vec<Url> = {
            let documents = self.inner.documents.read().await;
            documents
                .iter()
                .filter(|(other, doc)| *other != uri && doc.text.contains(&name))
                .map(|(other, _)| other.clone())
                .collect()
        };
        if dependents.is_empty() {
            return;
        }

        log::debug!(
            "{} saved, revalidating {} dependent document(s)",
            name,
            dependents.len()
        );
        self.inner.rulesets.purge().await;
        self.dispatch(dependents).await;
    }

    /// Stop tracking and clear the document's diagnostics
    pub async fn did_close(&self, uri: &Url) {
        self.inner.documents.write().await.remove(uri);
        self.inner
            .client
            .publish_diagnostics(uri.clone(), Vec::new())
            .await;
    }

    pub async fn configuration_changed(&self) {
        self.reload().await;
    }

    /// React to changed files reported by the client or the rule-set watch
    pub async fn watched_files_changed(&self, uris: &[Url]) {
        let mut relevant = false;
        for uri in uris {
            if self.is_ruleset_file(uri).await
                || self.inner.rulesets.references().contains(uri).await
            {
                relevant = true;
            } else if let Ok(path) = uri.to_file_path() {
                relevant |= self.inner.resolver.is_override_file(&path).await;
            }
        }
        if relevant {
            self.inner.rulesets.purge().await;
            self.reload().await;
        }
    }

    /// Resolve settings, load the rule-set and revalidate every document.
    ///
    /// A failed load keeps the previous rule-set active.
    pub async fn reload(&self) {
        {
            let _serial = self.inner.reload.lock().await;
            let current = self.inner.active.load_full();
            let resolved = self.inner.resolver.resolve(&current.settings).await;

            let settings = match self.inner.rulesets.load(&resolved.ruleset).await {
                Ok(ruleset) => {
                    self.inner.engine.set_ruleset(Arc::new(ruleset)).await;
                    resolved
                }
                Err(e) => {
                    log::error!("Failed to load rule-set {}: {}", resolved.ruleset, e);
                    self.inner
                        .client
                        .show_notice(
                            MessageType::WARNING,
                            format!(
                                "Failed to load rule-set {}, keeping the previous one: {}",
                                resolved.ruleset, e
                            ),
                        )
                        .await;
                    Settings {
                        ruleset: self.inner.engine.ruleset().source.clone(),
                        validate_files: resolved.validate_files,
                    }
                }
            };

            self.inner
                .active
                .store(Arc::new(ActiveSettings::new(settings)));
        }

        self.revalidate_all().await;
    }

    /// Run validation for every tracked document
    pub async fn revalidate_all(&self) {
        let uris = self.tracked().await;
        self.dispatch(uris).await;
    }

    /// One validation run for `uri`
    pub async fn validate(&self, uri: &Url) {
        let Some((text, generation)) = self.begin_run(uri).await else {
            return;
        };

        let active = self.inner.active.load_full();
        let diagnostics = if !active.selector.in_scope(uri, &text) {
            Vec::new()
        } else {
            let document = Document::new(uri.clone(), text);
            match self.inner.engine.run(&document).await {
                Ok(issues) => issues.iter().map(to_diagnostic).collect(),
                Err(e) => {
                    log::warn!("Validation of {} failed: {}", uri, e);
                    vec![failure_diagnostic(&e)]
                }
            }
        };

        self.finish_run(uri, generation, diagnostics).await;
    }

    async fn track(&self, uri: Url, text: String) {
        let mut documents = self.inner.documents.write().await;
        match documents.get_mut(&uri) {
            Some(doc) => doc.text = text,
            None => {
                documents.insert(
                    uri,
                    TrackedDocument {
                        text,
                        generation: 0,
                    },
                );
            }
        }
    }

    async fn begin_run(&self, uri: &Url) -> Option<(String, u64)> {
        let mut documents = self.inner.documents.write().await;
        let doc = documents.get_mut(uri)?;
        doc.generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        Some((doc.text.clone(), doc.generation))
    }

    async fn finish_run(&self, uri: &Url, generation: u64, diagnostics: Vec<Diagnostic>) {
        // Publishing under the read lock keeps newer runs from starting in between.
        // A slow client holds up open/change/close writers for that long.
        let documents = self.inner.documents.read().await;
        match documents.get(uri) {
            Some(doc) if doc.generation == generation => {
                self.inner
                    .client
                    .publish_diagnostics(uri.clone(), diagnostics)
                    .await;
            }
            _ => log::trace!("Discarding superseded results for {}", uri),
        }
    }

    async fn dispatch(&self, uris: Vec<Url>) {
        let mut runs = JoinSet::new();
        for uri in uris {
            let this = self.clone();
            runs.spawn(async move { this.validate(&uri).await });
        }
        while let Some(result) = runs.join_next().await {
            if let Err(e) = result {
                log::error!("Validation task failed: {}", e);
            }
        }
    }

    /// The active rule-set, or the watched one that failed to load
    async fn is_ruleset_file(&self, uri: &Url) -> bool {
        let active = match &self.inner.active.load().settings.ruleset {
            RulesetSource::File(path) => uri.to_file_path().is_ok_and(|p| &p == path),
            RulesetSource::Remote(url) => url == uri,
            RulesetSource::Embedded => false,
        };
        if active {
            return true;
        }
        match (self.inner.resolver.watched_file().await, uri.to_file_path()) {
            (Some(watched), Ok(path)) => watched == path,
            _ => false,
        }
    }
}

/// Last path segment of a URI, percent-decoded for `file://` URIs
fn bare_name(uri: &Url) -> Option<String> {
    if let Ok(path) = uri.to_file_path() {
        return path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
    }
    uri.path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}
