use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use tokio::sync::Notify;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, MessageType, NumberOrString, Url};

use openapi_language_server::engine::{
    Document, EngineError, Issue, Linter, Position, Range, RuleEngine, Severity,
};
use openapi_language_server::fs::{FileWatcher, TokioFileSystem, WatchHandle};
use openapi_language_server::ruleset::{DefaultReferenceResolver, Ruleset, RulesetCache};
use openapi_language_server::settings::{
    ConfigurationProvider, HostSettings, RulesetSource, SettingsResolver,
};
use openapi_language_server::validation::{DIAGNOSTIC_SOURCE, EditorClient, Orchestrator};

const CUSTOM_RULESET: &str = "rules:
  custom-title:
    description: House style requires a title.
    severity: error
    given: $.info
    then:
      field: title
      function: truthy
";

const OVERRIDE_RULESET: &str = "rules:
  override-version:
    description: House style requires a version.
    severity: warn
    given: $.info
    then:
      field: version
      function: truthy
";

#[derive(Default)]
struct RecordingClient {
    published: StdMutex<Vec<(Url, Vec<Diagnostic>)>>,
    notices: StdMutex<Vec<(MessageType, String)>>,
}

impl RecordingClient {
    fn published_for(&self, uri: &Url) -> Vec<Vec<Diagnostic>> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(published, _)| published == uri)
            .map(|(_, diagnostics)| diagnostics.clone())
            .collect()
    }

    fn last_for(&self, uri: &Url) -> Vec<Diagnostic> {
        self.published_for(uri)
            .pop()
            .unwrap_or_else(|| panic!("nothing published for {}", uri))
    }

    fn notices(&self) -> Vec<(MessageType, String)> {
        self.notices.lock().unwrap().clone()
    }
}

#[tower_lsp::async_trait]
impl EditorClient for RecordingClient {
    async fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        self.published.lock().unwrap().push((uri, diagnostics));
    }

    async fn show_notice(&self, kind: MessageType, message: String) {
        self.notices.lock().unwrap().push((kind, message));
    }
}

#[derive(Default)]
struct SwitchableProvider(StdMutex<HostSettings>);

impl SwitchableProvider {
    fn set(&self, settings: HostSettings) {
        *self.0.lock().unwrap() = settings;
    }
}

#[tower_lsp::async_trait]
impl ConfigurationProvider for SwitchableProvider {
    async fn fetch(&self) -> anyhow::Result<HostSettings> {
        Ok(self.0.lock().unwrap().clone())
    }
}

/// Counts live watches instead of touching the OS
#[derive(Default)]
struct CountingWatcher {
    active: Arc<AtomicUsize>,
}

impl FileWatcher for CountingWatcher {
    fn watch(&self, path: &Path) -> anyhow::Result<WatchHandle> {
        self.active.fetch_add(1, Ordering::SeqCst);
        let active = self.active.clone();
        Ok(WatchHandle::new(path.to_path_buf(), move || {
            active.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}

/// The built-in linter, counting invocations
struct CountingEngine {
    linter: Linter,
    runs: AtomicUsize,
}

#[tower_lsp::async_trait]
impl RuleEngine for CountingEngine {
    async fn set_ruleset(&self, ruleset: Arc<Ruleset>) {
        self.linter.set_ruleset(ruleset).await;
    }

    fn ruleset(&self) -> Arc<Ruleset> {
        self.linter.ruleset()
    }

    async fn run(&self, document: &Document) -> Result<Vec<Issue>, EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.linter.run(document).await
    }
}

/// Holds documents containing "slow" until released
#[derive(Default)]
struct GatedEngine {
    started: Notify,
    release: Notify,
}

#[tower_lsp::async_trait]
impl RuleEngine for GatedEngine {
    async fn set_ruleset(&self, _: Arc<Ruleset>) {}

    fn ruleset(&self) -> Arc<Ruleset> {
        Arc::new(Ruleset::default())
    }

    async fn run(&self, document: &Document) -> Result<Vec<Issue>, EngineError> {
        let code = if document.text.contains("slow") {
            self.started.notify_one();
            self.release.notified().await;
            "slow"
        } else {
            "fast"
        };
        Ok(vec![Issue {
            code: code.to_string(),
            message: code.to_string(),
            severity: Severity::Hint,
            path: Vec::new(),
            range: Range::new(Position::new(0, 0), Position::new(0, 0)),
        }])
    }
}

struct Harness {
    orchestrator: Orchestrator,
    client: Arc<RecordingClient>,
    provider: Arc<SwitchableProvider>,
    engine: Arc<CountingEngine>,
    watches: Arc<AtomicUsize>,
    workspace: TempDir,
}

impl Harness {
    fn new() -> Self {
        let workspace = tempfile::tempdir().expect("tempdir");
        let client = Arc::new(RecordingClient::default());
        let provider = Arc::new(SwitchableProvider::default());
        let watcher = CountingWatcher::default();
        let watches = watcher.active.clone();

        let resolver = SettingsResolver::new(
            Arc::new(TokioFileSystem),
            provider.clone(),
            Arc::new(watcher),
        );
        let rulesets = RulesetCache::new(Arc::new(DefaultReferenceResolver::new()));
        let engine = Arc::new(CountingEngine {
            linter: Linter::new(
                Arc::new(Ruleset::embedded().expect("embedded")),
                rulesets.references(),
            ),
            runs: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(client.clone(), resolver, rulesets, engine.clone());

        Self {
            orchestrator,
            client,
            provider,
            engine,
            watches,
            workspace,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.workspace.path().join(name)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("write");
        path
    }

    fn uri(&self, name: &str) -> Url {
        Url::from_file_path(self.path(name)).expect("absolute path")
    }

    fn runs(&self) -> usize {
        self.engine.runs.load(Ordering::SeqCst)
    }

    async fn start(&self, host: HostSettings) {
        self.provider.set(host);
        self.orchestrator
            .initialize(Some(self.workspace.path().to_path_buf()))
            .await;
        self.orchestrator.initialized().await;
    }
}

fn host_ruleset(path: &Path) -> HostSettings {
    HostSettings {
        spectral_rulesets_file: Some(path.display().to_string()),
        validate_files: Vec::new(),
    }
}

fn codes(diagnostics: &[Diagnostic]) -> Vec<String> {
    diagnostics
        .iter()
        .filter_map(|d| match &d.code {
            Some(NumberOrString::String(code)) => Some(code.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn openapi_document_is_validated_with_default_settings() {
    let h = Harness::new();
    let uri = h.uri("spec.yaml");

    h.orchestrator
        .did_open(uri.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;

    assert_eq!(h.runs(), 1);
    let diagnostics = h.client.last_for(&uri);
    assert!(!diagnostics.is_empty());
    assert!(codes(&diagnostics).contains(&"info-title".to_string()));
    for diagnostic in &diagnostics {
        assert!(diagnostic.severity.is_some());
        assert_eq!(diagnostic.source.as_deref(), Some(DIAGNOSTIC_SOURCE));
    }
}

#[tokio::test]
async fn out_of_scope_document_publishes_empty_without_engine_run() {
    let h = Harness::new();
    let uri = h.uri("notes.yaml");

    h.orchestrator
        .did_open(uri.clone(), "title: shopping list\n".to_string())
        .await;

    assert_eq!(h.runs(), 0);
    assert_eq!(h.client.published_for(&uri), vec![Vec::<Diagnostic>::new()]);
}

#[tokio::test]
async fn glob_patterns_override_content_heuristic() {
    let h = Harness::new();
    h.start(HostSettings {
        spectral_rulesets_file: None,
        validate_files: vec!["**/*.api.yaml".to_string()],
    })
    .await;

    let matched = h.uri("foo.api.yaml");
    h.orchestrator
        .did_open(matched.clone(), "swagger: '2.0'\n".to_string())
        .await;
    assert_eq!(h.runs(), 1);

    let unmatched = h.uri("plain.yaml");
    h.orchestrator
        .did_open(unmatched.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;
    assert_eq!(h.runs(), 1);
    assert!(h.client.last_for(&unmatched).is_empty());
}

#[tokio::test]
async fn workspace_override_beats_host_ruleset() {
    let h = Harness::new();
    let custom = h.write("custom.yaml", CUSTOM_RULESET);
    let override_file = h.write(".spectral.yaml", OVERRIDE_RULESET);

    h.start(host_ruleset(&custom)).await;
    assert_eq!(
        h.orchestrator.settings().ruleset,
        RulesetSource::File(override_file)
    );

    let uri = h.uri("spec.yaml");
    h.orchestrator
        .did_open(uri.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;
    assert_eq!(codes(&h.client.last_for(&uri)), vec!["override-version"]);
}

#[tokio::test]
async fn ruleset_change_revalidates_every_tracked_document() {
    let h = Harness::new();
    h.start(HostSettings::default()).await;

    let first = h.uri("a.yaml");
    let second = h.uri("b.yaml");
    h.orchestrator
        .did_open(first.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;
    h.orchestrator
        .did_open(second.clone(), "openapi: 3.1.0\ninfo: {}".to_string())
        .await;
    assert_eq!(h.runs(), 2);

    let custom = h.write("custom.yaml", CUSTOM_RULESET);
    h.provider.set(host_ruleset(&custom));
    h.orchestrator.configuration_changed().await;

    assert_eq!(h.runs(), 4);
    assert_eq!(codes(&h.client.last_for(&first)), vec!["custom-title"]);
    assert_eq!(codes(&h.client.last_for(&second)), vec!["custom-title"]);
}

#[tokio::test]
async fn close_publishes_empty_and_stops_tracking() {
    let h = Harness::new();
    let uri = h.uri("spec.yaml");
    h.orchestrator
        .did_open(uri.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;

    h.orchestrator.did_close(&uri).await;
    assert!(h.client.last_for(&uri).is_empty());
    assert!(h.orchestrator.tracked().await.is_empty());

    // Closing an unknown document still clears it
    let never_opened = h.uri("other.yaml");
    h.orchestrator.did_close(&never_opened).await;
    assert_eq!(
        h.client.published_for(&never_opened),
        vec![Vec::<Diagnostic>::new()]
    );

    h.orchestrator.configuration_changed().await;
    assert_eq!(h.runs(), 1);
}

#[tokio::test]
async fn save_revalidates_documents_naming_the_saved_file() {
    let h = Harness::new();
    h.write("shared-schema.yaml", "Pet:\n  type: object\n");
    let main = h.uri("main.yaml");
    let main_text = "openapi: 3.0.0
components:
  schemas:
    Dog:
      $ref: 'shared-schema.yaml#/Dog'
";
    h.orchestrator
        .did_open(main.clone(), main_text.to_string())
        .await;
    assert!(codes(&h.client.last_for(&main)).contains(&"invalid-ref".to_string()));
    assert_eq!(h.orchestrator.rulesets().references().len().await, 1);

    // The cached copy is stale until the save purges it
    h.write(
        "shared-schema.yaml",
        "Pet:\n  type: object\nDog:\n  type: object\n",
    );
    let runs = h.runs();
    h.orchestrator.did_save(&h.uri("shared-schema.yaml")).await;

    assert_eq!(h.runs(), runs + 1);
    assert!(!codes(&h.client.last_for(&main)).contains(&"invalid-ref".to_string()));
}

#[tokio::test]
async fn save_without_dependents_does_nothing() {
    let h = Harness::new();
    let uri = h.uri("spec.yaml");
    h.orchestrator
        .did_open(uri.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;

    h.orchestrator.did_save(&uri).await;
    h.orchestrator.did_save(&h.uri("unrelated.yaml")).await;
    assert_eq!(h.runs(), 1);
}

#[tokio::test]
async fn failed_ruleset_load_keeps_previous_ruleset() {
    let h = Harness::new();
    let broken = h.write("broken.yaml", "rules: [unclosed\n");
    let uri = h.uri("spec.yaml");
    h.orchestrator
        .did_open(uri.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;

    h.start(HostSettings {
        spectral_rulesets_file: Some(broken.display().to_string()),
        validate_files: vec!["**/*.yaml".to_string()],
    })
    .await;

    let notices = h.client.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, MessageType::WARNING);

    let settings = h.orchestrator.settings();
    assert_eq!(settings.ruleset, RulesetSource::Embedded);
    assert_eq!(settings.validate_files, vec!["**/*.yaml"]);

    // Still revalidated, still against the embedded rules
    assert_eq!(h.runs(), 2);
    assert!(codes(&h.client.last_for(&uri)).contains(&"info-title".to_string()));

    // Fixing the file on disk is picked up through the watch
    h.write("broken.yaml", CUSTOM_RULESET);
    h.orchestrator
        .watched_files_changed(&[Url::from_file_path(&broken).unwrap()])
        .await;
    assert_eq!(h.orchestrator.settings().ruleset, RulesetSource::File(broken));
    assert_eq!(codes(&h.client.last_for(&uri)), vec!["custom-title"]);
}

#[tokio::test]
async fn watched_ruleset_change_reloads() {
    let h = Harness::new();
    let custom = h.write("custom.yaml", CUSTOM_RULESET);
    h.start(host_ruleset(&custom)).await;

    let uri = h.uri("spec.yaml");
    h.orchestrator
        .did_open(uri.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;
    assert_eq!(codes(&h.client.last_for(&uri)), vec!["custom-title"]);

    h.write("custom.yaml", OVERRIDE_RULESET);
    h.orchestrator
        .watched_files_changed(&[Url::from_file_path(&custom).unwrap()])
        .await;
    assert_eq!(codes(&h.client.last_for(&uri)), vec!["override-version"]);

    // Unrelated paths are ignored
    let runs = h.runs();
    h.orchestrator
        .watched_files_changed(&[h.uri("elsewhere.yaml")])
        .await;
    assert_eq!(h.runs(), runs);
}

#[tokio::test]
async fn saving_the_active_ruleset_reloads_it() {
    let h = Harness::new();
    let custom = h.write("custom.yaml", CUSTOM_RULESET);
    h.start(host_ruleset(&custom)).await;

    let uri = h.uri("spec.yaml");
    h.orchestrator
        .did_open(uri.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;
    assert_eq!(codes(&h.client.last_for(&uri)), vec!["custom-title"]);

    h.write("custom.yaml", OVERRIDE_RULESET);
    h.orchestrator.did_save(&h.uri("custom.yaml")).await;

    assert_eq!(codes(&h.client.last_for(&uri)), vec!["override-version"]);
    assert_eq!(h.orchestrator.settings().ruleset, RulesetSource::File(custom));
}

#[tokio::test]
async fn changed_extends_target_purges_and_reloads() {
    let h = Harness::new();
    h.write("base.yaml", CUSTOM_RULESET);
    let root = h.write("root.yaml", "extends: ./base.yaml\n");
    h.start(host_ruleset(&root)).await;

    let base = h.uri("base.yaml");
    assert!(h.orchestrator.rulesets().references().contains(&base).await);

    let uri = h.uri("spec.yaml");
    h.orchestrator
        .did_open(uri.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;
    assert_eq!(codes(&h.client.last_for(&uri)), vec!["custom-title"]);

    // Without a purge the stale cached copy would be bundled again
    h.write("base.yaml", OVERRIDE_RULESET);
    let runs = h.runs();
    h.orchestrator.watched_files_changed(&[base.clone()]).await;

    assert_eq!(h.runs(), runs + 1);
    assert_eq!(codes(&h.client.last_for(&uri)), vec!["override-version"]);
    assert!(h.orchestrator.rulesets().references().contains(&base).await);
}

#[tokio::test]
async fn created_override_file_takes_over() {
    let h = Harness::new();
    h.start(HostSettings::default()).await;
    assert_eq!(h.orchestrator.settings().ruleset, RulesetSource::Embedded);

    let override_file = h.write(".spectral.yaml", OVERRIDE_RULESET);
    h.orchestrator
        .watched_files_changed(&[h.uri(".spectral.yaml")])
        .await;
    assert_eq!(
        h.orchestrator.settings().ruleset,
        RulesetSource::File(override_file)
    );
}

#[tokio::test]
async fn at_most_one_watch_is_live() {
    let h = Harness::new();
    let custom = h.write("custom.yaml", CUSTOM_RULESET);
    h.start(host_ruleset(&custom)).await;
    assert_eq!(h.watches.load(Ordering::SeqCst), 1);

    h.orchestrator.configuration_changed().await;
    h.orchestrator.configuration_changed().await;
    assert_eq!(h.watches.load(Ordering::SeqCst), 1);

    h.provider.set(HostSettings::default());
    h.orchestrator.configuration_changed().await;
    assert_eq!(h.watches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn engine_failure_becomes_single_parser_diagnostic() {
    let h = Harness::new();
    let broken = h.uri("broken.yaml");
    let healthy = h.uri("healthy.yaml");

    h.orchestrator
        .did_open(broken.clone(), "openapi: 3.0.0\ninfo: [unclosed\n".to_string())
        .await;
    h.orchestrator
        .did_open(healthy.clone(), "openapi: 3.0.0\ninfo: {}".to_string())
        .await;

    let diagnostics = h.client.last_for(&broken);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].code,
        Some(NumberOrString::String("parser".to_string()))
    );
    assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::ERROR));
    assert!(!h.client.last_for(&healthy).is_empty());
}

fn gated() -> (Orchestrator, Arc<RecordingClient>, Arc<GatedEngine>) {
    let client = Arc::new(RecordingClient::default());
    let engine = Arc::new(GatedEngine::default());
    let resolver = SettingsResolver::new(
        Arc::new(TokioFileSystem),
        Arc::new(SwitchableProvider::default()),
        Arc::new(CountingWatcher::default()),
    );
    let rulesets = RulesetCache::new(Arc::new(DefaultReferenceResolver::new()));
    let orchestrator = Orchestrator::new(client.clone(), resolver, rulesets, engine.clone());
    (orchestrator, client, engine)
}

#[tokio::test]
async fn superseded_run_does_not_overwrite_newer_results() {
    let (orchestrator, client, engine) = gated();
    let uri = Url::parse("file:///ws/spec.yaml").unwrap();

    let slow = {
        let orchestrator = orchestrator.clone();
        let uri = uri.clone();
        tokio::spawn(async move { orchestrator.did_open(uri, "openapi: slow".to_string()).await })
    };
    engine.started.notified().await;

    orchestrator
        .did_change(uri.clone(), "openapi: fast".to_string())
        .await;
    engine.release.notify_one();
    slow.await.unwrap();

    let published = client.published_for(&uri);
    assert_eq!(published.len(), 1);
    assert_eq!(codes(&published[0]), vec!["fast"]);
}

#[tokio::test]
async fn in_flight_run_is_discarded_after_close() {
    let (orchestrator, client, engine) = gated();
    let uri = Url::parse("file:///ws/spec.yaml").unwrap();

    let slow = {
        let orchestrator = orchestrator.clone();
        let uri = uri.clone();
        tokio::spawn(async move { orchestrator.did_open(uri, "openapi: slow".to_string()).await })
    };
    engine.started.notified().await;

    orchestrator.did_close(&uri).await;
    engine.release.notify_one();
    slow.await.unwrap();

    assert_eq!(client.published_for(&uri), vec![Vec::<Diagnostic>::new()]);
}
