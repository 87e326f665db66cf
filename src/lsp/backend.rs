use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::engine::Linter;
use crate::fs::{NotifyWatcher, TokioFileSystem};
use crate::ruleset::{DefaultReferenceResolver, Ruleset, RulesetCache};
use crate::settings::{SettingsResolver, WORKSPACE_OVERRIDE_FILE};
use crate::validation::Orchestrator;

const WATCH_REGISTRATION_ID: &str = "openapi-ls/override-file";

/// The LSP backend: forwards protocol events to the orchestrator
pub struct Backend {
    client: Client,
    orchestrator: Orchestrator,
}

impl Backend {
    /// Wire the default collaborators around `client`.
    ///
    /// `watch_events` receives the paths reported by the rule-set file watch.
    pub fn new(
        client: Client,
        embedded: Arc<Ruleset>,
        watch_events: mpsc::UnboundedSender<PathBuf>,
    ) -> Self {
        let resolver = SettingsResolver::new(
            Arc::new(TokioFileSystem),
            Arc::new(client.clone()),
            Arc::new(NotifyWatcher::new(watch_events)),
        );
        let rulesets = RulesetCache::new(Arc::new(DefaultReferenceResolver::new()));
        let engine = Arc::new(Linter::new(embedded, rulesets.references()));
        let orchestrator =
            Orchestrator::new(Arc::new(client.clone()), resolver, rulesets, engine);

        Self {
            client,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    async fn register_override_watch(&self) {
        let options = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String(format!("**/{}", WORKSPACE_OVERRIDE_FILE)),
                kind: None,
            }],
        };
        let register_options = match serde_json::to_value(options) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to encode watch registration: {}", e);
                return;
            }
        };

        let registration = Registration {
            id: WATCH_REGISTRATION_ID.to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: Some(register_options),
        };
        if let Err(e) = self.client.register_capability(vec![registration]).await {
            log::warn!("Client rejected file watch registration: {}", e);
        }
    }
}

/// First workspace folder, else the deprecated `rootUri`
#[allow(deprecated)]
fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .map(|folder| &folder.uri)
        .or(params.root_uri.as_ref())
        .and_then(|uri| uri.to_file_path().ok())
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(
        &self,
        params: InitializeParams,
    ) -> tower_lsp::jsonrpc::Result<InitializeResult> {
        let root = workspace_root(&params);
        log::info!("Workspace root: {:?}", root);
        self.orchestrator.initialize(root).await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                        ..Default::default()
                    },
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "openapi-language-server initialized")
            .await;
        self.register_override_watch().await;
        self.orchestrator.initialized().await;
        self.client
            .log_message(
                MessageType::INFO,
                format!("Using {}", self.orchestrator.settings().ruleset),
            )
            .await;
    }

    async fn shutdown(&self) -> tower_lsp::jsonrpc::Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        self.orchestrator.did_open(document.uri, document.text).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(change) = params.content_changes.into_iter().last() {
            self.orchestrator.did_change(uri, change.text).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.orchestrator.did_save(&params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.orchestrator.did_close(&params.text_document.uri).await;
    }

    async fn did_change_configuration(&self, _: DidChangeConfigurationParams) {
        self.orchestrator.configuration_changed().await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let uris: Vec<Url> = params.changes.into_iter().map(|change| change.uri).collect();
        self.orchestrator.watched_files_changed(&uris).await;
    }
}
