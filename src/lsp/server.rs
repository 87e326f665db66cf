use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{stdin, stdout};
use tokio::sync::mpsc;
use tower_lsp::lsp_types::Url;
use tower_lsp::{LspService, Server};

use crate::Config;
use crate::lsp::backend::Backend;
use crate::ruleset::Ruleset;
use crate::validation::Orchestrator;

/// Start the LSP server on stdio
pub async fn serve() -> Result<()> {
    let config = Config::from_args_and_env()?;
    config.init_logging();

    let embedded = Arc::new(Ruleset::embedded()?);
    log::info!("Embedded rule-set compiled with {} rules", embedded.len());

    // If running under the integration test, exit after a short delay so the test can read stdout to EOF.
    if std::env::var("OPENAPI_LS_TEST_EXIT").as_deref() == Ok("1") {
        thread::spawn(|| {
            thread::sleep(Duration::from_secs(1));
            std::process::exit(0);
        });
    }

    let (watch_events, watch_rx) = mpsc::unbounded_channel();
    let (service, socket) = LspService::build(move |client| {
        let backend = Backend::new(client, embedded, watch_events);
        tokio::spawn(forward_watch_events(backend.orchestrator().clone(), watch_rx));
        backend
    })
    .finish();

    Server::new(stdin(), stdout(), socket).serve(service).await;

    Ok(())
}

/// Feed rule-set file events from the notify watcher into the orchestrator
async fn forward_watch_events(
    orchestrator: Orchestrator,
    mut events: mpsc::UnboundedReceiver<PathBuf>,
) {
    while let Some(path) = events.recv().await {
        match Url::from_file_path(&path) {
            Ok(uri) => orchestrator.watched_files_changed(&[uri]).await,
            Err(()) => log::warn!("Ignoring watch event for non-absolute path {:?}", path),
        }
    }
    log::debug!("Rule-set watch channel closed");
}
