//! Validation
//!
//! Scope selection, issue mapping and the orchestrator that drives runs in
//! response to document, configuration and watch events.

pub mod mapper;
pub mod orchestrator;
pub mod selector;

use tower_lsp::lsp_types::{Diagnostic, MessageType, Url};

pub use mapper::{DIAGNOSTIC_SOURCE, failure_diagnostic, to_diagnostic};
pub use orchestrator::Orchestrator;
pub use selector::{ValidationSelector, in_scope};

/// What the orchestrator needs from the editor connection
#[tower_lsp::async_trait]
pub trait EditorClient: Send + Sync {
    async fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>);
    async fn show_notice(&self, kind: MessageType, message: String);
}
