//! Editor-facing collaborators backed by the tower-lsp client

use anyhow::{Context, Result};
use tower_lsp::Client;
use tower_lsp::lsp_types::{ConfigurationItem, Diagnostic, MessageType, Url};

use crate::settings::{CONFIG_SECTION, ConfigurationProvider, HostSettings};
use crate::validation::EditorClient;

#[tower_lsp::async_trait]
impl EditorClient for Client {
    async fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>) {
        Client::publish_diagnostics(self, uri, diagnostics, None).await;
    }

    async fn show_notice(&self, kind: MessageType, message: String) {
        self.show_message(kind, message).await;
    }
}

/// Pulls the `openapiLinter` section with `workspace/configuration`
#[tower_lsp::async_trait]
impl ConfigurationProvider for Client {
    async fn fetch(&self) -> Result<HostSettings> {
        let mut values = self
            .configuration(vec![ConfigurationItem {
                scope_uri: None,
                section: Some(CONFIG_SECTION.to_string()),
            }])
            .await
            .map_err(|e| anyhow::anyhow!("workspace/configuration failed: {}", e))?;

        let value = values.pop().unwrap_or_default();
        HostSettings::from_value(value).context("invalid openapiLinter settings")
    }
}
