//! External reference fetching and the shared reference cache

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::RwLock;
use tower_lsp::lsp_types::Url;

/// Fetches the text behind a reference URI
#[tower_lsp::async_trait]
pub trait ReferenceResolver: Send + Sync {
    async fn fetch(&self, uri: &Url) -> Result<String>;
}

/// Reads `file://` references from disk and `http(s)://` over the network
#[derive(Debug, Clone, Default)]
pub struct DefaultReferenceResolver {
    http: reqwest::Client,
}

impl DefaultReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[tower_lsp::async_trait]
impl ReferenceResolver for DefaultReferenceResolver {
    async fn fetch(&self, uri: &Url) -> Result<String> {
        match uri.scheme() {
            "file" => {
                let path = uri
                    .to_file_path()
                    .map_err(|_| anyhow::anyhow!("not a local path: {}", uri))?;
                tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("cannot read {}", path.display()))
            }
            "http" | "https" => {
                let response = self
                    .http
                    .get(uri.as_str())
                    .send()
                    .await
                    .with_context(|| format!("request to {} failed", uri))?
                    .error_for_status()?;
                Ok(response.text().await?)
            }
            scheme => bail!("unsupported reference scheme '{}'", scheme),
        }
    }
}

/// Previously resolved reference payloads keyed by URI.
///
/// Entries are never invalidated one by one; [`purge`](Self::purge) drops
/// the whole map.
pub struct ReferenceCache {
    resolver: Arc<dyn ReferenceResolver>,
    entries: RwLock<HashMap<Url, Arc<str>>>,
}

impl ReferenceCache {
    pub fn new(resolver: Arc<dyn ReferenceResolver>) -> Self {
        Self {
            resolver,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached payload, fetching on a miss. Failures are not cached.
    pub async fn get(&self, uri: &Url) -> Result<Arc<str>> {
        let key = without_fragment(uri);
        if let Some(text) = self.entries.read().await.get(&key) {
            return Ok(text.clone());
        }
        let text: Arc<str> = self.resolver.fetch(&key).await?.into();
        self.entries.write().await.insert(key, text.clone());
        Ok(text)
    }

    /// Fetch bypassing the cache, without storing the result
    pub async fn fetch_fresh(&self, uri: &Url) -> Result<String> {
        self.resolver.fetch(&without_fragment(uri)).await
    }

    pub async fn contains(&self, uri: &Url) -> bool {
        self.entries
            .read()
            .await
            .contains_key(&without_fragment(uri))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every cached entry
    pub async fn purge(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        *entries = HashMap::new();
        log::debug!("Purged {} cached references", dropped);
    }
}

fn without_fragment(uri: &Url) -> Url {
    let mut key = uri.clone();
    key.set_fragment(None);
    key
}
