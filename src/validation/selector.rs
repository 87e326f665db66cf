//! Validation Selector
//!
//! Decides whether a document is in scope. Configured globs are matched
//! against the URI and, for `file://` URIs, the filesystem path. With no
//! globs configured only documents starting with `openapi:` are selected;
//! AsyncAPI documents need an explicit pattern.

use globset::{Glob, GlobSet, GlobSetBuilder};
use tower_lsp::lsp_types::Url;

use crate::settings::Settings;

/// Literal prefix sniffed when no patterns are configured
pub const CONTENT_PREFIX: &str = "openapi:";

#[derive(Debug, Clone)]
pub struct ValidationSelector {
    /// `None` when no patterns are configured
    patterns: Option<GlobSet>,
}

impl ValidationSelector {
    pub fn new(patterns: &[String]) -> Self {
        if patterns.is_empty() {
            return Self { patterns: None };
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => log::warn!("Ignoring invalid validateFiles pattern '{}': {}", pattern, e),
            }
        }
        let set = builder.build().unwrap_or_else(|e| {
            log::warn!("Failed to compile validateFiles patterns: {}", e);
            GlobSet::empty()
        });
        Self {
            patterns: Some(set),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.validate_files)
    }

    pub fn in_scope(&self, uri: &Url, text: &str) -> bool {
        match &self.patterns {
            Some(set) => {
                set.is_match(uri.as_str())
                    || uri
                        .to_file_path()
                        .is_ok_and(|path| set.is_match(path))
            }
            None => text.starts_with(CONTENT_PREFIX),
        }
    }
}

/// One-shot form of [`ValidationSelector::in_scope`]
pub fn in_scope(uri: &Url, text: &str, settings: &Settings) -> bool {
    ValidationSelector::from_settings(settings).in_scope(uri, text)
}
