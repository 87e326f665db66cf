//! Effective server settings
//!
//! Three sources compete for the active rule-set: the workspace override
//! file, the host-reported configuration, and the embedded default.

pub mod resolver;

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Deserializer};
use tower_lsp::lsp_types::Url;

pub use resolver::SettingsResolver;

/// Rule-set file looked up in the workspace root before host configuration
pub const WORKSPACE_OVERRIDE_FILE: &str = ".spectral.yaml";

/// Configuration section requested from the host
pub const CONFIG_SECTION: &str = "openapiLinter";

/// Where the active rule-set comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RulesetSource {
    /// The embedded default definition; not a real file
    #[default]
    Embedded,
    File(PathBuf),
    Remote(Url),
}

impl RulesetSource {
    /// Local file backing this source, if any
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            RulesetSource::File(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for RulesetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulesetSource::Embedded => write!(f, "embedded default rule-set"),
            RulesetSource::File(path) => write!(f, "{}", path.display()),
            RulesetSource::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// The effective settings. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Settings {
    pub ruleset: RulesetSource,
    /// Glob patterns selecting documents; empty means content sniffing
    pub validate_files: Vec<String>,
}

/// Settings as reported by the host under [`CONFIG_SECTION`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostSettings {
    pub spectral_rulesets_file: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub validate_files: Vec<String>,
}

/// Explicit `null` reads the same as an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl HostSettings {
    /// Parse the raw configuration value; `null` yields defaults.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Source of host-reported configuration
#[tower_lsp::async_trait]
pub trait ConfigurationProvider: Send + Sync {
    async fn fetch(&self) -> Result<HostSettings>;
}
