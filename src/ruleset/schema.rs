//! Rule-set definition as written on disk (YAML or JSON)

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::engine::Severity;

#[derive(Debug, Clone, Deserialize)]
pub struct RulesetDefinition {
    #[serde(default)]
    pub extends: Option<Extends>,
    #[serde(default)]
    pub formats: Option<Vec<String>>,
    #[serde(default)]
    pub rules: BTreeMap<String, RuleEntry>,
}

impl RulesetDefinition {
    pub fn parse(source: &str) -> Result<Self, serde_yaml::Error> {
        if source.trim().is_empty() {
            return Ok(Self {
                extends: None,
                formats: None,
                rules: BTreeMap::new(),
            });
        }
        serde_yaml::from_str(source)
    }

    /// Names listed under `extends`, in order
    pub fn extends(&self) -> Vec<&str> {
        match &self.extends {
            None => Vec::new(),
            Some(Extends::One(name)) => vec![name.as_str()],
            Some(Extends::Many(entries)) => entries.iter().map(ExtendsEntry::name).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Extends {
    One(String),
    Many(Vec<ExtendsEntry>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtendsEntry {
    Name(String),
    /// `[name, mode]`; the mode is accepted and ignored
    WithMode(String, String),
}

impl ExtendsEntry {
    pub fn name(&self) -> &str {
        match self {
            ExtendsEntry::Name(name) | ExtendsEntry::WithMode(name, _) => name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    Definition(RuleDefinition),
    Severity(SeverityValue),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleDefinition {
    pub description: Option<String>,
    pub message: Option<String>,
    pub severity: Option<SeverityValue>,
    pub given: OneOrMany<String>,
    pub then: OneOrMany<ThenDefinition>,
    pub formats: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThenDefinition {
    pub field: Option<String>,
    pub function: String,
    #[serde(rename = "functionOptions")]
    pub function_options: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SeverityValue {
    Flag(bool),
    Level(i64),
    Name(String),
}

impl SeverityValue {
    /// `Ok(None)` means the rule is switched off
    pub fn resolve(&self) -> Result<Option<Severity>, String> {
        match self {
            SeverityValue::Flag(false) => Ok(None),
            SeverityValue::Flag(true) => Ok(Some(Severity::Warning)),
            SeverityValue::Level(-1) => Ok(None),
            SeverityValue::Level(0) => Ok(Some(Severity::Error)),
            SeverityValue::Level(1) => Ok(Some(Severity::Warning)),
            SeverityValue::Level(2) => Ok(Some(Severity::Information)),
            SeverityValue::Level(3) => Ok(Some(Severity::Hint)),
            SeverityValue::Level(other) => Err(format!("unknown severity level {}", other)),
            SeverityValue::Name(name) => match name.as_str() {
                "error" => Ok(Some(Severity::Error)),
                "warn" | "warning" => Ok(Some(Severity::Warning)),
                "info" | "information" => Ok(Some(Severity::Information)),
                "hint" => Ok(Some(Severity::Hint)),
                "off" => Ok(None),
                other => Err(format!("unknown severity '{}'", other)),
            },
        }
    }
}
