//! Rule-sets
//!
//! A [`Ruleset`] is the compiled, fully bundled unit swapped into the
//! engine. Bundling and reference caching live in [`cache`].

pub mod builtin;
pub mod cache;
pub mod references;
pub mod schema;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;
use tower_lsp::lsp_types::Url;

use crate::engine::functions::Function;
use crate::engine::{JsonPath, Severity};
use crate::settings::RulesetSource;
use schema::{RuleDefinition, ThenDefinition};

pub use cache::RulesetCache;
pub use references::{DefaultReferenceResolver, ReferenceCache, ReferenceResolver};

/// Document formats rules can be restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Oas2,
    Oas3,
    AsyncApi2,
    AsyncApi3,
}

impl Format {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "oas2" => Some(Format::Oas2),
            "oas3" | "oas3.0" | "oas3.1" => Some(Format::Oas3),
            "asyncapi2" => Some(Format::AsyncApi2),
            "asyncapi3" => Some(Format::AsyncApi3),
            _ => None,
        }
    }

    /// Sniff the format from the document's root keys
    pub fn detect(root: &Value) -> Option<Self> {
        let version = |key: &str| -> Option<String> {
            match root.get(key)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };
        if let Some(v) = version("openapi") {
            return v.starts_with('3').then_some(Format::Oas3);
        }
        if let Some(v) = version("swagger") {
            return v.starts_with('2').then_some(Format::Oas2);
        }
        if let Some(v) = version("asyncapi") {
            if v.starts_with('2') {
                return Some(Format::AsyncApi2);
            }
            if v.starts_with('3') {
                return Some(Format::AsyncApi3);
            }
        }
        None
    }
}

/// Where `then` applies relative to a `given` node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Every key of the node
    Keys,
    /// A dotted property path
    Property(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Then {
    pub field: Option<Field>,
    pub function: Function,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub description: Option<String>,
    pub message: Option<String>,
    pub severity: Severity,
    pub given: Vec<JsonPath>,
    pub then: Vec<Then>,
    /// `None` applies to every document
    pub formats: Option<Vec<Format>>,
}

impl Rule {
    /// Compile a definition. `default_formats` come from the defining rule-set.
    pub fn compile(
        name: &str,
        definition: RuleDefinition,
        default_formats: Option<&[Format]>,
    ) -> Result<Option<Self>, RulesetError> {
        let invalid = |reason: String| RulesetError::InvalidRule {
            name: name.to_string(),
            reason,
        };

        let severity = match &definition.severity {
            Some(value) => match value.resolve().map_err(invalid)? {
                Some(severity) => severity,
                None => return Ok(None),
            },
            None => Severity::Warning,
        };

        let given = definition
            .given
            .into_vec()
            .iter()
            .map(|path| JsonPath::parse(path))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;

        let then = definition
            .then
            .into_vec()
            .into_iter()
            .map(compile_then)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;

        let formats = match definition.formats {
            Some(names) => Some(parse_formats(&names).map_err(invalid)?),
            None => default_formats.map(<[Format]>::to_vec),
        };

        Ok(Some(Rule {
            name: name.to_string(),
            description: definition.description,
            message: definition.message,
            severity,
            given,
            then,
            formats,
        }))
    }

    pub fn applies_to(&self, format: Option<Format>) -> bool {
        match (&self.formats, format) {
            (None, _) => true,
            (Some(formats), Some(format)) => formats.contains(&format),
            (Some(_), None) => false,
        }
    }
}

fn compile_then(then: ThenDefinition) -> Result<Then, String> {
    let function = Function::from_definition(&then.function, then.function_options.as_ref())?;
    let field = then.field.map(|field| match field.as_str() {
        "@key" => Field::Keys,
        path => Field::Property(path.split('.').map(str::to_string).collect()),
    });
    Ok(Then { field, function })
}

pub fn parse_formats(names: &[String]) -> Result<Vec<Format>, String> {
    names
        .iter()
        .map(|name| Format::from_name(name).ok_or_else(|| format!("unknown format '{}'", name)))
        .collect()
}

/// A bundled rule-set, ready for the engine
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    pub source: RulesetSource,
    pub rules: BTreeMap<String, Rule>,
}

impl Ruleset {
    /// The embedded default; needs no fetching
    pub fn embedded() -> Result<Self, RulesetError> {
        let rules = builtin::bundle_default()?;
        Ok(Self {
            source: RulesetSource::Embedded,
            rules,
        })
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum RulesetError {
    #[error("failed to parse rule-set {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to fetch {uri}: {reason}")]
    Fetch { uri: Url, reason: String },
    #[error("rule-set extends itself through {0}")]
    Cycle(Url),
    #[error("cannot resolve extends '{name}' from {base}")]
    UnresolvableExtends { name: String, base: String },
    #[error("unknown built-in rule-set '{0}'")]
    UnknownBuiltin(String),
    #[error("invalid rule '{name}': {reason}")]
    InvalidRule { name: String, reason: String },
    #[error("rule-set path {} is not absolute", .0.display())]
    RelativePath(PathBuf),
    #[error("invalid formats: {0}")]
    InvalidFormats(String),
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Oas2 => "oas2",
            Format::Oas3 => "oas3",
            Format::AsyncApi2 => "asyncapi2",
            Format::AsyncApi3 => "asyncapi3",
        };
        f.write_str(name)
    }
}
