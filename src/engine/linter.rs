//! Built-in rule engine
//!
//! Parses the document, runs every applicable rule of the active rule-set
//! and resolves `$ref`s through the shared reference cache.

use std::sync::Arc;

use arc_swap::ArcSwap;
use percent_encoding::percent_decode_str;
use serde_json::Value;
use tower_lsp::lsp_types::Url;

use super::functions::Function;
use super::locate::locate;
use super::path::{Segment, display_path};
use super::{Document, EngineError, Issue, Position, RuleEngine};
use crate::ruleset::{Field, Format, ReferenceCache, Rule, Ruleset};

pub struct Linter {
    ruleset: ArcSwap<Ruleset>,
    references: Arc<ReferenceCache>,
}

impl Linter {
    pub fn new(ruleset: Arc<Ruleset>, references: Arc<ReferenceCache>) -> Self {
        Self {
            ruleset: ArcSwap::new(ruleset),
            references,
        }
    }

    async fn check_rule(
        &self,
        rule: &Rule,
        document: &Document,
        root: &Value,
        issues: &mut Vec<Issue>,
    ) {
        for given in &rule.given {
            for (path, node) in given.select(root) {
                for then in &rule.then {
                    if let Function::RefResolvable = then.function {
                        if let Some(error) = self.check_reference(&document.uri, root, node).await
                        {
                            push_issue(issues, rule, document, &path, &error);
                        }
                        continue;
                    }

                    for (target, value) in targets(&path, node, then.field.as_ref()) {
                        let property = target.last().map(ToString::to_string).unwrap_or_default();
                        if let Some(error) = then.function.evaluate(value.as_ref(), &property) {
                            push_issue(issues, rule, document, &target, &error);
                        }
                    }
                }
            }
        }
    }

    /// Error message when `node` is a `$ref` that does not resolve
    async fn check_reference(&self, base: &Url, root: &Value, node: &Value) -> Option<String> {
        let reference = node.as_str()?;

        if let Some(pointer) = reference.strip_prefix('#') {
            return pointer_target(root, pointer)
                .is_none()
                .then(|| format!("'{}' does not exist", reference));
        }

        let target = match base.join(reference) {
            Ok(target) => target,
            Err(e) => return Some(format!("'{}' is not a valid reference: {}", reference, e)),
        };
        let text = match self.references.get(&target).await {
            Ok(text) => text,
            Err(e) => return Some(format!("Could not resolve '{}': {:#}", reference, e)),
        };

        let pointer = target.fragment().unwrap_or_default();
        if pointer.is_empty() {
            return None;
        }
        let external: Value = match serde_yaml::from_str(&text) {
            Ok(value) => value,
            Err(e) => return Some(format!("Could not parse '{}': {}", reference, e)),
        };
        pointer_target(&external, pointer)
            .is_none()
            .then(|| format!("'{}' does not exist", reference))
    }
}

#[tower_lsp::async_trait]
impl RuleEngine for Linter {
    async fn set_ruleset(&self, ruleset: Arc<Ruleset>) {
        self.ruleset.store(ruleset);
    }

    fn ruleset(&self) -> Arc<Ruleset> {
        self.ruleset.load_full()
    }

    async fn run(&self, document: &Document) -> Result<Vec<Issue>, EngineError> {
        // Pinned for the whole run; a concurrent swap does not affect it
        let ruleset = self.ruleset.load_full();
        let root = parse(&document.text)?;
        let format = Format::detect(&root);

        let mut issues = Vec::new();
        for rule in ruleset.rules.values() {
            if rule.applies_to(format) {
                self.check_rule(rule, document, &root, &mut issues).await;
            }
        }

        issues.sort_by(|a, b| {
            (a.range.start, &a.code, &a.message).cmp(&(b.range.start, &b.code, &b.message))
        });
        Ok(issues)
    }
}

/// Parse YAML or JSON text. Blank text is an empty document.
pub fn parse(text: &str) -> Result<Value, EngineError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(text).map_err(|e| EngineError::Parse {
        message: e.to_string(),
        position: e.location().map(|loc| {
            Position::new(
                loc.line().saturating_sub(1) as u32,
                loc.column().saturating_sub(1) as u32,
            )
        }),
    })
}

/// Values `then` applies to, with their concrete paths
fn targets(
    path: &[Segment],
    node: &Value,
    field: Option<&Field>,
) -> Vec<(Vec<Segment>, Option<Value>)> {
    match field {
        None => vec![(path.to_vec(), Some(node.clone()))],
        Some(Field::Keys) => match node {
            Value::Object(map) => map
                .keys()
                .map(|key| {
                    let mut target = path.to_vec();
                    target.push(Segment::Key(key.clone()));
                    (target, Some(Value::String(key.clone())))
                })
                .collect(),
            _ => Vec::new(),
        },
        Some(Field::Property(parts)) => {
            let mut target = path.to_vec();
            let mut current = Some(node);
            for part in parts {
                target.push(Segment::Key(part.clone()));
                current = current.and_then(|value| value.get(part.as_str()));
            }
            vec![(target, current.cloned())]
        }
    }
}

fn push_issue(
    issues: &mut Vec<Issue>,
    rule: &Rule,
    document: &Document,
    path: &[Segment],
    error: &str,
) {
    let property = path.last().map(ToString::to_string).unwrap_or_default();
    // message template, then description, then the function error
    let message = match rule.message.as_deref().or(rule.description.as_deref()) {
        Some(template) => template
            .replace("{{error}}", error)
            .replace("{{property}}", &property)
            .replace("{{path}}", &display_path(path))
            .replace("{{description}}", rule.description.as_deref().unwrap_or("")),
        None => error.to_string(),
    };

    issues.push(Issue {
        code: rule.name.clone(),
        message,
        severity: rule.severity,
        path: path.to_vec(),
        range: locate(&document.text, path),
    });
}

fn pointer_target<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    if pointer.is_empty() {
        return Some(root);
    }
    let decoded = percent_decode_str(pointer).decode_utf8_lossy();
    root.pointer(&decoded)
}
