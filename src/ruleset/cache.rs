//! Ruleset Cache
//!
//! Bundles a rule-set from its source, following nested `extends` through
//! the shared [`ReferenceCache`]. The root rule-set is always read fresh so
//! edits to it are picked up without a purge.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tower_lsp::lsp_types::Url;

use super::builtin;
use super::references::{ReferenceCache, ReferenceResolver};
use super::schema::{RuleEntry, RulesetDefinition};
use super::{Rule, Ruleset, RulesetError, parse_formats};
use crate::settings::RulesetSource;

type RuleMap = BTreeMap<String, Rule>;
type BundleFuture<'a> = Pin<Box<dyn Future<Output = Result<RuleMap, RulesetError>> + Send + 'a>>;

pub struct RulesetCache {
    references: Arc<ReferenceCache>,
}

impl RulesetCache {
    pub fn new(resolver: Arc<dyn ReferenceResolver>) -> Self {
        Self {
            references: Arc::new(ReferenceCache::new(resolver)),
        }
    }

    /// The reference cache, shared with the engine for document `$ref`s
    pub fn references(&self) -> Arc<ReferenceCache> {
        self.references.clone()
    }

    /// Clear every cached reference
    pub async fn purge(&self) {
        self.references.purge().await;
    }

    /// Bundle the rule-set at `source`
    pub async fn load(&self, source: &RulesetSource) -> Result<Ruleset, RulesetError> {
        let rules = match source {
            RulesetSource::Embedded => builtin::bundle_default()?,
            RulesetSource::File(path) => {
                let url = Url::from_file_path(path)
                    .map_err(|_| RulesetError::RelativePath(path.clone()))?;
                self.load_root(url).await?
            }
            RulesetSource::Remote(url) => self.load_root(url.clone()).await?,
        };

        log::info!("Loaded {} rules from {}", rules.len(), source);
        Ok(Ruleset {
            source: source.clone(),
            rules,
        })
    }

    async fn load_root(&self, url: Url) -> Result<RuleMap, RulesetError> {
        let text = self
            .references
            .fetch_fresh(&url)
            .await
            .map_err(|e| RulesetError::Fetch {
                uri: url.clone(),
                reason: format!("{e:#}"),
            })?;
        self.bundle(text, url, Vec::new()).await
    }

    fn bundle(&self, text: String, base: Url, visiting: Vec<Url>) -> BundleFuture<'_> {
        Box::pin(async move {
            let definition =
                RulesetDefinition::parse(&text).map_err(|source| RulesetError::Parse {
                    location: base.to_string(),
                    source,
                })?;

            let mut visiting = visiting;
            visiting.push(base.clone());

            let mut rules = RuleMap::new();
            for name in definition.extends() {
                if builtin::is_builtin(name) {
                    rules.extend(builtin::compile_family(name)?);
                    continue;
                }

                let target = base
                    .join(name)
                    .map_err(|_| RulesetError::UnresolvableExtends {
                        name: name.to_string(),
                        base: base.to_string(),
                    })?;
                if visiting.contains(&target) {
                    return Err(RulesetError::Cycle(target));
                }
                let nested =
                    self.references
                        .get(&target)
                        .await
                        .map_err(|e| RulesetError::Fetch {
                            uri: target.clone(),
                            reason: format!("{e:#}"),
                        })?;
                let extended = self
                    .bundle(nested.to_string(), target, visiting.clone())
                    .await?;
                rules.extend(extended);
            }

            apply_definition(&mut rules, definition)?;
            Ok(rules)
        })
    }
}

/// Apply a definition's own rules on top of what it extends
pub(crate) fn apply_definition(
    rules: &mut RuleMap,
    definition: RulesetDefinition,
) -> Result<(), RulesetError> {
    let default_formats = definition
        .formats
        .as_deref()
        .map(parse_formats)
        .transpose()
        .map_err(RulesetError::InvalidFormats)?;

    for (name, entry) in definition.rules {
        match entry {
            RuleEntry::Definition(def) => {
                match Rule::compile(&name, def, default_formats.as_deref())? {
                    Some(rule) => {
                        rules.insert(name, rule);
                    }
                    None => {
                        rules.remove(&name);
                    }
                }
            }
            RuleEntry::Severity(value) => {
                let severity = value.resolve().map_err(|reason| RulesetError::InvalidRule {
                    name: name.clone(),
                    reason,
                })?;
                match (severity, rules.get_mut(&name)) {
                    (Some(severity), Some(rule)) => rule.severity = severity,
                    (None, Some(_)) => {
                        rules.remove(&name);
                    }
                    (_, None) => log::warn!("Ignoring override for unknown rule '{}'", name),
                }
            }
        }
    }
    Ok(())
}
