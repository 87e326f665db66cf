//! Built-in rule families and the embedded default rule-set

use std::collections::BTreeMap;

use super::cache::apply_definition;
use super::schema::RulesetDefinition;
use super::{Rule, RulesetError};

/// Used when no other rule-set source resolves
pub const DEFAULT_RULESET_SOURCE: &str = r#"extends: ["spectral:oas", "spectral:asyncapi"]"#;

const OAS_FAMILY: &str = include_str!("../../resources/rulesets/oas.yaml");
const ASYNCAPI_FAMILY: &str = include_str!("../../resources/rulesets/asyncapi.yaml");

/// Source of a built-in family referenced from `extends`
pub fn family(name: &str) -> Option<&'static str> {
    match name {
        "spectral:oas" => Some(OAS_FAMILY),
        "spectral:asyncapi" => Some(ASYNCAPI_FAMILY),
        _ => None,
    }
}

pub fn is_builtin(name: &str) -> bool {
    name.starts_with("spectral:")
}

/// Compile a built-in family into rules
pub fn compile_family(name: &str) -> Result<BTreeMap<String, Rule>, RulesetError> {
    let source = family(name).ok_or_else(|| RulesetError::UnknownBuiltin(name.to_string()))?;
    let definition = RulesetDefinition::parse(source).map_err(|source| RulesetError::Parse {
        location: name.to_string(),
        source,
    })?;
    let mut rules = BTreeMap::new();
    apply_definition(&mut rules, definition)?;
    Ok(rules)
}

/// Bundle [`DEFAULT_RULESET_SOURCE`]; only built-in families are involved
pub fn bundle_default() -> Result<BTreeMap<String, Rule>, RulesetError> {
    let definition =
        RulesetDefinition::parse(DEFAULT_RULESET_SOURCE).map_err(|source| RulesetError::Parse {
            location: "embedded default".to_string(),
            source,
        })?;
    let mut rules = BTreeMap::new();
    for name in definition.extends() {
        rules.extend(compile_family(name)?);
    }
    apply_definition(&mut rules, definition)?;
    Ok(rules)
}
