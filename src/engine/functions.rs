//! Rule functions.
//!
//! Each function inspects one target value and returns an error message
//! when the value fails the check. `refResolvable` needs the reference
//! cache and is evaluated by the linter itself.

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum Function {
    Truthy,
    Falsy,
    Defined,
    Undefined,
    Pattern {
        matches: Option<Regex>,
        not_matches: Option<Regex>,
    },
    Enumeration {
        values: Vec<Value>,
    },
    Length {
        min: Option<u64>,
        max: Option<u64>,
    },
    RefResolvable,
}

impl Function {
    /// Build a function from its rule-set name and `functionOptions`
    pub fn from_definition(name: &str, options: Option<&Value>) -> Result<Self, String> {
        let option = |key: &str| options.and_then(|o| o.get(key));
        match name {
            "truthy" => Ok(Function::Truthy),
            "falsy" => Ok(Function::Falsy),
            "defined" => Ok(Function::Defined),
            "undefined" => Ok(Function::Undefined),
            "pattern" => {
                let compile = |key: &str| -> Result<Option<Regex>, String> {
                    match option(key) {
                        None => Ok(None),
                        Some(Value::String(src)) => Regex::new(src)
                            .map(Some)
                            .map_err(|e| format!("invalid {} regex '{}': {}", key, src, e)),
                        Some(other) => Err(format!("{} must be a string, got {}", key, other)),
                    }
                };
                let matches = compile("match")?;
                let not_matches = compile("notMatch")?;
                if matches.is_none() && not_matches.is_none() {
                    return Err("pattern needs `match` or `notMatch`".to_string());
                }
                Ok(Function::Pattern {
                    matches,
                    not_matches,
                })
            }
            "enumeration" => match option("values") {
                Some(Value::Array(values)) => Ok(Function::Enumeration {
                    values: values.clone(),
                }),
                _ => Err("enumeration needs a `values` list".to_string()),
            },
            "length" => {
                let min = option("min").and_then(Value::as_u64);
                let max = option("max").and_then(Value::as_u64);
                if min.is_none() && max.is_none() {
                    return Err("length needs `min` or `max`".to_string());
                }
                Ok(Function::Length { min, max })
            }
            "refResolvable" => Ok(Function::RefResolvable),
            other => Err(format!("unknown function '{}'", other)),
        }
    }

    /// Check `value` (absent when the field is missing)
    pub fn evaluate(&self, value: Option<&Value>, property: &str) -> Option<String> {
        match self {
            Function::Truthy => (!is_truthy(value))
                .then(|| format!("\"{}\" property must be truthy", property)),
            Function::Falsy => {
                is_truthy(value).then(|| format!("\"{}\" property must be falsy", property))
            }
            Function::Defined => value
                .is_none()
                .then(|| format!("\"{}\" property must be defined", property)),
            Function::Undefined => value
                .is_some()
                .then(|| format!("\"{}\" property must not be defined", property)),
            Function::Pattern {
                matches,
                not_matches,
            } => {
                let text = value?.as_str()?;
                if let Some(re) = matches {
                    if !re.is_match(text) {
                        return Some(format!(
                            "\"{}\" must match the pattern \"{}\"",
                            text,
                            re.as_str()
                        ));
                    }
                }
                if let Some(re) = not_matches {
                    if re.is_match(text) {
                        return Some(format!(
                            "\"{}\" must not match the pattern \"{}\"",
                            text,
                            re.as_str()
                        ));
                    }
                }
                None
            }
            Function::Enumeration { values } => {
                let value = value?;
                if values.contains(value) {
                    return None;
                }
                let allowed: Vec<String> = values.iter().map(display_value).collect();
                Some(format!(
                    "\"{}\" must be equal to one of the allowed values: {}",
                    display_value(value),
                    allowed.join(", ")
                ))
            }
            Function::Length { min, max } => {
                let len = length(value?)?;
                if let Some(min) = min {
                    if len < *min {
                        return Some(format!("\"{}\" must not be shorter than {}", property, min));
                    }
                }
                if let Some(max) = max {
                    if len > *max {
                        return Some(format!("\"{}\" must not be longer than {}", property, max));
                    }
                }
                None
            }
            Function::RefResolvable => None,
        }
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn length(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => Some(s.chars().count() as u64),
        Value::Array(items) => Some(items.len() as u64),
        Value::Object(map) => Some(map.len() as u64),
        Value::Number(n) => n.as_f64().map(|f| f.max(0.0) as u64),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
