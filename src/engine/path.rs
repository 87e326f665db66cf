//! Path expressions used by rule `given` clauses.
//!
//! Supported subset: `$`, `.key`, `.*`, `[*]`, `['key']`, `[a,b]`, `..key`.
//! Numeric keys index into arrays.

use std::fmt;

use serde_json::Value;

/// One step into a document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{}", key),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Render a concrete path as `a.b.0.c`
pub fn display_path(path: &[Segment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Union(Vec<String>),
    Wildcard,
    Descendant(String),
}

/// A compiled `given` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    source: String,
    steps: Vec<Step>,
}

/// A node selected by a path, with its concrete location
pub type Selected<'a> = (Vec<Segment>, &'a Value);

impl JsonPath {
    pub fn parse(source: &str) -> Result<Self, String> {
        let rest = source
            .trim()
            .strip_prefix('$')
            .ok_or_else(|| format!("path '{}' must start with '$'", source))?;
        let chars: Vec<char> = rest.chars().collect();
        let mut steps = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' if chars.get(i + 1) == Some(&'.') => {
                    let (name, next) = read_name(&chars, i + 2);
                    if name.is_empty() {
                        return Err(format!("empty descendant name in '{}'", source));
                    }
                    steps.push(Step::Descendant(name));
                    i = next;
                }
                '.' => {
                    let (name, next) = read_name(&chars, i + 1);
                    match name.as_str() {
                        "" => return Err(format!("empty key in '{}'", source)),
                        "*" => steps.push(Step::Wildcard),
                        _ => steps.push(Step::Key(name)),
                    }
                    i = next;
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|&c| c == ']')
                        .map(|offset| i + offset)
                        .ok_or_else(|| format!("unclosed '[' in '{}'", source))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    steps.push(parse_bracket(&inner, source)?);
                    i = close + 1;
                }
                c => return Err(format!("unexpected '{}' in '{}'", c, source)),
            }
        }

        Ok(Self {
            source: source.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Select every node matched by this path, in document order
    pub fn select<'a>(&self, root: &'a Value) -> Vec<Selected<'a>> {
        let mut current: Vec<Selected<'a>> = vec![(Vec::new(), root)];
        for step in &self.steps {
            let mut next = Vec::new();
            for (path, node) in current {
                match step {
                    Step::Key(key) => push_child(&mut next, &path, node, key),
                    Step::Union(keys) => {
                        for key in keys {
                            push_child(&mut next, &path, node, key);
                        }
                    }
                    Step::Wildcard => push_all_children(&mut next, &path, node),
                    Step::Descendant(key) => collect_descendants(&mut next, path, node, key),
                }
            }
            current = next;
        }
        current
    }
}

fn read_name(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

fn parse_bracket(inner: &str, source: &str) -> Result<Step, String> {
    let inner = inner.trim();
    if inner == "*" {
        return Ok(Step::Wildcard);
    }
    let keys: Vec<String> = inner
        .split(',')
        .map(|key| key.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .collect();
    if keys.iter().any(String::is_empty) {
        return Err(format!("empty key in '{}'", source));
    }
    if keys.len() == 1 {
        Ok(Step::Key(keys.into_iter().next().unwrap_or_default()))
    } else {
        Ok(Step::Union(keys))
    }
}

fn child<'a>(node: &'a Value, key: &str) -> Option<(Segment, &'a Value)> {
    match node {
        Value::Object(map) => map.get(key).map(|v| (Segment::Key(key.to_string()), v)),
        Value::Array(items) => {
            let index: usize = key.parse().ok()?;
            items.get(index).map(|v| (Segment::Index(index), v))
        }
        _ => None,
    }
}

fn push_child<'a>(out: &mut Vec<Selected<'a>>, path: &[Segment], node: &'a Value, key: &str) {
    if let Some((segment, value)) = child(node, key) {
        let mut path = path.to_vec();
        path.push(segment);
        out.push((path, value));
    }
}

fn push_all_children<'a>(out: &mut Vec<Selected<'a>>, path: &[Segment], node: &'a Value) {
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                let mut path = path.to_vec();
                path.push(Segment::Key(key.clone()));
                out.push((path, value));
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                let mut path = path.to_vec();
                path.push(Segment::Index(index));
                out.push((path, value));
            }
        }
        _ => {}
    }
}

fn collect_descendants<'a>(
    out: &mut Vec<Selected<'a>>,
    path: Vec<Segment>,
    node: &'a Value,
    key: &str,
) {
    let mut children = Vec::new();
    push_all_children(&mut children, &path, node);
    for (child_path, value) in children {
        if child_path.last() == Some(&Segment::Key(key.to_string())) {
            out.push((child_path.clone(), value));
        }
        collect_descendants(out, child_path, value, key);
    }
}
