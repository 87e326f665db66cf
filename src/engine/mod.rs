//! Rule Engine
//!
//! The engine evaluates the active rule-set against a document and returns
//! issues. The orchestrator only sees the [`RuleEngine`] trait; [`Linter`]
//! is the built-in implementation.

pub mod functions;
pub mod linter;
pub mod locate;
pub mod path;

use std::sync::Arc;

use thiserror::Error;
use tower_lsp::lsp_types::Url;

use crate::ruleset::Ruleset;

pub use linter::Linter;
pub use path::{JsonPath, Segment};

/// Severity of an issue, 0-indexed from Error to Hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error = 0,
    Warning = 1,
    Information = 2,
    Hint = 3,
}

impl Severity {
    pub fn level(self) -> u8 {
        self as u8
    }
}

/// Zero-based line/character position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A single finding reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    /// Name of the rule that produced the issue
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub path: Vec<Segment>,
    pub range: Range,
}

/// A document handed to the engine
#[derive(Debug, Clone)]
pub struct Document {
    pub uri: Url,
    pub text: String,
}

impl Document {
    pub fn new(uri: Url, text: impl Into<String>) -> Self {
        Self {
            uri,
            text: text.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{message}")]
    Parse {
        message: String,
        /// Zero-based position reported by the parser
        position: Option<Position>,
    },
}

impl EngineError {
    pub fn position(&self) -> Option<Position> {
        match self {
            EngineError::Parse { position, .. } => *position,
        }
    }
}

/// The rule engine collaborator.
///
/// `set_ruleset` is an atomic replace: a `run` started after it returns sees
/// the new rule-set in full, a `run` already in flight keeps the old one.
#[tower_lsp::async_trait]
pub trait RuleEngine: Send + Sync {
    async fn set_ruleset(&self, ruleset: Arc<Ruleset>);
    fn ruleset(&self) -> Arc<Ruleset>;
    async fn run(&self, document: &Document) -> Result<Vec<Issue>, EngineError>;
}
