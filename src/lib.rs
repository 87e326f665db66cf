//! OpenAPI Language Server
//!
//! Validates OpenAPI and AsyncAPI documents against a configurable rule-set
//! and streams diagnostics back to the editor.
//!
//! This library provides:
//! - Settings resolution across embedded, host and workspace sources
//! - Rule-set bundling with a shared reference cache
//! - A built-in rule engine behind the `RuleEngine` trait
//! - Validation orchestration and the LSP backend

pub mod config;
pub mod engine;
pub mod fs;
pub mod lsp;
pub mod ruleset;
pub mod settings;
pub mod validation;

pub use config::Config;
pub use engine::{Document, Issue, Linter, RuleEngine};
pub use ruleset::{Ruleset, RulesetCache};
pub use settings::{Settings, SettingsResolver};
pub use validation::{Orchestrator, ValidationSelector};
