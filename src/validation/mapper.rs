//! Diagnostic Mapper
//!
//! Converts engine issues into LSP diagnostics.

use tower_lsp::lsp_types::{self, DiagnosticSeverity, NumberOrString};

use crate::engine::{EngineError, Issue, Position, Range, Severity};

/// `source` of every published diagnostic
pub const DIAGNOSTIC_SOURCE: &str = "OpenAPI Linter";

/// Code of the diagnostic reported when the engine fails on a document
pub const ENGINE_FAILURE_CODE: &str = "parser";

/// Engine level 0..=3 becomes LSP level 1..=4
pub fn to_lsp_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}

fn to_lsp_position(position: Position) -> lsp_types::Position {
    lsp_types::Position::new(position.line, position.character)
}

fn to_lsp_range(range: Range) -> lsp_types::Range {
    lsp_types::Range::new(to_lsp_position(range.start), to_lsp_position(range.end))
}

pub fn to_diagnostic(issue: &Issue) -> lsp_types::Diagnostic {
    lsp_types::Diagnostic {
        range: to_lsp_range(issue.range),
        severity: Some(to_lsp_severity(issue.severity)),
        code: Some(NumberOrString::String(issue.code.clone())),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: issue.message.clone(),
        ..Default::default()
    }
}

/// The single diagnostic standing in for a failed engine run
pub fn failure_diagnostic(error: &EngineError) -> lsp_types::Diagnostic {
    let position = error.position().unwrap_or_default();
    lsp_types::Diagnostic {
        range: to_lsp_range(Range::new(position, position)),
        severity: Some(DiagnosticSeverity::ERROR),
        code: Some(NumberOrString::String(ENGINE_FAILURE_CODE.to_string())),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: error.to_string(),
        ..Default::default()
    }
}
