//! LSP Protocol Implementation
//!
//! Thin tower-lsp binding; all behaviour lives in the orchestrator.

pub mod backend;
pub mod client;
pub mod server;

pub use backend::Backend;
