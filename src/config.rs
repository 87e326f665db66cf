//! Configuration management for the OpenAPI language server.
//!
//! Handles command-line argument parsing. Editor-side settings live in
//! [`crate::settings`].

use anyhow::Result;
use clap::Parser;

/// Command-line arguments for the OpenAPI language server
#[derive(Debug, Parser)]
#[command(name = "openapi-language-server")]
#[command(about = "Language server linting OpenAPI and AsyncAPI documents")]
#[command(version)]
pub struct Args {
    /// Log level for the language server
    #[arg(
        long,
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: String,

    /// Communicate over stdio. This is the only transport; editors pass it anyway.
    #[arg(long)]
    pub stdio: bool,
}

/// Combined configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args_and_env() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Create configuration from explicit arguments (useful for testing)
    pub fn from_args(args: Args) -> Result<Self> {
        Ok(Config {
            log_level: args.log_level,
        })
    }

    /// Initialise `env_logger` on stderr; stdout belongs to the protocol.
    pub fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(self.log_level.as_str());
        let _ = env_logger::Builder::from_env(env)
            .target(env_logger::Target::Stderr)
            .try_init();
    }
}
