// ABOUTME: Argument and wiring errors raised before any component runs
// ABOUTME: Component errors pass through anyhow unchanged

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CliError {
    #[error("Invalid environment assignment {0:?}, expected KEY=VALUE")]
    InvalidEnvPair(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}
