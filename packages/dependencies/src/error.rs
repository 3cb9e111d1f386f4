// ABOUTME: Error types for dependency scanning and service.json merges
// ABOUTME: Wraps IO, JSON and pattern failures with the offending path

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid service file {path}: {message}")]
    InvalidServiceFile { path: String, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid detection pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl AnalyzerError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
