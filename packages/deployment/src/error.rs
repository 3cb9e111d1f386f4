// ABOUTME: Error types for profiles, manifests, packager calls and pipeline runs
// ABOUTME: Validation errors carry remediation text; remote errors carry op, url and status

use std::path::Path;
use thiserror::Error;
use vrooli_dependencies::AnalyzerError;

#[derive(Error, Debug)]
pub enum DeploymentError {
    #[error("Deployment profile not found: {0}")]
    ProfileNotFound(String),

    #[error("{message}")]
    Validation {
        message: String,
        remediation: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("packager {op} failed at {url} (status {status}): {message}")]
    Remote {
        op: String,
        url: String,
        status: u16,
        message: String,
    },

    #[error("packager {op} failed at {url}: {source}")]
    Transport {
        op: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Build {build_id} failed: {message}")]
    BuildFailed { build_id: String, message: String },

    #[error("Deployment timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Deployment cancelled")]
    Cancelled,

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
}

impl DeploymentError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            remediation: None,
        }
    }

    pub fn remediation(&self) -> Option<&str> {
        match self {
            Self::Validation { remediation, .. } => remediation.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeploymentError>;
