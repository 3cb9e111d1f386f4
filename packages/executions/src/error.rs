// ABOUTME: Error types for the execution writer, execution index and workflow executor
// ABOUTME: Wraps IO, serialization, database and driver failures

use thiserror::Error;
use vrooli_driver::DriverError;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("Invalid execution plan: {0}")]
    InvalidPlan(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WriterError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type WriterResult<T> = std::result::Result<T, WriterError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Execution not found: {0}")]
    NotFound(String),

    #[error("Invalid status value: {0}")]
    InvalidStatus(String),
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error("Invalid execution request: {0}")]
    InvalidRequest(String),

    #[error("Step {step_index} timed out after {seconds}s")]
    Timeout { step_index: i32, seconds: u64 },

    #[error("Execution {0} was cancelled")]
    Cancelled(String),
}

pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;
