// ABOUTME: Error types for process tracking, process logging and sandbox management
// ABOUTME: Leaves return these instead of logging; the manager decides what is fatal

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Process {0} is not tracked")]
    NotTracked(u32),

    #[error("Process session not found: {0}")]
    SessionNotFound(String),

    #[error("Process session has ended: {0}")]
    SessionEnded(String),

    #[error("Processes still running after SIGKILL: {pids:?}")]
    StillRunning { pids: Vec<u32> },

    #[error("Timed out after {waited_ms}ms waiting for process {pid}")]
    Timeout { pid: u32, waited_ms: u64 },
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Log IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No log for sandbox {sandbox_id} pid {pid}")]
    NotFound { sandbox_id: String, pid: u32 },

    #[error("Log writer is closed: {0}")]
    Closed(String),

    #[error("Log stream cancelled")]
    Cancelled,
}

impl LoggerError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type LoggerResult<T> = std::result::Result<T, LoggerError>;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Sandbox not found: {0}")]
    NotFound(String),

    #[error("Invalid sandbox transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid sandbox scope: {0}")]
    InvalidScope(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Logger(#[from] LoggerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SandboxError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
