// ABOUTME: Sandboxed process substrate: scoped overlays, process tracking and per-process logs
// ABOUTME: The SandboxManager composes these behind create/exec/review/delete operations

pub mod error;
pub mod logger;
pub mod manager;
pub mod overlay;
pub mod storage;
pub mod tracker;
pub mod types;

pub use error::{
    LoggerError, LoggerResult, Result, SandboxError, TrackerError, TrackerResult,
};
pub use logger::{LogWriter, LoggerConfig, PendingLog, ProcessLogger};
pub use manager::{ManagerConfig, SandboxManager, PROFILE_ENV, SANDBOX_ID_ENV, SANDBOX_ROOT_ENV};
pub use overlay::{validate_scope, Overlay};
pub use storage::SandboxStore;
pub use tracker::{is_running, ProcessTracker, TrackerConfig, KILLED_EXIT_CODE};
pub use types::{
    ChangeKind, CreateSandboxRequest, ExecProfile, ExecRequest, ExecResult, FileChange,
    OwnerType, ProcessLogInfo, ProcessSession, ProcessStats, ProcessStatus, Sandbox,
    SandboxStatus, StartedProcess, TrackedProcess,
};
