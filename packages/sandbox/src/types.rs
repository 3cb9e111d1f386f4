// ABOUTME: Sandbox, tracked process, process log and exec request/response types
// ABOUTME: Includes the sandbox status lifecycle and exec profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Creating,
    Active,
    Stopped,
    Approved,
    Rejected,
    Deleted,
}

impl SandboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Stopped => "stopped",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
        }
    }

    /// `creating → active → {stopped ⇄ active} → {approved|rejected|deleted}`.
    pub fn can_transition_to(&self, next: SandboxStatus) -> bool {
        use SandboxStatus::*;
        matches!(
            (self, next),
            (Creating, Active)
                | (Creating, Deleted)
                | (Active, Stopped)
                | (Stopped, Active)
                | (Active, Approved)
                | (Active, Rejected)
                | (Active, Deleted)
                | (Stopped, Approved)
                | (Stopped, Rejected)
                | (Stopped, Deleted)
                | (Approved, Deleted)
                | (Rejected, Deleted)
        )
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Creating | Self::Active | Self::Stopped)
    }
}

impl std::str::FromStr for SandboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "creating" => Ok(Self::Creating),
            "active" => Ok(Self::Active),
            "stopped" => Ok(Self::Stopped),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown sandbox status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    User,
    Agent,
    Scenario,
}

impl std::str::FromStr for OwnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            "scenario" => Ok(Self::Scenario),
            other => Err(format!("unknown owner type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: String,
    /// Relative to `project_root`.
    pub scope_path: String,
    pub project_root: String,
    pub owner: String,
    pub owner_type: OwnerType,
    pub status: SandboxStatus,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSandboxRequest {
    pub scope_path: String,
    pub project_root: String,
    pub owner: String,
    pub owner_type: OwnerType,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedProcess {
    pub pid: u32,
    pub pgid: u32,
    pub sandbox_id: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl TrackedProcess {
    pub fn has_stopped(&self) -> bool {
        self.stopped_at.is_some()
    }
}

/// A group of processes terminated together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSession {
    pub id: String,
    pub sandbox_id: String,
    pub pids: Vec<u32>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStats {
    pub total_tracked: usize,
    pub total_running: usize,
    pub sandboxes_with_running: usize,
}

/// Runtime status of one tracked process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    #[serde(flatten)]
    pub process: TrackedProcess,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessLogInfo {
    pub sandbox_id: String,
    pub pid: u32,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub is_active: bool,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Label applied when configuring a child process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecProfile {
    #[default]
    Full,
    Restricted,
    VrooliAware,
}

impl ExecProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Restricted => "restricted",
            Self::VrooliAware => "vrooli-aware",
        }
    }
}

impl std::str::FromStr for ExecProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "full" | "" => Ok(Self::Full),
            "restricted" => Ok(Self::Restricted),
            "vrooli-aware" => Ok(Self::VrooliAware),
            other => Err(format!("unknown exec profile: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecRequest {
    pub sandbox_id: String,
    pub command: String,
    pub args: Vec<String>,
    /// Relative to the sandbox working copy. Empty means its root.
    pub working_dir: String,
    pub env: BTreeMap<String, String>,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub profile: ExecProfile,
    pub session_id: Option<String>,
}

impl ExecRequest {
    pub fn new(sandbox_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            sandbox_id: sandbox_id.into(),
            command: command.into(),
            args: Vec::new(),
            working_dir: String::new(),
            env: BTreeMap::new(),
            timeout: None,
            profile: ExecProfile::Full,
            session_id: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    pub pid: u32,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: i64,
    pub log_path: PathBuf,
    /// Full process log, header and footer included.
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedProcess {
    pub pid: u32,
    pub pgid: u32,
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Relative to the sandbox scope.
    pub path: String,
    pub kind: ChangeKind,
}
