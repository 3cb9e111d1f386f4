// ABOUTME: Sandbox lifecycle manager composing the store, overlays, process tracker and process logger
// ABOUTME: Runs commands inside a sandbox's working copy with two-phase logs and bounded waits

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vrooli_core::new_id;

use crate::error::{Result, SandboxError};
use crate::logger::{LogWriter, LoggerConfig, ProcessLogger, DEFAULT_MAX_LOG_SIZE};
use crate::overlay::{validate_scope, Overlay};
use crate::storage::SandboxStore;
use crate::tracker::{is_running, ProcessTracker, TrackerConfig, KILLED_EXIT_CODE};
use crate::types::{
    CreateSandboxRequest, ExecProfile, ExecRequest, ExecResult, FileChange, ProcessLogInfo,
    ProcessStats, ProcessStatus, Sandbox, SandboxStatus, StartedProcess,
};

pub const PROFILE_ENV: &str = "VROOLI_SANDBOX_PROFILE";
pub const SANDBOX_ID_ENV: &str = "VROOLI_SANDBOX_ID";
pub const SANDBOX_ROOT_ENV: &str = "VROOLI_SANDBOX_ROOT";

const PUMP_BUFFER_SIZE: usize = 8192;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Holds `<sandboxId>/upper` and `<sandboxId>/logs`.
    pub base_dir: PathBuf,
    pub max_log_size: u64,
    pub retain_logs: bool,
    pub tracker: TrackerConfig,
}

impl ManagerConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_log_size: DEFAULT_MAX_LOG_SIZE,
            retain_logs: false,
            tracker: TrackerConfig::default(),
        }
    }
}

/// A spawned child whose output is being pumped into its log.
struct Spawned {
    child: Child,
    pid: u32,
    pgid: u32,
    log_path: PathBuf,
    pumps: Vec<JoinHandle<()>>,
}

pub struct SandboxManager {
    config: ManagerConfig,
    store: SandboxStore,
    tracker: Arc<ProcessTracker>,
    logger: Arc<ProcessLogger>,
}

impl SandboxManager {
    pub fn new(store: SandboxStore, config: ManagerConfig) -> Self {
        let logger = ProcessLogger::new(LoggerConfig {
            base_dir: config.base_dir.clone(),
            max_log_size: config.max_log_size,
            retain_logs: config.retain_logs,
        });
        let tracker = ProcessTracker::new(config.tracker.clone());
        Self {
            config,
            store,
            tracker: Arc::new(tracker),
            logger: Arc::new(logger),
        }
    }

    pub fn tracker(&self) -> &Arc<ProcessTracker> {
        &self.tracker
    }

    pub fn logger(&self) -> &Arc<ProcessLogger> {
        &self.logger
    }

    // Sandbox lifecycle

    /// Persist the record, build the overlay and move to `active`.
    pub async fn create(&self, request: CreateSandboxRequest) -> Result<Sandbox> {
        if request.owner.trim().is_empty() {
            return Err(SandboxError::Validation("owner is required".to_string()));
        }
        if request.project_root.trim().is_empty() {
            return Err(SandboxError::Validation(
                "project root is required".to_string(),
            ));
        }
        validate_scope(&request.scope_path)?;

        let now = Utc::now();
        let mut sandbox = Sandbox {
            id: new_id(),
            scope_path: request.scope_path,
            project_root: request.project_root,
            owner: request.owner,
            owner_type: request.owner_type,
            status: SandboxStatus::Creating,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        };
        self.store.create(&sandbox).await?;

        if let Err(e) = Overlay::create(
            &self.config.base_dir,
            &sandbox.id,
            Path::new(&sandbox.project_root),
            &sandbox.scope_path,
        ) {
            warn!(sandbox_id = %sandbox.id, "Overlay creation failed: {}", e);
            if let Ok(overlay) = self.overlay(&sandbox) {
                let _ = overlay.remove();
            }
            if let Err(delete_err) = self.store.delete(&sandbox.id).await {
                warn!(sandbox_id = %sandbox.id, "Failed to remove sandbox record: {}", delete_err);
            }
            return Err(e);
        }

        self.store
            .update_status(&sandbox.id, SandboxStatus::Active)
            .await?;
        sandbox.status = SandboxStatus::Active;

        info!(
            sandbox_id = %sandbox.id,
            scope = %sandbox.scope_path,
            "Created sandbox"
        );
        Ok(sandbox)
    }

    pub async fn get(&self, id: &str) -> Result<Sandbox> {
        self.store.get(id).await
    }

    pub async fn list(&self, status: Option<SandboxStatus>) -> Result<Vec<Sandbox>> {
        self.store.list(status).await
    }

    /// Resume a stopped sandbox. Starting an active sandbox is a no-op.
    pub async fn start(&self, id: &str) -> Result<Sandbox> {
        let sandbox = self.store.get(id).await?;
        if sandbox.status == SandboxStatus::Active {
            return Ok(sandbox);
        }
        self.transition(sandbox, SandboxStatus::Active).await
    }

    /// Terminate every process of the sandbox and move it to `stopped`.
    pub async fn stop(&self, id: &str) -> Result<Sandbox> {
        let sandbox = self.store.get(id).await?;
        if sandbox.status == SandboxStatus::Stopped {
            return Ok(sandbox);
        }
        ensure_transition(&sandbox, SandboxStatus::Stopped)?;
        self.kill_all_logged(id).await;
        self.transition(sandbox, SandboxStatus::Stopped).await
    }

    /// Tear down in order: processes, logs, overlay, tracking, record.
    ///
    /// Each step is best-effort and deleting an unknown id succeeds.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let sandbox = match self.store.get(id).await {
            Ok(sandbox) => Some(sandbox),
            Err(SandboxError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        self.kill_all_logged(id).await;

        if let Err(e) = self.logger.cleanup_sandbox_logs(id).await {
            warn!(sandbox_id = %id, "Failed to clean up sandbox logs: {}", e);
        }

        if let Some(sandbox) = &sandbox {
            match self.overlay(sandbox).and_then(|overlay| overlay.remove()) {
                Ok(()) => {}
                Err(e) => warn!(sandbox_id = %id, "Failed to remove overlay: {}", e),
            }
        }

        let dropped = self.tracker.cleanup(id).await;
        debug!(sandbox_id = %id, "Dropped {} tracked processes", dropped);

        match self.store.delete(id).await {
            Ok(true) => info!(sandbox_id = %id, "Deleted sandbox"),
            Ok(false) => debug!(sandbox_id = %id, "Sandbox record already absent"),
            Err(e) => warn!(sandbox_id = %id, "Failed to delete sandbox record: {}", e),
        }
        Ok(())
    }

    // Review

    pub async fn diff(&self, id: &str) -> Result<Vec<FileChange>> {
        let sandbox = self.store.get(id).await?;
        self.overlay(&sandbox)?.diff()
    }

    /// Stop processes, write the upper layer into the project and mark `approved`.
    pub async fn approve(&self, id: &str) -> Result<Vec<FileChange>> {
        let sandbox = self.store.get(id).await?;
        ensure_transition(&sandbox, SandboxStatus::Approved)?;
        self.kill_all_logged(id).await;

        let changes = self.overlay(&sandbox)?.apply()?;
        self.transition(sandbox, SandboxStatus::Approved).await?;
        info!(sandbox_id = %id, changes = changes.len(), "Approved sandbox changes");
        Ok(changes)
    }

    /// Stop processes, discard the upper layer and mark `rejected`.
    pub async fn reject(&self, id: &str) -> Result<()> {
        let sandbox = self.store.get(id).await?;
        ensure_transition(&sandbox, SandboxStatus::Rejected)?;
        self.kill_all_logged(id).await;

        self.overlay(&sandbox)?.discard()?;
        self.transition(sandbox, SandboxStatus::Rejected).await?;
        info!(sandbox_id = %id, "Rejected sandbox changes");
        Ok(())
    }

    pub async fn stats(&self) -> ProcessStats {
        self.tracker.get_all_stats().await
    }

    // Processes

    /// Run a command to completion or until its timeout, returning its log.
    pub async fn execute(&self, request: ExecRequest) -> Result<ExecResult> {
        let sandbox = self.active_sandbox(&request.sandbox_id).await?;
        let started = Instant::now();
        let spawned = self.spawn(&sandbox, &request).await?;
        let pid = spawned.pid;
        let log_path = spawned.log_path.clone();

        let (exit_code, timed_out) = supervise(
            spawned,
            request.timeout,
            sandbox.id.clone(),
            self.tracker.clone(),
            self.logger.clone(),
        )
        .await;

        let output = self.logger.read_log(&sandbox.id, pid, 0, 0).await?;
        Ok(ExecResult {
            pid,
            exit_code,
            timed_out,
            duration_ms: started.elapsed().as_millis() as i64,
            log_path,
            output,
        })
    }

    /// Spawn a command and return once it is tracked; a background task reaps it.
    pub async fn start_process(&self, request: ExecRequest) -> Result<StartedProcess> {
        let sandbox = self.active_sandbox(&request.sandbox_id).await?;
        let spawned = self.spawn(&sandbox, &request).await?;
        let started = StartedProcess {
            pid: spawned.pid,
            pgid: spawned.pgid,
            log_path: spawned.log_path.clone(),
        };

        tokio::spawn(supervise(
            spawned,
            request.timeout,
            sandbox.id,
            self.tracker.clone(),
            self.logger.clone(),
        ));
        Ok(started)
    }

    pub async fn get_process_status(&self, sandbox_id: &str, pid: u32) -> Result<ProcessStatus> {
        let process = self
            .tracker
            .find(pid)
            .await
            .filter(|p| p.sandbox_id == sandbox_id)
            .ok_or(crate::error::TrackerError::NotTracked(pid))?;
        let running = !process.has_stopped() && is_running(pid);
        Ok(ProcessStatus { process, running })
    }

    pub async fn list_processes(&self, sandbox_id: &str) -> Vec<ProcessStatus> {
        self.tracker
            .get_processes(sandbox_id)
            .await
            .into_iter()
            .map(|process| {
                let running = !process.has_stopped() && is_running(process.pid);
                ProcessStatus { process, running }
            })
            .collect()
    }

    pub async fn stop_process(&self, sandbox_id: &str, pid: u32) -> Result<()> {
        self.get_process_status(sandbox_id, pid).await?;
        self.tracker.kill_process(pid).await?;
        info!(sandbox_id = %sandbox_id, pid, "Stopped process");
        Ok(())
    }

    /// Last `tail` lines when `tail > 0`, otherwise everything from `offset`.
    pub async fn get_process_logs(
        &self,
        sandbox_id: &str,
        pid: u32,
        tail: usize,
        offset: u64,
    ) -> Result<String> {
        Ok(self.logger.read_log(sandbox_id, pid, tail, offset).await?)
    }

    pub async fn list_process_logs(&self, sandbox_id: &str) -> Result<Vec<ProcessLogInfo>> {
        Ok(self.logger.list_logs(sandbox_id).await?)
    }

    fn overlay(&self, sandbox: &Sandbox) -> Result<Overlay> {
        Overlay::open(
            &self.config.base_dir,
            &sandbox.id,
            Path::new(&sandbox.project_root),
            &sandbox.scope_path,
        )
    }

    async fn active_sandbox(&self, id: &str) -> Result<Sandbox> {
        let sandbox = self.store.get(id).await?;
        if sandbox.status != SandboxStatus::Active {
            return Err(SandboxError::Validation(format!(
                "sandbox {} is {}, not active",
                id,
                sandbox.status.as_str()
            )));
        }
        Ok(sandbox)
    }

    async fn transition(&self, mut sandbox: Sandbox, next: SandboxStatus) -> Result<Sandbox> {
        ensure_transition(&sandbox, next)?;
        self.store.update_status(&sandbox.id, next).await?;
        debug!(
            sandbox_id = %sandbox.id,
            "Sandbox {} -> {}",
            sandbox.status.as_str(),
            next.as_str()
        );
        sandbox.status = next;
        sandbox.updated_at = Utc::now();
        Ok(sandbox)
    }

    async fn kill_all_logged(&self, sandbox_id: &str) {
        match self.tracker.kill_all(sandbox_id).await {
            Ok(0) => {}
            Ok(stopped) => info!(sandbox_id = %sandbox_id, stopped, "Terminated sandbox processes"),
            Err(e) => warn!(sandbox_id = %sandbox_id, "Failed to terminate processes: {}", e),
        }
    }

    /// Pending log, spawn in a new process group, track, finalize the log.
    async fn spawn(&self, sandbox: &Sandbox, request: &ExecRequest) -> Result<Spawned> {
        if request.command.trim().is_empty() {
            return Err(SandboxError::Validation("command is required".to_string()));
        }
        if let Some(session_id) = &request.session_id {
            match self.tracker.get_session(session_id).await {
                Some(session) if session.sandbox_id == sandbox.id => {}
                _ => {
                    return Err(crate::error::TrackerError::SessionNotFound(
                        session_id.clone(),
                    )
                    .into())
                }
            }
        }

        let upper = self.overlay(sandbox)?.upper_dir();
        let working_dir = upper.join(validate_scope(&request.working_dir)?);
        let command_line = request.command_line();

        let pending = self.logger.create_pending_log(&sandbox.id).await?;

        let mut command = Command::new(&request.command);
        command
            .args(&request.args)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        apply_profile(&mut command, request.profile, &sandbox.id, &upper);
        command.envs(&request.env);
        #[cfg(unix)]
        command.process_group(0);

        let spawn_result = command.spawn().and_then(|child| match child.id() {
            Some(pid) => Ok((child, pid)),
            None => Err(std::io::Error::other("child exited before its pid was read")),
        });
        let (mut child, pid) = match spawn_result {
            Ok(spawned) => spawned,
            Err(source) => {
                if let Err(e) = self.logger.abort_pending_log(pending).await {
                    warn!(sandbox_id = %sandbox.id, "Failed to remove pending log: {}", e);
                }
                return Err(SandboxError::Spawn {
                    command: command_line,
                    source,
                });
            }
        };

        let tracked = match &request.session_id {
            Some(session_id) => match self
                .tracker
                .track_in_session(session_id, pid, &command_line)
                .await
            {
                Ok(tracked) => tracked,
                Err(e) => {
                    if let Err(kill_err) = child.kill().await {
                        warn!(
                            sandbox_id = %sandbox.id,
                            pid,
                            "Failed to kill untracked process: {}",
                            kill_err
                        );
                    }
                    if let Err(log_err) = self.logger.abort_pending_log(pending).await {
                        warn!(sandbox_id = %sandbox.id, "Failed to remove pending log: {}", log_err);
                    }
                    return Err(e.into());
                }
            },
            None => {
                self.tracker
                    .track(&sandbox.id, pid, &command_line, None)
                    .await
            }
        };

        let writer = self.logger.finalize_log(pending, pid).await;
        let log_path = writer.path().await;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, writer.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, writer)));
        }

        info!(
            sandbox_id = %sandbox.id,
            pid,
            pgid = tracked.pgid,
            command = %command_line,
            "Spawned sandbox process"
        );

        Ok(Spawned {
            child,
            pid,
            pgid: tracked.pgid,
            log_path,
            pumps,
        })
    }
}

fn ensure_transition(sandbox: &Sandbox, next: SandboxStatus) -> Result<()> {
    if sandbox.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(SandboxError::InvalidTransition {
            from: sandbox.status.as_str().to_string(),
            to: next.as_str().to_string(),
        })
    }
}

fn apply_profile(command: &mut Command, profile: ExecProfile, sandbox_id: &str, upper: &Path) {
    if profile == ExecProfile::Restricted {
        let path = std::env::var_os("PATH");
        command.env_clear();
        if let Some(path) = path {
            command.env("PATH", path);
        }
    }
    command.env(PROFILE_ENV, profile.as_str());
    command.env(SANDBOX_ID_ENV, sandbox_id);
    if profile == ExecProfile::VrooliAware {
        command.env(SANDBOX_ROOT_ENV, upper);
    }
}

/// Copy child output into its log until the pipe closes.
async fn pump<R>(mut reader: R, writer: Arc<LogWriter>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if writer.write(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Wait for the child (bounded by `timeout`), drain its output, record the exit
/// with the tracker and close the log. Returns `(exit_code, timed_out)`.
async fn supervise(
    spawned: Spawned,
    timeout: Option<Duration>,
    sandbox_id: String,
    tracker: Arc<ProcessTracker>,
    logger: Arc<ProcessLogger>,
) -> (i32, bool) {
    let Spawned {
        mut child,
        pid,
        pumps,
        ..
    } = spawned;

    let status = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
        None => Some(child.wait().await),
    };

    let (exit_code, timed_out) = match status {
        Some(status) => (exit_code_of(status), false),
        None => {
            // Reap concurrently so the liveness probe stops seeing the child
            let (killed, _) = tokio::join!(tracker.kill_process(pid), child.wait());
            if let Err(e) = killed {
                warn!(sandbox_id = %sandbox_id, pid, "Failed to terminate timed out process: {}", e);
            }
            info!(sandbox_id = %sandbox_id, pid, "Process timed out");
            (KILLED_EXIT_CODE, true)
        }
    };

    for pump in pumps {
        let _ = pump.await;
    }

    tracker.mark_exited(pid, exit_code).await;
    if let Err(e) = logger.close_log(&sandbox_id, pid, exit_code).await {
        // Expected when the sandbox was deleted while the process ran
        debug!(sandbox_id = %sandbox_id, pid, "Could not close process log: {}", e);
    }
    (exit_code, timed_out)
}

fn exit_code_of(status: std::io::Result<ExitStatus>) -> i32 {
    status
        .ok()
        .and_then(|status| status.code())
        .unwrap_or(KILLED_EXIT_CODE)
}
