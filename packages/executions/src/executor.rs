// ABOUTME: Drives one workflow execution from session creation to terminal summary
// ABOUTME: Dispatches instructions, retries, checkpoints, heartbeats and records crashes

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vrooli_core::{CompiledInstruction, ExecutionPlan, FailureKind, StepFailure};
use vrooli_driver::{BrowserDriver, CreateSessionRequest, DriverError};

use crate::error::{ExecutorError, ExecutorResult};
use crate::types::{ExecutionStatus, StepTelemetry, TelemetryKind};
use crate::writer::ExecutionWriter;

pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub plan: ExecutionPlan,
    pub instructions: Vec<CompiledInstruction>,
    pub session: CreateSessionRequest,
    /// Heartbeat cadence. Zero disables heartbeats.
    pub telemetry_interval: Duration,
    /// Overall bound for a single attempt. `None` leaves it to the driver client.
    pub step_timeout: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new(plan: ExecutionPlan, instructions: Vec<CompiledInstruction>) -> Self {
        let session = CreateSessionRequest::new(&plan.execution_id, &plan.workflow_id);
        Self {
            plan,
            instructions,
            session,
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            step_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// Attempts recorded, retries included.
    pub steps_run: usize,
    /// Instructions whose last attempt failed.
    pub failed_steps: usize,
    pub session_id: String,
}

#[derive(Default)]
struct Progress {
    steps_run: usize,
    failed_steps: usize,
}

/// Why the step loop stopped early.
struct Abort {
    failure: StepFailure,
    error: ExecutorError,
}

impl Abort {
    fn cancelled(execution_id: &str) -> Self {
        Self {
            failure: StepFailure::new(FailureKind::Cancelled, "execution cancelled").fatal(),
            error: ExecutorError::Cancelled(execution_id.to_string()),
        }
    }

    fn timeout(step_index: i32, limit: Duration) -> Self {
        let seconds = limit.as_secs();
        Self {
            failure: StepFailure::new(
                FailureKind::Timeout,
                format!("step {} timed out after {}s", step_index, seconds),
            )
            .fatal(),
            error: ExecutorError::Timeout {
                step_index,
                seconds,
            },
        }
    }

    fn driver(err: DriverError) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_cancelled() {
            FailureKind::Cancelled
        } else {
            FailureKind::Infra
        };
        let mut failure = StepFailure::new(kind, err.to_string()).fatal();
        failure.source = vrooli_driver::error::DRIVER_NAME.to_string();
        Self {
            failure,
            error: ExecutorError::Driver(err),
        }
    }

    fn orchestration(err: ExecutorError) -> Self {
        Self {
            failure: StepFailure::new(FailureKind::Orchestration, err.to_string()).fatal(),
            error: err,
        }
    }
}

pub struct WorkflowExecutor {
    driver: Option<Arc<dyn BrowserDriver>>,
    writer: Arc<ExecutionWriter>,
}

impl WorkflowExecutor {
    pub fn new(driver: Option<Arc<dyn BrowserDriver>>, writer: Arc<ExecutionWriter>) -> Self {
        Self { driver, writer }
    }

    pub fn writer(&self) -> &Arc<ExecutionWriter> {
        &self.writer
    }

    /// Run every instruction of `request` in one driver session.
    ///
    /// Failed steps are recorded and the run continues unless the instruction
    /// has `stop_on_failure`. Cancellation, timeouts and driver errors are
    /// recorded through `mark_crash` before the session is closed.
    pub async fn execute(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutorResult<ExecutionReport> {
        let execution_id = request.plan.execution_id.clone();
        if execution_id.trim().is_empty() {
            return Err(ExecutorError::InvalidRequest(
                "execution id is empty".to_string(),
            ));
        }
        let driver = self
            .driver
            .clone()
            .ok_or_else(|| DriverError::not_configured("create session"))?;

        if let Some(index) = self.writer.index() {
            if let Err(e) = index.upsert_running(&request.plan).await {
                warn!(execution_id = %execution_id, "Failed to mark execution running: {}", e);
            }
        }
        info!(
            "Starting execution {} with {} instructions",
            execution_id,
            request.instructions.len()
        );

        let session_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let abort = Abort::cancelled(&execution_id);
                self.crash(&execution_id, abort.failure).await;
                return Err(abort.error);
            }
            result = driver.create_session(&request.session) => match result {
                Ok(id) => id,
                Err(e) => {
                    let abort = Abort::driver(e);
                    self.crash(&execution_id, abort.failure).await;
                    return Err(abort.error);
                }
            },
        };
        debug!("Execution {} running in session {}", execution_id, session_id);

        let current_step = Arc::new(AtomicI32::new(0));
        let heartbeat_token = cancel.child_token();
        let heartbeat = self.spawn_heartbeat(
            &request,
            current_step.clone(),
            heartbeat_token.clone(),
        );

        let result = self
            .run_steps(driver.as_ref(), &session_id, &request, &current_step, &cancel)
            .await;

        heartbeat_token.cancel();
        if let Some(handle) = heartbeat {
            let _ = handle.await;
        }

        match result {
            Ok(progress) => {
                let status = if progress.failed_steps > 0 {
                    ExecutionStatus::Failed
                } else {
                    ExecutionStatus::Completed
                };
                let completed = self.writer.complete(&execution_id, status).await;
                self.writer.release(&execution_id).await;
                close_session(driver.as_ref(), &session_id).await;
                completed?;

                info!(
                    "Execution {} {}: {} steps run, {} failed",
                    execution_id,
                    status.as_str(),
                    progress.steps_run,
                    progress.failed_steps
                );
                Ok(ExecutionReport {
                    execution_id,
                    status,
                    steps_run: progress.steps_run,
                    failed_steps: progress.failed_steps,
                    session_id,
                })
            }
            Err(abort) => {
                warn!(execution_id = %execution_id, "Execution aborted: {}", abort.error);
                self.crash(&execution_id, abort.failure).await;
                close_session(driver.as_ref(), &session_id).await;
                Err(abort.error)
            }
        }
    }

    async fn run_steps(
        &self,
        driver: &dyn BrowserDriver,
        session_id: &str,
        request: &ExecutionRequest,
        current_step: &AtomicI32,
        cancel: &CancellationToken,
    ) -> Result<Progress, Abort> {
        let plan = &request.plan;
        let total = request.instructions.len() as i32;
        let mut progress = Progress::default();

        for (position, instruction) in request.instructions.iter().enumerate() {
            current_step.store(instruction.index, Ordering::Relaxed);
            let max_attempts = instruction.max_attempts.max(1);
            let mut attempt = 1;

            loop {
                let call = driver.run_instruction(session_id, instruction);
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Abort::cancelled(&plan.execution_id)),
                    result = bounded(request.step_timeout, call) => result,
                };

                let mut outcome = match result {
                    None => {
                        let limit = request.step_timeout.unwrap_or_default();
                        return Err(Abort::timeout(instruction.index, limit));
                    }
                    Some(Err(e)) => return Err(Abort::driver(e)),
                    Some(Ok(outcome)) => outcome,
                };
                outcome.attempt = attempt as i32;
                let success = outcome.success;

                self.writer
                    .record_step_outcome(plan, outcome)
                    .await
                    .map_err(|e| Abort::orchestration(e.into()))?;
                progress.steps_run += 1;

                if success {
                    if let Err(e) = self
                        .writer
                        .update_checkpoint(&plan.execution_id, position as i32, total)
                        .await
                    {
                        warn!(execution_id = %plan.execution_id, "Checkpoint failed: {}", e);
                    }
                    break;
                }

                if attempt < max_attempts {
                    let telemetry = StepTelemetry::new(
                        instruction.index,
                        TelemetryKind::Retry,
                        format!(
                            "retrying step {} (attempt {} of {})",
                            instruction.index,
                            attempt + 1,
                            max_attempts
                        ),
                    );
                    if let Err(e) = self.writer.record_telemetry(plan, telemetry).await {
                        warn!(execution_id = %plan.execution_id, "Failed to record retry: {}", e);
                    }
                    attempt += 1;
                    continue;
                }

                progress.failed_steps += 1;
                if instruction.stop_on_failure {
                    info!(
                        "Stopping execution {} after failed step {}",
                        plan.execution_id, instruction.index
                    );
                    return Ok(progress);
                }
                break;
            }
        }

        Ok(progress)
    }

    fn spawn_heartbeat(
        &self,
        request: &ExecutionRequest,
        current_step: Arc<AtomicI32>,
        token: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if request.telemetry_interval.is_zero() {
            return None;
        }
        let writer = self.writer.clone();
        let plan = request.plan.clone();
        let period = request.telemetry_interval;

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let step = current_step.load(Ordering::Relaxed);
                        let telemetry = StepTelemetry::new(step, TelemetryKind::Heartbeat, "execution running");
                        if let Err(e) = writer.record_telemetry(&plan, telemetry).await {
                            warn!(execution_id = %plan.execution_id, "Heartbeat failed: {}", e);
                        }
                    }
                }
            }
        }))
    }

    async fn crash(&self, execution_id: &str, failure: StepFailure) {
        if let Err(e) = self.writer.mark_crash(execution_id, failure).await {
            warn!(execution_id = %execution_id, "Failed to record crash: {}", e);
        }
        self.writer.release(execution_id).await;
    }
}

async fn bounded<F, T>(limit: Option<Duration>, future: F) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}

async fn close_session(driver: &dyn BrowserDriver, session_id: &str) {
    if let Err(e) = driver.close_session(session_id).await {
        warn!("Failed to close session {}: {}", session_id, e);
    }
}

/// Runs executions concurrently, bounded by the driver's session capacity.
#[derive(Clone)]
pub struct WorkflowRunner {
    executor: Arc<WorkflowExecutor>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl WorkflowRunner {
    pub fn new(executor: Arc<WorkflowExecutor>, max_sessions: usize) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(max_sessions.max(1))),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn available_sessions(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a session slot, then execute.
    pub async fn run(&self, request: ExecutionRequest) -> ExecutorResult<ExecutionReport> {
        let token = self.shutdown.child_token();
        let execution_id = request.plan.execution_id.clone();

        let _permit = tokio::select! {
            _ = token.cancelled() => return Err(ExecutorError::Cancelled(execution_id)),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| ExecutorError::Cancelled(execution_id))?
            }
        };

        self.executor.execute(request, token).await
    }

    pub fn spawn(&self, request: ExecutionRequest) -> JoinHandle<ExecutorResult<ExecutionReport>> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(request).await })
    }

    /// Cancel every running and queued execution.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
