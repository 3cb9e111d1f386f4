// ABOUTME: CLI commands for running compiled workflows against the browser driver
// ABOUTME: Ctrl-C cancels the run, which is recorded as cancelled

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use std::path::PathBuf;
use vrooli_cli::args::{load_instructions, timeout_from_secs};
use vrooli_cli::AppContext;
use vrooli_core::ExecutionPlan;
use vrooli_executions::{ExecutionRequest, ExecutionStatus};

#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// Execute a compiled instruction list
    Run {
        #[arg(long)]
        execution_id: String,
        #[arg(long)]
        workflow_id: String,
        /// JSON file holding the compiled instructions
        #[arg(long)]
        instructions: PathBuf,
        /// Per-attempt timeout in seconds (0 = driver default)
        #[arg(long, default_value = "0")]
        step_timeout: u64,
    },
}

pub async fn handle(ctx: &AppContext, command: WorkflowCommands) -> Result<()> {
    match command {
        WorkflowCommands::Run {
            execution_id,
            workflow_id,
            instructions,
            step_timeout,
        } => run(ctx, execution_id, workflow_id, instructions, step_timeout).await,
    }
}

async fn run(
    ctx: &AppContext,
    execution_id: String,
    workflow_id: String,
    instructions: PathBuf,
    step_timeout: u64,
) -> Result<()> {
    let instructions = load_instructions(&instructions)?;
    let runner = ctx.workflow_runner().await?;

    let mut request = ExecutionRequest::new(ExecutionPlan::new(execution_id, workflow_id), instructions);
    request.step_timeout = timeout_from_secs(step_timeout);

    let handle = runner.spawn(request);
    let shutdown = runner.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling execution...".yellow());
            shutdown.shutdown();
        }
    });

    let report = handle.await??;
    ctrl_c.abort();

    let status = match report.status {
        ExecutionStatus::Completed => report.status.as_str().green(),
        ExecutionStatus::Failed | ExecutionStatus::Cancelled => report.status.as_str().red(),
        _ => report.status.as_str().yellow(),
    };
    println!("{} {}", "Execution".bold(), report.execution_id);
    println!("  status:       {}", status);
    println!("  steps run:    {}", report.steps_run);
    println!("  failed steps: {}", report.failed_steps);

    if report.status != ExecutionStatus::Completed {
        anyhow::bail!("execution finished with status {}", report.status.as_str());
    }
    Ok(())
}
