// ABOUTME: CLI commands for sandbox lifecycle, execution, logs and change review
// ABOUTME: Wraps SandboxManager operations with table and plain-text output

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use vrooli_cli::args::{env_map, timeout_from_secs};
use vrooli_cli::AppContext;
use vrooli_sandbox::{
    ChangeKind, CreateSandboxRequest, ExecProfile, ExecRequest, FileChange, OwnerType,
    SandboxStatus,
};

use super::utils::{format_bytes, format_time, new_table};

#[derive(Subcommand)]
pub enum SandboxCommands {
    /// Create a sandbox over a project scope
    Create {
        /// Project root directory
        #[arg(long)]
        project_root: String,
        /// Scope inside the project, relative to its root
        #[arg(long, default_value = ".")]
        scope: String,
        #[arg(long)]
        owner: String,
        /// user, agent or scenario
        #[arg(long, default_value = "user")]
        owner_type: OwnerType,
    },
    /// List sandboxes
    List {
        /// Only sandboxes in this status
        #[arg(long)]
        status: Option<SandboxStatus>,
    },
    /// Run a command inside a sandbox and wait for it
    Exec {
        sandbox_id: String,
        /// Working directory relative to the sandbox root
        #[arg(long, default_value = "")]
        workdir: String,
        /// Extra environment, KEY=VALUE
        #[arg(long = "env")]
        env: Vec<String>,
        /// Seconds before the process group is killed (0 = no limit)
        #[arg(long, default_value = "0")]
        timeout: u64,
        /// full, restricted or vrooli-aware
        #[arg(long, default_value = "full")]
        profile: ExecProfile,
        /// Start in the background instead of waiting
        #[arg(long)]
        detach: bool,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Show process logs for a sandbox
    Logs {
        sandbox_id: String,
        /// Process id; omit to list available logs
        pid: Option<u32>,
        /// Only the last N lines
        #[arg(long, default_value = "0")]
        tail: usize,
        /// Start reading at this byte offset
        #[arg(long, default_value = "0")]
        offset: u64,
    },
    /// Stop processes and remove a sandbox with its logs
    Delete { sandbox_id: String },
    /// Show changes made inside a sandbox
    Diff { sandbox_id: String },
    /// Apply sandbox changes to the project
    Approve { sandbox_id: String },
    /// Discard sandbox changes
    Reject { sandbox_id: String },
}

pub async fn handle(ctx: &AppContext, command: SandboxCommands) -> Result<()> {
    let manager = ctx.sandbox_manager().await?;
    match command {
        SandboxCommands::Create {
            project_root,
            scope,
            owner,
            owner_type,
        } => {
            let sandbox = manager
                .create(CreateSandboxRequest {
                    scope_path: scope,
                    project_root,
                    owner,
                    owner_type,
                    metadata: Default::default(),
                })
                .await?;
            println!("{} {}", "Created sandbox".green(), sandbox.id.bold());
            println!("  scope: {}/{}", sandbox.project_root, sandbox.scope_path);
        }
        SandboxCommands::List { status } => {
            let sandboxes = manager.list(status).await?;
            if sandboxes.is_empty() {
                println!("{}", "No sandboxes found".yellow());
                return Ok(());
            }
            let mut table = new_table(vec!["ID", "Status", "Owner", "Scope", "Created"]);
            for sandbox in sandboxes {
                table.add_row(vec![
                    sandbox.id,
                    sandbox.status.as_str().to_string(),
                    format!("{} ({})", sandbox.owner, owner_label(sandbox.owner_type)),
                    format!("{}/{}", sandbox.project_root, sandbox.scope_path),
                    format_time(&sandbox.created_at),
                ]);
            }
            println!("{table}");
        }
        SandboxCommands::Exec {
            sandbox_id,
            workdir,
            env,
            timeout,
            profile,
            detach,
            command,
        } => {
            let mut parts = command.into_iter();
            let program = parts.next().unwrap_or_default();
            let mut request = ExecRequest::new(sandbox_id, program);
            request.args = parts.collect();
            request.working_dir = workdir;
            request.env = env_map(&env)?;
            request.timeout = timeout_from_secs(timeout);
            request.profile = profile;

            if detach {
                let started = manager.start_process(request).await?;
                println!("{} pid {}", "Started".green(), started.pid);
                println!("  log: {}", started.log_path.display());
                return Ok(());
            }

            let result = manager.execute(request).await?;
            print!("{}", result.output);
            if result.timed_out {
                eprintln!("{}", "Process timed out and was killed".red());
            }
            if result.exit_code != 0 {
                anyhow::bail!("process {} exited with code {}", result.pid, result.exit_code);
            }
        }
        SandboxCommands::Logs {
            sandbox_id,
            pid,
            tail,
            offset,
        } => match pid {
            Some(pid) => {
                let text = manager.get_process_logs(&sandbox_id, pid, tail, offset).await?;
                print!("{}", text);
            }
            None => {
                let logs = manager.list_process_logs(&sandbox_id).await?;
                if logs.is_empty() {
                    println!("{}", "No process logs".yellow());
                    return Ok(());
                }
                let mut table = new_table(vec!["PID", "Size", "Active", "Modified"]);
                for log in logs {
                    table.add_row(vec![
                        log.pid.to_string(),
                        format_bytes(log.size_bytes),
                        if log.is_active { "yes" } else { "no" }.to_string(),
                        log.modified_at.as_ref().map(format_time).unwrap_or_default(),
                    ]);
                }
                println!("{table}");
            }
        },
        SandboxCommands::Delete { sandbox_id } => {
            manager.delete(&sandbox_id).await?;
            println!("{} {}", "Deleted sandbox".green(), sandbox_id);
        }
        SandboxCommands::Diff { sandbox_id } => {
            print_changes(&manager.diff(&sandbox_id).await?);
        }
        SandboxCommands::Approve { sandbox_id } => {
            let changes = manager.approve(&sandbox_id).await?;
            print_changes(&changes);
            println!("{} {} changes applied", "Approved".green(), changes.len());
        }
        SandboxCommands::Reject { sandbox_id } => {
            manager.reject(&sandbox_id).await?;
            println!("{} {}", "Rejected sandbox".yellow(), sandbox_id);
        }
    }
    Ok(())
}

fn owner_label(owner_type: OwnerType) -> &'static str {
    match owner_type {
        OwnerType::User => "user",
        OwnerType::Agent => "agent",
        OwnerType::Scenario => "scenario",
    }
}

fn print_changes(changes: &[FileChange]) {
    if changes.is_empty() {
        println!("{}", "No changes".dimmed());
        return;
    }
    for change in changes {
        let line = match change.kind {
            ChangeKind::Added => format!("A {}", change.path).green(),
            ChangeKind::Modified => format!("M {}", change.path).yellow(),
            ChangeKind::Deleted => format!("D {}", change.path).red(),
        };
        println!("{}", line);
    }
}
