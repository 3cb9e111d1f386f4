// ABOUTME: CLI commands for running the desktop deployment pipeline and editing profile swaps
// ABOUTME: Prints one line per orchestration step and exits non-zero when any step failed

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vrooli_cli::AppContext;
use vrooli_deployment::{
    clamp_poll_interval, OrchestrationRequest, OrchestrationResult, OrchestrationStatus, StepStatus,
};

#[derive(Subcommand)]
pub enum DeployCommands {
    /// Run the deployment pipeline for a profile
    Run {
        profile_id: String,
        #[arg(long)]
        skip_build: bool,
        #[arg(long)]
        skip_packaging: bool,
        /// Bundle output directory
        #[arg(long)]
        output: Option<PathBuf>,
        /// Target platforms, overriding the profile
        #[arg(long = "platform")]
        platforms: Vec<String>,
        /// Seconds between remote build status checks (clamped to 3-10)
        #[arg(long, default_value = "5")]
        poll_interval: u64,
        /// Directory holding profile JSON files
        #[arg(long)]
        profiles_dir: Option<PathBuf>,
    },
    /// Add a dependency swap to a profile
    Swap {
        profile_id: String,
        from: String,
        to: String,
        #[arg(long)]
        profiles_dir: Option<PathBuf>,
    },
}

pub async fn handle(ctx: &AppContext, command: DeployCommands) -> Result<()> {
    match command {
        DeployCommands::Run {
            profile_id,
            skip_build,
            skip_packaging,
            output,
            platforms,
            poll_interval,
            profiles_dir,
        } => {
            let orchestrator = ctx.orchestrator(profiles_dir)?;
            let mut request =
                OrchestrationRequest::new(profile_id, output.unwrap_or_else(|| ctx.bundles_dir()));
            request.skip_build = skip_build;
            request.skip_packaging = skip_packaging;
            request.platforms = platforms;
            request.poll_interval = Some(clamp_poll_interval(Duration::from_secs(poll_interval)));

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("{}", "Cancelling deployment...".yellow());
                    trigger.cancel();
                }
            });
            let result = orchestrator.run(&request, &cancel).await;
            ctrl_c.abort();

            let result = result?;
            print_result(&result);
            if result.status == OrchestrationStatus::Failed {
                anyhow::bail!("deployment of profile {} failed", result.profile_id);
            }
            Ok(())
        }
        DeployCommands::Swap {
            profile_id,
            from,
            to,
            profiles_dir,
        } => {
            let orchestrator = ctx.orchestrator(profiles_dir)?;
            let profile = orchestrator.add_swap(&profile_id, &from, &to)?;
            println!(
                "{} {} → {} on profile {}",
                "Swap recorded:".green(),
                from,
                to,
                profile.id
            );
            Ok(())
        }
    }
}

fn print_result(result: &OrchestrationResult) {
    println!("{} {}", "Deployment".bold(), result.profile_id);
    for step in &result.steps {
        let status = match step.status {
            StepStatus::Success => "success".green(),
            StepStatus::Warning => "warning".yellow(),
            StepStatus::Skipped => "skipped".dimmed(),
            StepStatus::Failed => "failed".red(),
            StepStatus::Running => "running".blue(),
        };
        println!("  {:<24} {}", format!("{:?}", step.name), status);
        if let Some(message) = &step.message {
            println!("    {}", message.dimmed());
        }
        if let Some(error) = &step.error {
            println!("    {}", error.red());
        }
    }
    if let Some(path) = &result.manifest_path {
        println!("  manifest: {}", path.display());
    }
}
