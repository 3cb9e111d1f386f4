// ABOUTME: Entry point for the vrooli command-line tool
// ABOUTME: Loads .env, installs tracing, then dispatches to workflow, sandbox, deps, deploy and tools commands

use clap::{Parser, Subcommand};
use colored::*;
use std::process;

mod cli;

use cli::deploy::DeployCommands;
use cli::deps::DepsCommands;
use cli::sandbox::SandboxCommands;
use cli::tools::ToolsCommands;
use cli::workflow::WorkflowCommands;
use vrooli_cli::AppContext;

#[derive(Parser)]
#[command(name = "vrooli")]
#[command(about = "Vrooli substrate - workflows, sandboxes, dependency analysis and deployment")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run browser automation workflows
    #[command(subcommand)]
    Workflow(WorkflowCommands),
    /// Manage sandboxes and the processes inside them
    #[command(subcommand)]
    Sandbox(SandboxCommands),
    /// Analyze scenario dependencies
    #[command(subcommand)]
    Deps(DepsCommands),
    /// Validate profiles and build desktop bundles
    #[command(subcommand)]
    Deploy(DeployCommands),
    /// Serve a tool registry
    #[command(subcommand)]
    Tools(ToolsCommands),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    vrooli_cli::logging::init_tracing();

    let cli = Cli::parse();

    if let Err(e) = handle_command(cli.command).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    let ctx = AppContext::from_env()?;
    match command {
        Commands::Workflow(command) => cli::workflow::handle(&ctx, command).await,
        Commands::Sandbox(command) => cli::sandbox::handle(&ctx, command).await,
        Commands::Deps(command) => cli::deps::handle(&ctx, command).await,
        Commands::Deploy(command) => cli::deploy::handle(&ctx, command).await,
        Commands::Tools(command) => cli::tools::handle(&ctx, command).await,
    }
}
