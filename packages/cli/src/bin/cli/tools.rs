// ABOUTME: CLI command for serving a tool registry manifest over HTTP
// ABOUTME: Serves an empty manifest when no file is given

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use std::net::SocketAddr;
use std::path::PathBuf;
use vrooli_api::{RegistryState, ToolManifest};
use vrooli_cli::AppContext;

#[derive(Subcommand)]
pub enum ToolsCommands {
    /// Serve a tool manifest
    Serve {
        /// Manifest JSON file
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Listen port (defaults to TOOL_REGISTRY_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Listen address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

pub async fn handle(ctx: &AppContext, command: ToolsCommands) -> Result<()> {
    match command {
        ToolsCommands::Serve {
            manifest,
            port,
            host,
        } => {
            let manifest = match manifest {
                Some(path) => ToolManifest::load(&path)?,
                None => ToolManifest::empty("vrooli"),
            };
            let port = port.unwrap_or(ctx.settings.registry_port);
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("invalid listen address {}:{}", host, port))?;

            println!(
                "{} {} tools for {} on http://{}",
                "Serving".green(),
                manifest.tools.len(),
                manifest.scenario,
                addr
            );
            vrooli_api::serve(addr, RegistryState::new(manifest)).await?;
            Ok(())
        }
    }
}
