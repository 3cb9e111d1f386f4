// ABOUTME: CLI commands for scenario dependency analysis
// ABOUTME: Prints detected-vs-declared drift and optionally merges it into service.json

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use vrooli_cli::AppContext;
use vrooli_dependencies::ScenarioAnalysis;

use super::utils::new_table;

#[derive(Subcommand)]
pub enum DepsCommands {
    /// Compare a scenario's source against its declared dependencies
    Analyze {
        scenario: String,
        /// Add missing resources to .vrooli/service.json
        #[arg(long)]
        apply_resources: bool,
        /// Add missing scenarios to .vrooli/service.json
        #[arg(long)]
        apply_scenarios: bool,
        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle(ctx: &AppContext, command: DepsCommands) -> Result<()> {
    match command {
        DepsCommands::Analyze {
            scenario,
            apply_resources,
            apply_scenarios,
            json,
        } => {
            let analyzer = ctx.analyzer()?;
            let analysis = analyzer.analyze(&scenario)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print_analysis(&analysis);
            }

            if apply_resources || apply_scenarios {
                let report =
                    analyzer.apply_detected_diffs(&scenario, &analysis, apply_resources, apply_scenarios)?;
                if report.written {
                    println!(
                        "{} {} resources, {} scenarios added",
                        "Updated service.json:".green(),
                        report.added_resources.len(),
                        report.added_scenarios.len()
                    );
                } else {
                    println!("{}", "service.json already up to date".dimmed());
                }
            }
            Ok(())
        }
    }
}

fn print_analysis(analysis: &ScenarioAnalysis) {
    println!("{} {}", "Scenario".bold(), analysis.scenario);

    if analysis.detected.is_empty() {
        println!("{}", "No dependencies detected".yellow());
    } else {
        let mut table = new_table(vec!["Dependency", "Type", "Access", "Source"]);
        for dep in &analysis.detected {
            table.add_row(vec![
                dep.dependency_name.clone(),
                dep.dependency_type.as_str().to_string(),
                dep.access_method.as_str().to_string(),
                dep.source_file.clone().unwrap_or_default(),
            ]);
        }
        println!("{table}");
    }

    for dep in analysis
        .missing_resources
        .iter()
        .chain(analysis.missing_scenarios.iter())
    {
        println!(
            "  {} {} ({})",
            "missing".red(),
            dep.dependency_name,
            dep.dependency_type.as_str()
        );
    }
    for name in analysis
        .unused_resources
        .iter()
        .chain(analysis.unused_scenarios.iter())
    {
        println!("  {} {}", "unused".yellow(), name);
    }
    if !analysis.has_drift() {
        println!("{}", "Declared dependencies match the source".green());
    }
}
