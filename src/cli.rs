//! CLI module for Cadence
//!
//! Provides commands:
//! - `simulate`: Replay a scenario file through the automation engine
//! - `constraints`: List stored frequency constraints

use anyhow::{Context, Result};
use cadence_core::{FrequencyStore, SqliteAutomationStore};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::simulate;

/// Cadence automation engine CLI
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Trigger processing and frequency limiting for automations")]
#[command(version)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// SQLite database path (overrides configuration)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed a scenario file through the engine and print fire decisions
    Simulate {
        /// Scenario JSON file
        #[arg(short, long)]
        input: PathBuf,
    },
    /// List stored frequency constraints
    Constraints,
}

/// Run the CLI command
pub async fn run(cli: Cli, mut config: AppConfig) -> Result<()> {
    if let Some(path) = cli.database {
        config.storage.path = Some(path);
    }

    match cli.command {
        Some(Commands::Simulate { input }) => simulate::run(&input, &config).await,
        Some(Commands::Constraints) => list_constraints(&config).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

async fn list_constraints(config: &AppConfig) -> Result<()> {
    let path = config.storage.resolve_path()?;
    let store = SqliteAutomationStore::new(&path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let constraints = store.get_all_constraints().await?;
    if constraints.is_empty() {
        println!("No frequency constraints stored");
        return Ok(());
    }

    println!("{:<24} {:>12} {:>8} {:>12}", "ID", "RANGE_MS", "COUNT", "OCCURRENCES");
    for constraint in constraints {
        let occurrences = store.get_occurrences(&constraint.id).await?;
        println!(
            "{:<24} {:>12} {:>8} {:>12}",
            constraint.id,
            constraint.range.as_millis(),
            constraint.count,
            occurrences.len()
        );
    }
    Ok(())
}
