//! Cadence - Automation Engine
//!
//! CLI entry point for simulating and inspecting the automation engine.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod loader;
mod simulate;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=info,cadence_core=info".into()),
        )
        .with(cli.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.json).then(tracing_subscriber::fmt::layer))
        .init();

    let config = loader::load_config()?;
    debug!(?config, "Configuration loaded");

    cli::run(cli, config).await
}
