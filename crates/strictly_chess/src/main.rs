//! Strictly Chess - record inspection CLI

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use std::path::Path;
use strictly_chess::{ChessConfig, JsonRecordStore};
use tracing::{debug, info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = ChessConfig::load(&cli.config).context("Failed to load config")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Records => list_records(&config).await,
        Command::Show { path } => show_record(&path).await,
    }
}

/// Prints every stored record file.
#[instrument(skip_all, fields(dir = %config.record_dir().display()))]
async fn list_records(config: &ChessConfig) -> Result<()> {
    let store = JsonRecordStore::from_config(config);
    let records = store.list().await.context("Failed to list records")?;
    info!(count = records.len(), "Listing records");

    if records.is_empty() {
        println!("No records in {}", config.record_dir().display());
    }
    for path in records {
        println!("{}", path.display());
    }
    Ok(())
}

/// Prints one record's positions and moves.
#[instrument(skip_all, fields(path = %path.display()))]
async fn show_record(path: &Path) -> Result<()> {
    let record = JsonRecordStore::load(path)
        .await
        .with_context(|| format!("Failed to load record {}", path.display()))?;
    debug!(moves = record.moves.len(), "Record loaded");

    println!("Start: {}", record.start_position);
    if record.is_finalized() {
        println!("End:   {}", record.end_position);
    } else {
        println!("End:   (unfinished)");
    }
    println!("Moves: {}", record.moves.len());
    for (turn, pair) in record.moves.chunks(2).enumerate() {
        let white = pair[0].to_string();
        let black = pair.get(1).map(ToString::to_string).unwrap_or_default();
        println!("{:>3}. {:<6} {}", turn + 1, white, black);
    }
    Ok(())
}
