//! Command-line interface for strictly_chess.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strictly Chess - inspect saved chess game records
#[derive(Parser, Debug)]
#[command(name = "strictly_chess")]
#[command(about = "Inspect game records saved by strictly_chess sessions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = "strictly_chess.toml")]
    pub config: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List saved records in the configured record directory
    Records,

    /// Print a saved record
    Show {
        /// Path to the record file
        path: PathBuf,
    },
}
