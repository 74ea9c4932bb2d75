//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::run::RunArgs;

/// Top-level command line.
#[derive(Parser)]
#[command(name = "fleetkeeper")]
#[command(about = "Fleetkeeper - keeps a fleet of remote workers busy and drives jobs to their goal", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .fleetkeeper/
    #[arg(short, long, global = true, env = "FLEETKEEPER_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Fleetkeeper subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the reconciliation loop and job monitor until interrupted
    Run(RunArgs),

    /// Run a single reconciliation tick and show the fleet
    Tick,

    /// Query every worker's status once
    Status,

    /// Show the effective configuration
    Config,
}
