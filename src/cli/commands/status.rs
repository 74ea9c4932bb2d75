//! Fleet status probe.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::cli::table::probes_table;
use crate::domain::models::Config;
use crate::services::{FleetController, WorkerProbe};

#[derive(Debug, Serialize)]
struct StatusOutput {
    workers: Vec<WorkerProbe>,
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        probes_table(&self.workers)
    }
}

/// Probe every worker in the directory once.
pub async fn execute(config: &Config, json_mode: bool) -> Result<()> {
    let controller = FleetController::from_config(config)?;
    controller
        .refresh_directory()
        .await
        .context("Failed to read worker directory")?;

    let result = StatusOutput {
        workers: controller.probe_fleet().await,
    };
    output(&result, json_mode);
    Ok(())
}
