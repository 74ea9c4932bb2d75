//! One-shot reconciliation tick.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::cli::table::workers_table;
use crate::domain::models::{Config, WorkerRecord};
use crate::services::{FleetController, ReconcileReport, TickOutcome};

#[derive(Debug, Serialize)]
struct TickOutput {
    /// None when reconciliation is switched off in config
    report: Option<ReconcileReport>,
    fleet: Vec<WorkerRecord>,
}

impl CommandOutput for TickOutput {
    fn to_human(&self) -> String {
        let header = match &self.report {
            Some(r) => format!(
                "Checked {} workers: {} healthy, {} restarted, {} restart failures, {} critical, {} left to jobs, {} timed out ({} disabled skipped)",
                r.checked,
                r.healthy,
                r.restarted,
                r.restart_failed,
                r.critical,
                r.deferred_to_job,
                r.timed_out,
                r.skipped_disabled
            ),
            None => "Reconciliation is disabled; nothing was done.".to_string(),
        };
        format!("{header}\n\n{}", workers_table(&self.fleet))
    }
}

/// Run a single keep-alive pass.
pub async fn execute(config: &Config, json_mode: bool) -> Result<()> {
    let controller = FleetController::from_config(config)?;

    let report = match controller.reconciler().tick().await {
        TickOutcome::Completed(report) => Some(report),
        TickOutcome::Disabled | TickOutcome::Overlapping => None,
    };

    let result = TickOutput {
        report,
        fleet: controller.get_fleet_status().await,
    };
    output(&result, json_mode);
    Ok(())
}
