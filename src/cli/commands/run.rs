//! Long-running supervisor command.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::output::{output, CommandOutput};
use crate::cli::table::{jobs_table, workers_table};
use crate::domain::models::{Config, JobRecord, WorkerRecord};
use crate::services::FleetController;

/// `RESOURCE=DELTA` pair given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Metric resource the job watches
    pub resource_id: String,
    /// Required change in the metric
    pub delta: i64,
}

impl FromStr for JobSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource_id, delta) = s
            .split_once('=')
            .ok_or_else(|| format!("expected RESOURCE=DELTA, got '{s}'"))?;
        let resource_id = resource_id.trim();
        if resource_id.is_empty() {
            return Err("resource cannot be empty".to_string());
        }
        let delta = delta
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid delta '{delta}': {e}"))?;
        Ok(Self {
            resource_id: resource_id.to_string(),
            delta,
        })
    }
}

/// Flags for `fleetkeeper run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Create a job on startup (repeatable)
    #[arg(long = "job", value_name = "RESOURCE=DELTA")]
    pub jobs: Vec<JobSpec>,

    /// Exit once every job created on startup has ended
    #[arg(long)]
    pub until_done: bool,

    /// Start with keep-alive reconciliation switched off
    #[arg(long)]
    pub no_reconcile: bool,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    jobs: Vec<JobRecord>,
    fleet: Vec<WorkerRecord>,
}

impl CommandOutput for RunSummary {
    fn to_human(&self) -> String {
        format!("{}\n\n{}", jobs_table(&self.jobs), workers_table(&self.fleet))
    }
}

/// Start both loops, create the requested jobs and wait for Ctrl-C or the jobs to end.
pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let controller = FleetController::from_config(config)?;
    if args.no_reconcile {
        controller.set_fleet_reconciliation_enabled(false);
    }
    controller.start().await;

    let mut created = Vec::new();
    for spec in &args.jobs {
        match controller.create_job(&spec.resource_id, spec.delta).await {
            Ok(job) => created.push(job.job_id),
            Err(e) => warn!(resource_id = %spec.resource_id, error = %e, "Failed to create job"),
        }
    }

    if args.until_done && !created.is_empty() {
        let poll = config.monitor.interval().min(Duration::from_secs(1));
        tokio::select! {
            () = wait_for_jobs(&controller, &created, poll) => {
                info!("All jobs ended");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
        info!("Interrupted");
    }

    controller.shutdown().await;
    let stopped = controller.stop_all_jobs().await;
    if !stopped.is_empty() {
        info!(count = stopped.len(), "Stopped jobs still running at exit");
    }

    let summary = RunSummary {
        jobs: controller.list_jobs().await,
        fleet: controller.get_fleet_status().await,
    };
    output(&summary, json_mode);
    Ok(())
}

async fn wait_for_jobs(controller: &FleetController, job_ids: &[String], poll: Duration) {
    loop {
        let mut all_ended = true;
        for job_id in job_ids {
            if let Ok(job) = controller.get_job_status(job_id).await {
                all_ended &= !job.is_running;
            }
        }
        if all_ended {
            return;
        }
        tokio::time::sleep(poll).await;
    }
}
