//! Fleet controller.
//!
//! Owns the shared [`FleetState`], the reconciliation loop and the job
//! monitor, and is the only surface the rest of the system talks to.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapters::{FileWorkerDirectory, HttpMetricSource, HttpWorkerClient, StaticWorkerDirectory};
use crate::domain::errors::DomainResult;
use crate::domain::models::{Config, JobRecord, TimeoutConfig, WorkerRecord, WorkerStatus};
use crate::domain::ports::{MetricSource, WorkerClient, WorkerDirectory};
use crate::services::fleet_state::FleetState;
use crate::services::job_monitor::JobMonitor;
use crate::services::reconciliation_loop::ReconciliationLoop;

/// One-off status probe of a worker, outside any tick.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerProbe {
    /// Directory id of the probed worker
    pub worker_id: String,
    /// Endpoint the probe was sent to
    pub endpoint: String,
    /// Directory enabled flag
    pub enabled: bool,
    /// None when the worker is disabled or did not answer
    pub status: Option<WorkerStatus>,
    /// Transport or protocol error when the probe failed
    pub error: Option<String>,
}

/// Facade over fleet keep-alive and job monitoring.
pub struct FleetController {
    state: Arc<FleetState>,
    directory: Arc<dyn WorkerDirectory>,
    client: Arc<dyn WorkerClient>,
    timeouts: TimeoutConfig,
    reconciler: Arc<ReconciliationLoop>,
    monitor: Arc<JobMonitor>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl FleetController {
    /// Build a controller from explicit ports.
    pub fn new(
        config: &Config,
        directory: Arc<dyn WorkerDirectory>,
        client: Arc<dyn WorkerClient>,
        metrics: Arc<dyn MetricSource>,
    ) -> Self {
        let state = Arc::new(FleetState::new(config.reconciliation.enabled));
        let reconciler = Arc::new(ReconciliationLoop::new(
            state.clone(),
            directory.clone(),
            client.clone(),
            config.reconciliation.clone(),
            config.timeouts.clone(),
        ));
        let monitor = Arc::new(JobMonitor::new(
            state.clone(),
            metrics,
            client.clone(),
            config.monitor.clone(),
            config.timeouts.clone(),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            state,
            directory,
            client,
            timeouts: config.timeouts.clone(),
            reconciler,
            monitor,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Wire the HTTP adapters and the configured worker directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = HttpWorkerClient::new().context("Failed to build worker client")?;
        let metrics = HttpMetricSource::new(&config.metric).context("Failed to build metric source")?;

        let directory: Arc<dyn WorkerDirectory> = match &config.directory.path {
            Some(path) => Arc::new(FileWorkerDirectory::new(path)),
            None => Arc::new(StaticWorkerDirectory::new(config.directory.workers.clone())),
        };

        Ok(Self::new(config, directory, Arc::new(client), Arc::new(metrics)))
    }

    /// Shared fleet state.
    pub fn state(&self) -> &Arc<FleetState> {
        &self.state
    }

    /// Fleet keep-alive loop.
    pub fn reconciler(&self) -> &Arc<ReconciliationLoop> {
        &self.reconciler
    }

    /// Job monitor.
    pub fn monitor(&self) -> &Arc<JobMonitor> {
        &self.monitor
    }

    /// Load the current directory listing into the fleet state.
    pub async fn refresh_directory(&self) -> DomainResult<usize> {
        let descriptors = self.directory.list().await?;
        self.state.register_from_directory(&descriptors).await;
        Ok(descriptors.len())
    }

    /// Register the fleet and spawn both tick loops. Calling this on a
    /// running controller does nothing.
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            warn!("Fleet controller already started");
            return;
        }

        match self.refresh_directory().await {
            Ok(count) => info!(workers = count, "Registered fleet from directory"),
            Err(e) => warn!(error = %e, "Initial directory read failed, starting with an empty fleet"),
        }

        handles.push(self.reconciler.clone().start(self.shutdown_tx.subscribe()));
        handles.push(self.monitor.clone().start(self.shutdown_tx.subscribe()));
        info!("Fleet controller started");
    }

    /// Signal both loops and wait for them. In-flight ticks finish first.
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        if handles.is_empty() {
            return;
        }

        let _ = self.shutdown_tx.send(());
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Tick loop ended abnormally");
            }
        }
        info!("Fleet controller stopped");
    }

    /// Whether the tick loops have been spawned.
    pub async fn is_running(&self) -> bool {
        !self.handles.lock().await.is_empty()
    }

    /// See [`JobMonitor::create_job`].
    pub async fn create_job(&self, resource_id: &str, delta: i64) -> DomainResult<JobRecord> {
        self.monitor.create_job(resource_id, delta).await
    }

    /// Stop one job and send stops to its workers.
    pub async fn stop_job(&self, job_id: &str) -> DomainResult<JobRecord> {
        self.monitor.stop_job(job_id).await
    }

    /// Stop every job that has not ended yet.
    pub async fn stop_all_jobs(&self) -> Vec<JobRecord> {
        self.monitor.stop_all_jobs().await
    }

    /// Record of one job.
    pub async fn get_job_status(&self, job_id: &str) -> DomainResult<JobRecord> {
        self.monitor.get_job_status(job_id).await
    }

    /// All jobs known to the monitor, newest first.
    pub async fn list_jobs(&self) -> Vec<JobRecord> {
        self.monitor.list_jobs().await
    }

    /// Snapshot of every registered worker.
    pub async fn get_fleet_status(&self) -> Vec<WorkerRecord> {
        self.state.snapshot().await
    }

    /// Switch fleet keep-alive on or off without touching jobs.
    pub fn set_fleet_reconciliation_enabled(&self, enabled: bool) {
        self.state.set_reconciliation_enabled(enabled);
        info!(enabled, "Fleet reconciliation switch changed");
    }

    /// Whether fleet keep-alive runs on tick.
    pub fn fleet_reconciliation_enabled(&self) -> bool {
        self.state.reconciliation_enabled()
    }

    /// Query every known worker's status once. Nothing is recorded.
    pub async fn probe_fleet(&self) -> Vec<WorkerProbe> {
        let workers = self.state.snapshot().await;
        let probes = workers.into_iter().map(|worker| async move {
            let (status, error) = if worker.enabled {
                match self
                    .client
                    .get_status(&worker.endpoint, self.timeouts.status())
                    .await
                {
                    Ok(status) => (Some(status), None),
                    Err(e) => (None, Some(e.to_string())),
                }
            } else {
                (None, None)
            };
            WorkerProbe {
                worker_id: worker.id,
                endpoint: worker.endpoint,
                enabled: worker.enabled,
                status,
                error,
            }
        });
        join_all(probes).await
    }
}
