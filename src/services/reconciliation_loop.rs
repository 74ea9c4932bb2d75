//! Fleet reconciliation loop.
//!
//! Every tick compares the desired state of the fleet (every enabled worker
//! busy) with the observed state and issues corrective starts:
//! - disabled workers are skipped without any call
//! - reachable but idle workers get a keep-alive start
//! - unreachable workers get a start directly; if that fails too the
//!   worker is flagged critical until a later status fetch succeeds
//!
//! Workers assigned to a running job are only observed here. Their
//! restarts belong to the job monitor's bounded budget.
//!
//! Failures never escape a tick; they are recorded on the worker records.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::domain::models::{
    ReconciliationConfig, StartMode, StartRequest, TimeoutConfig, WorkerRecord,
};
use crate::domain::ports::{WorkerClient, WorkerDirectory};
use crate::services::fleet_state::FleetState;
use crate::services::tick_guard::TickGuard;

/// What happened to one worker during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerOutcome {
    Healthy,
    Restarted,
    RestartFailed,
    Critical,
    DeferredToJob,
    TimedOut,
}

/// Tally of one completed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Enabled workers visited
    pub checked: usize,
    /// Disabled workers left alone
    pub skipped_disabled: usize,
    /// Workers already running
    pub healthy: usize,
    /// Idle workers started again
    pub restarted: usize,
    /// Idle worker whose keep-alive start failed
    pub restart_failed: usize,
    /// Unreachable worker whose start failed
    pub critical: usize,
    /// Workers left to their job's monitor
    pub deferred_to_job: usize,
    /// Workers whose handling ran past the unit timeout
    pub timed_out: usize,
}

impl ReconcileReport {
    fn record(&mut self, outcome: WorkerOutcome) {
        match outcome {
            WorkerOutcome::Healthy => self.healthy += 1,
            WorkerOutcome::Restarted => self.restarted += 1,
            WorkerOutcome::RestartFailed => self.restart_failed += 1,
            WorkerOutcome::Critical => self.critical += 1,
            WorkerOutcome::DeferredToJob => self.deferred_to_job += 1,
            WorkerOutcome::TimedOut => self.timed_out += 1,
        }
    }

    /// Whether the tick had to correct anything.
    pub fn had_corrections(&self) -> bool {
        self.restarted + self.restart_failed + self.critical + self.timed_out > 0
    }
}

/// Result of asking for a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran
    Completed(ReconcileReport),
    /// Another tick was still in flight
    Overlapping,
    /// Fleet reconciliation is switched off
    Disabled,
}

/// Keeps every enabled worker in the fleet running.
pub struct ReconciliationLoop {
    state: Arc<FleetState>,
    directory: Arc<dyn WorkerDirectory>,
    client: Arc<dyn WorkerClient>,
    config: ReconciliationConfig,
    timeouts: TimeoutConfig,
    in_tick: AtomicBool,
}

impl ReconciliationLoop {
    /// Build a loop over the shared fleet state.
    pub fn new(
        state: Arc<FleetState>,
        directory: Arc<dyn WorkerDirectory>,
        client: Arc<dyn WorkerClient>,
        config: ReconciliationConfig,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            state,
            directory,
            client,
            config,
            timeouts,
            in_tick: AtomicBool::new(false),
        }
    }

    /// Active loop settings.
    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Spawn the periodic loop.
    ///
    /// A tick that has started always runs to completion; the shutdown
    /// signal is only observed between ticks.
    pub fn start(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                interval_ms = self.config.interval_ms,
                "Started fleet reconciliation loop"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.tick().await {
                            TickOutcome::Completed(report) if report.had_corrections() => {
                                info!(?report, "Reconciliation tick corrected fleet");
                            }
                            TickOutcome::Completed(report) => {
                                debug!(?report, "Reconciliation tick completed");
                            }
                            TickOutcome::Overlapping => {
                                debug!("Previous reconciliation tick still running, skipping");
                            }
                            TickOutcome::Disabled => {
                                debug!("Fleet reconciliation disabled, skipping tick");
                            }
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal, stopping reconciliation loop");
                        break;
                    }
                }
            }

            info!("Fleet reconciliation loop stopped");
        })
    }

    /// Run one reconciliation pass over the fleet.
    pub async fn tick(&self) -> TickOutcome {
        if !self.state.reconciliation_enabled() {
            return TickOutcome::Disabled;
        }
        let Some(_guard) = TickGuard::try_acquire(&self.in_tick) else {
            return TickOutcome::Overlapping;
        };

        let workers = self.current_membership().await;
        let mut report = ReconcileReport::default();

        let mut units = Vec::new();
        for worker in workers {
            if !worker.enabled {
                report.skipped_disabled += 1;
                continue;
            }
            report.checked += 1;
            units.push(self.reconcile_with_timeout(worker));
        }

        for outcome in join_all(units).await {
            report.record(outcome);
        }

        TickOutcome::Completed(report)
    }

    /// Workers to visit this tick.
    ///
    /// When the directory cannot be read the last known membership is used.
    async fn current_membership(&self) -> Vec<WorkerRecord> {
        match self.directory.list().await {
            Ok(descriptors) => {
                self.state.register_from_directory(&descriptors).await;
                let mut workers = Vec::with_capacity(descriptors.len());
                for descriptor in &descriptors {
                    if let Some(record) = self.state.worker_snapshot(&descriptor.id).await {
                        workers.push(record);
                    }
                }
                workers
            }
            Err(e) => {
                warn!(error = %e, "Worker directory unavailable, using last known fleet");
                self.state.snapshot().await
            }
        }
    }

    async fn reconcile_with_timeout(&self, worker: WorkerRecord) -> WorkerOutcome {
        let unit_timeout = self.config.unit_timeout();
        let worker_id = worker.id.clone();

        match tokio::time::timeout(unit_timeout, self.reconcile_worker(worker)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    worker_id = %worker_id,
                    timeout_ms = unit_timeout.as_millis() as u64,
                    "Worker reconciliation timed out"
                );
                self.state
                    .update(&worker_id, |r| r.mark_error("reconciliation timed out"))
                    .await;
                WorkerOutcome::TimedOut
            }
        }
    }

    async fn reconcile_worker(&self, worker: WorkerRecord) -> WorkerOutcome {
        let job_assigned = worker.is_job_assigned();

        match self
            .client
            .get_status(&worker.endpoint, self.timeouts.status())
            .await
        {
            Ok(status) => {
                let now = Utc::now();
                self.state.update(&worker.id, |r| r.mark_seen(now)).await;

                if status.running {
                    return WorkerOutcome::Healthy;
                }
                if job_assigned {
                    debug!(worker_id = %worker.id, "Idle worker belongs to a running job, not restarting");
                    return WorkerOutcome::DeferredToJob;
                }

                match self.keep_alive_start(&worker.endpoint).await {
                    Ok(()) => {
                        self.state.update(&worker.id, WorkerRecord::mark_restarted).await;
                        info!(worker_id = %worker.id, "Restarted idle worker");
                        WorkerOutcome::Restarted
                    }
                    Err(e) => {
                        warn!(worker_id = %worker.id, error = %e, "Failed to restart idle worker");
                        self.state.update(&worker.id, |r| r.mark_error(e)).await;
                        WorkerOutcome::RestartFailed
                    }
                }
            }
            Err(status_error) => {
                if job_assigned {
                    debug!(
                        worker_id = %worker.id,
                        error = %status_error,
                        "Unreachable worker belongs to a running job, not restarting"
                    );
                    self.state
                        .update(&worker.id, |r| r.mark_error(status_error.to_string()))
                        .await;
                    return WorkerOutcome::DeferredToJob;
                }

                warn!(
                    worker_id = %worker.id,
                    error = %status_error,
                    "Worker unreachable, attempting start"
                );

                match self.keep_alive_start(&worker.endpoint).await {
                    Ok(()) => {
                        let now = Utc::now();
                        self.state
                            .update(&worker.id, |r| {
                                r.mark_restarted();
                                r.last_seen = Some(now);
                            })
                            .await;
                        info!(worker_id = %worker.id, "Restarted unreachable worker");
                        WorkerOutcome::Restarted
                    }
                    Err(e) => {
                        error!(
                            worker_id = %worker.id,
                            error = %e,
                            "Restart of unreachable worker failed, marking critical"
                        );
                        self.state.update(&worker.id, |r| r.mark_critical(e)).await;
                        WorkerOutcome::Critical
                    }
                }
            }
        }
    }

    async fn keep_alive_start(&self, endpoint: &str) -> Result<(), String> {
        let request = StartRequest::new(
            self.config.keep_alive_target,
            self.config.keep_alive_resource.clone(),
            StartMode::KeepAlive,
        );
        self.client
            .start(endpoint, &request, self.timeouts.start())
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{CallKind, MockWorker, MockWorkerClient};
    use crate::adapters::StaticWorkerDirectory;
    use crate::domain::models::{WorkerDescriptor, WorkerStatus};
    use std::time::{Duration, Instant};

    fn fast_timeouts() -> TimeoutConfig {
        TimeoutConfig {
            status_ms: 100,
            start_ms: 100,
            stop_ms: 100,
            metric_ms: 100,
        }
    }

    fn setup(
        workers: Vec<WorkerDescriptor>,
    ) -> (Arc<ReconciliationLoop>, Arc<FleetState>, MockWorkerClient) {
        let state = Arc::new(FleetState::default());
        let client = MockWorkerClient::new();
        let reconciler = ReconciliationLoop::new(
            state.clone(),
            Arc::new(StaticWorkerDirectory::new(workers)),
            Arc::new(client.clone()),
            ReconciliationConfig {
                unit_timeout_ms: 1_000,
                ..Default::default()
            },
            fast_timeouts(),
        );
        (Arc::new(reconciler), state, client)
    }

    fn completed(outcome: TickOutcome) -> ReconcileReport {
        match outcome {
            TickOutcome::Completed(report) => report,
            other => panic!("Expected completed tick, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disabled_worker_is_never_contacted() {
        let (reconciler, state, client) =
            setup(vec![WorkerDescriptor::new("w1", "http://w1").disabled()]);

        let report = completed(reconciler.tick().await);

        assert_eq!(report.skipped_disabled, 1);
        assert_eq!(report.checked, 0);
        assert!(client.calls_for("http://w1").await.is_empty());
        let record = state.worker_snapshot("w1").await.unwrap();
        assert_eq!(record.restart_count, 0);
        assert!(record.last_seen.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_started() {
        let (reconciler, state, client) = setup(vec![WorkerDescriptor::new("w1", "http://w1")]);
        client.set_worker("http://w1", MockWorker::unreachable()).await;

        let report = completed(reconciler.tick().await);

        assert_eq!(report.restarted, 1);
        assert_eq!(client.start_count("http://w1").await, 1);
        let record = state.worker_snapshot("w1").await.unwrap();
        assert_eq!(record.restart_count, 1);
        assert!(!record.critical);
        assert!(record.last_seen.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_worker_with_failed_start_is_critical_until_seen() {
        let (reconciler, state, client) = setup(vec![WorkerDescriptor::new("w1", "http://w1")]);
        client
            .set_worker("http://w1", MockWorker::unreachable().rejecting_start())
            .await;

        let report = completed(reconciler.tick().await);
        assert_eq!(report.critical, 1);
        let record = state.worker_snapshot("w1").await.unwrap();
        assert!(record.critical);
        assert!(record.last_error.is_some());
        assert_eq!(record.restart_count, 0);

        // Still down on the next tick: stays critical
        completed(reconciler.tick().await);
        assert!(state.worker_snapshot("w1").await.unwrap().critical);

        client
            .set_status(
                "http://w1",
                WorkerStatus {
                    running: true,
                    ..Default::default()
                },
            )
            .await;
        completed(reconciler.tick().await);

        let record = state.worker_snapshot("w1").await.unwrap();
        assert!(!record.critical);
        assert!(record.last_error.is_none());
    }

    #[tokio::test]
    async fn test_idle_worker_gets_keep_alive_start() {
        let (reconciler, state, client) = setup(vec![WorkerDescriptor::new("w1", "http://w1")]);

        let report = completed(reconciler.tick().await);

        assert_eq!(report.restarted, 1);
        let requests = client.start_requests("http://w1").await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].mode, StartMode::KeepAlive);
        assert_eq!(requests[0].target, reconciler.config().keep_alive_target);
        assert_eq!(requests[0].resource_ref, reconciler.config().keep_alive_resource);
        assert_eq!(state.worker_snapshot("w1").await.unwrap().restart_count, 1);

        // Now running: nothing to correct
        let report = completed(reconciler.tick().await);
        assert_eq!(report.healthy, 1);
        assert_eq!(client.start_count("http://w1").await, 1);
    }

    #[tokio::test]
    async fn test_failed_keep_alive_start_is_not_critical() {
        let (reconciler, state, client) = setup(vec![WorkerDescriptor::new("w1", "http://w1")]);
        client
            .set_worker("http://w1", MockWorker::default().rejecting_start())
            .await;

        let report = completed(reconciler.tick().await);

        assert_eq!(report.restart_failed, 1);
        let record = state.worker_snapshot("w1").await.unwrap();
        assert!(!record.critical);
        assert!(record.last_error.is_some());
        assert!(record.last_seen.is_some());
    }

    #[tokio::test]
    async fn test_job_assigned_worker_is_not_restarted() {
        let (reconciler, state, client) = setup(vec![
            WorkerDescriptor::new("w1", "http://w1"),
            WorkerDescriptor::new("w2", "http://w2"),
        ]);
        completed(reconciler.tick().await);
        client.clear_calls().await;

        state.assign_job("w1", "video123-1-abcd").await;
        client.set_worker("http://w1", MockWorker::default()).await;
        client.set_worker("http://w2", MockWorker::unreachable()).await;
        state.assign_job("w2", "video123-1-abcd").await;

        let report = completed(reconciler.tick().await);

        assert_eq!(report.deferred_to_job, 2);
        assert_eq!(client.start_count("http://w1").await, 0);
        assert_eq!(client.start_count("http://w2").await, 0);
        assert_eq!(client.calls_for("http://w1").await, vec![CallKind::Status]);
    }

    #[tokio::test]
    async fn test_reconciliation_switch_off_skips_tick() {
        let (reconciler, state, client) = setup(vec![WorkerDescriptor::new("w1", "http://w1")]);
        state.set_reconciliation_enabled(false);

        assert_eq!(reconciler.tick().await, TickOutcome::Disabled);
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let (reconciler, _state, client) = setup(vec![WorkerDescriptor::new("w1", "http://w1")]);
        client.set_worker("http://w1", MockWorker::hanging()).await;

        let first = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.tick().await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(reconciler.tick().await, TickOutcome::Overlapping);
        assert!(matches!(first.await.unwrap(), TickOutcome::Completed(_)));
        assert!(matches!(reconciler.tick().await, TickOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_slow_worker_does_not_stall_fleet() {
        let state = Arc::new(FleetState::default());
        let client = MockWorkerClient::new();
        client.set_worker("http://slow", MockWorker::hanging()).await;
        client.set_worker("http://fast", MockWorker::running()).await;
        let reconciler = ReconciliationLoop::new(
            state.clone(),
            Arc::new(StaticWorkerDirectory::new(vec![
                WorkerDescriptor::new("slow", "http://slow"),
                WorkerDescriptor::new("fast", "http://fast"),
            ])),
            Arc::new(client.clone()),
            ReconciliationConfig {
                unit_timeout_ms: 150,
                ..Default::default()
            },
            TimeoutConfig {
                status_ms: 10_000,
                start_ms: 10_000,
                ..fast_timeouts()
            },
        );

        let started = Instant::now();
        let report = completed(reconciler.tick().await);

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.healthy, 1);
        let slow = state.worker_snapshot("slow").await.unwrap();
        assert_eq!(slow.last_error.as_deref(), Some("reconciliation timed out"));
    }

    #[tokio::test]
    async fn test_unreadable_directory_uses_last_known_fleet() {
        use crate::adapters::FileWorkerDirectory;
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id":"w1","endpoint":"http://w1"}}]"#).unwrap();

        let state = Arc::new(FleetState::default());
        let client = MockWorkerClient::new();
        client.set_worker("http://w1", MockWorker::running()).await;
        let reconciler = ReconciliationLoop::new(
            state.clone(),
            Arc::new(FileWorkerDirectory::new(file.path())),
            Arc::new(client.clone()),
            ReconciliationConfig::default(),
            fast_timeouts(),
        );

        completed(reconciler.tick().await);

        std::fs::write(file.path(), "{broken").unwrap();
        let report = completed(reconciler.tick().await);

        assert_eq!(report.healthy, 1);
        assert_eq!(client.status_count("http://w1").await, 2);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let (reconciler, _state, client) = setup(vec![WorkerDescriptor::new("w1", "http://w1")]);
        client.set_worker("http://w1", MockWorker::running()).await;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = reconciler.start(shutdown_rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.is_ok(), "Reconciliation loop should shut down gracefully");
        assert!(client.status_count("http://w1").await >= 1);
    }
}
