//! Job monitor.
//!
//! Owns every [`JobRecord`]. Each tick, for every running job:
//! 1. reads the metric and polls every assigned worker, concurrently
//!    (an unavailable metric skips this tick's decision)
//! 2. completes the job and stops its workers once the goal is reached
//! 3. otherwise, if no assigned worker is running, spends one auto-restart
//!    attempt, and ends the job as `RESTART_EXHAUSTED` once the attempt
//!    that uses up the budget has been made
//!
//! Decisions are taken under the job's lock; network calls run after it is
//! released, so status queries never wait on a worker. A terminal transition
//! is recorded before its stop fan-out starts and the fan-out is never
//! cancelled by the per-job timeout, so every ended job releases its workers
//! and gets exactly one stop attempt per worker.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    JobRecord, JobStatus, MonitorConfig, StartMode, StartRequest, TimeoutConfig, WorkerJobState,
    WorkerRecord, WorkerStatus,
};
use crate::domain::ports::{MetricSource, WorkerClient};
use crate::services::fleet_state::FleetState;
use crate::services::tick_guard::TickGuard;

type JobEntry = Arc<Mutex<JobRecord>>;
type CallResults = Vec<(String, DomainResult<()>)>;

/// What happened to one job during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    /// Ended before this tick got to it
    Skipped,
    MetricUnavailable,
    Progressing,
    Restarted,
    Completed,
    Exhausted,
    TimedOut,
}

/// Work decided under the job lock and carried out after it is released.
enum JobAction {
    Done(JobOutcome),
    Restart {
        targets: Vec<WorkerRecord>,
        request: StartRequest,
        /// This attempt uses up the budget
        last_attempt: bool,
    },
    /// The job already ended; its workers still need releasing and stopping
    Stop {
        assigned: Vec<String>,
        targets: Vec<WorkerRecord>,
        outcome: JobOutcome,
    },
}

/// Tally of one completed monitor tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    /// Running jobs visited
    pub scanned: usize,
    /// Jobs with at least one worker running
    pub progressing: usize,
    /// Jobs whose decision was deferred to a later tick
    pub metric_unavailable: usize,
    /// Jobs that spent a restart attempt and are still running
    pub restarted: usize,
    /// Jobs that reached their goal this tick
    pub completed: usize,
    /// Jobs that ran out of restart attempts this tick
    pub exhausted: usize,
    /// Jobs whose metric read and status polls overran the unit timeout
    pub timed_out: usize,
}

impl MonitorReport {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Skipped => {}
            JobOutcome::MetricUnavailable => self.metric_unavailable += 1,
            JobOutcome::Progressing => self.progressing += 1,
            JobOutcome::Restarted => self.restarted += 1,
            JobOutcome::Completed => self.completed += 1,
            JobOutcome::Exhausted => self.exhausted += 1,
            JobOutcome::TimedOut => self.timed_out += 1,
        }
    }

    /// True when the tick restarted or ended at least one job.
    pub fn had_transitions(&self) -> bool {
        self.restarted + self.completed + self.exhausted > 0
    }
}

/// Result of asking for a monitor tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTickOutcome {
    /// The tick ran over every running job
    Completed(MonitorReport),
    /// Another tick was still in flight
    Overlapping,
}

/// Tracks goal-directed jobs and drives them to completion.
pub struct JobMonitor {
    state: Arc<FleetState>,
    metrics: Arc<dyn MetricSource>,
    client: Arc<dyn WorkerClient>,
    config: MonitorConfig,
    timeouts: TimeoutConfig,
    jobs: RwLock<HashMap<String, JobEntry>>,
    in_tick: AtomicBool,
}

impl JobMonitor {
    /// Create a monitor with no jobs.
    pub fn new(
        state: Arc<FleetState>,
        metrics: Arc<dyn MetricSource>,
        client: Arc<dyn WorkerClient>,
        config: MonitorConfig,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            state,
            metrics,
            client,
            config,
            timeouts,
            jobs: RwLock::new(HashMap::new()),
            in_tick: AtomicBool::new(false),
        }
    }

    /// Monitor settings in effect.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Create a job driving `resource_id` up by `delta`.
    ///
    /// Every enabled worker is assigned and sent a goal-directed start.
    /// Jobs for the same resource are tracked independently. The whole call
    /// is bounded by the longer of the metric and start timeouts; starts that
    /// do not answer in time are recorded as failed and left to the monitor's
    /// restart budget.
    pub async fn create_job(&self, resource_id: &str, delta: i64) -> DomainResult<JobRecord> {
        let deadline = Instant::now() + self.timeouts.metric().max(self.timeouts.start());
        let start_value = self.read_metric(resource_id).await?;

        let workers = self.state.enabled_workers().await;
        if workers.is_empty() {
            return Err(DomainError::ValidationFailed(
                "no enabled workers to assign".to_string(),
            ));
        }

        let mut job = JobRecord::new(
            resource_id,
            start_value,
            delta,
            workers.iter().map(|w| w.id.clone()),
        )?;

        for worker in &workers {
            self.state.assign_job(&worker.id, &job.job_id).await;
        }

        let request = StartRequest::new(job.goal_value, resource_id, StartMode::Goal);
        let budget = deadline.saturating_duration_since(Instant::now());
        let results = self.send_starts(&workers, &request, budget).await;
        let accepted = record_starts(&mut job, results);

        info!(
            job_id = %job.job_id,
            resource_id = %resource_id,
            start_value = job.start_value,
            goal_value = job.goal_value,
            workers = workers.len(),
            accepted,
            "Created job"
        );

        let snapshot = job.clone();
        self.jobs
            .write()
            .await
            .insert(job.job_id.clone(), Arc::new(Mutex::new(job)));
        Ok(snapshot)
    }

    /// Stop a job. Stopping a job that already ended is a no-op.
    pub async fn stop_job(&self, job_id: &str) -> DomainResult<JobRecord> {
        let entry = self.entry(job_id).await?;
        match self.end_job(&entry, JobStatus::Stopped).await {
            Some(job) => {
                info!(job_id = %job_id, "Stopped job on request");
                Ok(job)
            }
            None => {
                let job = entry.lock().await.clone();
                debug!(job_id = %job_id, status = job.status.as_str(), "Job already ended, stop ignored");
                Ok(job)
            }
        }
    }

    /// Stop every running job, returning the jobs this call stopped.
    pub async fn stop_all_jobs(&self) -> Vec<JobRecord> {
        let entries: Vec<JobEntry> = self.jobs.read().await.values().cloned().collect();

        let stops = entries
            .iter()
            .map(|entry| self.end_job(entry, JobStatus::Stopped));

        let stopped: Vec<JobRecord> = join_all(stops).await.into_iter().flatten().collect();
        info!(count = stopped.len(), "Stopped all running jobs");
        stopped
    }

    /// Snapshot of one job. Ended jobs keep returning their final state.
    pub async fn get_job_status(&self, job_id: &str) -> DomainResult<JobRecord> {
        let entry = self.entry(job_id).await?;
        let job = entry.lock().await.clone();
        Ok(job)
    }

    /// Snapshots of every job, newest first.
    pub async fn list_jobs(&self) -> Vec<JobRecord> {
        let entries: Vec<JobEntry> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(entry.lock().await.clone());
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    async fn entry(&self, job_id: &str) -> DomainResult<JobEntry> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| DomainError::JobNotFound(job_id.to_string()))
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
                max_restarts = self.config.max_restarts,
                "Started job monitor"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.tick().await {
                            MonitorTickOutcome::Completed(report) if report.had_transitions() => {
                                info!(?report, "Job monitor tick changed jobs");
                            }
                            MonitorTickOutcome::Completed(report) => {
                                debug!(?report, "Job monitor tick completed");
                            }
                            MonitorTickOutcome::Overlapping => {
                                debug!("Previous job monitor tick still running, skipping");
                            }
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal, stopping job monitor");
                        break;
                    }
                }
            }

            info!("Job monitor stopped");
        })
    }

    /// Run one monitoring pass over every running job.
    pub async fn tick(&self) -> MonitorTickOutcome {
        let Some(_guard) = TickGuard::try_acquire(&self.in_tick) else {
            return MonitorTickOutcome::Overlapping;
        };

        let entries: Vec<JobEntry> = self.jobs.read().await.values().cloned().collect();

        let mut report = MonitorReport::default();
        let mut units = Vec::new();
        for entry in entries {
            let snapshot = entry.lock().await.clone();
            if !snapshot.is_running {
                continue;
            }
            report.scanned += 1;
            units.push(self.process_job(entry, snapshot));
        }

        for outcome in join_all(units).await {
            report.record(outcome);
        }

        MonitorTickOutcome::Completed(report)
    }

    /// Budget for the metric read and status polls. The rest of the unit
    /// timeout is kept for one start or stop round.
    fn observe_timeout(&self) -> Duration {
        let unit = self.config.unit_timeout();
        let action = self.timeouts.start().max(self.timeouts.stop());
        match unit.checked_sub(action) {
            Some(budget) if !budget.is_zero() => budget,
            _ => unit,
        }
    }

    async fn process_job(&self, entry: JobEntry, snapshot: JobRecord) -> JobOutcome {
        let observe = async {
            tokio::join!(
                self.read_metric(&snapshot.resource_id),
                self.poll_workers(&snapshot)
            )
        };
        let observe_timeout = self.observe_timeout();
        let Ok((metric, statuses)) = tokio::time::timeout(observe_timeout, observe).await else {
            warn!(
                job_id = %snapshot.job_id,
                timeout_ms = observe_timeout.as_millis() as u64,
                "Job monitoring timed out"
            );
            return JobOutcome::TimedOut;
        };

        let targets = self.enabled_workers(snapshot.assigned_workers.keys()).await;
        let action = {
            let mut job = entry.lock().await;
            self.decide(&mut job, metric, statuses, targets)
        };

        match action {
            JobAction::Done(outcome) => outcome,
            JobAction::Stop {
                assigned,
                targets,
                outcome,
            } => {
                self.stop_ended_job(&entry, &assigned, &targets).await;
                outcome
            }
            JobAction::Restart {
                targets,
                request,
                last_attempt,
            } => {
                self.restart_job(&entry, &targets, &request, last_attempt)
                    .await
            }
        }
    }

    /// Fold this tick's observations into the job and pick the next step.
    fn decide(
        &self,
        job: &mut JobRecord,
        metric: DomainResult<i64>,
        statuses: Vec<(String, Result<WorkerStatus, String>)>,
        targets: Vec<WorkerRecord>,
    ) -> JobAction {
        if !job.is_running {
            return JobAction::Done(JobOutcome::Skipped);
        }

        for (worker_id, result) in statuses {
            job.record_worker_status(&worker_id, result);
        }

        match metric {
            Ok(value) => job.observe_value(value),
            Err(e) => {
                debug!(job_id = %job.job_id, error = %e, "Metric unavailable, deferring decision");
                return JobAction::Done(JobOutcome::MetricUnavailable);
            }
        }

        if job.goal_reached() {
            info!(
                job_id = %job.job_id,
                current_value = job.current_value,
                goal_value = job.goal_value,
                "Job reached its goal"
            );
            job.finish(JobStatus::Completed, Utc::now());
            return JobAction::Stop {
                assigned: job.worker_ids(),
                targets,
                outcome: JobOutcome::Completed,
            };
        }

        if job.any_worker_running() {
            return JobAction::Done(JobOutcome::Progressing);
        }

        if job.restart_attempts >= self.config.max_restarts {
            warn!(
                job_id = %job.job_id,
                restart_attempts = job.restart_attempts,
                progress = job.progress(),
                "Restart budget exhausted with goal unmet"
            );
            job.finish(JobStatus::RestartExhausted, Utc::now());
            return JobAction::Stop {
                assigned: job.worker_ids(),
                targets,
                outcome: JobOutcome::Exhausted,
            };
        }

        job.restart_attempts += 1;
        JobAction::Restart {
            targets,
            request: StartRequest::new(job.goal_value, job.resource_id.clone(), StartMode::Goal),
            last_attempt: job.restart_attempts >= self.config.max_restarts,
        }
    }

    /// Send one restart round and record it. The round that uses up the
    /// budget ends the job as `RESTART_EXHAUSTED` in the same tick.
    async fn restart_job(
        &self,
        entry: &JobEntry,
        targets: &[WorkerRecord],
        request: &StartRequest,
        last_attempt: bool,
    ) -> JobOutcome {
        let results = self.send_starts(targets, request, self.timeouts.start()).await;

        let mut job = entry.lock().await;
        if !job.is_running {
            // Stopped while the starts were in flight
            let started: Vec<WorkerRecord> = targets
                .iter()
                .filter(|w| results.iter().any(|(id, r)| id == &w.id && r.is_ok()))
                .cloned()
                .collect();
            drop(job);
            if !started.is_empty() {
                info!(workers = started.len(), "Job ended during restart, stopping restarted workers");
                let stops = self.send_stops(&started).await;
                record_stops(&mut *entry.lock().await, stops);
            }
            return JobOutcome::Skipped;
        }

        let accepted = record_starts(&mut job, results);
        job.last_restart_accepted = Some(accepted);
        job.degraded = accepted == 0;

        if job.degraded {
            error!(
                job_id = %job.job_id,
                restart_attempts = job.restart_attempts,
                max_restarts = self.config.max_restarts,
                "No worker accepted the restart"
            );
        } else {
            info!(
                job_id = %job.job_id,
                restart_attempts = job.restart_attempts,
                accepted,
                "Restarted idle job workers"
            );
        }

        if !last_attempt {
            return JobOutcome::Restarted;
        }

        warn!(
            job_id = %job.job_id,
            restart_attempts = job.restart_attempts,
            progress = job.progress(),
            "Restart budget exhausted with goal unmet"
        );
        job.finish(JobStatus::RestartExhausted, Utc::now());
        let assigned = job.worker_ids();
        drop(job);

        self.stop_ended_job(entry, &assigned, targets).await;
        JobOutcome::Exhausted
    }

    /// End a running job and stop its workers. Returns `None` if the job had
    /// already ended.
    async fn end_job(&self, entry: &JobEntry, status: JobStatus) -> Option<JobRecord> {
        let assigned = {
            let mut job = entry.lock().await;
            if !job.finish(status, Utc::now()) {
                return None;
            }
            job.worker_ids()
        };

        let targets = self.enabled_workers(assigned.iter()).await;
        self.stop_ended_job(entry, &assigned, &targets).await;
        let job = entry.lock().await.clone();
        Some(job)
    }

    /// Release an ended job's workers and stop them, best effort.
    async fn stop_ended_job(&self, entry: &JobEntry, assigned: &[String], targets: &[WorkerRecord]) {
        let job_id = entry.lock().await.job_id.clone();
        for worker_id in assigned {
            self.state.release_job(worker_id, &job_id).await;
        }

        let results = self.send_stops(targets).await;
        for (worker_id, result) in &results {
            if let Err(e) = result {
                warn!(job_id = %job_id, worker_id = %worker_id, error = %e, "Failed to stop worker");
            }
        }
        record_stops(&mut *entry.lock().await, results);
    }

    async fn send_starts(
        &self,
        workers: &[WorkerRecord],
        request: &StartRequest,
        timeout: Duration,
    ) -> CallResults {
        let starts = workers.iter().map(|worker| async move {
            let result = self.client.start(&worker.endpoint, request, timeout).await;
            (worker.id.clone(), result)
        });
        join_all(starts).await
    }

    async fn send_stops(&self, workers: &[WorkerRecord]) -> CallResults {
        let stops = workers.iter().map(|worker| async move {
            let result = self
                .client
                .stop(&worker.endpoint, self.timeouts.stop())
                .await;
            (worker.id.clone(), result)
        });
        join_all(stops).await
    }

    /// Status of every assigned worker. Disabled or unknown workers are not
    /// contacted.
    async fn poll_workers(&self, job: &JobRecord) -> Vec<(String, Result<WorkerStatus, String>)> {
        let mut polls = Vec::new();
        let mut skipped = Vec::new();
        for worker_id in job.assigned_workers.keys() {
            match self.state.worker_snapshot(worker_id).await {
                Some(worker) if worker.enabled => polls.push(worker),
                Some(_) => skipped.push((worker_id.clone(), Err("worker disabled".to_string()))),
                None => skipped.push((worker_id.clone(), Err("worker unknown".to_string()))),
            }
        }

        let fetches = polls.iter().map(|worker| async move {
            let result = self
                .client
                .get_status(&worker.endpoint, self.timeouts.status())
                .await
                .map_err(|e| e.to_string());
            (worker.id.clone(), result)
        });

        let mut results = join_all(fetches).await;
        results.extend(skipped);
        results
    }

    async fn enabled_workers<'a>(
        &self,
        worker_ids: impl Iterator<Item = &'a String>,
    ) -> Vec<WorkerRecord> {
        let mut workers = Vec::new();
        for worker_id in worker_ids {
            if let Some(worker) = self.state.worker_snapshot(worker_id).await {
                if worker.enabled {
                    workers.push(worker);
                }
            }
        }
        workers
    }

    async fn read_metric(&self, resource_id: &str) -> DomainResult<i64> {
        let timeout = self.timeouts.metric();
        match tokio::time::timeout(timeout, self.metrics.read(resource_id, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::metric_unavailable(resource_id, "timed out")),
        }
    }
}

/// Record start results as per-worker sub-status. Returns how many accepted.
fn record_starts(job: &mut JobRecord, results: CallResults) -> usize {
    let mut accepted = 0;
    for (worker_id, result) in results {
        match result {
            Ok(()) => {
                accepted += 1;
                job.set_worker_state(&worker_id, WorkerJobState::Running, None);
            }
            Err(e) => {
                warn!(job_id = %job.job_id, worker_id = %worker_id, error = %e, "Worker rejected start");
                job.set_worker_state(&worker_id, WorkerJobState::Failed, Some(e.to_string()));
            }
        }
    }
    accepted
}

fn record_stops(job: &mut JobRecord, results: CallResults) {
    for (worker_id, result) in results {
        match result {
            Ok(()) => job.set_worker_state(&worker_id, WorkerJobState::Stopped, None),
            Err(e) => job.set_worker_state(&worker_id, WorkerJobState::Failed, Some(e.to_string())),
        }
    }
}
