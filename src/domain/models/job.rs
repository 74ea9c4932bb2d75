//! Job domain model.
//!
//! A job drives one resource's metric from its value at creation up to a
//! goal, using a set of assigned workers. Jobs are created, mutated and
//! terminated only by the job monitor.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::worker::WorkerStatus;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Goal not yet reached, monitor is scanning the job
    Running,
    /// Goal reached
    Completed,
    /// Stopped on request
    Stopped,
    /// Auto-restart budget consumed with the goal unmet
    RestartExhausted,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl JobStatus {
    /// Lowercase label used in tables and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::RestartExhausted => "restart_exhausted",
        }
    }

    /// True for every status except `Running`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Per-job view of one assigned worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerJobState {
    /// Last seen running, or accepted a start
    Running,
    /// Reported idle, or accepted a stop
    Stopped,
    /// Unreachable, disabled, or rejected a command
    Failed,
}

impl WorkerJobState {
    /// Lowercase label used in tables and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// An assigned worker's sub-status and counters within one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedWorker {
    /// Fleet id of the worker
    pub worker_id: String,
    /// Sub-status within this job
    pub state: WorkerJobState,
    /// Latest cumulative success counter reported by the worker
    pub success: u64,
    /// Latest cumulative request counter reported by the worker
    pub requests: u64,
    /// Error from the latest failed call, if any
    pub last_error: Option<String>,
}

impl AssignedWorker {
    /// Fresh assignment with zeroed counters.
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            state: WorkerJobState::Stopped,
            success: 0,
            requests: 0,
            last_error: None,
        }
    }
}

/// One tracked goal for a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique id, see [`JobRecord::make_job_id`]
    pub job_id: String,
    /// Resource whose metric the job drives
    pub resource_id: String,
    /// Metric value observed at creation
    pub start_value: i64,
    /// `start_value + delta`
    pub goal_value: i64,
    /// Highest metric value observed so far
    pub current_value: i64,
    /// False once the job reached any terminal status
    pub is_running: bool,
    /// Lifecycle status
    pub status: JobStatus,
    /// Sub-status per assigned worker, keyed by worker id
    pub assigned_workers: BTreeMap<String, AssignedWorker>,
    /// Auto-restart rounds spent so far
    pub restart_attempts: u32,
    /// Set when the last auto-restart round was accepted by no worker
    pub degraded: bool,
    /// Workers that accepted the last auto-restart round
    pub last_restart_accepted: Option<usize>,
    /// Sum of the assigned workers' success counters
    pub total_success: u64,
    /// Sum of the assigned workers' request counters
    pub total_requests: u64,
    /// Creation time, also encoded in the id
    pub created_at: DateTime<Utc>,
    /// Set on the transition into any terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a running job for `resource_id`.
    ///
    /// Rejects a delta that does not move the goal above the start value.
    pub fn new<I, S>(
        resource_id: impl Into<String>,
        start_value: i64,
        delta: i64,
        worker_ids: I,
    ) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let resource_id = resource_id.into();
        if resource_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "resource id cannot be empty".to_string(),
            ));
        }

        let goal_value = start_value.saturating_add(delta);
        if goal_value <= start_value {
            return Err(DomainError::InvalidTarget {
                start: start_value,
                goal: goal_value,
            });
        }

        let created_at = Utc::now();
        let assigned_workers = worker_ids
            .into_iter()
            .map(|id| {
                let worker = AssignedWorker::new(id);
                (worker.worker_id.clone(), worker)
            })
            .collect();

        Ok(Self {
            job_id: Self::make_job_id(&resource_id, created_at),
            resource_id,
            start_value,
            goal_value,
            current_value: start_value,
            is_running: true,
            status: JobStatus::Running,
            assigned_workers,
            restart_attempts: 0,
            degraded: false,
            last_restart_accepted: None,
            total_success: 0,
            total_requests: 0,
            created_at,
            completed_at: None,
        })
    }

    /// Derive a job id from the resource and creation time.
    ///
    /// The random suffix keeps ids distinct for jobs created for the same
    /// resource within the same millisecond.
    pub fn make_job_id(resource_id: &str, created_at: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}",
            resource_id,
            created_at.timestamp_millis(),
            &suffix[..8]
        )
    }

    /// Record a metric observation. Lower readings never regress progress.
    pub fn observe_value(&mut self, value: i64) {
        self.current_value = self.current_value.max(value);
    }

    /// `current_value - start_value`, never negative.
    pub fn progress(&self) -> i64 {
        self.current_value.saturating_sub(self.start_value).max(0)
    }

    /// Distance left to the goal, never negative.
    pub fn remaining(&self) -> i64 {
        self.goal_value.saturating_sub(self.current_value).max(0)
    }

    /// Progress as a percentage of the requested delta, capped at 100.
    pub fn progress_percent(&self) -> f64 {
        let span = self.goal_value.saturating_sub(self.start_value) as f64;
        if span <= 0.0 {
            return 100.0;
        }
        (self.progress() as f64 / span * 100.0).min(100.0)
    }

    /// Whether the highest observed value meets the goal.
    pub fn goal_reached(&self) -> bool {
        self.current_value >= self.goal_value
    }

    /// Apply a status poll result for one assigned worker.
    pub fn record_worker_status(&mut self, worker_id: &str, result: Result<WorkerStatus, String>) {
        let Some(worker) = self.assigned_workers.get_mut(worker_id) else {
            return;
        };
        match result {
            Ok(status) => {
                worker.state = if status.running {
                    WorkerJobState::Running
                } else {
                    WorkerJobState::Stopped
                };
                worker.success = status.success;
                worker.requests = status.requests;
                worker.last_error = None;
            }
            Err(error) => {
                worker.state = WorkerJobState::Failed;
                worker.last_error = Some(error);
            }
        }
        self.recompute_totals();
    }

    /// Mark an assigned worker's sub-status directly.
    pub fn set_worker_state(
        &mut self,
        worker_id: &str,
        state: WorkerJobState,
        error: Option<String>,
    ) {
        if let Some(worker) = self.assigned_workers.get_mut(worker_id) {
            worker.state = state;
            worker.last_error = error;
        }
    }

    fn recompute_totals(&mut self) {
        self.total_success = self.assigned_workers.values().map(|w| w.success).sum();
        self.total_requests = self.assigned_workers.values().map(|w| w.requests).sum();
    }

    /// Whether at least one assigned worker is doing work.
    pub fn any_worker_running(&self) -> bool {
        self.assigned_workers
            .values()
            .any(|w| w.state == WorkerJobState::Running)
    }

    /// Ids of every assigned worker.
    pub fn worker_ids(&self) -> Vec<String> {
        self.assigned_workers.keys().cloned().collect()
    }

    /// Move a running job into a terminal status.
    ///
    /// Returns false, leaving the record untouched, if the job already ended.
    pub fn finish(&mut self, status: JobStatus, at: DateTime<Utc>) -> bool {
        if !self.is_running || !status.is_terminal() {
            return false;
        }
        self.is_running = false;
        self.status = status;
        self.completed_at = Some(at);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(start: i64, delta: i64) -> JobRecord {
        JobRecord::new("video123", start, delta, ["w1", "w2"]).unwrap()
    }

    #[test]
    fn test_new_job_goal() {
        let job = job(1000, 5000);
        assert_eq!(job.start_value, 1000);
        assert_eq!(job.goal_value, 6000);
        assert_eq!(job.current_value, 1000);
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.is_running);
        assert_eq!(job.assigned_workers.len(), 2);
        assert!(job.job_id.starts_with("video123-"));
    }

    #[test]
    fn test_non_positive_delta_rejected() {
        for delta in [0, -1, -5000] {
            let result = JobRecord::new("video123", 1000, delta, ["w1"]);
            assert!(matches!(result, Err(DomainError::InvalidTarget { .. })));
        }
    }

    #[test]
    fn test_empty_resource_rejected() {
        let result = JobRecord::new("  ", 0, 10, ["w1"]);
        assert!(matches!(result, Err(DomainError::ValidationFailed(_))));
    }

    #[test]
    fn test_overflowing_goal_rejected() {
        let result = JobRecord::new("video123", i64::MAX, 10, ["w1"]);
        assert!(matches!(result, Err(DomainError::InvalidTarget { .. })));
    }

    #[test]
    fn test_lower_observation_does_not_regress() {
        let mut job = job(1000, 5000);
        job.observe_value(3000);
        job.observe_value(2000);
        assert_eq!(job.current_value, 3000);
        assert_eq!(job.progress(), 2000);
        job.observe_value(500);
        assert_eq!(job.progress(), 2000);
    }

    #[test]
    fn test_progress_percent_and_remaining() {
        let mut job = job(1000, 4000);
        job.observe_value(2000);
        assert!((job.progress_percent() - 25.0).abs() < f64::EPSILON);
        assert_eq!(job.remaining(), 3000);
        job.observe_value(9000);
        assert!((job.progress_percent() - 100.0).abs() < f64::EPSILON);
        assert_eq!(job.remaining(), 0);
        assert!(job.goal_reached());
    }

    #[test]
    fn test_worker_status_aggregation() {
        let mut job = job(0, 100);
        job.record_worker_status(
            "w1",
            Ok(WorkerStatus { running: true, success: 10, requests: 12 }),
        );
        job.record_worker_status(
            "w2",
            Ok(WorkerStatus { running: false, success: 5, requests: 9 }),
        );
        assert_eq!(job.total_success, 15);
        assert_eq!(job.total_requests, 21);
        assert!(job.any_worker_running());

        job.record_worker_status("w1", Err("timeout".to_string()));
        assert_eq!(job.assigned_workers["w1"].state, WorkerJobState::Failed);
        assert_eq!(job.total_success, 15);
        assert!(!job.any_worker_running());
    }

    #[test]
    fn test_finish_is_one_shot() {
        let mut job = job(0, 100);
        let first = Utc::now();
        assert!(job.finish(JobStatus::Completed, first));
        assert!(!job.finish(JobStatus::Stopped, Utc::now()));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, Some(first));
    }

    #[test]
    fn test_finish_rejects_running_status() {
        let mut job = job(0, 100);
        assert!(!job.finish(JobStatus::Running, Utc::now()));
        assert!(job.is_running);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::RestartExhausted).unwrap();
        assert_eq!(json, "\"RESTART_EXHAUSTED\"");
        assert!(JobStatus::Stopped.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
