//! Worker domain model.
//!
//! A worker is a remote process exposing `start`, `stop` and `status`
//! endpoints. The fleet is the set of workers the reconciliation loop
//! keeps busy.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A worker as listed by the worker directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    /// Stable opaque identifier
    pub id: String,
    /// Base URL of the worker's HTTP surface
    pub endpoint: String,
    /// Externally controlled enable switch
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

impl WorkerDescriptor {
    /// Enabled worker at `endpoint`.
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            enabled: true,
        }
    }

    /// Same worker with the enable switch off.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Supervision record for one worker.
///
/// `last_seen`, `restart_count`, `critical` and `last_error` are owned by the
/// reconciliation loop. `assigned_jobs` is owned by the job monitor. Both
/// write under the same per-worker lock in [`crate::services::FleetState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Stable id from the directory
    pub id: String,
    /// Base URL, refreshed from the directory
    pub endpoint: String,
    /// Disabled workers are never contacted
    pub enabled: bool,
    /// Last successful status fetch
    pub last_seen: Option<DateTime<Utc>>,
    /// Successful restarts issued by the reconciliation loop. Never reset.
    pub restart_count: u64,
    /// Set when a restart of an unreachable worker failed; cleared by the
    /// next successful status fetch.
    pub critical: bool,
    /// Latest failure seen by either loop
    pub last_error: Option<String>,
    /// Running jobs this worker is assigned to
    #[serde(default)]
    pub assigned_jobs: BTreeSet<String>,
}

impl WorkerRecord {
    /// Record for a worker seen for the first time.
    pub fn new(descriptor: &WorkerDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            endpoint: descriptor.endpoint.clone(),
            enabled: descriptor.enabled,
            last_seen: None,
            restart_count: 0,
            critical: false,
            last_error: None,
            assigned_jobs: BTreeSet::new(),
        }
    }

    /// Apply directory-owned fields without touching loop-owned state.
    pub fn apply_descriptor(&mut self, descriptor: &WorkerDescriptor) {
        self.endpoint.clone_from(&descriptor.endpoint);
        self.enabled = descriptor.enabled;
    }

    /// Record a successful status fetch.
    pub fn mark_seen(&mut self, at: DateTime<Utc>) {
        self.last_seen = Some(at);
        self.critical = false;
        self.last_error = None;
    }

    /// Record a successful restart.
    pub fn mark_restarted(&mut self) {
        self.restart_count += 1;
    }

    /// Record a failure without escalating.
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Escalate to critical and record the cause.
    pub fn mark_critical(&mut self, error: impl Into<String>) {
        self.critical = true;
        self.last_error = Some(error.into());
    }

    /// Whether a running job currently owns this worker's restarts.
    pub fn is_job_assigned(&self) -> bool {
        !self.assigned_jobs.is_empty()
    }
}

/// Label passed through to the worker describing why it was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    /// Fleet keep-alive start with a placeholder resource
    KeepAlive,
    /// Goal-directed start on behalf of a job
    Goal,
}

impl StartMode {
    /// Wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeepAlive => "keep_alive",
            Self::Goal => "goal",
        }
    }
}

/// Body of `POST {endpoint}/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Counter value the worker should work toward
    pub target: i64,
    /// Resource the worker should act on
    pub resource_ref: String,
    /// Passed through for the worker's own observability
    pub mode: StartMode,
}

impl StartRequest {
    /// Build a start body.
    pub fn new(target: i64, resource_ref: impl Into<String>, mode: StartMode) -> Self {
        Self {
            target,
            resource_ref: resource_ref.into(),
            mode,
        }
    }
}

/// Body of `GET {endpoint}/status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Whether the worker is currently executing its task
    pub running: bool,
    /// Cumulative successful task executions
    pub success: u64,
    /// Cumulative task requests
    pub requests: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults_to_enabled() {
        let descriptor: WorkerDescriptor =
            serde_json::from_str(r#"{"id":"w1","endpoint":"http://w1"}"#).unwrap();
        assert!(descriptor.enabled);
    }

    #[test]
    fn test_apply_descriptor_preserves_loop_fields() {
        let mut record = WorkerRecord::new(&WorkerDescriptor::new("w1", "http://w1"));
        record.mark_restarted();
        record.mark_critical("boom");

        record.apply_descriptor(&WorkerDescriptor::new("w1", "http://w1-new").disabled());

        assert_eq!(record.endpoint, "http://w1-new");
        assert!(!record.enabled);
        assert_eq!(record.restart_count, 1);
        assert!(record.critical);
    }

    #[test]
    fn test_mark_seen_clears_critical() {
        let mut record = WorkerRecord::new(&WorkerDescriptor::new("w1", "http://w1"));
        record.mark_critical("restart failed");
        record.mark_seen(Utc::now());

        assert!(!record.critical);
        assert!(record.last_error.is_none());
        assert!(record.last_seen.is_some());
    }

    #[test]
    fn test_start_request_wire_format() {
        let request = StartRequest::new(6000, "video123", StartMode::Goal);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"target": 6000, "resourceRef": "video123", "mode": "goal"})
        );
    }

    #[test]
    fn test_status_parses() {
        let status: WorkerStatus =
            serde_json::from_str(r#"{"running":true,"success":12,"requests":40}"#).unwrap();
        assert!(status.running);
        assert_eq!(status.success, 12);
        assert_eq!(status.requests, 40);
    }
}
