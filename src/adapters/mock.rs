//! In-memory collaborators for testing.
//!
//! `MockWorkerClient` simulates a set of workers keyed by endpoint and
//! records every call made against them. `MockMetricSource` serves
//! scripted metric values per resource.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{StartRequest, WorkerStatus};
use crate::domain::ports::{MetricSource, WorkerClient};

/// Simulated behavior of one worker endpoint.
#[derive(Debug, Clone)]
pub struct MockWorker {
    /// Status endpoint answers
    pub reachable: bool,
    /// Answer to status calls
    pub status: WorkerStatus,
    /// Start calls succeed
    pub accept_start: bool,
    /// Stop calls succeed
    pub accept_stop: bool,
    /// Every call blocks until the caller's timeout elapses
    pub hang: bool,
    /// Every call answers after this long, or times out if the caller's
    /// timeout is shorter
    pub latency: Duration,
    /// A successful start flips `status.running` to true
    pub start_sets_running: bool,
}

impl Default for MockWorker {
    fn default() -> Self {
        Self {
            reachable: true,
            status: WorkerStatus::default(),
            accept_start: true,
            accept_stop: true,
            hang: false,
            latency: Duration::ZERO,
            start_sets_running: true,
        }
    }
}

impl MockWorker {
    /// Reachable and already running.
    pub fn running() -> Self {
        Self {
            status: WorkerStatus {
                running: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Every call fails at once.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Default::default()
        }
    }

    /// Reports `running == false` forever, even after accepting a start.
    pub fn stuck_idle() -> Self {
        Self {
            start_sets_running: false,
            ..Default::default()
        }
    }

    /// Start calls fail.
    pub fn rejecting_start(mut self) -> Self {
        self.accept_start = false;
        self
    }

    /// Every call blocks until it times out.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Apply hang or latency. `Err` means the call timed out.
    async fn respond(&self, endpoint: &str, timeout: Duration) -> DomainResult<()> {
        if self.hang || self.latency >= timeout {
            tokio::time::sleep(timeout).await;
            return Err(DomainError::unreachable(endpoint, "timed out"));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(())
    }
}

/// Kind of call made against a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    /// Start with the given request
    Start(StartRequest),
    /// Stop
    Stop,
    /// Status poll
    Status,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCall {
    /// Endpoint the call was sent to
    pub endpoint: String,
    /// What was asked
    pub kind: CallKind,
}

#[derive(Debug, Default)]
struct MockWorkerState {
    workers: HashMap<String, MockWorker>,
    calls: Vec<WorkerCall>,
}

/// Mock worker client for testing.
#[derive(Debug, Clone, Default)]
pub struct MockWorkerClient {
    state: Arc<RwLock<MockWorkerState>>,
}

impl MockWorkerClient {
    /// Empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the behavior of one endpoint.
    pub async fn set_worker(&self, endpoint: impl Into<String>, worker: MockWorker) {
        self.state
            .write()
            .await
            .workers
            .insert(endpoint.into(), worker);
    }

    /// Change the status an installed worker reports.
    pub async fn set_status(&self, endpoint: &str, status: WorkerStatus) {
        let mut state = self.state.write().await;
        let worker = state.workers.entry(endpoint.to_string()).or_default();
        worker.reachable = true;
        worker.status = status;
    }

    /// Every call so far, in order.
    pub async fn calls(&self) -> Vec<WorkerCall> {
        self.state.read().await.calls.clone()
    }

    /// Calls made against one endpoint.
    pub async fn calls_for(&self, endpoint: &str) -> Vec<CallKind> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .map(|c| c.kind.clone())
            .collect()
    }

    /// Start requests sent to one endpoint.
    pub async fn start_requests(&self, endpoint: &str) -> Vec<StartRequest> {
        self.calls_for(endpoint)
            .await
            .into_iter()
            .filter_map(|kind| match kind {
                CallKind::Start(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Number of start calls to one endpoint.
    pub async fn start_count(&self, endpoint: &str) -> usize {
        self.start_requests(endpoint).await.len()
    }

    /// Number of stop calls to one endpoint.
    pub async fn stop_count(&self, endpoint: &str) -> usize {
        self.calls_for(endpoint)
            .await
            .iter()
            .filter(|kind| matches!(kind, CallKind::Stop))
            .count()
    }

    /// Number of status calls to one endpoint.
    pub async fn status_count(&self, endpoint: &str) -> usize {
        self.calls_for(endpoint)
            .await
            .iter()
            .filter(|kind| matches!(kind, CallKind::Status))
            .count()
    }

    /// Forget recorded calls.
    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }

    /// Record the call and return the worker's current behavior.
    async fn record(&self, endpoint: &str, kind: CallKind) -> MockWorker {
        let mut state = self.state.write().await;
        state.calls.push(WorkerCall {
            endpoint: endpoint.to_string(),
            kind,
        });
        state.workers.get(endpoint).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl WorkerClient for MockWorkerClient {
    async fn start(
        &self,
        endpoint: &str,
        request: &StartRequest,
        timeout: Duration,
    ) -> DomainResult<()> {
        let worker = self.record(endpoint, CallKind::Start(request.clone())).await;
        worker.respond(endpoint, timeout).await?;
        if !worker.accept_start {
            return Err(DomainError::unreachable(endpoint, "start rejected"));
        }

        let mut state = self.state.write().await;
        let entry = state.workers.entry(endpoint.to_string()).or_default();
        if entry.start_sets_running {
            entry.reachable = true;
            entry.status.running = true;
        }
        Ok(())
    }

    async fn stop(&self, endpoint: &str, timeout: Duration) -> DomainResult<()> {
        let worker = self.record(endpoint, CallKind::Stop).await;
        worker.respond(endpoint, timeout).await?;
        if !worker.accept_stop {
            return Err(DomainError::unreachable(endpoint, "stop rejected"));
        }

        let mut state = self.state.write().await;
        state
            .workers
            .entry(endpoint.to_string())
            .or_default()
            .status
            .running = false;
        Ok(())
    }

    async fn get_status(&self, endpoint: &str, timeout: Duration) -> DomainResult<WorkerStatus> {
        let worker = self.record(endpoint, CallKind::Status).await;
        worker.respond(endpoint, timeout).await?;
        if !worker.reachable {
            return Err(DomainError::unreachable(endpoint, "connection refused"));
        }
        Ok(worker.status)
    }
}

/// Mock metric source for testing.
#[derive(Debug, Clone, Default)]
pub struct MockMetricSource {
    values: Arc<RwLock<HashMap<String, Option<i64>>>>,
    reads: Arc<RwLock<Vec<String>>>,
    latency: Arc<RwLock<Duration>>,
}

impl MockMetricSource {
    /// Empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metric value returned for a resource.
    pub async fn set_value(&self, resource_id: &str, value: i64) {
        self.values
            .write()
            .await
            .insert(resource_id.to_string(), Some(value));
    }

    /// Make reads for a resource fail.
    pub async fn set_unavailable(&self, resource_id: &str) {
        self.values
            .write()
            .await
            .insert(resource_id.to_string(), None);
    }

    /// Delay every read by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = latency;
    }

    /// Number of reads for a resource.
    pub async fn read_count(&self, resource_id: &str) -> usize {
        self.reads
            .read()
            .await
            .iter()
            .filter(|r| r.as_str() == resource_id)
            .count()
    }
}

#[async_trait]
impl MetricSource for MockMetricSource {
    async fn read(&self, resource_id: &str, timeout: Duration) -> DomainResult<i64> {
        self.reads.write().await.push(resource_id.to_string());

        let latency = *self.latency.read().await;
        if latency >= timeout {
            tokio::time::sleep(timeout).await;
            return Err(DomainError::metric_unavailable(resource_id, "timed out"));
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.values
            .read()
            .await
            .get(resource_id)
            .copied()
            .flatten()
            .ok_or_else(|| DomainError::metric_unavailable(resource_id, "no value scripted"))
    }
}
