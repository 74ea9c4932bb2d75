//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleetkeeper::adapters::{MockMetricSource, MockWorkerClient, StaticWorkerDirectory};
use fleetkeeper::domain::models::{Config, JobStatus, WorkerDescriptor};
use fleetkeeper::FleetController;

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll an async condition every 10ms until it holds or `timeout_ms` passes.
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if predicate().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

/// Wait until the job reports `status`.
#[allow(dead_code)]
pub async fn wait_for_job_status(
    controller: &FleetController,
    job_id: &str,
    status: JobStatus,
    timeout_ms: u64,
) -> bool {
    wait_until(
        move || async move {
            controller
                .get_job_status(job_id)
                .await
                .is_ok_and(|job| job.status == status)
        },
        timeout_ms,
    )
    .await
}

/// Config with fast ticks and short per-call timeouts.
#[allow(dead_code)]
pub fn fast_config(max_restarts: u32) -> Config {
    let mut config = Config::default();
    config.reconciliation.interval_ms = 20;
    config.reconciliation.unit_timeout_ms = 500;
    config.monitor.interval_ms = 20;
    config.monitor.unit_timeout_ms = 500;
    config.monitor.max_restarts = max_restarts;
    config.timeouts.status_ms = 100;
    config.timeouts.start_ms = 100;
    config.timeouts.stop_ms = 100;
    config.timeouts.metric_ms = 100;
    config
}

/// Controller wired to in-memory collaborators.
#[allow(dead_code)]
pub struct TestFleet {
    pub controller: FleetController,
    pub client: MockWorkerClient,
    pub metrics: MockMetricSource,
    pub directory: StaticWorkerDirectory,
}

#[allow(dead_code)]
pub fn test_fleet(config: &Config, workers: Vec<WorkerDescriptor>) -> TestFleet {
    let client = MockWorkerClient::new();
    let metrics = MockMetricSource::new();
    let directory = StaticWorkerDirectory::new(workers);
    let controller = FleetController::new(
        config,
        Arc::new(directory.clone()),
        Arc::new(client.clone()),
        Arc::new(metrics.clone()),
    );
    TestFleet {
        controller,
        client,
        metrics,
        directory,
    }
}

/// `count` enabled workers named w1..wN at http://wN.
#[allow(dead_code)]
pub fn workers(count: usize) -> Vec<WorkerDescriptor> {
    (1..=count)
        .map(|i| WorkerDescriptor::new(format!("w{i}"), format!("http://w{i}")))
        .collect()
}
