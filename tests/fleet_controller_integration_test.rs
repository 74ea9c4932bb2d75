//! End-to-end tests of the controller with both tick loops running
//! against in-memory workers.

mod common;

use std::time::Duration;

use common::{fast_config, test_fleet, wait_for_job_status, wait_until, workers};
use fleetkeeper::adapters::MockWorker;
use fleetkeeper::domain::models::{JobStatus, StartMode, WorkerDescriptor};
use fleetkeeper::DomainError;

#[tokio::test]
async fn test_job_runs_to_completion() {
    common::setup_test_logging();
    let fleet = test_fleet(&fast_config(10), workers(2));
    fleet.metrics.set_value("video123", 1000).await;
    fleet.controller.start().await;

    let job = fleet.controller.create_job("video123", 5000).await.unwrap();
    assert_eq!(job.start_value, 1000);
    assert_eq!(job.goal_value, 6000);

    let controller = &fleet.controller;
    let job_id = job.job_id.as_str();

    fleet.metrics.set_value("video123", 4000).await;
    let progressed = wait_until(
        move || async move { controller.get_job_status(job_id).await.unwrap().current_value == 4000 },
        2000,
    )
    .await;
    assert!(progressed, "Monitor should observe progress");

    fleet.metrics.set_value("video123", 6000).await;
    let completed = wait_for_job_status(controller, job_id, JobStatus::Completed, 2000).await;
    assert!(completed, "Job should complete once the goal is reached");

    // Later ticks must not stop the workers again
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fleet.client.stop_count("http://w1").await, 1);
    assert_eq!(fleet.client.stop_count("http://w2").await, 1);

    let done = fleet.controller.get_job_status(&job.job_id).await.unwrap();
    assert!(!done.is_running);
    assert_eq!(done.progress(), 5000);

    fleet.controller.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_jobs_for_one_resource_complete_independently() {
    let fleet = test_fleet(&fast_config(10), workers(2));
    fleet.metrics.set_value("video123", 1000).await;
    fleet.controller.start().await;

    let (first, second) = tokio::join!(
        fleet.controller.create_job("video123", 100),
        fleet.controller.create_job("video123", 300)
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_ne!(first.job_id, second.job_id);

    let controller = &fleet.controller;
    fleet.metrics.set_value("video123", 1100).await;
    assert!(wait_for_job_status(controller, &first.job_id, JobStatus::Completed, 2000).await);
    let second_now = controller.get_job_status(&second.job_id).await.unwrap();
    assert!(second_now.is_running, "Second job keeps its own goal");

    fleet.metrics.set_value("video123", 1300).await;
    assert!(wait_for_job_status(controller, &second.job_id, JobStatus::Completed, 2000).await);

    let jobs = controller.list_jobs().await;
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));

    fleet.controller.shutdown().await;
}

#[tokio::test]
async fn test_stuck_job_exhausts_restart_budget() {
    let fleet = test_fleet(&fast_config(3), workers(1));
    fleet.client.set_worker("http://w1", MockWorker::stuck_idle()).await;
    fleet.metrics.set_value("video123", 0).await;
    fleet.controller.start().await;

    let job = fleet.controller.create_job("video123", 100).await.unwrap();

    let exhausted =
        wait_for_job_status(&fleet.controller, &job.job_id, JobStatus::RestartExhausted, 3000)
            .await;
    assert!(exhausted, "Job should give up after its restart budget");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let goal_starts = fleet
        .client
        .start_requests("http://w1")
        .await
        .into_iter()
        .filter(|r| r.mode == StartMode::Goal)
        .count();
    assert_eq!(goal_starts, 4, "Initial start plus three restarts");

    let snapshot = fleet.controller.get_job_status(&job.job_id).await.unwrap();
    assert_eq!(snapshot.restart_attempts, 3);
    assert!(snapshot.completed_at.is_some());

    fleet.controller.shutdown().await;
}

#[tokio::test]
async fn test_reconciler_leaves_job_workers_to_the_monitor() {
    let mut config = fast_config(10);
    // Keep the monitor from restarting anything during the test
    config.monitor.interval_ms = 60_000;
    let fleet = test_fleet(&config, workers(1));
    fleet.client.set_worker("http://w1", MockWorker::stuck_idle()).await;
    fleet.metrics.set_value("video123", 0).await;
    fleet.controller.refresh_directory().await.unwrap();

    fleet.controller.create_job("video123", 100).await.unwrap();
    fleet.controller.start().await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    fleet.controller.shutdown().await;

    let requests = fleet.client.start_requests("http://w1").await;
    assert!(
        requests.iter().all(|r| r.mode == StartMode::Goal),
        "No keep-alive start for a job-assigned worker: {requests:?}"
    );
    assert!(fleet.client.status_count("http://w1").await > 0);
}

#[tokio::test]
async fn test_fleet_is_kept_alive() {
    let mut descriptors = workers(2);
    descriptors.push(WorkerDescriptor::new("w3", "http://w3").disabled());
    let fleet = test_fleet(&fast_config(10), descriptors);
    fleet.client.set_worker("http://w2", MockWorker::unreachable()).await;
    fleet.controller.start().await;

    let client = &fleet.client;
    let restarted = wait_until(
        move || async move {
            client.start_count("http://w1").await >= 1 && client.start_count("http://w2").await >= 1
        },
        2000,
    )
    .await;
    assert!(restarted, "Idle and unreachable workers should be started");

    let request = &fleet.client.start_requests("http://w1").await[0];
    assert_eq!(request.mode, StartMode::KeepAlive);
    assert_eq!(request.resource_ref, "idle");
    assert_eq!(request.target, 1_000_000_000);

    let fleet_status = fleet.controller.get_fleet_status().await;
    let w1 = fleet_status.iter().find(|w| w.id == "w1").unwrap();
    assert!(w1.restart_count >= 1);
    assert!(fleet.client.calls_for("http://w3").await.is_empty());

    fleet.controller.shutdown().await;
}

#[tokio::test]
async fn test_switch_off_stops_keep_alive() {
    let fleet = test_fleet(&fast_config(10), workers(1));
    fleet.client.set_worker("http://w1", MockWorker::stuck_idle()).await;
    fleet.controller.set_fleet_reconciliation_enabled(false);
    fleet.controller.start().await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(fleet.client.calls_for("http://w1").await.is_empty());

    fleet.controller.set_fleet_reconciliation_enabled(true);
    let client = &fleet.client;
    let started = wait_until(
        move || async move { client.start_count("http://w1").await >= 1 },
        2000,
    )
    .await;
    assert!(started);

    fleet.controller.shutdown().await;
}

#[tokio::test]
async fn test_directory_changes_are_picked_up() {
    let fleet = test_fleet(&fast_config(10), workers(1));
    fleet.client.set_worker("http://w1", MockWorker::running()).await;
    fleet.controller.start().await;

    fleet
        .directory
        .upsert(WorkerDescriptor::new("w9", "http://w9"))
        .await;
    let controller = &fleet.controller;
    let joined = wait_until(
        move || async move { controller.get_fleet_status().await.len() == 2 },
        2000,
    )
    .await;
    assert!(joined, "New directory entries should join the fleet");

    fleet.directory.set_enabled("w1", false).await;
    let disabled = wait_until(
        move || async move {
            controller
                .get_fleet_status()
                .await
                .iter()
                .any(|w| w.id == "w1" && !w.enabled)
        },
        2000,
    )
    .await;
    assert!(disabled);

    fleet.controller.shutdown().await;
}

#[tokio::test]
async fn test_invalid_jobs_are_rejected() {
    let fleet = test_fleet(&fast_config(10), workers(1));
    fleet.controller.refresh_directory().await.unwrap();
    fleet.metrics.set_value("video123", 500).await;

    let result = fleet.controller.create_job("video123", 0).await;
    assert!(matches!(
        result,
        Err(DomainError::InvalidTarget {
            start: 500,
            goal: 500
        })
    ));
    assert!(fleet.controller.list_jobs().await.is_empty());

    let result = fleet.controller.stop_job("no-such-job").await;
    assert!(matches!(result, Err(DomainError::JobNotFound(_))));
}

#[tokio::test]
async fn test_shutdown_waits_for_loops() {
    let fleet = test_fleet(&fast_config(10), workers(3));
    fleet.controller.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = tokio::time::timeout(Duration::from_secs(2), fleet.controller.shutdown()).await;
    assert!(result.is_ok(), "Shutdown should complete within timeout");
    assert!(!fleet.controller.is_running().await);

    // Nothing runs after shutdown
    let calls = fleet.client.calls().await.len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fleet.client.calls().await.len(), calls);
}
