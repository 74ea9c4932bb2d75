//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - WorkerClient: start/stop/status commands against one worker
//! - WorkerDirectory: fleet membership
//! - MetricSource: the metric a job is driving toward its goal

pub mod metric_source;
pub mod worker_client;
pub mod worker_directory;

pub use metric_source::MetricSource;
pub use worker_client::WorkerClient;
pub use worker_directory::WorkerDirectory;
