//! Fleet, job and configuration models.

pub mod config;
pub mod job;
pub mod worker;

pub use config::{
    Config, DirectoryConfig, LoggingConfig, MetricConfig, MonitorConfig, ReconciliationConfig,
    TimeoutConfig,
};
pub use job::{AssignedWorker, JobRecord, JobStatus, WorkerJobState};
pub use worker::{StartMode, StartRequest, WorkerDescriptor, WorkerRecord, WorkerStatus};
