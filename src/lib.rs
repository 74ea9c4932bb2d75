//! Fleetkeeper - Fleet Reconciliation and Job Monitor
//!
//! Fleetkeeper keeps a fleet of remote worker processes busy and drives
//! goal-directed jobs across them until a monitored metric reaches its
//! target.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Worker and job models, errors, and the ports
//!   for workers, the worker directory and the metric source
//! - **Adapter Layer** (`adapters`): HTTP implementations of the ports,
//!   file/static worker directories, and in-memory doubles
//! - **Service Layer** (`services`): Fleet state, the reconciliation loop,
//!   the job monitor and the controller that fronts them
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use fleetkeeper::{ConfigLoader, FleetController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let controller = FleetController::from_config(&config)?;
//!     controller.start().await;
//!
//!     let job = controller.create_job("video123", 5000).await?;
//!     println!("created {}", job.job_id);
//!
//!     tokio::signal::ctrl_c().await?;
//!     controller.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, JobRecord, JobStatus, StartMode, StartRequest, WorkerDescriptor, WorkerRecord,
    WorkerStatus,
};
pub use domain::ports::{MetricSource, WorkerClient, WorkerDirectory};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{FleetController, FleetState, JobMonitor, ReconciliationLoop};
