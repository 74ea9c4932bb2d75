//! Adapters for the external collaborators behind the domain ports.

pub mod directory;
pub mod http;
pub mod mock;

pub use directory::{FileWorkerDirectory, StaticWorkerDirectory};
pub use http::{HttpMetricSource, HttpWorkerClient};
pub use mock::{MockMetricSource, MockWorker, MockWorkerClient};
