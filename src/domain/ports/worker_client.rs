//! Worker client port - interface for commanding one remote worker.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{StartRequest, WorkerStatus};

/// Issues commands against a single worker endpoint.
///
/// Every call carries a caller-chosen timeout. Any transport failure,
/// non-2xx response, timeout or unparseable body surfaces as
/// [`crate::domain::DomainError::WorkerUnreachable`]. Implementations never
/// retry; retry policy belongs to the tick loops.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// `POST {endpoint}/start`
    async fn start(
        &self,
        endpoint: &str,
        request: &StartRequest,
        timeout: Duration,
    ) -> DomainResult<()>;

    /// `POST {endpoint}/stop`
    async fn stop(&self, endpoint: &str, timeout: Duration) -> DomainResult<()>;

    /// `GET {endpoint}/status`
    async fn get_status(&self, endpoint: &str, timeout: Duration) -> DomainResult<WorkerStatus>;
}
