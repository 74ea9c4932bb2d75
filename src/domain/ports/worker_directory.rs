//! Worker directory port - source of truth for fleet membership.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::WorkerDescriptor;

/// Lists the workers the fleet should supervise.
///
/// A worker missing from the list is simply not supervised; the
/// directory never reports absence as a failure.
#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    /// Current fleet membership.
    async fn list(&self) -> DomainResult<Vec<WorkerDescriptor>>;
}
