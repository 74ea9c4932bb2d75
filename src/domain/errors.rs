//! Domain errors for the fleetkeeper system.

use thiserror::Error;

/// Domain-level errors that can occur while supervising the fleet.
///
/// Only [`DomainError::InvalidTarget`], [`DomainError::JobNotFound`] and
/// [`DomainError::ValidationFailed`] ever reach a caller of the control
/// surface. The other variants are absorbed by the tick loops and recorded
/// on worker or job records.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Transport failure, timeout, non-2xx answer or unparseable body
    #[error("Worker unreachable at {endpoint}: {reason}")]
    WorkerUnreachable { endpoint: String, reason: String },

    /// The metric source had no usable value; retried next tick
    #[error("Metric unavailable for {resource_id}: {reason}")]
    MetricUnavailable { resource_id: String, reason: String },

    /// Job goal does not lie above its start value
    #[error("Invalid target: goal {goal} must be greater than start {start}")]
    InvalidTarget { start: i64, goal: i64 },

    /// The worker directory could not be read
    #[error("Worker directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// No job with this id
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Rejected input on the control surface
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl DomainError {
    /// Build a [`DomainError::WorkerUnreachable`] from any displayable cause.
    pub fn unreachable(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::WorkerUnreachable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`DomainError::MetricUnavailable`] from any displayable cause.
    pub fn metric_unavailable(
        resource_id: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::MetricUnavailable {
            resource_id: resource_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for failures the tick loops retry on their own schedule.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::WorkerUnreachable { .. }
                | Self::MetricUnavailable { .. }
                | Self::DirectoryUnavailable(_)
        )
    }
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
