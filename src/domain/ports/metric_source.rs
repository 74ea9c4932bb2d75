//! Metric source port - current value of the quantity a job drives.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Reads the current counter for a resource.
///
/// [`crate::domain::DomainError::MetricUnavailable`] means "unknown right
/// now", never zero.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Current value for `resource_id`, giving up after `timeout`.
    async fn read(&self, resource_id: &str, timeout: Duration) -> DomainResult<i64>;
}
