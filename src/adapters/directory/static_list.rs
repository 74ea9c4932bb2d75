//! In-memory worker directory.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::WorkerDescriptor;
use crate::domain::ports::WorkerDirectory;

/// Worker list held in memory, editable at runtime.
///
/// Backs inline `directory.workers` configuration and the test suites.
#[derive(Debug, Clone, Default)]
pub struct StaticWorkerDirectory {
    workers: Arc<RwLock<Vec<WorkerDescriptor>>>,
}

impl StaticWorkerDirectory {
    /// Directory with a fixed starting list.
    pub fn new(workers: Vec<WorkerDescriptor>) -> Self {
        Self {
            workers: Arc::new(RwLock::new(workers)),
        }
    }

    /// Insert a worker or replace the one with the same id.
    pub async fn upsert(&self, descriptor: WorkerDescriptor) {
        let mut workers = self.workers.write().await;
        match workers.iter_mut().find(|w| w.id == descriptor.id) {
            Some(existing) => *existing = descriptor,
            None => workers.push(descriptor),
        }
    }

    /// Flip a worker's enable switch. Returns false for unknown ids.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut workers = self.workers.write().await;
        workers
            .iter_mut()
            .find(|w| w.id == id)
            .map(|w| w.enabled = enabled)
            .is_some()
    }

    /// Drop a worker from the listing.
    pub async fn remove(&self, id: &str) {
        self.workers.write().await.retain(|w| w.id != id);
    }
}

#[async_trait]
impl WorkerDirectory for StaticWorkerDirectory {
    async fn list(&self) -> DomainResult<Vec<WorkerDescriptor>> {
        Ok(self.workers.read().await.clone())
    }
}
