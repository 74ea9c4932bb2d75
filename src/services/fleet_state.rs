//! Shared fleet state.
//!
//! One explicitly owned object holding every known [`WorkerRecord`], handed
//! to both tick loops. Each record sits behind its own mutex so the
//! reconciliation loop and the job monitor never observe a half-applied
//! update, and work on different workers never contends.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::domain::models::{WorkerDescriptor, WorkerRecord};

/// Handle to one worker's record.
type WorkerEntry = Arc<Mutex<WorkerRecord>>;

/// Worker records plus the fleet-wide reconciliation switch.
#[derive(Debug)]
pub struct FleetState {
    workers: RwLock<BTreeMap<String, WorkerEntry>>,
    reconciliation_enabled: AtomicBool,
}

impl Default for FleetState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FleetState {
    /// Empty fleet with the reconciliation switch set as given.
    pub fn new(reconciliation_enabled: bool) -> Self {
        Self {
            workers: RwLock::new(BTreeMap::new()),
            reconciliation_enabled: AtomicBool::new(reconciliation_enabled),
        }
    }

    /// Whether keep-alive reconciliation is switched on.
    pub fn reconciliation_enabled(&self) -> bool {
        self.reconciliation_enabled.load(Ordering::Acquire)
    }

    /// Flip the fleet-wide keep-alive switch. Takes effect on the next tick.
    pub fn set_reconciliation_enabled(&self, enabled: bool) {
        self.reconciliation_enabled.store(enabled, Ordering::Release);
    }

    /// Upsert directory listings.
    ///
    /// Directory-owned fields (`endpoint`, `enabled`) are overwritten; loop
    /// and job fields are preserved. Records missing from the listing are
    /// kept untouched.
    pub async fn register_from_directory(&self, descriptors: &[WorkerDescriptor]) {
        let mut new_entries = Vec::new();
        {
            let workers = self.workers.read().await;
            for descriptor in descriptors {
                match workers.get(&descriptor.id) {
                    Some(entry) => entry.lock().await.apply_descriptor(descriptor),
                    None => new_entries.push(descriptor),
                }
            }
        }

        if new_entries.is_empty() {
            return;
        }

        let mut workers = self.workers.write().await;
        for descriptor in new_entries {
            workers
                .entry(descriptor.id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(WorkerRecord::new(descriptor))));
        }
    }

    async fn entry(&self, worker_id: &str) -> Option<WorkerEntry> {
        self.workers.read().await.get(worker_id).cloned()
    }

    /// Consistent copy of one record.
    pub async fn worker_snapshot(&self, worker_id: &str) -> Option<WorkerRecord> {
        let entry = self.entry(worker_id).await?;
        let record = entry.lock().await.clone();
        Some(record)
    }

    /// Consistent copies of every record, ordered by id.
    pub async fn snapshot(&self) -> Vec<WorkerRecord> {
        let entries: Vec<WorkerEntry> = self.workers.read().await.values().cloned().collect();
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            records.push(entry.lock().await.clone());
        }
        records
    }

    /// Snapshots of enabled workers only.
    pub async fn enabled_workers(&self) -> Vec<WorkerRecord> {
        self.snapshot()
            .await
            .into_iter()
            .filter(|w| w.enabled)
            .collect()
    }

    /// Number of known workers.
    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    /// True before any worker has been registered.
    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }

    /// Apply `f` under the worker's lock. Returns false for unknown ids.
    pub async fn update<F>(&self, worker_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut WorkerRecord),
    {
        let Some(entry) = self.entry(worker_id).await else {
            return false;
        };
        f(&mut *entry.lock().await);
        true
    }

    /// Hand the worker's restarts to a running job.
    pub async fn assign_job(&self, worker_id: &str, job_id: &str) {
        self.update(worker_id, |record| {
            record.assigned_jobs.insert(job_id.to_string());
        })
        .await;
    }

    /// Return the worker to fleet keep-alive once no job holds it.
    pub async fn release_job(&self, worker_id: &str, job_id: &str) {
        self.update(worker_id, |record| {
            record.assigned_jobs.remove(job_id);
        })
        .await;
    }
}
