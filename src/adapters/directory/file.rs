//! JSON file backed worker directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::WorkerDescriptor;
use crate::domain::ports::WorkerDirectory;

/// Reads `[{"id", "endpoint", "enabled"}]` from disk on every `list()`,
/// so edits made by other tools show up on the next tick.
#[derive(Debug, Clone)]
pub struct FileWorkerDirectory {
    path: PathBuf,
}

impl FileWorkerDirectory {
    /// Directory backed by a JSON file, re-read on every listing.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// File this directory reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl WorkerDirectory for FileWorkerDirectory {
    async fn list(&self) -> DomainResult<Vec<WorkerDescriptor>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "worker directory file not found, fleet is empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(DomainError::DirectoryUnavailable(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&raw).map_err(|e| {
            DomainError::DirectoryUnavailable(format!(
                "failed to parse {}: {e}",
                self.path.display()
            ))
        })
    }
}
