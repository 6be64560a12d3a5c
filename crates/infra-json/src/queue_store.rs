// Pending Queue File Store

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use jobfeed_core::domain::{QueueItem, QueueStatus};
use jobfeed_core::port::QueueStore;
use jobfeed_core::Result;

use crate::state_file::StateFile;

/// JSON-file pending queue store (`pending_posts.json`)
pub struct JsonQueueStore {
    file: StateFile,
}

impl JsonQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: StateFile::new(path),
        }
    }
}

#[async_trait]
impl QueueStore for JsonQueueStore {
    async fn load(&self) -> Result<Vec<QueueItem>> {
        let Some(value) = self.file.read_value().await? else {
            return Ok(Vec::new());
        };

        let Value::Array(entries) = value else {
            warn!(path = %self.file.path().display(), "queue file is not an array, starting empty");
            return Ok(Vec::new());
        };

        // Item-by-item decode: one malformed entry (unknown status, missing
        // field) must not take the rest of the queue down with it
        let mut items = Vec::with_capacity(entries.len());
        let mut dropped = 0usize;
        for entry in entries {
            match serde_json::from_value::<QueueItem>(entry) {
                Ok(item) => items.push(item),
                Err(e) => {
                    dropped += 1;
                    warn!(error = %e, "dropping invalid queue item");
                }
            }
        }
        if dropped > 0 {
            warn!(dropped, kept = items.len(), "queue contained invalid items");
        }
        Ok(items)
    }

    async fn save(&self, queue: &[QueueItem]) -> Result<()> {
        let pending = queue.iter().filter(|i| i.status == QueueStatus::Pending).count();
        let enriched = queue.iter().filter(|i| i.status == QueueStatus::Enriched).count();
        let posted = queue.iter().filter(|i| i.status == QueueStatus::Posted).count();
        info!(pending, enriched, posted, total = queue.len(), "saving pending queue");

        // Queue persistence is critical: errors propagate to the caller
        self.file.write_atomic(queue).await
    }
}
