// Seen-Set File Store

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use jobfeed_core::domain::{migrate_legacy_id, SeenSet};
use jobfeed_core::port::SeenStore;
use jobfeed_core::Result;

use crate::state_file::StateFile;

/// JSON-file seen-set store (`seen_jobs.json`, sorted id array)
pub struct JsonSeenStore {
    file: StateFile,
}

impl JsonSeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: StateFile::new(path),
        }
    }
}

#[async_trait]
impl SeenStore for JsonSeenStore {
    async fn load(&self) -> Result<SeenSet> {
        let Some(value) = self.file.read_value().await? else {
            return Ok(SeenSet::new());
        };

        let Value::Array(entries) = value else {
            warn!(path = %self.file.path().display(), "seen-set file is not an array, starting empty");
            return Ok(SeenSet::new());
        };

        let mut migrated = 0usize;
        let mut dropped = 0usize;
        let ids = entries.into_iter().filter_map(|entry| match entry {
            Value::String(id) if !id.trim().is_empty() => {
                let clean = migrate_legacy_id(&id);
                if clean != id {
                    migrated += 1;
                }
                Some(clean)
            }
            _ => {
                dropped += 1;
                None
            }
        });
        let set = SeenSet::from_ids(ids);

        if migrated > 0 || dropped > 0 {
            info!(migrated, dropped, total = set.len(), "loaded seen-set with migrations");
        }
        Ok(set)
    }

    async fn save(&self, set: &SeenSet) -> Result<()> {
        self.file.write_atomic(&set.to_sorted_vec()).await
    }
}
