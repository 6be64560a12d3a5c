// Posted-Jobs Ledger File Store
//
// The on-disk file is the durable source of truth. Every save reloads it
// fresh, merges the caller's memory copy into it, rotates old instances to
// monthly archive files, writes atomically and verifies the result. This is
// the one path in the system that fails loud: a silently lost ledger entry
// means duplicate postings to end users.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use jobfeed_core::domain::{DedupPolicy, Ledger, PostingInstance};
use jobfeed_core::port::{Clock, LedgerStore};
use jobfeed_core::{AppError, Result};

use crate::state_file::StateFile;

/// JSON-file ledger store (`posted_jobs.json` + `archive/YYYY-MM.json`)
pub struct JsonLedgerStore {
    active: StateFile,
    archive_dir: PathBuf,
    policy: DedupPolicy,
    clock: Arc<dyn Clock>,
}

impl JsonLedgerStore {
    pub fn new(
        path: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
        policy: DedupPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            active: StateFile::new(path),
            archive_dir: archive_dir.into(),
            policy,
            clock,
        }
    }

    /// Move everything outside the active window into monthly archive
    /// files, merging with existing file contents by instance id. Returns
    /// how many instances left the active ledger.
    async fn archive_old(&self, ledger: &mut Ledger) -> Result<usize> {
        let now = self.clock.now();
        let groups = ledger.take_archivable(now, &self.policy);
        if groups.is_empty() {
            return Ok(0);
        }

        let mut total = 0usize;
        for (month, instances) in groups {
            let file = StateFile::new(self.archive_dir.join(format!("{month}.json")));
            let existing = read_instances(&file).await?;

            // Upsert incoming over existing, then restore chronological order
            let mut by_id: HashMap<String, PostingInstance> = existing
                .into_iter()
                .map(|inst| (inst.id.clone(), inst))
                .collect();
            total += instances.len();
            for instance in instances {
                by_id.insert(instance.id.clone(), instance);
            }
            let mut merged: Vec<PostingInstance> = by_id.into_values().collect();
            merged.sort_by(|a, b| a.posted_at.cmp(&b.posted_at).then_with(|| a.id.cmp(&b.id)));

            let in_file = merged.len();
            file.write_atomic(&merged).await?;
            info!(month = %month, total_in_file = in_file, "wrote monthly archive");
        }
        Ok(total)
    }

    async fn archive_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.archive_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Read an archive file as a list of instances; unparseable files degrade
/// to empty with a warning (archives are append-mostly, never load-bearing
/// for the duplicate gate)
async fn read_instances(file: &StateFile) -> Result<Vec<PostingInstance>> {
    let Some(value) = file.read_value().await? else {
        return Ok(Vec::new());
    };
    match serde_json::from_value(value) {
        Ok(instances) => Ok(instances),
        Err(e) => {
            warn!(path = %file.path().display(), error = %e, "archive file has unexpected shape, ignoring");
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl LedgerStore for JsonLedgerStore {
    async fn load(&self) -> Result<Ledger> {
        let now = self.clock.now();
        let Some(value) = self.active.read_value().await? else {
            return Ok(Ledger::empty(now));
        };

        match value {
            // Legacy V1 format: bare array of job id strings
            Value::Array(entries) => {
                let ids = entries
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect();
                Ok(Ledger::from_v1(ids, now))
            }
            value => match serde_json::from_value::<Ledger>(value) {
                Ok(ledger) => Ok(ledger),
                Err(e) => {
                    let backup = self.active.backup_corrupt().await?;
                    error!(
                        backup = %backup.display(),
                        error = %e,
                        "ledger file has unexpected shape, backed it up and starting fresh"
                    );
                    Ok(Ledger::empty(now))
                }
            },
        }
    }

    async fn save(&self, ledger: &Ledger) -> Result<Ledger> {
        let now = self.clock.now();

        // Reload disk state right before writing: a concurrent run may have
        // advanced it since our copy was loaded
        let disk = self.load().await?;
        let (mut merged, stats) = Ledger::merge(disk, ledger);
        if stats.added > 0 || stats.replaced > 0 || stats.unioned > 0 {
            info!(
                added = stats.added,
                replaced = stats.replaced,
                unioned = stats.unioned,
                "merged memory ledger with disk state"
            );
        }

        let archived = self.archive_old(&mut merged).await?;
        merged.last_updated = now;
        let expected = merged.jobs.len();

        self.active.write_atomic(&merged).await.map_err(|e| {
            error!(error = %e, "ledger write failed");
            e
        })?;

        // Read back and verify: a count mismatch means data loss and is
        // unacceptable here
        let reread = self.load().await?;
        if reread.jobs.len() != expected {
            return Err(AppError::Store(format!(
                "ledger verification failed: wrote {} instances, read back {}",
                expected,
                reread.jobs.len()
            )));
        }

        info!(active = expected, archived, "saved posted-jobs ledger");
        Ok(merged)
    }

    async fn count_channel_posts(&self, channel_id: &str) -> Result<u64> {
        let mut count = self
            .load()
            .await?
            .jobs
            .iter()
            .filter(|inst| inst.channel_posts.contains_key(channel_id))
            .count() as u64;

        for path in self.archive_paths().await? {
            let instances = read_instances(&StateFile::new(path)).await?;
            count += instances
                .iter()
                .filter(|inst| inst.channel_posts.contains_key(channel_id))
                .count() as u64;
        }
        Ok(count)
    }
}
