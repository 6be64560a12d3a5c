// Persistence Ports
//
// One load/save discipline, three stores. The ledger store owns the
// merge-on-save and archive rotation behavior; callers hand it their memory
// copy and continue with whatever state survived reconciliation.

use async_trait::async_trait;

use crate::domain::{Ledger, QueueItem, SeenSet};
use crate::error::Result;

/// Seen-set persistence
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Load the persisted set; corruption degrades to empty, never fails
    async fn load(&self) -> Result<SeenSet>;

    /// Persist as a sorted array (atomic write)
    async fn save(&self, set: &SeenSet) -> Result<()>;
}

/// Pending-queue persistence
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Load and validate; structurally-invalid items are dropped, never fatal
    async fn load(&self) -> Result<Vec<QueueItem>>;

    /// Atomic write; failures propagate (losing the queue causes duplicate
    /// postings downstream)
    async fn save(&self, queue: &[QueueItem]) -> Result<()>;
}

/// Posted-jobs ledger persistence
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the active ledger, transparently upgrading the legacy V1 format
    async fn load(&self) -> Result<Ledger>;

    /// Reload disk state, merge the memory copy into it, archive old
    /// instances, write atomically and verify. Returns the merged active
    /// ledger the caller should continue with. Errors here are fatal to the
    /// pipeline by design.
    async fn save(&self, ledger: &Ledger) -> Result<Ledger>;

    /// Historical posting count for one channel across the active ledger
    /// and all archive files (basis for channel-local sequence numbers)
    async fn count_channel_posts(&self, channel_id: &str) -> Result<u64>;
}

pub mod mocks {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::DedupPolicy;
    use chrono::{DateTime, Utc};

    /// In-memory seen store
    #[derive(Default)]
    pub struct MemorySeenStore {
        state: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SeenStore for MemorySeenStore {
        async fn load(&self) -> Result<SeenSet> {
            let state = self.state.lock().expect("store mutex");
            Ok(SeenSet::from_ids(state.iter().cloned()))
        }

        async fn save(&self, set: &SeenSet) -> Result<()> {
            let mut state = self.state.lock().expect("store mutex");
            *state = set.to_sorted_vec();
            Ok(())
        }
    }

    /// In-memory queue store
    #[derive(Default)]
    pub struct MemoryQueueStore {
        state: Mutex<Vec<QueueItem>>,
    }

    #[async_trait]
    impl QueueStore for MemoryQueueStore {
        async fn load(&self) -> Result<Vec<QueueItem>> {
            Ok(self.state.lock().expect("store mutex").clone())
        }

        async fn save(&self, queue: &[QueueItem]) -> Result<()> {
            *self.state.lock().expect("store mutex") = queue.to_vec();
            Ok(())
        }
    }

    /// In-memory ledger store applying the same merge-then-archive
    /// discipline as the file-backed implementation
    pub struct MemoryLedgerStore {
        state: Mutex<Ledger>,
        archived: Mutex<Vec<crate::domain::PostingInstance>>,
        policy: DedupPolicy,
        now: Mutex<DateTime<Utc>>,
    }

    impl MemoryLedgerStore {
        pub fn new(now: DateTime<Utc>, policy: DedupPolicy) -> Self {
            Self {
                state: Mutex::new(Ledger::empty(now)),
                archived: Mutex::new(Vec::new()),
                policy,
                now: Mutex::new(now),
            }
        }

        pub fn set_now(&self, now: DateTime<Utc>) {
            *self.now.lock().expect("store mutex") = now;
        }

        pub fn archived_count(&self) -> usize {
            self.archived.lock().expect("store mutex").len()
        }
    }

    #[async_trait]
    impl LedgerStore for MemoryLedgerStore {
        async fn load(&self) -> Result<Ledger> {
            Ok(self.state.lock().expect("store mutex").clone())
        }

        async fn save(&self, ledger: &Ledger) -> Result<Ledger> {
            let now = *self.now.lock().expect("store mutex");
            let disk = self.state.lock().expect("store mutex").clone();
            let (mut merged, _stats) = Ledger::merge(disk, ledger);
            let archived = merged.take_archivable(now, &self.policy);
            self.archived
                .lock()
                .expect("store mutex")
                .extend(archived.into_values().flatten());
            *self.state.lock().expect("store mutex") = merged.clone();
            Ok(merged)
        }

        async fn count_channel_posts(&self, channel_id: &str) -> Result<u64> {
            let active = self.state.lock().expect("store mutex");
            let archived = self.archived.lock().expect("store mutex");
            let count = active
                .jobs
                .iter()
                .chain(archived.iter())
                .filter(|inst| inst.channel_posts.contains_key(channel_id))
                .count();
            Ok(count as u64)
        }
    }
}
