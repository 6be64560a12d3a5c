// Seen-Set - every JobId ever fetched, independent of posting status

use std::collections::HashSet;

use super::record::JobId;

/// Default capacity before rotation evicts the oldest entries
pub const DEFAULT_SEEN_CAPACITY: usize = 10_000;

/// Append-only set of fetched job ids with capacity rotation.
///
/// Insertion order is kept in memory so rotation can evict oldest-first; the
/// persisted form is a sorted array (diff-friendliness, not semantics).
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    ids: Vec<JobId>,
    index: HashSet<JobId>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted ids, deduplicating while preserving order
    pub fn from_ids(ids: impl IntoIterator<Item = JobId>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.insert(id);
        }
        set
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Returns true if the id was newly added
    pub fn insert(&mut self, id: impl Into<JobId>) -> bool {
        let id = id.into();
        if id.is_empty() || self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.ids.push(id);
        true
    }

    /// Evict oldest entries beyond `capacity`; returns how many were dropped
    pub fn rotate(&mut self, capacity: usize) -> usize {
        if self.ids.len() <= capacity {
            return 0;
        }
        let excess = self.ids.len() - capacity;
        for id in self.ids.drain(..excess) {
            self.index.remove(&id);
        }
        excess
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Persisted representation: sorted id array
    pub fn to_sorted_vec(&self) -> Vec<JobId> {
        let mut out = self.ids.clone();
        out.sort_unstable();
        out
    }
}
