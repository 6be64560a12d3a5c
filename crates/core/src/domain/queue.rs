// Pending Queue - jobs awaiting enrichment and posting, FIFO

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{DomainError, Result};
use super::record::{JobId, JobPosting};

/// Queue item lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Enriched,
    Posted,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Enriched => write!(f, "enriched"),
            QueueStatus::Posted => write!(f, "posted"),
        }
    }
}

/// One queued job with its lifecycle timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub job_id: JobId,
    pub job: JobPosting,
    pub status: QueueStatus,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub enriched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub fn new(job_id: impl Into<JobId>, job: JobPosting, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            job,
            status: QueueStatus::Pending,
            added_at: now,
            enriched_at: None,
            posted_at: None,
        }
    }

    /// Transition Pending -> Enriched with explicit timestamp
    pub fn mark_enriched(&mut self, job: JobPosting, now: DateTime<Utc>) -> Result<()> {
        if self.status != QueueStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: QueueStatus::Enriched.to_string(),
            });
        }
        self.job = job;
        self.status = QueueStatus::Enriched;
        self.enriched_at = Some(now);
        Ok(())
    }

    /// Transition Enriched -> Posted with explicit timestamp
    pub fn mark_posted(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != QueueStatus::Enriched {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: QueueStatus::Posted.to_string(),
            });
        }
        self.status = QueueStatus::Posted;
        self.posted_at = Some(now);
        Ok(())
    }
}

/// Result of a two-phase queue cleanup
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub removed_posted: usize,
    pub removed_duplicates: usize,
}

/// Two-phase cleanup: drop items already distributed (Posted status or an
/// id in the externally-supplied posted set), then deduplicate by job id
/// keeping the first occurrence (FIFO-stable). Dropping Posted items here
/// is what lets a reopened job re-enter the queue later.
pub fn cleanup(queue: Vec<QueueItem>, posted_ids: &HashSet<JobId>) -> (Vec<QueueItem>, CleanupStats) {
    let mut stats = CleanupStats::default();
    let mut kept_ids: HashSet<JobId> = HashSet::new();
    let mut kept = Vec::with_capacity(queue.len());

    for item in queue {
        if item.status == QueueStatus::Posted || posted_ids.contains(&item.job_id) {
            stats.removed_posted += 1;
            continue;
        }
        if !kept_ids.insert(item.job_id.clone()) {
            stats.removed_duplicates += 1;
            continue;
        }
        kept.push(item);
    }

    (kept, stats)
}

/// Actively remove an item by job id (blacklisted/invalid jobs must not
/// block the queue); returns true if something was removed
pub fn remove_by_id(queue: &mut Vec<QueueItem>, job_id: &str) -> bool {
    let before = queue.len();
    queue.retain(|item| item.job_id != job_id);
    queue.len() != before
}

/// Select the next batch of unposted job ids, FIFO by added_at
pub fn batch_ids(queue: &[QueueItem], batch_size: usize) -> Vec<JobId> {
    let mut candidates: Vec<&QueueItem> = queue
        .iter()
        .filter(|item| item.status != QueueStatus::Posted)
        .collect();
    candidates.sort_by_key(|item| item.added_at);
    candidates
        .into_iter()
        .take(batch_size)
        .map(|item| item.job_id.clone())
        .collect()
}
