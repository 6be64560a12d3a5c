// Domain Layer - Pure business logic and entities

pub mod error;
pub mod identity;
pub mod ledger;
pub mod queue;
pub mod record;
pub mod seen;

// Re-exports
pub use error::DomainError;
pub use identity::{generate_job_id, migrate_legacy_id};
pub use ledger::{
    ChannelKind, ChannelPost, DedupPolicy, Ledger, LedgerMetadata, MergeStats, PostingInstance,
};
pub use queue::{CleanupStats, QueueItem, QueueStatus};
pub use record::{JobId, JobPosting};
pub use seen::SeenSet;
