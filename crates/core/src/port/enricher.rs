// Enrichment Port
// External collaborator that fills in description fields for pending jobs

use async_trait::async_trait;

use crate::domain::JobPosting;
use crate::error::Result;

/// Description enrichment service.
///
/// Implementations must return the jobs in the same order they were given;
/// a job that cannot be enriched comes back unchanged rather than failing
/// the whole batch.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, jobs: Vec<JobPosting>) -> Result<Vec<JobPosting>>;
}

pub mod mocks {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::AppError;

    /// Enricher that stamps a fixed description onto every job
    pub struct MockEnricher {
        description: String,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockEnricher {
        pub fn new(description: impl Into<String>) -> Self {
            Self {
                description: description.into(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                description: String::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Enricher for MockEnricher {
        async fn enrich(&self, jobs: Vec<JobPosting>) -> Result<Vec<JobPosting>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Internal("enrichment unavailable".to_string()));
            }
            Ok(jobs
                .into_iter()
                .map(|mut job| {
                    job.description = Some(self.description.clone());
                    job
                })
                .collect())
        }
    }
}
