// Pipeline - one scheduled run of the aggregation flow
//
// raw records -> canonicalize -> identity -> seen filter -> queue ->
// enrich -> filters -> duplicate gate -> post per channel -> ledger.
// Ledger saves happen immediately after every successful post; queue and
// seen-set are persisted at the end of each phase.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::application::counters::ChannelCounters;
use crate::application::filters::JobFilter;
use crate::domain::{
    generate_job_id, queue, ChannelPost, DedupPolicy, JobId, JobPosting, QueueItem, QueueStatus,
    seen::DEFAULT_SEEN_CAPACITY,
};
use crate::error::Result;
use crate::port::{
    ChannelTarget, Clock, Enricher, LedgerStore, PostError, Poster, QueueStore, SeenStore,
};

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Jobs pulled from the queue per run
    pub batch_size: usize,
    /// Seen-set rotation threshold
    pub seen_capacity: usize,
    pub policy: DedupPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
            policy: DedupPolicy::default(),
        }
    }
}

/// Outcome of the ingestion phase
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub received: usize,
    pub fresh: usize,
    pub skipped_seen: usize,
    pub skipped_queued: usize,
}

/// Outcome of the posting phase
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub batch: usize,
    pub posted_jobs: usize,
    pub posted_messages: usize,
    pub skipped_duplicates: usize,
    pub removed: usize,
    pub stopped_early: bool,
}

pub struct Pipeline {
    seen_store: Arc<dyn SeenStore>,
    queue_store: Arc<dyn QueueStore>,
    ledger_store: Arc<dyn LedgerStore>,
    enricher: Arc<dyn Enricher>,
    poster: Arc<dyn Poster>,
    clock: Arc<dyn Clock>,
    filter: JobFilter,
    counters: ChannelCounters,
    config: PipelineConfig,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seen_store: Arc<dyn SeenStore>,
        queue_store: Arc<dyn QueueStore>,
        ledger_store: Arc<dyn LedgerStore>,
        enricher: Arc<dyn Enricher>,
        poster: Arc<dyn Poster>,
        clock: Arc<dyn Clock>,
        filter: JobFilter,
        config: PipelineConfig,
    ) -> Self {
        let counters = ChannelCounters::new(ledger_store.clone());
        Self {
            seen_store,
            queue_store,
            ledger_store,
            enricher,
            poster,
            clock,
            filter,
            counters,
            config,
        }
    }

    /// Ingest freshly-fetched raw records: assign identities, filter against
    /// the seen-set and the queue itself, enqueue the rest
    pub async fn ingest(&self, raw: &[Value]) -> Result<IngestReport> {
        let now = self.clock.now();
        let mut seen = self.seen_store.load().await?;
        let mut queue = self.queue_store.load().await?;
        // Posted items are history, not pending work; they must not block
        // a later reopening of the same id
        let queued: HashSet<JobId> = queue
            .iter()
            .filter(|item| item.status != QueueStatus::Posted)
            .map(|item| item.job_id.clone())
            .collect();

        let mut report = IngestReport::default();
        for value in raw {
            report.received += 1;
            let job = JobPosting::from_raw(value);
            let job_id = generate_job_id(&job);

            if seen.contains(&job_id) {
                report.skipped_seen += 1;
                continue;
            }
            seen.insert(job_id.clone());
            if queued.contains(&job_id) {
                // Fresh to the seen-set (e.g. after rotation) but already
                // waiting in the queue: no second entry
                report.skipped_queued += 1;
                continue;
            }
            queue.push(QueueItem::new(job_id, job, now));
            report.fresh += 1;
        }

        let evicted = seen.rotate(self.config.seen_capacity);
        if evicted > 0 {
            info!(evicted, capacity = self.config.seen_capacity, "rotated seen-set");
        }

        // Queue persistence is critical; the seen-set degrades gracefully
        self.queue_store.save(&queue).await?;
        if let Err(e) = self.seen_store.save(&seen).await {
            warn!(error = %e, "failed to persist seen-set, continuing");
        }

        info!(
            received = report.received,
            fresh = report.fresh,
            skipped_seen = report.skipped_seen,
            skipped_queued = report.skipped_queued,
            "ingestion complete"
        );
        Ok(report)
    }

    /// Enrich and distribute the next FIFO batch of queued jobs
    pub async fn process(&mut self, channels: &[ChannelTarget]) -> Result<RunReport> {
        let now = self.clock.now();
        let policy = self.config.policy;

        let queue = self.queue_store.load().await?;
        let mut ledger = self.ledger_store.load().await?;

        let posted_ids = ledger.active_job_ids(now, &policy);
        let (mut queue, cleanup) = queue::cleanup(queue, &posted_ids);
        if cleanup.removed_posted > 0 || cleanup.removed_duplicates > 0 {
            info!(
                removed_posted = cleanup.removed_posted,
                removed_duplicates = cleanup.removed_duplicates,
                "cleaned pending queue"
            );
        }

        let batch = queue::batch_ids(&queue, self.config.batch_size);
        let mut report = RunReport {
            batch: batch.len(),
            ..RunReport::default()
        };

        self.enrich_pending(&mut queue, &batch, now).await;

        let mut stopped = false;
        for job_id in &batch {
            if stopped {
                break;
            }
            let Some(item) = queue.iter().find(|item| &item.job_id == job_id) else {
                continue;
            };
            // Items that failed enrichment stay Pending and wait for the
            // next run
            if item.status != QueueStatus::Enriched {
                continue;
            }
            let job = item.job.clone();

            if !self.filter.is_valid(&job) || self.filter.is_blacklisted(&job) {
                queue::remove_by_id(&mut queue, job_id);
                report.removed += 1;
                info!(job_id, title = %job.title, "removed blacklisted or invalid job from queue");
                continue;
            }

            if ledger.has_been_posted(job_id, job.source_posted_at, now, &policy) {
                queue::remove_by_id(&mut queue, job_id);
                report.skipped_duplicates += 1;
                continue;
            }

            let mut posted_any = false;
            for channel in channels {
                if ledger.has_been_posted_to_channel(job_id, &channel.id, now, &policy) {
                    continue;
                }
                match self.poster.post(&job, channel).await {
                    Ok(outcome) => {
                        let number = self.counters.next(&channel.id).await?;
                        ledger.record_channel_post(
                            job_id,
                            &job,
                            &channel.id,
                            ChannelPost {
                                message_id: outcome.message_id,
                                channel_kind: channel.kind,
                                posted_at: now,
                                channel_job_number: Some(number),
                            },
                            outcome.thread_id,
                            now,
                            &policy,
                        );
                        // Immediate save: later posts in this run must see
                        // this instance. Save errors are fatal by design.
                        ledger = self.ledger_store.save(&ledger).await?;
                        posted_any = true;
                        report.posted_messages += 1;
                    }
                    Err(PostError::ChannelFull { channel }) => {
                        warn!(channel, "channel at capacity, stopping run early");
                        report.stopped_early = true;
                        stopped = true;
                        break;
                    }
                    Err(e) => {
                        warn!(job_id, channel = %channel.id, error = %e, "post failed, skipping channel");
                    }
                }
            }

            if posted_any {
                if let Some(item) = queue.iter_mut().find(|item| &item.job_id == job_id) {
                    item.mark_posted(now)?;
                }
                report.posted_jobs += 1;
            }
        }

        self.queue_store.save(&queue).await?;
        info!(
            batch = report.batch,
            posted_jobs = report.posted_jobs,
            posted_messages = report.posted_messages,
            skipped_duplicates = report.skipped_duplicates,
            removed = report.removed,
            stopped_early = report.stopped_early,
            "posting run complete"
        );
        Ok(report)
    }

    /// Enrich the Pending items of the batch in one call; failure leaves
    /// them Pending (skip, not abort)
    async fn enrich_pending(
        &self,
        queue: &mut [QueueItem],
        batch: &[JobId],
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let pending: Vec<(JobId, JobPosting)> = batch
            .iter()
            .filter_map(|job_id| {
                queue
                    .iter()
                    .find(|item| &item.job_id == job_id && item.status == QueueStatus::Pending)
                    .map(|item| (item.job_id.clone(), item.job.clone()))
            })
            .collect();
        if pending.is_empty() {
            return;
        }

        let jobs: Vec<JobPosting> = pending.iter().map(|(_, job)| job.clone()).collect();
        match self.enricher.enrich(jobs).await {
            Ok(enriched) if enriched.len() == pending.len() => {
                for ((job_id, _), job) in pending.iter().zip(enriched) {
                    if let Some(item) = queue
                        .iter_mut()
                        .find(|item| &item.job_id == job_id && item.status == QueueStatus::Pending)
                    {
                        if let Err(e) = item.mark_enriched(job, now) {
                            warn!(job_id, error = %e, "unexpected enrichment transition");
                        }
                    }
                }
            }
            Ok(enriched) => {
                warn!(
                    expected = pending.len(),
                    got = enriched.len(),
                    "enricher returned wrong batch size, items stay pending"
                );
            }
            Err(e) => {
                warn!(error = %e, "enrichment failed, items stay pending");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::clock::mocks::FixedClock;
    use crate::port::enricher::mocks::MockEnricher;
    use crate::port::poster::mocks::RecordingPoster;
    use crate::port::store::mocks::{MemoryLedgerStore, MemoryQueueStore, MemorySeenStore};
    use crate::application::filters::BlacklistEntry;
    use crate::domain::ChannelKind;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    struct Fixture {
        seen: Arc<MemorySeenStore>,
        queue: Arc<MemoryQueueStore>,
        ledger: Arc<MemoryLedgerStore>,
        poster: Arc<RecordingPoster>,
    }

    fn pipeline_with(poster: Arc<RecordingPoster>, blacklist: Vec<BlacklistEntry>) -> (Pipeline, Fixture) {
        let seen = Arc::new(MemorySeenStore::default());
        let queue = Arc::new(MemoryQueueStore::default());
        let ledger = Arc::new(MemoryLedgerStore::new(now(), DedupPolicy::default()));
        let fixture = Fixture {
            seen: seen.clone(),
            queue: queue.clone(),
            ledger: ledger.clone(),
            poster: poster.clone(),
        };
        let pipeline = Pipeline::new(
            seen,
            queue,
            ledger,
            Arc::new(MockEnricher::new("a description")),
            poster,
            Arc::new(FixedClock::at(now())),
            JobFilter::new(blacklist),
            PipelineConfig::default(),
        );
        (pipeline, fixture)
    }

    fn channels() -> Vec<ChannelTarget> {
        vec![
            ChannelTarget::new("chan-cat", "backend", ChannelKind::Category),
            ChannelTarget::new("chan-loc", "new-york", ChannelKind::Location),
        ]
    }

    fn raw_job(title: &str, company: &str) -> Value {
        json!({"title": title, "company": company, "job_city": "New York"})
    }

    #[tokio::test]
    async fn ingest_dedups_against_seen_and_queue() {
        let (pipeline, fx) = pipeline_with(Arc::new(RecordingPoster::new()), vec![]);
        let batch = vec![raw_job("Engineer", "Acme"), raw_job("Engineer", "Acme")];

        let report = pipeline.ingest(&batch).await.unwrap();
        assert_eq!(report.fresh, 1);
        assert_eq!(report.skipped_seen, 1);

        // Second run: same job is seen, nothing new enters the queue
        let report = pipeline.ingest(&batch).await.unwrap();
        assert_eq!(report.fresh, 0);
        assert_eq!(report.skipped_seen, 2);
        assert_eq!(fx.queue.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn process_posts_once_per_channel_and_marks_posted() {
        let poster = Arc::new(RecordingPoster::new());
        let (mut pipeline, fx) = pipeline_with(poster.clone(), vec![]);
        pipeline.ingest(&[raw_job("Engineer", "Acme")]).await.unwrap();

        let report = pipeline.process(&channels()).await.unwrap();
        assert_eq!(report.posted_jobs, 1);
        assert_eq!(report.posted_messages, 2);
        assert_eq!(poster.posts().len(), 2);

        let queue = fx.queue.load().await.unwrap();
        assert_eq!(queue[0].status, QueueStatus::Posted);

        let ledger = fx.ledger.load().await.unwrap();
        assert_eq!(ledger.jobs.len(), 1);
        assert_eq!(ledger.jobs[0].channel_posts.len(), 2);
        assert_eq!(ledger.jobs[0].instance_number, 1);

        // Re-running does not repost
        let report = pipeline.process(&channels()).await.unwrap();
        assert_eq!(report.posted_messages, 0);
        assert_eq!(poster.posts().len(), 2);
    }

    #[tokio::test]
    async fn blacklisted_job_is_actively_removed_from_queue() {
        let (mut pipeline, fx) = pipeline_with(
            Arc::new(RecordingPoster::new()),
            vec![BlacklistEntry {
                title: "agentic ai teacher".to_string(),
                company: "amazon".to_string(),
            }],
        );
        pipeline
            .ingest(&[raw_job("Agentic AI Teacher", "Amazon"), raw_job("Engineer", "Acme")])
            .await
            .unwrap();
        assert_eq!(fx.queue.load().await.unwrap().len(), 2);

        let report = pipeline.process(&channels()).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.posted_jobs, 1);

        let queue = fx.queue.load().await.unwrap();
        assert!(!queue.iter().any(|item| item.job.company == "Amazon"));
    }

    #[tokio::test]
    async fn already_posted_job_is_skipped_and_dropped() {
        let poster = Arc::new(RecordingPoster::new());
        let (mut pipeline, fx) = pipeline_with(poster.clone(), vec![]);
        pipeline.ingest(&[raw_job("Engineer", "Acme")]).await.unwrap();

        // Another process already posted it
        let mut ledger = fx.ledger.load().await.unwrap();
        let job = JobPosting::from_raw(&raw_job("Engineer", "Acme"));
        let job_id = generate_job_id(&job);
        ledger.mark_as_posted(&job_id, &job, None, now());
        fx.ledger.save(&ledger).await.unwrap();

        let report = pipeline.process(&channels()).await.unwrap();
        assert_eq!(report.posted_messages, 0);
        assert!(poster.posts().is_empty());
        // Queue cleanup removed it against the active ledger
        assert!(fx.queue.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_full_stops_the_run_early() {
        let poster = Arc::new(RecordingPoster::with_full_channels(vec![
            "chan-cat".to_string(),
        ]));
        let (mut pipeline, _fx) = pipeline_with(poster.clone(), vec![]);
        pipeline
            .ingest(&[raw_job("Engineer", "Acme"), raw_job("Analyst", "Globex")])
            .await
            .unwrap();

        let report = pipeline.process(&channels()).await.unwrap();
        assert!(report.stopped_early);
        // First channel was full; nothing further was attempted
        assert!(poster.posts().is_empty());
    }

    #[tokio::test]
    async fn enrichment_failure_leaves_items_pending() {
        let seen = Arc::new(MemorySeenStore::default());
        let queue = Arc::new(MemoryQueueStore::default());
        let ledger = Arc::new(MemoryLedgerStore::new(now(), DedupPolicy::default()));
        let poster = Arc::new(RecordingPoster::new());
        let mut pipeline = Pipeline::new(
            seen,
            queue.clone(),
            ledger,
            Arc::new(MockEnricher::failing()),
            poster.clone(),
            Arc::new(FixedClock::at(now())),
            JobFilter::default(),
            PipelineConfig::default(),
        );
        pipeline.ingest(&[raw_job("Engineer", "Acme")]).await.unwrap();

        let report = pipeline.process(&channels()).await.unwrap();
        assert_eq!(report.posted_messages, 0);
        assert!(poster.posts().is_empty());
        assert_eq!(queue.load().await.unwrap()[0].status, QueueStatus::Pending);
    }
}
