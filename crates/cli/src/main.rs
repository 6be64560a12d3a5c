// jobfeed - composition root and command-line interface

mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobfeed_core::application::{JobFilter, Pipeline};
use jobfeed_core::domain::{JobPosting, QueueStatus};
use jobfeed_core::port::{
    ChannelTarget, Clock, Enricher, LedgerStore, Poster, QueueStore, SeenStore, SystemClock,
};
use jobfeed_core::port::poster::mocks::RecordingPoster;
use jobfeed_infra_http::{DiscordPoster, HttpEnricher};
use jobfeed_infra_json::{JsonLedgerStore, JsonQueueStore, JsonSeenStore};

use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "jobfeed", version, about = "Job aggregation and distribution pipeline")]
struct Cli {
    /// Config file path (default: ./jobfeed.toml, optional)
    #[arg(long, env = "JOBFEED_CONFIG")]
    config: Option<String>,

    /// Run against a throwaway copy of the state and post to a stub
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest raw feed files, then enrich and post the next batch
    Run {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Ingest raw feed files into the pending queue
    Ingest {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Enrich and post the next batch of queued jobs
    Post,

    /// Rotate posting instances outside the active window into monthly archives
    Archive,

    /// Show pipeline state
    Stats {
        /// Number of recent posting instances to list
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

/// Enricher used when no enrichment endpoint is configured: jobs advance
/// through the queue unchanged
struct PassthroughEnricher;

#[async_trait]
impl Enricher for PassthroughEnricher {
    async fn enrich(&self, jobs: Vec<JobPosting>) -> jobfeed_core::Result<Vec<JobPosting>> {
        Ok(jobs)
    }
}

/// Wired adapters plus the stores the read-only commands need directly
struct App {
    seen_store: Arc<dyn SeenStore>,
    queue_store: Arc<dyn QueueStore>,
    ledger_store: Arc<dyn LedgerStore>,
    enricher: Arc<dyn Enricher>,
    poster: Arc<dyn Poster>,
    clock: Arc<dyn Clock>,
    channels: Vec<ChannelTarget>,
    settings: Settings,
}

impl App {
    fn wire(settings: Settings, dry_run: bool) -> Result<Self> {
        let data_dir = if dry_run {
            let staged = stage_dry_run_copy(&settings.data_dir())?;
            println!(
                "{}",
                format!("dry run: working on a copy under {}", staged.display()).yellow()
            );
            staged
        } else {
            settings.data_dir()
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let seen_store: Arc<dyn SeenStore> =
            Arc::new(JsonSeenStore::new(data_dir.join("seen_jobs.json")));
        let queue_store: Arc<dyn QueueStore> =
            Arc::new(JsonQueueStore::new(data_dir.join("pending_posts.json")));
        let ledger_store: Arc<dyn LedgerStore> = Arc::new(JsonLedgerStore::new(
            data_dir.join("posted_jobs.json"),
            data_dir.join("archive"),
            settings.policy(),
            clock.clone(),
        ));

        let enricher: Arc<dyn Enricher> = match &settings.enrichment.endpoint {
            Some(endpoint) => Arc::new(HttpEnricher::new(endpoint, settings.enrichment_timeout())?),
            None => Arc::new(PassthroughEnricher),
        };

        let poster: Arc<dyn Poster> = if dry_run {
            Arc::new(RecordingPoster::new())
        } else {
            if settings.discord.token.trim().is_empty() {
                anyhow::bail!(
                    "discord.token is not configured (set it in jobfeed.toml or JOBFEED_DISCORD__TOKEN)"
                );
            }
            Arc::new(DiscordPoster::new(
                &settings.discord.token,
                &settings.discord.api_base,
            )?)
        };

        let channels = settings.channel_targets();
        Ok(Self {
            seen_store,
            queue_store,
            ledger_store,
            enricher,
            poster,
            clock,
            channels,
            settings,
        })
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.seen_store.clone(),
            self.queue_store.clone(),
            self.ledger_store.clone(),
            self.enricher.clone(),
            self.poster.clone(),
            self.clock.clone(),
            JobFilter::new(self.settings.blacklist.clone()),
            self.settings.pipeline_config(),
        )
    }

    async fn ingest(&self, inputs: &[PathBuf]) -> Result<()> {
        let records = read_raw_records(inputs)?;
        let report = self.pipeline().ingest(&records).await?;
        println!(
            "{} {} received, {} fresh, {} already seen, {} already queued",
            "✓".green().bold(),
            report.received,
            report.fresh.to_string().green(),
            report.skipped_seen,
            report.skipped_queued,
        );
        Ok(())
    }

    async fn post(&self) -> Result<()> {
        if self.channels.is_empty() {
            anyhow::bail!("no channels configured, nothing to post to");
        }
        let report = self.pipeline().process(&self.channels).await?;
        println!(
            "{} batch of {}: {} jobs posted ({} messages), {} duplicates skipped, {} removed",
            "✓".green().bold(),
            report.batch,
            report.posted_jobs.to_string().green(),
            report.posted_messages,
            report.skipped_duplicates,
            report.removed,
        );
        if report.stopped_early {
            println!("{}", "⚠ run stopped early: a channel is at capacity".yellow());
        }
        Ok(())
    }

    async fn archive(&self) -> Result<()> {
        let ledger = self.ledger_store.load().await?;
        let before = ledger.jobs.len();
        let merged = self.ledger_store.save(&ledger).await?;
        let archived = before.saturating_sub(merged.jobs.len());
        println!(
            "{} {} instances archived, {} still active",
            "✓".green().bold(),
            archived,
            merged.jobs.len()
        );
        Ok(())
    }

    async fn stats(&self, limit: usize) -> Result<()> {
        let seen = self.seen_store.load().await?;
        let queue = self.queue_store.load().await?;
        let ledger = self.ledger_store.load().await?;
        let now = self.clock.now();
        let policy = self.settings.policy();

        let pending = queue.iter().filter(|i| i.status == QueueStatus::Pending).count();
        let enriched = queue.iter().filter(|i| i.status == QueueStatus::Enriched).count();
        let posted = queue.iter().filter(|i| i.status == QueueStatus::Posted).count();
        let active = ledger.active_job_ids(now, &policy).len();

        println!("{}", "jobfeed state".bold());
        println!("  seen ids:        {}", seen.len());
        println!("  queue:           {pending} pending / {enriched} enriched / {posted} posted");
        println!("  ledger:          {} instances ({} active jobs)", ledger.jobs.len(), active);
        if ledger.metadata.migrated_from_v1 {
            println!("  {}", "ledger was migrated from the v1 format".yellow());
        }

        let mut instances = ledger.jobs.clone();
        instances.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
        let rows: Vec<InstanceRow> = instances
            .iter()
            .take(limit)
            .map(|inst| InstanceRow {
                job_id: inst.job_id.clone(),
                company: inst.company.clone(),
                instance: inst.instance_number,
                posted_at: inst.posted_at.format("%Y-%m-%d %H:%M").to_string(),
                channels: inst.channel_posts.len(),
            })
            .collect();
        if !rows.is_empty() {
            println!();
            println!("{}", Table::new(rows));
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct InstanceRow {
    job_id: String,
    company: String,
    instance: u32,
    posted_at: String,
    channels: usize,
}

/// Each input file holds a JSON array of raw feed records
fn read_raw_records(inputs: &[PathBuf]) -> Result<Vec<serde_json::Value>> {
    let mut records = Vec::new();
    for path in inputs {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        match value {
            serde_json::Value::Array(entries) => records.extend(entries),
            single => records.push(single),
        }
    }
    Ok(records)
}

/// Copy the state files into a temp directory so a dry run never touches
/// the real data
fn stage_dry_run_copy(data_dir: &Path) -> Result<PathBuf> {
    let staged = std::env::temp_dir().join(format!("jobfeed-dry-run-{}", std::process::id()));
    std::fs::create_dir_all(&staged)?;

    for name in ["seen_jobs.json", "pending_posts.json", "posted_jobs.json"] {
        let source = data_dir.join(name);
        if source.exists() {
            std::fs::copy(&source, staged.join(name))?;
        }
    }
    let archive_dir = data_dir.join("archive");
    if archive_dir.is_dir() {
        let staged_archive = staged.join("archive");
        std::fs::create_dir_all(&staged_archive)?;
        for entry in std::fs::read_dir(&archive_dir)? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                std::fs::copy(entry.path(), staged_archive.join(entry.file_name()))?;
            }
        }
    }
    Ok(staged)
}

fn init_logging() {
    let log_format = std::env::var("JOBFEED_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("jobfeed=info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    info!(version = VERSION, data_dir = %settings.data_dir().display(), "jobfeed starting");

    let app = App::wire(settings, cli.dry_run)?;

    match cli.command {
        Commands::Run { inputs } => {
            app.ingest(&inputs).await?;
            app.post().await?;
        }
        Commands::Ingest { inputs } => app.ingest(&inputs).await?,
        Commands::Post => app.post().await?,
        Commands::Archive => app.archive().await?,
        Commands::Stats { limit } => app.stats(limit).await?,
    }

    Ok(())
}
