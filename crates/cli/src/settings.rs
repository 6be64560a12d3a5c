// Settings - layered configuration
//
// Sources, lowest priority first: built-in defaults, `jobfeed.toml`,
// `JOBFEED_*` environment variables (double underscore for nesting, e.g.
// `JOBFEED_DISCORD__TOKEN`). Settings are injected into the pipeline at
// wiring time; nothing reads configuration globally.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use jobfeed_core::application::filters::BlacklistEntry;
use jobfeed_core::application::PipelineConfig;
use jobfeed_core::domain::{ChannelKind, DedupPolicy};
use jobfeed_core::port::ChannelTarget;

const DEFAULT_DATA_DIR: &str = "~/.jobfeed";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding all state files
    pub data_dir: String,
    /// Jobs pulled from the queue per posting run
    pub batch_size: usize,
    /// Seen-set rotation threshold
    pub seen_capacity: usize,
    pub active_window_days: i64,
    pub reopening_window_days: i64,
    pub stale_fallback_days: i64,
    pub enrichment: EnrichmentSettings,
    pub discord: DiscordSettings,
    pub channels: Vec<ChannelSettings>,
    pub blacklist: Vec<BlacklistEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    /// Absent endpoint disables enrichment (jobs pass through unchanged)
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordSettings {
    pub token: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSettings {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            batch_size: 10,
            seen_capacity: 10_000,
            active_window_days: 7,
            reopening_window_days: 30,
            stale_fallback_days: 90,
            enrichment: EnrichmentSettings::default(),
            discord: DiscordSettings::default(),
            channels: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: jobfeed_infra_http::discord::DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the given config file (default `jobfeed.toml` in
    /// the working directory, optional) plus `JOBFEED_*` overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        match config_path {
            Some(path) => {
                builder = builder.add_source(config::File::with_name(path));
            }
            None => {
                builder = builder.add_source(config::File::with_name("jobfeed").required(false));
            }
        }
        builder = builder.add_source(
            config::Environment::with_prefix("JOBFEED")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.active_window_days <= 0 || self.reopening_window_days <= 0 {
            anyhow::bail!("dedup windows must be positive day counts");
        }
        for channel in &self.channels {
            if channel.id.trim().is_empty() {
                anyhow::bail!("channel '{}' has an empty id", channel.name);
            }
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned())
    }

    pub fn policy(&self) -> DedupPolicy {
        DedupPolicy::from_days(
            self.active_window_days,
            self.reopening_window_days,
            self.stale_fallback_days,
        )
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.batch_size,
            seen_capacity: self.seen_capacity,
            policy: self.policy(),
        }
    }

    pub fn channel_targets(&self) -> Vec<ChannelTarget> {
        self.channels
            .iter()
            .map(|c| ChannelTarget::new(&c.id, &c.name, c.kind))
            .collect()
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment.timeout_secs)
    }
}
