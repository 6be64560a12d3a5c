// Discord Poster
//
// Posts one job per message via the Discord REST API. The only error the
// pipeline treats specially is "max active threads" (code 160006), which
// maps to ChannelFull so the run stops early instead of hammering the API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use jobfeed_core::domain::JobPosting;
use jobfeed_core::port::{ChannelTarget, PostError, PostOutcome, Poster};
use jobfeed_core::{AppError, Result};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Discord's error code for a forum channel at its active-thread cap
const CODE_MAX_ACTIVE_THREADS: u64 = 160006;

/// Hard message length cap imposed by the platform
const MAX_CONTENT_LEN: usize = 2000;

pub struct DiscordPoster {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    id: String,
    #[serde(default)]
    thread: Option<ThreadRef>,
}

#[derive(Deserialize)]
struct ThreadRef {
    id: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

impl DiscordPoster {
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            token: token.into(),
        })
    }
}

/// Render the job as a Discord message, truncated to the platform cap
fn format_message(job: &JobPosting) -> String {
    let mut content = format!("**{}**\n{}", job.title, job.company);
    if let Some(location) = &job.location {
        content.push_str(&format!("\n📍 {location}"));
    }
    if let Some(url) = &job.url {
        content.push_str(&format!("\n{url}"));
    }
    if let Some(description) = &job.description {
        let description = description.trim();
        if !description.is_empty() {
            content.push_str("\n\n");
            content.push_str(description);
        }
    }

    if content.chars().count() > MAX_CONTENT_LEN {
        let truncated: String = content.chars().take(MAX_CONTENT_LEN - 1).collect();
        content = format!("{truncated}…");
    }
    content
}

/// Map a non-success response body to the port's error taxonomy
fn map_api_error(status: u16, body: &str) -> PostError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if parsed.code == CODE_MAX_ACTIVE_THREADS => PostError::ChannelFull {
            channel: String::new(),
        },
        Ok(parsed) => PostError::Api {
            status,
            message: parsed.message,
        },
        Err(_) => PostError::Api {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

#[async_trait]
impl Poster for DiscordPoster {
    async fn post(
        &self,
        job: &JobPosting,
        channel: &ChannelTarget,
    ) -> std::result::Result<PostOutcome, PostError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel.id);
        let content = format_message(job);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(|e| PostError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = match map_api_error(status.as_u16(), &body) {
                PostError::ChannelFull { .. } => PostError::ChannelFull {
                    channel: channel.id.clone(),
                },
                other => other,
            };
            warn!(channel = %channel.name, status = status.as_u16(), "post rejected");
            return Err(error);
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| PostError::Http(format!("unreadable message response: {e}")))?;

        debug!(channel = %channel.name, message_id = %message.id, "posted job");
        Ok(PostOutcome {
            message_id: message.id,
            thread_id: message.thread.map(|t| t.id),
        })
    }
}
