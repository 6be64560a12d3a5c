// HTTP Enrichment Client
//
// Calls an external service that fills in job descriptions. Enrichment is
// best-effort: any transport or shape problem logs a warning and hands the
// original batch back unchanged, so the pipeline keeps moving.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use jobfeed_core::domain::JobPosting;
use jobfeed_core::port::Enricher;
use jobfeed_core::{AppError, Result};

pub struct HttpEnricher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEnricher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn enrich(&self, jobs: Vec<JobPosting>) -> Result<Vec<JobPosting>> {
        if jobs.is_empty() {
            return Ok(jobs);
        }

        let response = match self.client.post(&self.endpoint).json(&jobs).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "enrichment request failed, keeping jobs unchanged");
                return Ok(jobs);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "enrichment service returned an error");
            return Ok(jobs);
        }

        let enriched: Vec<JobPosting> = match response.json().await {
            Ok(enriched) => enriched,
            Err(e) => {
                warn!(error = %e, "enrichment response was unreadable");
                return Ok(jobs);
            }
        };

        // Implementations must preserve order and cardinality; a service
        // that returns a different count is ignored wholesale
        if enriched.len() != jobs.len() {
            warn!(
                sent = jobs.len(),
                received = enriched.len(),
                "enrichment service returned a mismatched batch, keeping originals"
            );
            return Ok(jobs);
        }

        debug!(count = enriched.len(), "enriched job batch");
        Ok(enriched)
    }
}
