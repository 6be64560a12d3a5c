// Job Record Canonicalization
//
// Upstream sources disagree on field names (title vs job_title, company vs
// employer_name, ...). Everything downstream of this module only ever sees
// the canonical JobPosting type; alias lookups happen exactly once, here.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable deduplication key for a job posting
pub type JobId = String;

/// Canonical internal job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub title: String,
    pub company: String,
    pub url: Option<String>,
    pub location: Option<String>,
    pub source_posted_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub source: Option<String>,
}

const TITLE_KEYS: &[&str] = &["title", "job_title"];
const COMPANY_KEYS: &[&str] = &["company", "company_name", "employer_name"];
const URL_KEYS: &[&str] = &["url", "job_apply_link", "apply_url"];
const CITY_KEYS: &[&str] = &["job_city", "city", "location"];
const DATE_KEYS: &[&str] = &["job_posted_at_datetime_utc", "posted_at", "date_posted"];
const DESCRIPTION_KEYS: &[&str] = &["description", "job_description"];

impl JobPosting {
    /// Canonicalize a raw, loosely-typed job record.
    ///
    /// Never fails: missing fields become empty/None and are caught later by
    /// the validity filter. The raw record is read defensively, first match
    /// among the known alias names wins.
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            title: pick_string(raw, TITLE_KEYS).unwrap_or_default(),
            company: pick_string(raw, COMPANY_KEYS).unwrap_or_default(),
            url: pick_string(raw, URL_KEYS),
            location: pick_location(raw),
            source_posted_at: pick_string(raw, DATE_KEYS).and_then(|s| parse_source_date(&s)),
            description: pick_string(raw, DESCRIPTION_KEYS),
            source: pick_string(raw, &["source"]),
        }
    }

    /// Minimal constructor used by enrichment and tests
    pub fn new(title: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            url: None,
            location: None,
            source_posted_at: None,
            description: None,
            source: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_source_date(mut self, at: DateTime<Utc>) -> Self {
        self.source_posted_at = Some(at);
        self
    }
}

fn pick_string(raw: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match raw.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => continue,
        }
    }
    None
}

/// Location: prefer the first element of a locations array, else a city field
fn pick_location(raw: &Value) -> Option<String> {
    if let Some(Value::Array(locations)) = raw.get("locations") {
        if let Some(Value::String(first)) = locations.first() {
            if !first.trim().is_empty() {
                return Some(first.trim().to_string());
            }
        }
    }
    pick_string(raw, CITY_KEYS)
}

/// Source posting dates arrive as RFC 3339, a date-time without offset, or a
/// bare date, depending on the source
fn parse_source_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}
