// Job Identity Generator
//
// Derives the stable JobId used for deduplication. URL-based identity is the
// most reliable signal (same posting, same URL); the textual fallback has to
// survive the formatting noise that otherwise fragments one job into several
// IDs (Roman numeral levels, "Sr."/"Jr." abbreviations, legal suffixes).

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use super::record::{JobId, JobPosting};

/// Trailing legal-entity suffixes stripped from company names
const LEGAL_SUFFIXES: &[&str] = &[
    "incorporated",
    "corporation",
    "limited",
    "corp",
    "inc",
    "llc",
    "ltd",
];

/// Trailing generic words stripped from company names
const GENERIC_SUFFIXES: &[&str] = &["solutions", "technologies", "systems", "group"];

fn roman_numeral_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Longest alternatives first so "iii" is not matched as "i" + "i" + "i"
    RE.get_or_init(|| Regex::new(r"\b(iii|ii|iv|i|v)\b").expect("static regex"))
}

/// Derive a stable identifier for a job posting.
///
/// Pure and infallible: prefers `hostname + pathname` of the apply URL, falls
/// back to normalized `company-title-city`. Two records describing the same
/// posting must map to the same id even when superficial formatting differs.
pub fn generate_job_id(job: &JobPosting) -> JobId {
    if let Some(raw_url) = job.url.as_deref() {
        if let Some(id) = id_from_url(raw_url) {
            return id;
        }
    }

    let company = normalize_company(&job.company);
    let title = normalize_title(&job.title);
    let city = normalize_location(job.location.as_deref());

    // Degenerate (empty) output is returned as-is; see DESIGN.md.
    sanitize(&format!("{company}-{title}-{city}"))
}

/// Best-effort migration for seen-set ids written by older releases, which
/// contained raw commas and triple-dash separators
pub fn migrate_legacy_id(id: &str) -> JobId {
    if id.contains(',') || id.contains("---") {
        sanitize(&id.to_lowercase())
    } else {
        id.to_string()
    }
}

fn id_from_url(raw: &str) -> Option<JobId> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?;
    // Query string and trailing slash carry no identity
    let path = url.path().trim_end_matches('/');
    let id = sanitize(&format!("{host}{path}").to_lowercase());
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let lowered = lowered.trim();

    // Roman numerals are replaced on word boundaries BEFORE whitespace is
    // collapsed to dashes, otherwise the boundaries disappear
    let with_digits = roman_numeral_re().replace_all(lowered, |caps: &regex::Captures| {
        match &caps[1] {
            "i" => "1",
            "ii" => "2",
            "iii" => "3",
            "iv" => "4",
            "v" => "5",
            other => other,
        }
        .to_string()
    });

    let expanded = with_digits
        .replace("sr.", "senior")
        .replace("jr.", "junior")
        .replace('&', "and");

    dash_join(&expanded)
}

fn normalize_company(company: &str) -> String {
    let mut name = company.to_lowercase().trim().to_string();

    // Strip trailing legal suffixes and generic words, repeatedly, so
    // "Foo Solutions Inc." reduces to "foo". Never strip the whole name.
    loop {
        let trimmed = name
            .trim_end_matches(|c: char| c.is_whitespace() || c == '.' || c == ',')
            .to_string();
        let mut stripped = false;
        for suffix in LEGAL_SUFFIXES.iter().chain(GENERIC_SUFFIXES.iter()) {
            if let Some(rest) = trimmed.strip_suffix(suffix) {
                let is_word_boundary = rest
                    .chars()
                    .last()
                    .map(|c| c.is_whitespace() || c == ',' || c == '.')
                    .unwrap_or(false);
                if is_word_boundary && !rest.trim().is_empty() {
                    name = rest.to_string();
                    stripped = true;
                    break;
                }
            }
        }
        if !stripped {
            name = trimmed;
            break;
        }
    }

    dash_join(&name.replace(", ", "-"))
}

fn normalize_location(location: Option<&str>) -> String {
    match location {
        Some(city) => dash_join(&city.to_lowercase()),
        None => String::new(),
    }
}

/// Collapse internal whitespace runs to single dashes
fn dash_join(s: &str) -> String {
    s.trim().split_whitespace().collect::<Vec<_>>().join("-")
}

/// Replace every non-word, non-dash character with `-`, collapse repeated
/// dashes, trim leading/trailing dashes
fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_dash = false;
    for c in s.chars() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}
