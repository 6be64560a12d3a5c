// Blacklist and Validity Filters
// Applied before jobs reach the posted-accounting path; rejected jobs are
// actively removed from the pending queue so they never block it.

use serde::{Deserialize, Serialize};

use crate::domain::JobPosting;

/// One blacklisted (title, company) pair, matched case-insensitively
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub title: String,
    pub company: String,
}

/// Pre-posting job filter
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    blacklist: Vec<BlacklistEntry>,
}

impl JobFilter {
    pub fn new(blacklist: Vec<BlacklistEntry>) -> Self {
        let blacklist = blacklist
            .into_iter()
            .map(|entry| BlacklistEntry {
                title: entry.title.trim().to_lowercase(),
                company: entry.company.trim().to_lowercase(),
            })
            .collect();
        Self { blacklist }
    }

    pub fn is_blacklisted(&self, job: &JobPosting) -> bool {
        let title = job.title.trim().to_lowercase();
        let company = job.company.trim().to_lowercase();
        self.blacklist
            .iter()
            .any(|entry| entry.title == title && entry.company == company)
    }

    /// A postable job needs at least a title and a company
    pub fn is_valid(&self, job: &JobPosting) -> bool {
        !job.title.trim().is_empty() && !job.company.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> JobFilter {
        JobFilter::new(vec![BlacklistEntry {
            title: "agentic ai teacher".to_string(),
            company: "amazon".to_string(),
        }])
    }

    #[test]
    fn blacklist_matches_case_insensitively() {
        let job = JobPosting::new("Agentic AI Teacher", "Amazon");
        assert!(filter().is_blacklisted(&job));
    }

    #[test]
    fn blacklist_requires_both_fields_to_match() {
        assert!(!filter().is_blacklisted(&JobPosting::new("Agentic AI Teacher", "Acme")));
        assert!(!filter().is_blacklisted(&JobPosting::new("Senior SWE - Agi Ds", "Amazon")));
    }

    #[test]
    fn validity_rejects_empty_fields() {
        let f = filter();
        assert!(f.is_valid(&JobPosting::new("Engineer", "Acme")));
        assert!(!f.is_valid(&JobPosting::new("", "Acme")));
        assert!(!f.is_valid(&JobPosting::new("Engineer", "   ")));
    }
}
