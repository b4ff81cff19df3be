//! Audit log tags and per-run summary for detail scrapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of one detail-scrape attempt. Only `Success` updates the detail
/// record; everything else leaves the previous data in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScrapeStatus {
    Success,
    PageEmpty,
    RedirectFailure,
    LlmError,
    FetchError,
}

impl ScrapeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::PageEmpty => "PAGE_EMPTY",
            Self::RedirectFailure => "REDIRECT_FAILURE",
            Self::LlmError => "LLM_ERROR",
            Self::FetchError => "FETCH_ERROR",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(Self::Success),
            "PAGE_EMPTY" => Ok(Self::PageEmpty),
            "REDIRECT_FAILURE" => Ok(Self::RedirectFailure),
            "LLM_ERROR" => Ok(Self::LlmError),
            // older runs tagged browser failures this way
            "FETCH_ERROR" | "SELENIUM_ERROR" => Ok(Self::FetchError),
            other => Err(format!("unknown scrape status: {other}")),
        }
    }
}

/// One row of the `llm_interaction_log` audit table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeAttempt {
    pub card_url: String,
    pub bank_name: String,
    pub card_name: String,
    pub run_timestamp: DateTime<Utc>,
    pub raw_page_text: String,
    pub llm_response: String,
    pub status: ScrapeStatus,
}

/// Totals of one detail-scrape run, persisted to `run_summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_timestamp: DateTime<Utc>,
    pub total_urls_in_inventory: usize,
    pub skipped_fresh: usize,
    pub skipped_backoff: usize,
    pub urls_processed: usize,
    pub successful_extractions: usize,
    pub failed_urls: usize,
}

impl RunSummary {
    pub fn new(run_timestamp: DateTime<Utc>, total_urls_in_inventory: usize) -> Self {
        Self {
            run_timestamp,
            total_urls_in_inventory,
            skipped_fresh: 0,
            skipped_backoff: 0,
            urls_processed: 0,
            successful_extractions: 0,
            failed_urls: 0,
        }
    }

    pub fn record(&mut self, status: ScrapeStatus) {
        self.urls_processed += 1;
        if status.is_success() {
            self.successful_extractions += 1;
        } else {
            self.failed_urls += 1;
        }
    }
}
