//! Detail pass: product pages to card records
//!
//! Candidates come from the active inventory and are filtered by the refresh
//! policy. Due URLs are fetched concurrently; extraction goes through the
//! serialized gate. Every attempt lands in the audit log, and only a
//! successful extraction touches the detail record.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use scraper::Html;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::worker_pool::run_bounded;
use crate::domain::{CardDetail, RefreshDecision, RefreshPolicy, RunSummary, ScrapeAttempt, ScrapeStatus};
use crate::infrastructure::config::{AppConfig, ConfigError, defaults};
use crate::infrastructure::llm_client::CardFieldExtractor;
use crate::infrastructure::page_fetcher::{PageFetcher, is_redirected_away};
use crate::infrastructure::parsing::visible_text;
use crate::infrastructure::{DetailRepository, RefreshCandidate, SerializedExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailSettings {
    pub workers: usize,
    /// A page needs strictly more visible characters than this.
    pub min_page_text_chars: usize,
    pub policy: RefreshPolicy,
}

impl Default for DetailSettings {
    fn default() -> Self {
        Self {
            workers: defaults::DETAIL_WORKERS,
            min_page_text_chars: defaults::MIN_PAGE_TEXT_CHARS,
            policy: RefreshPolicy::default(),
        }
    }
}

impl TryFrom<&AppConfig> for DetailSettings {
    type Error = ConfigError;

    fn try_from(config: &AppConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            workers: config.crawling.detail_workers,
            min_page_text_chars: config.crawling.min_page_text_chars,
            policy: config.refresh.policy()?,
        })
    }
}

/// Result of looking at one page, before anything is written.
struct Evaluation {
    status: ScrapeStatus,
    page_text: String,
    llm_response: String,
    detail: Option<CardDetail>,
}

impl Evaluation {
    fn failed(status: ScrapeStatus, page_text: String, llm_response: String) -> Self {
        Self {
            status,
            page_text,
            llm_response,
            detail: None,
        }
    }
}

#[derive(Clone)]
pub struct DetailService {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<SerializedExtractor>,
    details: DetailRepository,
    settings: DetailSettings,
}

impl DetailService {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<SerializedExtractor>,
        details: DetailRepository,
        settings: DetailSettings,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            details,
            settings,
        }
    }

    /// Refresh every due URL, at most `limit` of them, and persist the run summary.
    pub async fn run(&self, limit: Option<usize>) -> Result<RunSummary> {
        self.run_at(Utc::now(), limit).await
    }

    /// Same as [`run`](Self::run) with an explicit clock for the refresh decision.
    pub async fn run_at(&self, now: DateTime<Utc>, limit: Option<usize>) -> Result<RunSummary> {
        let candidates = self.details.refresh_candidates().await?;
        let mut summary = RunSummary::new(now, candidates.len());

        let mut due = Vec::new();
        for candidate in candidates {
            match self
                .settings
                .policy
                .decide(candidate.last_updated_at, candidate.failures, now)
            {
                RefreshDecision::Scrape => due.push(candidate),
                RefreshDecision::Fresh => summary.skipped_fresh += 1,
                RefreshDecision::BackingOff { until } => {
                    debug!("Backing off {} until {}", candidate.url, until);
                    summary.skipped_backoff += 1;
                }
            }
        }
        if let Some(limit) = limit {
            due.truncate(limit);
        }

        info!(
            "{} URLs in inventory: {} fresh, {} backing off, {} to scrape",
            summary.total_urls_in_inventory,
            summary.skipped_fresh,
            summary.skipped_backoff,
            due.len()
        );

        let service = self.clone();
        let results = run_bounded(due, self.settings.workers, move |candidate| {
            let service = service.clone();
            async move { service.scrape_candidate(candidate, now).await }
        })
        .await;

        for result in results {
            match result {
                Ok(Ok(status)) => summary.record(status),
                Ok(Err(e)) => {
                    warn!("Could not persist scrape result: {:#}", e);
                    summary.urls_processed += 1;
                    summary.failed_urls += 1;
                }
                Err(failure) => {
                    warn!("Scrape task failed: {}", failure);
                    summary.urls_processed += 1;
                    summary.failed_urls += 1;
                }
            }
        }

        self.details.save_run_summary(&summary).await?;
        info!(
            "Detail run finished: {} processed, {} succeeded, {} failed",
            summary.urls_processed, summary.successful_extractions, summary.failed_urls
        );
        Ok(summary)
    }

    /// Scrape one active inventory URL regardless of freshness or backoff.
    pub async fn scrape_one(&self, url: &str) -> Result<ScrapeStatus> {
        let candidate = self
            .details
            .refresh_candidates()
            .await?
            .into_iter()
            .find(|c| c.url == url)
            .ok_or_else(|| anyhow!("{url} is not an active inventory URL"))?;
        self.scrape_candidate(candidate, Utc::now()).await
    }

    async fn scrape_candidate(
        &self,
        candidate: RefreshCandidate,
        run_timestamp: DateTime<Utc>,
    ) -> Result<ScrapeStatus> {
        let evaluation = self.evaluate(&candidate, run_timestamp).await;
        let status = evaluation.status;

        self.details
            .record_attempt(&ScrapeAttempt {
                card_url: candidate.url.clone(),
                bank_name: candidate.bank_name.clone(),
                card_name: candidate.card_name.clone(),
                run_timestamp,
                raw_page_text: evaluation.page_text,
                llm_response: evaluation.llm_response,
                status,
            })
            .await?;

        if let Some(detail) = evaluation.detail {
            self.details.upsert_detail(&detail).await?;
            self.details.clear_failures(&candidate.url).await?;
            info!("Updated {} ({})", detail.card_name, candidate.bank_name);
        } else {
            let failures = self.details.record_failure(&candidate.url, status, run_timestamp).await?;
            warn!("{} for {} (failure #{})", status, candidate.url, failures);
        }
        Ok(status)
    }

    async fn evaluate(&self, candidate: &RefreshCandidate, now: DateTime<Utc>) -> Evaluation {
        let page = match self.fetcher.fetch(&candidate.url).await {
            Ok(page) => page,
            Err(e) => {
                debug!("Fetch failed for {}: {:#}", candidate.url, e);
                return Evaluation::failed(ScrapeStatus::FetchError, String::new(), String::new());
            }
        };

        if is_redirected_away(&candidate.url, &page.final_url) {
            debug!("{} redirected to {}", candidate.url, page.final_url);
            return Evaluation::failed(ScrapeStatus::RedirectFailure, String::new(), String::new());
        }

        let page_text = visible_text(&Html::parse_document(&page.html));
        if page_text.chars().count() <= self.settings.min_page_text_chars {
            return Evaluation::failed(ScrapeStatus::PageEmpty, page_text, String::new());
        }

        match self.extractor.extract(&page_text).await {
            Ok(extraction) => {
                let detail = CardDetail::from_extraction(
                    &candidate.url,
                    &candidate.bank_name,
                    &candidate.card_name,
                    &extraction.fields,
                    now,
                );
                Evaluation {
                    status: ScrapeStatus::Success,
                    page_text,
                    llm_response: extraction.raw_response,
                    detail: Some(detail),
                }
            }
            Err(e) => {
                let llm_response = e.raw_response().map_or_else(|| e.to_string(), str::to_string);
                Evaluation::failed(ScrapeStatus::LlmError, page_text, llm_response)
            }
        }
    }
}
