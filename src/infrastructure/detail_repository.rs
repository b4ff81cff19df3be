//! Repository for card details, the scrape audit log, failure backoff state
//! and run summaries.
//!
//! Every method is a single statement on a pooled connection; nothing here
//! holds a transaction across URLs.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::domain::card_detail::CashbackType;
use crate::domain::{CardDetail, FailureState, RunSummary, ScrapeAttempt, ScrapeStatus};

/// An active inventory URL with the state needed for the refresh decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshCandidate {
    pub url: String,
    pub bank_name: String,
    pub card_name: String,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub failures: Option<FailureState>,
}

#[derive(Clone)]
pub struct DetailRepository {
    pool: Arc<SqlitePool>,
}

impl DetailRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Active inventory joined with detail freshness and failure state.
    pub async fn refresh_candidates(&self) -> Result<Vec<RefreshCandidate>> {
        let rows = sqlx::query(
            r"
            SELECT i.url, i.bank_name, i.card_name,
                   d.last_updated_at,
                   f.consecutive_failures, f.last_failed_at
            FROM card_inventory i
            LEFT JOIN credit_cards_details d ON d.url = i.url
            LEFT JOIN scrape_failures f ON f.url = i.url
            WHERE i.is_active = 1
            ORDER BY i.bank_name, i.url
            ",
        )
        .fetch_all(&*self.pool)
        .await
        .context("Failed to load refresh candidates")?;

        rows.iter()
            .map(|row| -> Result<RefreshCandidate> {
                let failures = match (
                    row.try_get::<Option<i64>, _>("consecutive_failures")?,
                    row.try_get::<Option<DateTime<Utc>>, _>("last_failed_at")?,
                ) {
                    (Some(count), Some(last_failed_at)) => Some(FailureState {
                        consecutive_failures: count as u32,
                        last_failed_at,
                    }),
                    _ => None,
                };

                Ok(RefreshCandidate {
                    url: row.try_get("url")?,
                    bank_name: row.try_get("bank_name")?,
                    card_name: row.try_get("card_name")?,
                    last_updated_at: row.try_get("last_updated_at")?,
                    failures,
                })
            })
            .collect()
    }

    /// Insert or fully replace the detail record of one URL.
    pub async fn upsert_detail(&self, detail: &CardDetail) -> Result<()> {
        sqlx::query(
            r"
            INSERT OR REPLACE INTO credit_cards_details
            (url, bank_name, card_name, minimum_salary_requirement, min_salary_numeric,
             annual_fee, minimum_spend_requirement, balance_transfer_eligibility,
             foreign_currency_fee, welcome_bonus, cashback_rates, max_cashback_rate,
             is_uncapped, cashback_type, points_earning_rates, cobrand_rewards,
             airport_lounge_access, travel_insurance, airport_transfers, hotel_discounts,
             cinema_offers, dining_discounts, golf_privileges, valet_parking,
             purchase_protection, extended_warranty, other_key_benefits, last_updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&detail.url)
        .bind(&detail.bank_name)
        .bind(&detail.card_name)
        .bind(&detail.minimum_salary_requirement)
        .bind(detail.min_salary_numeric)
        .bind(&detail.annual_fee)
        .bind(&detail.minimum_spend_requirement)
        .bind(&detail.balance_transfer_eligibility)
        .bind(&detail.foreign_currency_fee)
        .bind(&detail.welcome_bonus)
        .bind(&detail.cashback_rates)
        .bind(detail.max_cashback_rate)
        .bind(detail.is_uncapped)
        .bind(detail.cashback_type.as_str())
        .bind(&detail.points_earning_rates)
        .bind(&detail.cobrand_rewards)
        .bind(&detail.airport_lounge_access)
        .bind(&detail.travel_insurance)
        .bind(&detail.airport_transfers)
        .bind(&detail.hotel_discounts)
        .bind(&detail.cinema_offers)
        .bind(&detail.dining_discounts)
        .bind(&detail.golf_privileges)
        .bind(&detail.valet_parking)
        .bind(&detail.purchase_protection)
        .bind(&detail.extended_warranty)
        .bind(&detail.other_key_benefits)
        .bind(detail.last_updated_at)
        .execute(&*self.pool)
        .await
        .with_context(|| format!("Failed to store detail for {}", detail.url))?;
        Ok(())
    }

    pub async fn get_detail(&self, url: &str) -> Result<Option<CardDetail>> {
        sqlx::query("SELECT * FROM credit_cards_details WHERE url = ?")
            .bind(url)
            .fetch_optional(&*self.pool)
            .await?
            .as_ref()
            .map(detail_from_row)
            .transpose()
    }

    /// Append one attempt to the audit log.
    pub async fn record_attempt(&self, attempt: &ScrapeAttempt) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO llm_interaction_log
            (card_url, bank_name, card_name, run_timestamp, raw_page_text, llm_response, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&attempt.card_url)
        .bind(&attempt.bank_name)
        .bind(&attempt.card_name)
        .bind(attempt.run_timestamp)
        .bind(&attempt.raw_page_text)
        .bind(&attempt.llm_response)
        .bind(attempt.status.as_str())
        .execute(&*self.pool)
        .await
        .with_context(|| format!("Failed to log attempt for {}", attempt.card_url))?;
        Ok(())
    }

    /// Audit log entries of one URL, oldest first.
    pub async fn attempts_for(&self, url: &str) -> Result<Vec<ScrapeAttempt>> {
        let rows = sqlx::query("SELECT * FROM llm_interaction_log WHERE card_url = ? ORDER BY id")
            .bind(url)
            .fetch_all(&*self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<ScrapeAttempt> {
                let status: String = row.try_get("status")?;
                Ok(ScrapeAttempt {
                    card_url: row.try_get("card_url")?,
                    bank_name: row.try_get("bank_name")?,
                    card_name: row.try_get("card_name")?,
                    run_timestamp: row.try_get("run_timestamp")?,
                    raw_page_text: row.try_get::<Option<String>, _>("raw_page_text")?.unwrap_or_default(),
                    llm_response: row.try_get::<Option<String>, _>("llm_response")?.unwrap_or_default(),
                    status: status.parse::<ScrapeStatus>().map_err(|e| anyhow!(e))?,
                })
            })
            .collect()
    }

    /// Bump the consecutive failure counter and return its new value.
    pub async fn record_failure(&self, url: &str, status: ScrapeStatus, now: DateTime<Utc>) -> Result<u32> {
        let row = sqlx::query(
            r"
            INSERT INTO scrape_failures (url, consecutive_failures, last_failed_at, last_status)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                consecutive_failures = consecutive_failures + 1,
                last_failed_at = excluded.last_failed_at,
                last_status = excluded.last_status
            RETURNING consecutive_failures
            ",
        )
        .bind(url)
        .bind(now)
        .bind(status.as_str())
        .fetch_one(&*self.pool)
        .await
        .with_context(|| format!("Failed to record failure for {url}"))?;

        Ok(row.try_get::<i64, _>("consecutive_failures")? as u32)
    }

    pub async fn failure_state(&self, url: &str) -> Result<Option<FailureState>> {
        sqlx::query("SELECT consecutive_failures, last_failed_at FROM scrape_failures WHERE url = ?")
            .bind(url)
            .fetch_optional(&*self.pool)
            .await?
            .map(|row| -> Result<FailureState> {
                Ok(FailureState {
                    consecutive_failures: row.try_get::<i64, _>("consecutive_failures")? as u32,
                    last_failed_at: row.try_get("last_failed_at")?,
                })
            })
            .transpose()
    }

    pub async fn clear_failures(&self, url: &str) -> Result<()> {
        sqlx::query("DELETE FROM scrape_failures WHERE url = ?")
            .bind(url)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_run_summary(&self, summary: &RunSummary) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO run_summary
            (run_timestamp, total_urls_in_inventory, skipped_fresh, skipped_backoff,
             urls_processed, successful_extractions, failed_urls)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(summary.run_timestamp)
        .bind(summary.total_urls_in_inventory as i64)
        .bind(summary.skipped_fresh as i64)
        .bind(summary.skipped_backoff as i64)
        .bind(summary.urls_processed as i64)
        .bind(summary.successful_extractions as i64)
        .bind(summary.failed_urls as i64)
        .execute(&*self.pool)
        .await
        .context("Failed to save run summary")?;
        Ok(())
    }

    pub async fn latest_run_summary(&self) -> Result<Option<RunSummary>> {
        sqlx::query("SELECT * FROM run_summary ORDER BY id DESC LIMIT 1")
            .fetch_optional(&*self.pool)
            .await?
            .map(|row| -> Result<RunSummary> {
                let count = |column: &str| -> Result<usize> { Ok(row.try_get::<i64, _>(column)? as usize) };
                Ok(RunSummary {
                    run_timestamp: row.try_get("run_timestamp")?,
                    total_urls_in_inventory: count("total_urls_in_inventory")?,
                    skipped_fresh: count("skipped_fresh")?,
                    skipped_backoff: count("skipped_backoff")?,
                    urls_processed: count("urls_processed")?,
                    successful_extractions: count("successful_extractions")?,
                    failed_urls: count("failed_urls")?,
                })
            })
            .transpose()
    }
}

fn detail_from_row(row: &SqliteRow) -> Result<CardDetail> {
    let text = |column: &str| -> Result<String> { Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default()) };
    let cashback_type: String = row.try_get("cashback_type")?;

    Ok(CardDetail {
        url: row.try_get("url")?,
        bank_name: row.try_get("bank_name")?,
        card_name: row.try_get("card_name")?,
        minimum_salary_requirement: text("minimum_salary_requirement")?,
        min_salary_numeric: row.try_get("min_salary_numeric")?,
        annual_fee: text("annual_fee")?,
        minimum_spend_requirement: text("minimum_spend_requirement")?,
        balance_transfer_eligibility: text("balance_transfer_eligibility")?,
        foreign_currency_fee: text("foreign_currency_fee")?,
        welcome_bonus: text("welcome_bonus")?,
        cashback_rates: text("cashback_rates")?,
        max_cashback_rate: row.try_get("max_cashback_rate")?,
        is_uncapped: row.try_get("is_uncapped")?,
        cashback_type: CashbackType::parse(&cashback_type),
        points_earning_rates: text("points_earning_rates")?,
        cobrand_rewards: text("cobrand_rewards")?,
        airport_lounge_access: text("airport_lounge_access")?,
        travel_insurance: text("travel_insurance")?,
        airport_transfers: text("airport_transfers")?,
        hotel_discounts: text("hotel_discounts")?,
        cinema_offers: text("cinema_offers")?,
        dining_discounts: text("dining_discounts")?,
        golf_privileges: text("golf_privileges")?,
        valet_parking: text("valet_parking")?,
        purchase_protection: text("purchase_protection")?,
        extended_warranty: text("extended_warranty")?,
        other_key_benefits: text("other_key_benefits")?,
        last_updated_at: row.try_get("last_updated_at")?,
    })
}
