//! Repository for the card inventory
//!
//! The inventory is the source of truth for which product URLs exist. Rows
//! are never deleted; a card that disappears from its bank's listing is
//! deactivated and reactivated in place if it comes back.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::debug;

use crate::domain::card::is_suspicious_name;
use crate::domain::{InventoryEntry, ReconciliationPlan, ReconciliationReport};

/// Active/inactive totals for one bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankInventoryCount {
    pub bank_name: String,
    pub active: usize,
    pub inactive: usize,
}

#[derive(Clone)]
pub struct InventoryRepository {
    pool: Arc<SqlitePool>,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn active_urls_for_bank(&self, bank_name: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT url FROM card_inventory WHERE bank_name = ? AND is_active = 1 ORDER BY url")
            .bind(bank_name)
            .fetch_all(&*self.pool)
            .await
            .context("Failed to load active inventory urls")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("url").map_err(anyhow::Error::from))
            .collect()
    }

    /// Apply one bank's reconciliation plan atomically: either every flag
    /// and timestamp change lands, or none does.
    pub async fn apply_reconciliation(
        &self,
        bank_name: &str,
        plan: &ReconciliationPlan,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationReport> {
        let mut report = ReconciliationReport {
            bank_name: bank_name.to_string(),
            found: plan.upsert.len(),
            ..ReconciliationReport::default()
        };

        let mut tx = self.pool.begin().await.context("Failed to begin reconciliation")?;

        for url in &plan.deactivate {
            let result = sqlx::query(
                "UPDATE card_inventory SET is_active = 0 WHERE url = ? AND bank_name = ? AND is_active = 1",
            )
            .bind(url)
            .bind(bank_name)
            .execute(&mut *tx)
            .await?;
            report.deactivated += result.rows_affected() as usize;
        }

        for card in &plan.upsert {
            let existing: Option<bool> = sqlx::query("SELECT is_active FROM card_inventory WHERE url = ?")
                .bind(&card.url)
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.try_get::<bool, _>("is_active"))
                .transpose()?;

            match existing {
                None => report.inserted += 1,
                Some(false) => report.reactivated += 1,
                Some(true) => {}
            }

            sqlx::query(
                r"
                INSERT INTO card_inventory (url, bank_name, card_name, first_discovered_at, last_verified_at, is_active)
                VALUES (?, ?, ?, ?, ?, 1)
                ON CONFLICT(url) DO UPDATE SET
                    card_name = excluded.card_name,
                    last_verified_at = excluded.last_verified_at,
                    is_active = 1
                ",
            )
            .bind(&card.url)
            .bind(bank_name)
            .bind(&card.name)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.context("Failed to commit reconciliation")?;

        debug!(
            "Reconciled {}: found={}, inserted={}, reactivated={}, deactivated={}",
            bank_name, report.found, report.inserted, report.reactivated, report.deactivated
        );
        Ok(report)
    }

    /// Active entries, optionally restricted to one bank.
    pub async fn list_active(&self, bank_name: Option<&str>) -> Result<Vec<InventoryEntry>> {
        let rows = match bank_name {
            Some(bank) => {
                sqlx::query("SELECT * FROM card_inventory WHERE is_active = 1 AND bank_name = ? ORDER BY bank_name, url")
                    .bind(bank)
                    .fetch_all(&*self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM card_inventory WHERE is_active = 1 ORDER BY bank_name, url")
                    .fetch_all(&*self.pool)
                    .await?
            }
        };

        rows.iter().map(entry_from_row).collect()
    }

    pub async fn get(&self, url: &str) -> Result<Option<InventoryEntry>> {
        sqlx::query("SELECT * FROM card_inventory WHERE url = ?")
            .bind(url)
            .fetch_optional(&*self.pool)
            .await?
            .as_ref()
            .map(entry_from_row)
            .transpose()
    }

    pub async fn counts_by_bank(&self) -> Result<Vec<BankInventoryCount>> {
        let rows = sqlx::query(
            r"
            SELECT bank_name,
                   SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END) AS active,
                   SUM(CASE WHEN is_active = 0 THEN 1 ELSE 0 END) AS inactive
            FROM card_inventory
            GROUP BY bank_name
            ORDER BY bank_name
            ",
        )
        .fetch_all(&*self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<BankInventoryCount> {
                Ok(BankInventoryCount {
                    bank_name: row.try_get("bank_name")?,
                    active: row.try_get::<i64, _>("active")? as usize,
                    inactive: row.try_get::<i64, _>("inactive")? as usize,
                })
            })
            .collect()
    }

    /// Active entries whose stored name looks like a scraping failure.
    pub async fn suspicious_entries(&self) -> Result<Vec<InventoryEntry>> {
        Ok(self
            .list_active(None)
            .await?
            .into_iter()
            .filter(|entry| is_suspicious_name(&entry.card_name))
            .collect())
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<InventoryEntry> {
    Ok(InventoryEntry {
        url: row.try_get("url")?,
        bank_name: row.try_get("bank_name")?,
        card_name: row.try_get("card_name")?,
        first_discovered_at: row.try_get("first_discovered_at")?,
        last_verified_at: row.try_get("last_verified_at")?,
        is_active: row.try_get("is_active")?,
    })
}
