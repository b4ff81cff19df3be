// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database url: {database_url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {database_url}"))?;

        info!("Connected to database: {}", db_path);
        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that never expires
    /// keeps the data alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the catalog schema. Safe to run on every start.
    pub async fn migrate(&self) -> Result<()> {
        let create_inventory_sql = r"
            CREATE TABLE IF NOT EXISTS card_inventory (
                url TEXT PRIMARY KEY,
                bank_name TEXT NOT NULL,
                card_name TEXT NOT NULL,
                first_discovered_at DATETIME NOT NULL,
                last_verified_at DATETIME NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1
            )
        ";

        let create_details_sql = r"
            CREATE TABLE IF NOT EXISTS credit_cards_details (
                url TEXT PRIMARY KEY,
                bank_name TEXT NOT NULL,
                card_name TEXT NOT NULL,
                minimum_salary_requirement TEXT,
                min_salary_numeric REAL NOT NULL DEFAULT 0,
                annual_fee TEXT,
                minimum_spend_requirement TEXT,
                balance_transfer_eligibility TEXT,
                foreign_currency_fee TEXT,
                welcome_bonus TEXT,
                cashback_rates TEXT,
                max_cashback_rate REAL NOT NULL DEFAULT 0,
                is_uncapped BOOLEAN NOT NULL DEFAULT 0,
                cashback_type TEXT NOT NULL DEFAULT 'Variable',
                points_earning_rates TEXT,
                cobrand_rewards TEXT,
                airport_lounge_access TEXT,
                travel_insurance TEXT,
                airport_transfers TEXT,
                hotel_discounts TEXT,
                cinema_offers TEXT,
                dining_discounts TEXT,
                golf_privileges TEXT,
                valet_parking TEXT,
                purchase_protection TEXT,
                extended_warranty TEXT,
                other_key_benefits TEXT,
                last_updated_at DATETIME NOT NULL
            )
        ";

        let create_interaction_log_sql = r"
            CREATE TABLE IF NOT EXISTS llm_interaction_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                card_url TEXT NOT NULL,
                bank_name TEXT NOT NULL,
                card_name TEXT NOT NULL,
                run_timestamp DATETIME NOT NULL,
                raw_page_text TEXT,
                llm_response TEXT,
                status TEXT NOT NULL
            )
        ";

        let create_run_summary_sql = r"
            CREATE TABLE IF NOT EXISTS run_summary (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_timestamp DATETIME NOT NULL,
                total_urls_in_inventory INTEGER NOT NULL,
                skipped_fresh INTEGER NOT NULL DEFAULT 0,
                skipped_backoff INTEGER NOT NULL DEFAULT 0,
                urls_processed INTEGER NOT NULL,
                successful_extractions INTEGER NOT NULL,
                failed_urls INTEGER NOT NULL
            )
        ";

        let create_failures_sql = r"
            CREATE TABLE IF NOT EXISTS scrape_failures (
                url TEXT PRIMARY KEY,
                consecutive_failures INTEGER NOT NULL,
                last_failed_at DATETIME NOT NULL,
                last_status TEXT NOT NULL
            )
        ";

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_inventory_bank_active ON card_inventory (bank_name, is_active)",
            "CREATE INDEX IF NOT EXISTS idx_details_last_updated ON credit_cards_details (last_updated_at)",
            "CREATE INDEX IF NOT EXISTS idx_interaction_log_url ON llm_interaction_log (card_url)",
            "CREATE INDEX IF NOT EXISTS idx_interaction_log_status ON llm_interaction_log (status)",
        ];

        for statement in [
            create_inventory_sql,
            create_details_sql,
            create_interaction_log_sql,
            create_run_summary_sql,
            create_failures_sql,
        ]
        .into_iter()
        .chain(create_indexes_sql)
        {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("test.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;

        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration_is_idempotent() -> Result<()> {
        let db = DatabaseConnection::in_memory().await?;
        db.migrate().await?;
        db.migrate().await?;

        for table in [
            "card_inventory",
            "credit_cards_details",
            "llm_interaction_log",
            "run_summary",
            "scrape_failures",
        ] {
            let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_optional(db.pool())
                .await?;
            assert!(result.is_some(), "missing table {table}");
        }
        Ok(())
    }
}
