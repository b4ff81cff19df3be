//! Configuration infrastructure
//!
//! Settings are read once at startup and injected into the services.
//! Sources are layered with the `config` crate, later sources winning:
//! 1. `config/default.toml` next to the working directory (optional)
//! 2. an explicit file passed on the command line (required when given)
//! 3. environment variables prefixed with `CARD_SCOUT__` (e.g. `CARD_SCOUT__LLM__MODEL`)
//!
//! The LLM API key additionally falls back to `GEMINI_API_KEY`.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::RefreshPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Default values for every setting.
pub mod defaults {
    /// Application directory name under the platform data dir
    pub const APP_DIR_NAME: &str = "uae-card-scout";

    /// SQLite file name inside the data directory
    pub const DATABASE_FILE: &str = "credit_card_data.db";

    /// Concurrent bank listing pages during discovery
    pub const DISCOVERY_WORKERS: usize = 5;

    /// Concurrent product pages during the detail scrape
    pub const DETAIL_WORKERS: usize = 5;

    /// Request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Global request rate across all workers
    pub const MAX_REQUESTS_PER_SECOND: u32 = 5;

    /// Browser-like user agent; several bank sites refuse obvious bots
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

    /// Pages with less visible text than this are treated as empty
    pub const MIN_PAGE_TEXT_CHARS: usize = 100;

    /// Detail records younger than this many days are not re-scraped
    pub const CACHE_VALIDITY_DAYS: i64 = 7;

    /// First backoff window after a failed detail scrape
    pub const RETRY_BACKOFF_BASE_HOURS: i64 = 6;

    /// Upper bound of the failure backoff window
    pub const RETRY_BACKOFF_MAX_HOURS: i64 = 168;

    /// Largest accepted cache validity or backoff window, in days
    pub const MAX_REFRESH_WINDOW_DAYS: i64 = 3650;

    pub const LLM_MODEL: &str = "gemini-flash-latest";
    pub const LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

    /// Fixed pause before every LLM call (crude provider rate limit)
    pub const LLM_CALL_DELAY_MS: u64 = 10_000;

    pub const LLM_TIMEOUT_SECONDS: u64 = 180;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
    pub const LOG_FILE_NAME: &str = "card-scout.log";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub crawling: CrawlingConfig,
    pub refresh: RefreshConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection string; defaults to a file in the app data directory
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlingConfig {
    pub discovery_workers: usize,
    pub detail_workers: usize,
    pub request_timeout_seconds: u64,
    pub max_requests_per_second: u32,
    pub user_agent: String,
    pub min_page_text_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub cache_validity_days: i64,
    pub retry_backoff_base_hours: i64,
    pub retry_backoff_max_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub call_delay_ms: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Defaults to `<app data dir>/logs`
    pub log_dir: Option<PathBuf>,
    /// Module-specific levels, e.g. `sqlx = "warn"`
    pub module_filters: HashMap<String, String>,
}

impl Default for CrawlingConfig {
    fn default() -> Self {
        Self {
            discovery_workers: defaults::DISCOVERY_WORKERS,
            detail_workers: defaults::DETAIL_WORKERS,
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            user_agent: defaults::USER_AGENT.to_string(),
            min_page_text_chars: defaults::MIN_PAGE_TEXT_CHARS,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cache_validity_days: defaults::CACHE_VALIDITY_DAYS,
            retry_backoff_base_hours: defaults::RETRY_BACKOFF_BASE_HOURS,
            retry_backoff_max_hours: defaults::RETRY_BACKOFF_MAX_HOURS,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: defaults::LLM_MODEL.to_string(),
            base_url: defaults::LLM_BASE_URL.to_string(),
            call_delay_ms: defaults::LLM_CALL_DELAY_MS,
            timeout_seconds: defaults::LLM_TIMEOUT_SECONDS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("sqlx".to_string(), "warn".to_string());
        module_filters.insert("reqwest".to_string(), "info".to_string());
        module_filters.insert("hyper".to_string(), "warn".to_string());
        module_filters.insert("html5ever".to_string(), "warn".to_string());

        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            module_filters,
        }
    }
}

impl LlmConfig {
    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.call_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl RefreshConfig {
    pub fn policy(&self) -> Result<RefreshPolicy, ConfigError> {
        let out_of_range = |field: &str| ConfigError::Validation {
            message: format!("{field} is out of range"),
        };
        Ok(RefreshPolicy {
            ttl: ChronoDuration::try_days(self.cache_validity_days)
                .ok_or_else(|| out_of_range("cache_validity_days"))?,
            backoff_base: ChronoDuration::try_hours(self.retry_backoff_base_hours)
                .ok_or_else(|| out_of_range("retry_backoff_base_hours"))?,
            backoff_max: ChronoDuration::try_hours(self.retry_backoff_max_hours)
                .ok_or_else(|| out_of_range("retry_backoff_max_hours"))?,
        })
    }
}

impl AppConfig {
    /// Load layered configuration. `explicit` must exist when given.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("CARD_SCOUT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = settings.try_deserialize()?;
        if config.llm.api_key.as_deref().is_none_or(str::is_empty) {
            config.llm.api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Validation {
                message: message.to_string(),
            })
        };

        if self.crawling.discovery_workers == 0 || self.crawling.detail_workers == 0 {
            return invalid("worker counts must be greater than 0");
        }
        if self.crawling.max_requests_per_second == 0 {
            return invalid("max_requests_per_second must be greater than 0");
        }
        if self.refresh.cache_validity_days <= 0 {
            return invalid("cache_validity_days must be greater than 0");
        }
        if self.refresh.retry_backoff_base_hours < 0
            || self.refresh.retry_backoff_max_hours < self.refresh.retry_backoff_base_hours
        {
            return invalid("retry backoff bounds are inconsistent");
        }
        if self.refresh.cache_validity_days > defaults::MAX_REFRESH_WINDOW_DAYS
            || self.refresh.retry_backoff_max_hours > defaults::MAX_REFRESH_WINDOW_DAYS * 24
        {
            return invalid("refresh windows may not exceed MAX_REFRESH_WINDOW_DAYS");
        }
        self.refresh.policy()?;

        Ok(())
    }

    /// Connection string for the catalog database.
    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => {
                let path = app_data_dir().join(defaults::DATABASE_FILE);
                format!("sqlite://{}", path.display())
            }
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.logging
            .log_dir
            .clone()
            .unwrap_or_else(|| app_data_dir().join("logs"))
    }
}

/// Platform data directory for the database and logs, falling back to the
/// working directory when the platform has none.
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(defaults::APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh.policy().unwrap().ttl, ChronoDuration::days(7));
        assert!(config.database_url().ends_with(defaults::DATABASE_FILE));
    }

    #[test]
    fn zero_workers_are_rejected() {
        let mut config = AppConfig::default();
        config.crawling.detail_workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn oversized_refresh_windows_are_rejected() {
        let mut config = AppConfig::default();
        config.refresh.cache_validity_days = i64::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
        assert!(config.refresh.policy().is_err());

        let mut config = AppConfig::default();
        config.refresh.retry_backoff_max_hours = i64::MAX / 2;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
        assert!(config.refresh.policy().is_err());
    }

    #[test]
    fn explicit_file_overrides_defaults() -> anyhow::Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            "[database]\nurl = \"sqlite::memory:\"\n\n[refresh]\ncache_validity_days = 3\n\n[llm]\napi_key = \"from-file\"\nmodel = \"test-model\""
        )?;

        let config = AppConfig::load(Some(file.path()))?;
        assert_eq!(config.database_url(), "sqlite::memory:");
        assert_eq!(config.refresh.cache_validity_days, 3);
        assert_eq!(config.llm.model, "test-model");
        assert_eq!(config.llm.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.crawling.detail_workers, defaults::DETAIL_WORKERS);
        Ok(())
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(result.is_err());
    }
}
