//! Logging system configuration and initialization
//!
//! - Console output with compact formatting
//! - Optional file output through a non-blocking writer
//! - Structured JSON logging (optional)
//! - Per-module level overrides from configuration, `RUST_LOG` wins when set
//! - The previous log file is renamed with its timestamp on startup

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::Mutex;
use tracing::{Subscriber, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::defaults;

// Keeps the file writer alive for the lifetime of the process
static LOG_GUARDS: Lazy<Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// UTC timestamps with millisecond precision.
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

/// Rename an existing log file to `<stem>.<timestamp>.log`.
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<()> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(&log_file_path).context("Failed to get log file metadata")?;
    let file_time = metadata
        .modified()
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let datetime: chrono::DateTime<Utc> = file_time.into();

    let file_stem = log_file_name.trim_end_matches(".log");
    let timestamped_name = format!("{file_stem}.{}.log", datetime.format("%Y%m%dT%H%M%S"));
    let timestamped_path = log_dir.join(&timestamped_name);

    std::fs::rename(&log_file_path, &timestamped_path).with_context(|| {
        format!(
            "Failed to rotate log file {} to {}",
            log_file_path.display(),
            timestamped_path.display()
        )
    })?;

    Ok(())
}

/// Build the level filter. Dependency noise is suppressed unless the
/// configured level is `trace`.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    if !config.level.eq_ignore_ascii_case("trace") {
        let mut modules: Vec<_> = config.module_filters.iter().collect();
        modules.sort();
        for (module, level) in modules {
            filter = filter.add_directive(
                format!("{module}={level}")
                    .parse()
                    .with_context(|| format!("Invalid log directive for {module}"))?,
            );
        }
        filter = filter.add_directive(format!("card_scout_lib={}", config.level).parse()?);
    }

    Ok(filter)
}

/// Compact stderr layer stacked next to the file layer. `Option<Layer>` is
/// itself a layer, so a disabled console adds nothing.
fn console_layer<S>(enabled: bool) -> Option<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    enabled.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_timer(UtcTimeFormatter)
            .with_target(false)
    })
}

/// Initialize logging with custom configuration.
///
/// `log_dir` is only touched when file output is enabled.
pub fn init_logging_with_config(config: &LoggingConfig, log_dir: &Path) -> Result<()> {
    let env_filter = build_env_filter(config)?;
    let registry = Registry::default().with(env_filter);

    match (config.file_output, config.console_output) {
        (true, console) => {
            std::fs::create_dir_all(log_dir)
                .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
            rotate_existing_log_file(log_dir, defaults::LOG_FILE_NAME)?;

            let file_appender = rolling::never(log_dir, defaults::LOG_FILE_NAME);
            let (file_writer, file_guard) = non_blocking(file_appender);
            LOG_GUARDS
                .lock()
                .map_err(|_| anyhow!("log guard registry poisoned"))?
                .push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(UtcTimeFormatter)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false);
                registry.with(file_layer).with(console_layer(console)).try_init()?;
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(UtcTimeFormatter)
                    .with_target(false)
                    .with_ansi(false);
                registry.with(file_layer).with(console_layer(console)).try_init()?;
            }
        }
        (false, true) => {
            if config.json_format {
                let console_layer = fmt::Layer::new()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_timer(UtcTimeFormatter);
                registry.with(console_layer).try_init()?;
            } else {
                let console_layer = fmt::Layer::new()
                    .with_writer(std::io::stderr)
                    .with_timer(UtcTimeFormatter)
                    .with_target(false);
                registry.with(console_layer).try_init()?;
            }
        }
        (false, false) => {
            return Err(anyhow!("No logging output configured"));
        }
    }

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log file: {}", log_dir.join(defaults::LOG_FILE_NAME).display());
    }

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== UAE Card Scout ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {}", current_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_builds() {
        let config = LoggingConfig::default();
        assert!(build_env_filter(&config).is_ok());
    }

    #[test]
    fn bad_module_directive_is_reported() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let mut config = LoggingConfig::default();
        config.module_filters.insert("sqlx".into(), "not a level!".into());
        assert!(build_env_filter(&config).is_err());
    }

    #[test]
    fn rotation_renames_previous_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("card-scout.log"), "old run\n")?;

        rotate_existing_log_file(dir.path(), "card-scout.log")?;

        assert!(!dir.path().join("card-scout.log").exists());
        let rotated = std::fs::read_dir(dir.path())?.count();
        assert_eq!(rotated, 1);
        Ok(())
    }

    // The only test in this crate that installs a global subscriber.
    #[test]
    fn file_output_with_console_installs_subscriber() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = LoggingConfig {
            file_output: true,
            console_output: true,
            json_format: true,
            ..LoggingConfig::default()
        };

        init_logging_with_config(&config, dir.path())?;

        assert!(dir.path().join(defaults::LOG_FILE_NAME).exists());
        Ok(())
    }

    #[test]
    fn no_outputs_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        let dir = std::env::temp_dir();
        assert!(init_logging_with_config(&config, &dir).is_err());
    }
}
