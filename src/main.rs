use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use card_scout_lib::application::{DetailService, DetailSettings, DiscoveryRunReport, DiscoveryService};
use card_scout_lib::domain::Bank;
use card_scout_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use card_scout_lib::infrastructure::{
    AppConfig, DatabaseConnection, DetailRepository, GeminiClient, HttpClient, HttpClientConfig, HttpPageFetcher,
    InventoryRepository, PageFetcher, SerializedExtractor, StrategyRegistry,
};

#[derive(Parser)]
#[command(name = "card-scout", version, about = "UAE credit card catalog crawler")]
struct Cli {
    /// Configuration file layered over config/default.toml.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh the card inventory from bank listing pages.
    Discover {
        /// Limit the pass to these banks (name or alias). Repeatable.
        #[arg(long = "bank")]
        banks: Vec<String>,
    },
    /// Extract card details for stale inventory URLs.
    Scrape {
        /// Process at most this many due URLs.
        #[arg(long)]
        limit: Option<usize>,
        /// Force-scrape a single inventory URL.
        #[arg(long, conflicts_with = "limit")]
        url: Option<String>,
    },
    /// Discovery over every bank followed by a detail scrape.
    Run {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Inventory counts per bank and the last run summary.
    Status,
    /// List inventory entries with placeholder names.
    Audit,
    /// List supported banks and their listing pages.
    Banks,
}

struct App {
    config: AppConfig,
    database: DatabaseConnection,
}

impl App {
    async fn open(config: AppConfig) -> Result<Self> {
        let database = DatabaseConnection::new(&config.database_url()).await?;
        database.migrate().await?;
        Ok(Self { config, database })
    }

    fn fetcher(&self) -> Result<Arc<dyn PageFetcher>> {
        let client = HttpClient::new(HttpClientConfig::from(&self.config.crawling))?;
        Ok(Arc::new(HttpPageFetcher::new(Arc::new(client))))
    }

    fn discovery_service(&self, fetcher: Arc<dyn PageFetcher>) -> DiscoveryService {
        DiscoveryService::new(
            fetcher,
            Arc::new(StrategyRegistry::new()),
            InventoryRepository::new(self.database.pool().clone()),
            self.config.crawling.discovery_workers,
        )
    }

    fn detail_service(&self, fetcher: Arc<dyn PageFetcher>) -> Result<DetailService> {
        let gemini = GeminiClient::new(&self.config.llm)?;
        info!("Using model {}", gemini.model());
        let extractor = SerializedExtractor::new(Arc::new(gemini), self.config.llm.call_delay());
        Ok(DetailService::new(
            fetcher,
            Arc::new(extractor),
            DetailRepository::new(self.database.pool().clone()),
            DetailSettings::try_from(&self.config)?,
        ))
    }
}

fn resolve_banks(names: &[String]) -> Result<Vec<Bank>> {
    if names.is_empty() {
        return Ok(Bank::all().to_vec());
    }
    names
        .iter()
        .map(|name| Bank::from_name(name).with_context(|| format!("Unknown bank: {name}")))
        .collect()
}

fn print_discovery(report: &DiscoveryRunReport) {
    for bank in &report.banks {
        match (&bank.report, &bank.error) {
            (Some(r), _) => println!(
                "{:<20} {:<9} found {:>3}  new {:>3}  reactivated {:>3}  deactivated {:>3}",
                bank.bank.display_name(),
                bank.method.to_string(),
                r.found,
                r.inserted,
                r.reactivated,
                r.deactivated
            ),
            (None, Some(e)) => println!("{:<20} ERROR     {}", bank.bank.display_name(), e),
            (None, None) => println!(
                "{:<20} {:<9} nothing found, inventory unchanged",
                bank.bank.display_name(),
                bank.method.to_string()
            ),
        }
    }
}

async fn print_status(app: &App) -> Result<()> {
    let inventory = InventoryRepository::new(app.database.pool().clone());
    let details = DetailRepository::new(app.database.pool().clone());

    println!("{:<20} {:>7} {:>9}", "Bank", "Active", "Inactive");
    for count in inventory.counts_by_bank().await? {
        println!("{:<20} {:>7} {:>9}", count.bank_name, count.active, count.inactive);
    }

    match details.latest_run_summary().await? {
        Some(s) => println!(
            "\nLast detail run {}: {} in inventory, {} fresh, {} backing off, {} processed ({} ok, {} failed)",
            s.run_timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            s.total_urls_in_inventory,
            s.skipped_fresh,
            s.skipped_backoff,
            s.urls_processed,
            s.successful_extractions,
            s.failed_urls
        ),
        None => println!("\nNo detail run recorded yet"),
    }
    Ok(())
}

async fn execute(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging_with_config(&config.logging, &config.log_dir())?;
    log_system_info();
    info!(
        "Loaded configuration (discovery_workers={}, detail_workers={}, cache_validity_days={})",
        config.crawling.discovery_workers, config.crawling.detail_workers, config.refresh.cache_validity_days
    );

    match cli.command {
        Command::Banks => {
            for bank in Bank::all() {
                println!("{:<20} {}", bank.display_name(), bank.listing_url());
            }
        }
        Command::Discover { banks } => {
            let banks = resolve_banks(&banks)?;
            let app = App::open(config).await?;
            let report = app.discovery_service(app.fetcher()?).run(&banks).await;
            print_discovery(&report);
        }
        Command::Scrape { limit, url } => {
            let app = App::open(config).await?;
            let service = app.detail_service(app.fetcher()?)?;
            if let Some(url) = url {
                let status = service.scrape_one(&url).await?;
                println!("{url}: {status}");
            } else {
                let summary = service.run(limit).await?;
                println!(
                    "Processed {} URLs: {} succeeded, {} failed ({} fresh, {} backing off)",
                    summary.urls_processed,
                    summary.successful_extractions,
                    summary.failed_urls,
                    summary.skipped_fresh,
                    summary.skipped_backoff
                );
            }
        }
        Command::Run { limit } => {
            let app = App::open(config).await?;
            let fetcher = app.fetcher()?;
            let detail = app.detail_service(fetcher.clone())?;
            let report = app.discovery_service(fetcher).run(Bank::all()).await;
            print_discovery(&report);
            let summary = detail.run(limit).await?;
            println!(
                "Processed {} URLs: {} succeeded, {} failed",
                summary.urls_processed, summary.successful_extractions, summary.failed_urls
            );
        }
        Command::Status => print_status(&App::open(config).await?).await?,
        Command::Audit => {
            let app = App::open(config).await?;
            let entries = InventoryRepository::new(app.database.pool().clone())
                .suspicious_entries()
                .await?;
            if entries.is_empty() {
                println!("No suspicious inventory names");
            }
            for entry in entries {
                println!("{:<20} {:<30} {}", entry.bank_name, entry.card_name, entry.url);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = execute(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
