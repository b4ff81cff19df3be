//! Discovery pass: listing pages to inventory
//!
//! Each bank is fetched, parsed and reconciled independently. A bank whose
//! listing cannot be fetched, or which yields no links, leaves its inventory
//! rows exactly as they were.

use anyhow::{Context, Result};
use chrono::Utc;
use scraper::Html;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::application::worker_pool::run_bounded;
use crate::domain::{Bank, DiscoveryMethod, DiscoveryOutcome, ReconciliationPlan, ReconciliationReport};
use crate::infrastructure::page_fetcher::PageFetcher;
use crate::infrastructure::{InventoryRepository, StrategyRegistry};

/// What happened to one bank during a discovery pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankDiscoveryResult {
    pub bank: Bank,
    pub method: DiscoveryMethod,
    pub found: usize,
    /// `None` when the inventory was left untouched.
    pub report: Option<ReconciliationReport>,
    pub error: Option<String>,
}

impl BankDiscoveryResult {
    fn untouched(outcome: &DiscoveryOutcome, error: Option<String>) -> Self {
        Self {
            bank: outcome.bank,
            method: outcome.method,
            found: outcome.cards.len(),
            report: None,
            error,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoveryRunReport {
    pub banks: Vec<BankDiscoveryResult>,
}

impl DiscoveryRunReport {
    pub fn total_found(&self) -> usize {
        self.banks.iter().map(|b| b.found).sum()
    }

    pub fn reconciled(&self) -> impl Iterator<Item = &ReconciliationReport> {
        self.banks.iter().filter_map(|b| b.report.as_ref())
    }

    /// Banks whose inventory was not reconciled this pass.
    pub fn skipped_banks(&self) -> Vec<Bank> {
        self.banks.iter().filter(|b| b.report.is_none()).map(|b| b.bank).collect()
    }
}

#[derive(Clone)]
pub struct DiscoveryService {
    fetcher: Arc<dyn PageFetcher>,
    registry: Arc<StrategyRegistry>,
    inventory: InventoryRepository,
    workers: usize,
}

impl DiscoveryService {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        registry: Arc<StrategyRegistry>,
        inventory: InventoryRepository,
        workers: usize,
    ) -> Self {
        Self {
            fetcher,
            registry,
            inventory,
            workers,
        }
    }

    /// Discover and reconcile the given banks, `workers` at a time.
    pub async fn run(&self, banks: &[Bank]) -> DiscoveryRunReport {
        info!("Starting discovery for {} banks with {} workers", banks.len(), self.workers);

        let service = self.clone();
        let results = run_bounded(banks.to_vec(), self.workers, move |bank| {
            let service = service.clone();
            async move { service.discover_bank(bank).await }
        })
        .await;

        let banks = banks
            .iter()
            .zip(results)
            .map(|(bank, result)| {
                result.unwrap_or_else(|failure| BankDiscoveryResult {
                    bank: *bank,
                    method: DiscoveryMethod::Error,
                    found: 0,
                    report: None,
                    error: Some(failure.to_string()),
                })
            })
            .collect();

        let report = DiscoveryRunReport { banks };
        info!(
            "Discovery finished: {} links found, {} banks left untouched",
            report.total_found(),
            report.skipped_banks().len()
        );
        report
    }

    /// Fetch, parse and reconcile a single bank.
    pub async fn discover_bank(&self, bank: Bank) -> BankDiscoveryResult {
        let outcome = match self.find_cards(bank).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{}: discovery failed: {:#}", bank, e);
                return BankDiscoveryResult::untouched(&DiscoveryOutcome::failed(bank), Some(format!("{e:#}")));
            }
        };

        if !outcome.is_successful() {
            warn!("{}: no card links found, inventory left unchanged", bank);
            return BankDiscoveryResult::untouched(&outcome, None);
        }

        match self.reconcile(&outcome).await {
            Ok(report) => {
                info!(
                    "{}: {} found via {} ({} new, {} reactivated, {} deactivated)",
                    bank, report.found, outcome.method, report.inserted, report.reactivated, report.deactivated
                );
                BankDiscoveryResult {
                    bank,
                    method: outcome.method,
                    found: outcome.cards.len(),
                    report: Some(report),
                    error: None,
                }
            }
            Err(e) => {
                warn!("{}: reconciliation failed: {:#}", bank, e);
                BankDiscoveryResult::untouched(&outcome, Some(format!("{e:#}")))
            }
        }
    }

    async fn find_cards(&self, bank: Bank) -> Result<DiscoveryOutcome> {
        let page = self.fetcher.fetch(bank.listing_url()).await?;
        // Card URLs stay keyed on the configured listing URL even if it redirects.
        let base = Url::parse(bank.listing_url()).with_context(|| format!("Invalid listing URL for {bank}"))?;

        let html = Html::parse_document(&page.html);
        Ok(self.registry.discover(bank, &html, &base))
    }

    async fn reconcile(&self, outcome: &DiscoveryOutcome) -> Result<ReconciliationReport> {
        let bank_name = outcome.bank.display_name();
        let active = self.inventory.active_urls_for_bank(bank_name).await?;
        let plan = ReconciliationPlan::build(active, &outcome.cards);
        self.inventory.apply_reconciliation(bank_name, &plan, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedPageFetcher, TestDatabase};

    const HSBC_LISTING: &str = r#"
        <div class="card-list">
          <a href="/credit-cards/products/cashback/">Cashback</a>
          <a href="/credit-cards/products/premier/">Premier</a>
        </div>"#;

    fn service(db: &TestDatabase, fetcher: ScriptedPageFetcher) -> DiscoveryService {
        DiscoveryService::new(Arc::new(fetcher), Arc::new(StrategyRegistry::empty()), db.inventory(), 2)
    }

    #[tokio::test]
    async fn found_links_are_reconciled() -> Result<()> {
        let db = TestDatabase::new().await?;
        let fetcher = ScriptedPageFetcher::new().page(Bank::Hsbc.listing_url(), HSBC_LISTING);

        let report = service(&db, fetcher).run(&[Bank::Hsbc]).await;

        assert_eq!(report.banks.len(), 1);
        assert_eq!(report.banks[0].method, DiscoveryMethod::Fallback);
        assert_eq!(report.banks[0].report.as_ref().map(|r| r.inserted), Some(2));
        assert_eq!(db.inventory().active_urls_for_bank("HSBC").await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn fetch_error_leaves_inventory_untouched() -> Result<()> {
        let db = TestDatabase::new().await?;
        db.seed_inventory("HSBC", &["https://www.hsbc.ae/credit-cards/products/old/"], Utc::now())
            .await?;
        let fetcher = ScriptedPageFetcher::new().failing(Bank::Hsbc.listing_url(), "timed out");

        let report = service(&db, fetcher).run(&[Bank::Hsbc]).await;

        assert_eq!(report.banks[0].method, DiscoveryMethod::Error);
        assert!(report.banks[0].error.as_deref().is_some_and(|e| e.contains("timed out")));
        assert_eq!(report.skipped_banks(), vec![Bank::Hsbc]);
        assert_eq!(db.inventory().active_urls_for_bank("HSBC").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn one_failing_bank_does_not_stop_the_others() -> Result<()> {
        let db = TestDatabase::new().await?;
        let fetcher = ScriptedPageFetcher::new()
            .page(Bank::Hsbc.listing_url(), HSBC_LISTING)
            .failing(Bank::Fab.listing_url(), "connection reset");

        let report = service(&db, fetcher).run(&[Bank::Fab, Bank::Hsbc]).await;

        assert_eq!(report.banks[0].bank, Bank::Fab);
        assert!(report.banks[0].report.is_none());
        assert!(report.banks[1].report.is_some());
        assert_eq!(report.total_found(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn redirected_listing_keeps_urls_on_the_configured_host() -> Result<()> {
        let db = TestDatabase::new().await?;
        let fetcher = ScriptedPageFetcher::new().redirect(
            Bank::FinanceHouse.listing_url(),
            "https://financehouse.ae/ar/credit-cards/",
            "<h1>Credit Cards</h1><p>Cashback and rewards</p>",
        );
        let service = DiscoveryService::new(Arc::new(fetcher), Arc::new(StrategyRegistry::new()), db.inventory(), 1);

        service.run(&[Bank::FinanceHouse]).await;

        assert_eq!(
            db.inventory().active_urls_for_bank("Finance House").await?,
            vec![Bank::FinanceHouse.listing_url().to_string()]
        );
        Ok(())
    }
}
