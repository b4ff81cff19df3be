//! Discovery passes against a scripted bank site and an in-memory catalog
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use proptest::prelude::*;

use card_scout_lib::application::DiscoveryService;
use card_scout_lib::domain::{Bank, CardRef, DiscoveryMethod, ReconciliationPlan};
use card_scout_lib::infrastructure::StrategyRegistry;
use card_scout_lib::test_utils::{ScriptedPageFetcher, TestDatabase};

const HSBC_BASE: &str = "https://www.hsbc.ae/credit-cards/products/";

fn listing(slugs: &[&str]) -> String {
    let links: String = slugs
        .iter()
        .map(|slug| format!(r#"<a href="/credit-cards/products/{slug}/">{slug}</a>"#))
        .collect();
    format!("<html><body><div>{links}</div></body></html>")
}

fn hsbc_url(slug: &str) -> String {
    format!("{HSBC_BASE}{slug}/")
}

async fn discover(db: &TestDatabase, page: Option<String>) -> DiscoveryMethod {
    let fetcher = match page {
        Some(html) => ScriptedPageFetcher::new().page(Bank::Hsbc.listing_url(), html),
        None => ScriptedPageFetcher::new().failing(Bank::Hsbc.listing_url(), "503 Service Unavailable"),
    };
    let service = DiscoveryService::new(Arc::new(fetcher), Arc::new(StrategyRegistry::empty()), db.inventory(), 2);
    service.run(&[Bank::Hsbc]).await.banks[0].method
}

#[tokio::test]
async fn rediscovery_is_idempotent_and_refreshes_verification() -> Result<()> {
    let db = TestDatabase::new().await?;
    discover(&db, Some(listing(&["cashback", "premier"]))).await;
    let first = db.inventory().list_active(Some("HSBC")).await?;

    tokio::time::sleep(Duration::from_millis(5)).await;
    discover(&db, Some(listing(&["cashback", "premier"]))).await;
    let second = db.inventory().list_active(Some("HSBC")).await?;

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    for (before, after) in first.iter().zip(&second) {
        assert_eq!(before.url, after.url);
        assert_eq!(before.first_discovered_at, after.first_discovered_at);
        assert!(after.last_verified_at > before.last_verified_at);
    }
    Ok(())
}

#[tokio::test]
async fn vanished_card_is_deactivated_then_reactivated_in_place() -> Result<()> {
    let db = TestDatabase::new().await?;
    discover(&db, Some(listing(&["cashback", "premier"]))).await;
    let original = db.inventory().get(&hsbc_url("premier")).await?.expect("inserted");

    discover(&db, Some(listing(&["cashback"]))).await;
    let gone = db.inventory().get(&hsbc_url("premier")).await?.expect("row kept");
    assert!(!gone.is_active);

    tokio::time::sleep(Duration::from_millis(5)).await;
    discover(&db, Some(listing(&["cashback", "premier"]))).await;
    let back = db.inventory().get(&hsbc_url("premier")).await?.expect("row kept");

    assert!(back.is_active);
    assert_eq!(back.first_discovered_at, original.first_discovered_at);
    assert!(back.last_verified_at > gone.last_verified_at);
    assert_eq!(db.inventory().counts_by_bank().await?[0].inactive, 0);
    Ok(())
}

#[tokio::test]
async fn failed_or_empty_pass_changes_no_flags() -> Result<()> {
    let db = TestDatabase::new().await?;
    discover(&db, Some(listing(&["cashback", "premier"]))).await;
    let before = db.inventory().list_active(Some("HSBC")).await?;

    assert_eq!(discover(&db, None).await, DiscoveryMethod::Error);
    assert_eq!(db.inventory().list_active(Some("HSBC")).await?, before);

    let maintenance = "<html><body><p>We are upgrading our website</p></body></html>".to_string();
    assert_eq!(discover(&db, Some(maintenance)).await, DiscoveryMethod::None);
    assert_eq!(db.inventory().list_active(Some("HSBC")).await?, before);
    Ok(())
}

#[tokio::test]
async fn reconciliation_never_touches_other_banks() -> Result<()> {
    let db = TestDatabase::new().await?;
    let now = Utc::now();
    db.seed_inventory("FAB", &["https://www.bankfab.com/en-ae/personal/credit-cards/cashback"], now)
        .await?;

    discover(&db, Some(listing(&["cashback"]))).await;
    discover(&db, Some(listing(&["premier"]))).await;

    assert_eq!(db.inventory().active_urls_for_bank("FAB").await?.len(), 1);
    Ok(())
}

async fn discover_with_builtin_strategies(db: &TestDatabase, bank: Bank, html: &str) -> DiscoveryMethod {
    let fetcher = ScriptedPageFetcher::new().page(bank.listing_url(), html);
    let service = DiscoveryService::new(Arc::new(fetcher), Arc::new(StrategyRegistry::new()), db.inventory(), 1);
    service.run(&[bank]).await.banks[0].method
}

const MAINTENANCE: &str = "<html><body><p>Site under maintenance</p></body></html>";

#[tokio::test]
async fn seeded_bank_keeps_its_cards_through_a_maintenance_page() -> Result<()> {
    let db = TestDatabase::new().await?;
    let listing = r#"
        <div class="js-scroll"><h5 class="card-title">Bright Card</h5><a class="InnerPageBoxLink" href="/site/bright-card.html">x</a></div>
        <div class="js-scroll"><h5 class="card-title">Platinum Card</h5><a class="InnerPageBoxLink" href="/site/platinum-card.html">x</a></div>"#;

    assert_eq!(discover_with_builtin_strategies(&db, Bank::AjmanBank, listing).await, DiscoveryMethod::Specific);
    let before = db.inventory().active_urls_for_bank("Ajman Bank").await?;
    assert_eq!(before.len(), 3);

    assert_eq!(discover_with_builtin_strategies(&db, Bank::AjmanBank, MAINTENANCE).await, DiscoveryMethod::None);
    assert_eq!(db.inventory().active_urls_for_bank("Ajman Bank").await?, before);
    Ok(())
}

#[tokio::test]
async fn listing_page_bank_keeps_its_card_through_a_maintenance_page() -> Result<()> {
    let db = TestDatabase::new().await?;
    let product = "<html><body><h1>Credit Cards</h1><p>Up to 5% cashback</p></body></html>";

    assert_eq!(discover_with_builtin_strategies(&db, Bank::FinanceHouse, product).await, DiscoveryMethod::Specific);
    let before = db.inventory().list_active(Some("Finance House")).await?;
    assert_eq!(before.len(), 1);

    assert_eq!(discover_with_builtin_strategies(&db, Bank::FinanceHouse, MAINTENANCE).await, DiscoveryMethod::None);
    assert_eq!(db.inventory().list_active(Some("Finance House")).await?, before);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn active_set_always_matches_last_successful_pass(
        passes in proptest::collection::vec(proptest::collection::btree_set(0u8..8, 0..6), 1..6)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        runtime.block_on(async {
            let db = TestDatabase::new().await?;
            let repo = db.inventory();
            let mut ever_seen = BTreeSet::new();
            let mut expected_active = BTreeSet::new();

            for (i, pass) in passes.iter().enumerate() {
                let found: Vec<CardRef> = pass
                    .iter()
                    .map(|n| CardRef::new(format!("https://bank/card-{n}"), format!("card {n}")))
                    .collect();
                // An empty pass is not reconciled.
                if found.is_empty() {
                    continue;
                }
                let plan = ReconciliationPlan::build(repo.active_urls_for_bank("ADCB").await?, &found);
                let now = Utc::now() + chrono::Duration::seconds(i as i64);
                repo.apply_reconciliation("ADCB", &plan, now).await?;

                ever_seen.extend(found.iter().map(|c| c.url.clone()));
                expected_active = found.iter().map(|c| c.url.clone()).collect();
            }

            let active: BTreeSet<String> = repo.active_urls_for_bank("ADCB").await?.into_iter().collect();
            assert_eq!(active, expected_active);

            let counts = repo.counts_by_bank().await?;
            let total: usize = counts.iter().map(|c| c.active + c.inactive).sum();
            assert_eq!(total, ever_seen.len());
            anyhow::Ok(())
        })
        .map_err(|e| TestCaseError::fail(format!("{e:#}")))?;
    }
}
