//! Test utilities for card-scout
//!
//! Provides an isolated in-memory database plus scripted page fetchers and
//! extractors, so services can be exercised without network access.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::card_detail::CashbackType;
use crate::domain::{CardDetail, CardRef, ReconciliationPlan};
use crate::infrastructure::llm_client::{CardFieldExtractor, LlmError, LlmExtraction};
use crate::infrastructure::page_fetcher::{FetchedPage, PageFetcher};
use crate::infrastructure::{DatabaseConnection, DetailRepository, InventoryRepository};

/// Test database configuration
pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    /// Create a new in-memory test database with the schema applied.
    ///
    /// Each test gets a fresh, clean database state.
    pub async fn new() -> Result<Self> {
        let connection = DatabaseConnection::in_memory().await?;
        connection.migrate().await?;
        Ok(Self { connection })
    }

    pub fn pool(&self) -> sqlx::SqlitePool {
        self.connection.pool().clone()
    }

    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.pool())
    }

    pub fn details(&self) -> DetailRepository {
        DetailRepository::new(self.pool())
    }

    /// Insert active inventory rows for one bank.
    pub async fn seed_inventory(&self, bank_name: &str, urls: &[&str], now: DateTime<Utc>) -> Result<()> {
        let cards: Vec<CardRef> = urls.iter().map(|url| CardRef::new(*url, "Seeded Card")).collect();
        let plan = ReconciliationPlan::build(Vec::<String>::new(), &cards);
        self.inventory().apply_reconciliation(bank_name, &plan, now).await?;
        Ok(())
    }
}

/// A fully populated detail record with fixed values.
pub fn sample_detail(url: &str, bank_name: &str, now: DateTime<Utc>) -> CardDetail {
    CardDetail {
        url: url.to_string(),
        bank_name: bank_name.to_string(),
        card_name: "Sample Cashback Card".to_string(),
        minimum_salary_requirement: "AED 8,000 per month".to_string(),
        min_salary_numeric: 8000.0,
        annual_fee: "Free for life".to_string(),
        minimum_spend_requirement: "Not Mentioned".to_string(),
        balance_transfer_eligibility: "0% for 6 months".to_string(),
        foreign_currency_fee: "1.99%".to_string(),
        welcome_bonus: "AED 300 cashback".to_string(),
        cashback_rates: "Up to 5% cashback, uncapped".to_string(),
        max_cashback_rate: 5.0,
        is_uncapped: true,
        cashback_type: CashbackType::Variable,
        points_earning_rates: "Not Mentioned".to_string(),
        cobrand_rewards: "Not Mentioned".to_string(),
        airport_lounge_access: "4 visits per year".to_string(),
        travel_insurance: "Included".to_string(),
        airport_transfers: "Not Mentioned".to_string(),
        hotel_discounts: "Not Mentioned".to_string(),
        cinema_offers: "Buy one get one".to_string(),
        dining_discounts: "Up to 20%".to_string(),
        golf_privileges: "Not Mentioned".to_string(),
        valet_parking: "Not Mentioned".to_string(),
        purchase_protection: "Not Mentioned".to_string(),
        extended_warranty: "Not Mentioned".to_string(),
        other_key_benefits: "Not Mentioned".to_string(),
        last_updated_at: now,
    }
}

/// Page text long enough to pass the empty-page check.
pub fn product_page_html(title: &str) -> String {
    format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1>\
         <p>Earn up to 5% cashback on groceries and fuel with no annual fee in the first year.</p>\
         <p>Minimum monthly salary AED 8,000. Complimentary airport lounge access at 900 lounges.</p>\
         </body></html>"
    )
}

/// Counts concurrent calls and remembers the peak.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

enum ScriptedPage {
    Served { final_url: String, html: String },
    Error(String),
}

/// `PageFetcher` answering from a fixed URL map. Unknown URLs fail.
#[derive(Default)]
pub struct ScriptedPageFetcher {
    pages: HashMap<String, ScriptedPage>,
    latency: Duration,
    in_flight: InFlight,
}

impl ScriptedPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(
            url.to_string(),
            ScriptedPage::Served {
                final_url: url.to_string(),
                html: html.into(),
            },
        );
        self
    }

    pub fn redirect(mut self, url: &str, final_url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(
            url.to_string(),
            ScriptedPage::Served {
                final_url: final_url.to_string(),
                html: html.into(),
            },
        );
        self
    }

    pub fn failing(mut self, url: &str, message: &str) -> Self {
        self.pages.insert(url.to_string(), ScriptedPage::Error(message.to_string()));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fetches(&self) -> usize {
        self.in_flight.total.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.in_flight.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for ScriptedPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let _guard = self.in_flight.enter();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.pages.get(url) {
            Some(ScriptedPage::Served { final_url, html }) => Ok(FetchedPage {
                requested_url: url.to_string(),
                final_url: final_url.clone(),
                html: html.clone(),
            }),
            Some(ScriptedPage::Error(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("no scripted page for {url}")),
        }
    }
}

/// `CardFieldExtractor` returning a canned answer.
pub struct ScriptedExtractor {
    answer: std::result::Result<Map<String, Value>, String>,
    latency: Duration,
    in_flight: InFlight,
}

impl ScriptedExtractor {
    pub fn succeeding() -> Self {
        let fields = json!({
            "Card Name": "Scripted Platinum Card",
            "Bank Name": "Ignored Bank",
            "Minimum Salary Requirement": "AED 15,000",
            "Annual Fee": "AED 1,050",
            "Cashback Rates": "2% on all spends",
            "Airport Lounge Access": "Unlimited",
        });
        Self::with_fields(fields.as_object().cloned().unwrap_or_default())
    }

    pub fn with_fields(fields: Map<String, Value>) -> Self {
        Self {
            answer: Ok(fields),
            latency: Duration::ZERO,
            in_flight: InFlight::default(),
        }
    }

    /// Every call fails with a parse error carrying `raw_response`.
    pub fn failing(raw_response: &str) -> Self {
        Self {
            answer: Err(raw_response.to_string()),
            latency: Duration::ZERO,
            in_flight: InFlight::default(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.in_flight.total.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.in_flight.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CardFieldExtractor for ScriptedExtractor {
    async fn extract(&self, _page_text: &str) -> std::result::Result<LlmExtraction, LlmError> {
        let _guard = self.in_flight.enter();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.answer {
            Ok(fields) => Ok(LlmExtraction {
                fields: fields.clone(),
                raw_response: Value::Object(fields.clone()).to_string(),
            }),
            Err(raw) => Err(LlmError::Parse {
                message: "scripted failure".into(),
                raw_response: raw.clone(),
            }),
        }
    }
}
