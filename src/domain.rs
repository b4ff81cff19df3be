//! Domain module - Core business logic and entities
//!
//! This module contains the catalog entities (banks, inventory entries,
//! detail records) and the pure rules that govern them: reconciliation of a
//! discovery pass against stored inventory, and the staleness policy that
//! decides which detail pages are re-scraped.

pub mod bank;
pub mod card;
pub mod card_detail;
pub mod reconciliation;
pub mod refresh_policy;
pub mod scrape_status;

// Re-export commonly used items for convenience
pub use bank::Bank;
pub use card::{CardRef, InventoryEntry};
pub use card_detail::CardDetail;
pub use reconciliation::{DiscoveryMethod, DiscoveryOutcome, ReconciliationPlan, ReconciliationReport};
pub use refresh_policy::{FailureState, RefreshDecision, RefreshPolicy};
pub use scrape_status::{RunSummary, ScrapeAttempt, ScrapeStatus};
