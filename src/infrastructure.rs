//! Infrastructure layer for storage, fetching, parsing and the LLM
//!
//! This module provides the SQLite connection and repositories, the rate
//! limited HTTP stack, per-bank listing parsers and the extraction client.

pub mod config;  // Layered configuration
pub mod database_connection;
pub mod detail_repository;
pub mod http_client;
pub mod inventory_repository;
pub mod llm_client;
pub mod llm_gate;  // One-at-a-time access to the extractor
pub mod logging;  // Logging infrastructure
pub mod page_fetcher;
pub mod parsing;  // Listing strategies and page text

// Re-export commonly used items
pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use detail_repository::{DetailRepository, RefreshCandidate};
pub use http_client::{HttpClient, HttpClientConfig};
pub use inventory_repository::{BankInventoryCount, InventoryRepository};
pub use llm_client::{CardFieldExtractor, GeminiClient, LlmError, LlmExtraction};
pub use llm_gate::SerializedExtractor;
pub use page_fetcher::{FetchedPage, HttpPageFetcher, PageFetcher};
pub use parsing::StrategyRegistry;
