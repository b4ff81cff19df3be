//! Application layer module
//!
//! Services that orchestrate fetching, parsing, extraction and storage for
//! the two passes: inventory discovery and detail refresh.

pub mod detail_service;
pub mod discovery_service;
pub mod worker_pool;

pub use detail_service::{DetailService, DetailSettings};
pub use discovery_service::{BankDiscoveryResult, DiscoveryRunReport, DiscoveryService};
pub use worker_pool::{TaskFailure, run_bounded};
