//! UAE Card Scout - credit card catalog crawler
//!
//! Keeps an inventory of credit-card product pages for UAE banks up to date
//! and extracts structured card details from those pages with an LLM.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

#[doc(hidden)]
pub mod test_utils;
