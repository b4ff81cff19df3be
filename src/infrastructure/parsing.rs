//! Listing-page parsing
//!
//! Every bank gets an `ExtractionStrategy`; the registry runs it and falls
//! back to a generic link heuristic when it finds nothing. Adding a bank is
//! one new registry entry.

pub mod bank_strategies;
pub mod container;
pub mod dom;
pub mod error;
pub mod generic;
pub mod page_text;

pub use error::{ParsingError, ParsingResult};
pub use generic::GenericLinkStrategy;
pub use page_text::visible_text;

use scraper::Html;
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

use crate::domain::{Bank, CardRef, DiscoveryMethod, DiscoveryOutcome};

/// Extracts product links from one listing page.
pub trait ExtractionStrategy: Send + Sync {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>>;

    /// Known products listed whatever the page shows. Seeds are added to a
    /// pass that found something and never make an empty pass successful.
    fn seeds(&self, _listing_url: &Url) -> Vec<CardRef> {
        Vec::new()
    }
}

pub struct StrategyRegistry {
    strategies: HashMap<Bank, Box<dyn ExtractionStrategy>>,
    fallback: Box<dyn ExtractionStrategy>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    /// Registry with the built-in strategy of every known bank.
    pub fn new() -> Self {
        let strategies = Bank::all()
            .iter()
            .map(|bank| (*bank, bank_strategies::strategy_for(*bank)))
            .collect();
        Self {
            strategies,
            fallback: Box::new(GenericLinkStrategy),
        }
    }

    /// Registry with no bank strategies; only the fallback runs.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            fallback: Box::new(GenericLinkStrategy),
        }
    }

    pub fn register(&mut self, bank: Bank, strategy: Box<dyn ExtractionStrategy>) {
        self.strategies.insert(bank, strategy);
    }

    /// Run the bank's strategy, then the fallback if it found nothing.
    /// A strategy error is treated like an empty result. Seeds only join a
    /// pass that extracted at least one card.
    pub fn discover(&self, bank: Bank, html: &Html, listing_url: &Url) -> DiscoveryOutcome {
        let strategy = self.strategies.get(&bank);
        let specific = match strategy {
            Some(strategy) => strategy.extract(html, listing_url).unwrap_or_else(|e| {
                warn!("{} strategy failed: {}", bank, e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        let (extracted, method) = if !specific.is_empty() {
            debug!("{}: specific strategy found {} links", bank, specific.len());
            (specific, DiscoveryMethod::Specific)
        } else {
            let fallback = self.fallback.extract(html, listing_url).unwrap_or_else(|e| {
                warn!("{} fallback strategy failed: {}", bank, e);
                Vec::new()
            });
            debug!("{}: fallback found {} links", bank, fallback.len());
            (fallback, DiscoveryMethod::Fallback)
        };

        if extracted.is_empty() {
            return DiscoveryOutcome::found(bank, Vec::new(), DiscoveryMethod::None);
        }

        let mut cards = strategy.map(|s| s.seeds(listing_url)).unwrap_or_default();
        cards.extend(extracted);
        DiscoveryOutcome::found(bank, cards, method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<CardRef>);

    impl ExtractionStrategy for Fixed {
        fn extract(&self, _: &Html, _: &Url) -> ParsingResult<Vec<CardRef>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl ExtractionStrategy for Broken {
        fn extract(&self, _: &Html, _: &Url) -> ParsingResult<Vec<CardRef>> {
            Err(ParsingError::invalid_selector("div[", "unterminated"))
        }
    }

    fn listing() -> Url {
        Url::parse("https://www.bank.ae/en/").unwrap()
    }

    const FALLBACK_PAGE: &str = r#"<a href="/en/personal/credit-cards/gold">Gold</a>"#;

    #[test]
    fn specific_results_are_deduplicated() {
        let mut registry = StrategyRegistry::empty();
        registry.register(
            Bank::Fab,
            Box::new(Fixed(vec![
                CardRef::new("https://x/1", "One"),
                CardRef::new("https://x/1", "One again"),
            ])),
        );
        let outcome = registry.discover(Bank::Fab, &Html::parse_document(FALLBACK_PAGE), &listing());
        assert_eq!(outcome.method, DiscoveryMethod::Specific);
        assert_eq!(outcome.cards, vec![CardRef::new("https://x/1", "One again")]);
    }

    #[test]
    fn empty_or_broken_strategy_falls_back() {
        let mut registry = StrategyRegistry::empty();
        registry.register(Bank::Fab, Box::new(Fixed(Vec::new())));
        registry.register(Bank::Hsbc, Box::new(Broken));
        let html = Html::parse_document(FALLBACK_PAGE);

        for bank in [Bank::Fab, Bank::Hsbc, Bank::Dib] {
            let outcome = registry.discover(bank, &html, &listing());
            assert_eq!(outcome.method, DiscoveryMethod::Fallback);
            assert_eq!(outcome.cards[0].url, "https://www.bank.ae/en/personal/credit-cards/gold");
        }
    }

    #[test]
    fn seeds_alone_do_not_make_a_pass() {
        let registry = StrategyRegistry::new();
        let listing = Url::parse(Bank::AjmanBank.listing_url()).unwrap();

        let empty = registry.discover(Bank::AjmanBank, &Html::parse_document("<p>Site under maintenance</p>"), &listing);
        assert_eq!(empty.method, DiscoveryMethod::None);
        assert!(empty.cards.is_empty());

        let page = r#"<div class="js-scroll"><h5 class="card-title">Bright Card</h5><a class="InnerPageBoxLink" href="/site/bright-card.html">x</a></div>"#;
        let found = registry.discover(Bank::AjmanBank, &Html::parse_document(page), &listing);
        assert_eq!(found.method, DiscoveryMethod::Specific);
        assert_eq!(found.cards.len(), 2);
        assert!(found.cards[0].url.contains("ultracash"));
    }

    #[test]
    fn nothing_found_is_method_none() {
        let registry = StrategyRegistry::new();
        let outcome = registry.discover(Bank::Fab, &Html::parse_document("<p>maintenance</p>"), &listing());
        assert_eq!(outcome.method, DiscoveryMethod::None);
        assert!(!outcome.is_successful());
    }
}
