//! Per-bank inventory reconciliation
//!
//! A discovery pass produces the set `F` of cards currently listed by a bank.
//! Against the stored active set `D`, entries in `D − F` are deactivated and
//! every entry of `F` is upserted. Nothing is ever deleted, and a pass that
//! did not succeed must not touch any flag.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::bank::Bank;
use super::card::{dedupe_by_url, normalize_card_name, CardRef};

/// How the cards of a discovery pass were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryMethod {
    /// The bank's own strategy matched.
    Specific,
    /// The bank's strategy found nothing and the generic link heuristic did.
    Fallback,
    /// The page loaded but no strategy found anything.
    None,
    /// The listing page could not be loaded.
    Error,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Specific => "Specific",
            Self::Fallback => "Fallback",
            Self::None => "None",
            Self::Error => "Error",
        };
        f.write_str(label)
    }
}

/// Result of one discovery pass for one bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryOutcome {
    pub bank: Bank,
    pub cards: Vec<CardRef>,
    pub method: DiscoveryMethod,
}

impl DiscoveryOutcome {
    pub fn found(bank: Bank, cards: Vec<CardRef>, method: DiscoveryMethod) -> Self {
        let cards = dedupe_by_url(cards);
        let method = if cards.is_empty() { DiscoveryMethod::None } else { method };
        Self { bank, cards, method }
    }

    pub fn failed(bank: Bank) -> Self {
        Self {
            bank,
            cards: Vec::new(),
            method: DiscoveryMethod::Error,
        }
    }

    /// Only a pass that found at least one card may change inventory flags.
    /// An empty result is treated as a probable failure of the listing page.
    pub fn is_successful(&self) -> bool {
        !self.cards.is_empty() && !matches!(self.method, DiscoveryMethod::Error | DiscoveryMethod::None)
    }
}

/// The writes a successful pass translates into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Active URLs no longer listed (`D − F`), sorted for deterministic SQL.
    pub deactivate: Vec<String>,
    /// Found cards with normalized names, unique by URL.
    pub upsert: Vec<CardRef>,
}

impl ReconciliationPlan {
    pub fn build<I, S>(active_urls: I, found: &[CardRef]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let upsert: Vec<CardRef> = dedupe_by_url(found.to_vec())
            .into_iter()
            .map(|card| CardRef {
                name: normalize_card_name(&card.name),
                url: card.url,
            })
            .collect();

        let found_urls: HashSet<&str> = upsert.iter().map(|c| c.url.as_str()).collect();
        let deactivate: BTreeSet<String> = active_urls
            .into_iter()
            .map(Into::into)
            .filter(|url| !found_urls.contains(url.as_str()))
            .collect();

        Self {
            deactivate: deactivate.into_iter().collect(),
            upsert,
        }
    }
}

/// What a reconciliation actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub bank_name: String,
    pub found: usize,
    pub inserted: usize,
    pub reactivated: usize,
    pub deactivated: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn card(url: &str) -> CardRef {
        CardRef::new(url, "some card")
    }

    #[test]
    fn missing_urls_are_deactivated() {
        let plan = ReconciliationPlan::build(
            ["https://b/a", "https://b/b", "https://b/c"],
            &[card("https://b/a"), card("https://b/d")],
        );
        assert_eq!(plan.deactivate, vec!["https://b/b".to_string(), "https://b/c".to_string()]);
        assert_eq!(plan.upsert.len(), 2);
    }

    #[test]
    fn upsert_names_are_normalized() {
        let plan = ReconciliationPlan::build(Vec::<String>::new(), &[CardRef::new("https://b/x", "  titanium   CARD")]);
        assert_eq!(plan.upsert[0].name, "Titanium Card");
    }

    #[test]
    fn empty_outcome_is_not_successful() {
        let outcome = DiscoveryOutcome::found(Bank::Fab, Vec::new(), DiscoveryMethod::Specific);
        assert_eq!(outcome.method, DiscoveryMethod::None);
        assert!(!outcome.is_successful());
        assert!(!DiscoveryOutcome::failed(Bank::Fab).is_successful());
    }

    #[test]
    fn outcome_dedupes_cards() {
        let outcome = DiscoveryOutcome::found(
            Bank::Hsbc,
            vec![card("https://h/1"), card("https://h/1")],
            DiscoveryMethod::Fallback,
        );
        assert_eq!(outcome.cards.len(), 1);
        assert!(outcome.is_successful());
    }

    proptest! {
        #[test]
        fn plan_partitions_active_set(
            active in proptest::collection::btree_set("[a-e]{1,2}", 0..12),
            found in proptest::collection::vec("[a-e]{1,2}", 0..12),
        ) {
            let found_cards: Vec<CardRef> = found.iter().map(|u| CardRef::new(u.clone(), "n")).collect();
            let plan = ReconciliationPlan::build(active.iter().cloned(), &found_cards);

            let found_set: HashSet<&String> = found.iter().collect();
            for url in &plan.deactivate {
                prop_assert!(active.contains(url));
                prop_assert!(!found_set.contains(url));
            }
            for url in &active {
                let kept = found_set.contains(url);
                prop_assert_eq!(kept, !plan.deactivate.contains(url));
            }
            let upsert_urls: HashSet<&String> = plan.upsert.iter().map(|c| &c.url).collect();
            prop_assert_eq!(upsert_urls.len(), plan.upsert.len());
            prop_assert_eq!(upsert_urls, found_set);
        }
    }
}
