//! Inventory entities
//!
//! A card's identity is its product-page URL. The name is metadata that is
//! normalized before storage so cosmetic drift on the bank's site does not
//! churn the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Placeholder used when a strategy finds a link but no title.
pub const NAME_NOT_FOUND: &str = "Name Not Found";

/// One product link found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRef {
    pub url: String,
    pub name: String,
}

impl CardRef {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }
}

/// Row of the `card_inventory` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub url: String,
    pub bank_name: String,
    pub card_name: String,
    pub first_discovered_at: DateTime<Utc>,
    pub last_verified_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Title-case every alphabetic run, tidy separators and collapse whitespace.
pub fn normalize_card_name(raw: &str) -> String {
    let mut titled = String::with_capacity(raw.len());
    let mut previous_alpha = false;
    for ch in raw.chars() {
        if ch.is_alphabetic() {
            if previous_alpha {
                titled.extend(ch.to_lowercase());
            } else {
                titled.extend(ch.to_uppercase());
            }
            previous_alpha = true;
        } else {
            titled.push(ch);
            previous_alpha = false;
        }
    }

    let cleaned = titled.replace('–', "-").replace('/', " / ");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep one entry per URL (the last name wins), in first-seen order.
pub fn dedupe_by_url(cards: Vec<CardRef>) -> Vec<CardRef> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<CardRef> = Vec::with_capacity(cards.len());

    for card in cards {
        match position.get(&card.url) {
            Some(&idx) => unique[idx].name = card.name,
            None => {
                position.insert(card.url.clone(), unique.len());
                unique.push(card);
            }
        }
    }

    unique
}

/// Names that indicate the strategy or the LLM failed to find a real title.
pub fn is_suspicious_name(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    lowered.is_empty()
        || lowered == "not found"
        || lowered == NAME_NOT_FOUND.to_lowercase()
        || lowered.contains("not mentioned")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_card_name("  world   ELITE mastercard "), "World Elite Mastercard");
        assert_eq!(normalize_card_name("Visa\tInfinite\n"), "Visa Infinite");
    }

    #[test]
    fn normalizes_separators() {
        assert_eq!(normalize_card_name("cashback–plus"), "Cashback-Plus");
        assert_eq!(normalize_card_name("visa/mastercard"), "Visa / Mastercard");
        assert_eq!(normalize_card_name("visa / mastercard"), "Visa / Mastercard");
    }

    #[test]
    fn cosmetic_variants_normalize_to_the_same_name() {
        assert_eq!(
            normalize_card_name("SKYWARDS  signature"),
            normalize_card_name("Skywards Signature")
        );
    }

    #[test]
    fn digits_start_a_new_word() {
        assert_eq!(normalize_card_name("365 cashback"), "365 Cashback");
    }

    #[test]
    fn dedupe_keeps_first_position_and_last_name() {
        let cards = vec![
            CardRef::new("https://a/1", "One"),
            CardRef::new("https://a/2", "Two"),
            CardRef::new("https://a/1", "One Again"),
        ];
        let unique = dedupe_by_url(cards);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0], CardRef::new("https://a/1", "One Again"));
        assert_eq!(unique[1].url, "https://a/2");
    }

    #[test]
    fn detects_placeholder_names() {
        assert!(is_suspicious_name("Name Not Found"));
        assert!(is_suspicious_name("not found"));
        assert!(is_suspicious_name("Card Not Mentioned"));
        assert!(is_suspicious_name(""));
        assert!(!is_suspicious_name("Platinum Card"));
    }
}
