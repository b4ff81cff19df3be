//! Detail record of one card, built from the LLM extraction of its product page.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const NOT_MENTIONED: &str = "Not Mentioned";

/// JSON keys the extractor is asked to return, in prompt order.
pub mod keys {
    pub const CARD_NAME: &str = "Card Name";
    pub const BANK_NAME: &str = "Bank Name";
    pub const MINIMUM_SALARY: &str = "Minimum Salary Requirement";
    pub const ANNUAL_FEE: &str = "Annual Fee";
    pub const MINIMUM_SPEND: &str = "Minimum Spend Requirement";
    pub const BALANCE_TRANSFER: &str = "Balance Transfer / 0% Installment Plan Eligibility";
    pub const FOREIGN_CURRENCY_FEE: &str = "Foreign Currency Fee";
    pub const WELCOME_BONUS: &str = "Welcome Bonus / Sign-up Offer";
    pub const CASHBACK_RATES: &str = "Cashback Rates";
    pub const POINTS_EARNING: &str = "Points / Miles Earning Rates";
    pub const COBRAND_REWARDS: &str = "Co-brand Specific Rewards";
    pub const LOUNGE_ACCESS: &str = "Airport Lounge Access";
    pub const TRAVEL_INSURANCE: &str = "Travel Insurance";
    pub const AIRPORT_TRANSFERS: &str = "Airport Transfers";
    pub const HOTEL_DISCOUNTS: &str = "Hotel Discounts / Upgrades";
    pub const CINEMA_OFFERS: &str = "Cinema Offers";
    pub const DINING_DISCOUNTS: &str = "Dining Discounts";
    pub const GOLF_PRIVILEGES: &str = "Golf Privileges";
    pub const VALET_PARKING: &str = "Valet Parking";
    pub const PURCHASE_PROTECTION: &str = "Purchase Protection";
    pub const EXTENDED_WARRANTY: &str = "Extended Warranty";
    pub const OTHER_BENEFITS: &str = "Other Key Benefits";

    pub const ALL: [&str; 22] = [
        CARD_NAME,
        BANK_NAME,
        MINIMUM_SALARY,
        ANNUAL_FEE,
        MINIMUM_SPEND,
        BALANCE_TRANSFER,
        FOREIGN_CURRENCY_FEE,
        WELCOME_BONUS,
        CASHBACK_RATES,
        POINTS_EARNING,
        COBRAND_REWARDS,
        LOUNGE_ACCESS,
        TRAVEL_INSURANCE,
        AIRPORT_TRANSFERS,
        HOTEL_DISCOUNTS,
        CINEMA_OFFERS,
        DINING_DISCOUNTS,
        GOLF_PRIVILEGES,
        VALET_PARKING,
        PURCHASE_PROTECTION,
        EXTENDED_WARRANTY,
        OTHER_BENEFITS,
    ];
}

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.?\d*").expect("valid number regex"));
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("valid percent regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashbackType {
    Flat,
    Variable,
}

impl CashbackType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "Flat",
            Self::Variable => "Variable",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("flat") { Self::Flat } else { Self::Variable }
    }
}

impl fmt::Display for CashbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of the `credit_cards_details` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDetail {
    pub url: String,
    pub bank_name: String,
    pub card_name: String,
    pub minimum_salary_requirement: String,
    pub min_salary_numeric: f64,
    pub annual_fee: String,
    pub minimum_spend_requirement: String,
    pub balance_transfer_eligibility: String,
    pub foreign_currency_fee: String,
    pub welcome_bonus: String,
    pub cashback_rates: String,
    pub max_cashback_rate: f64,
    pub is_uncapped: bool,
    pub cashback_type: CashbackType,
    pub points_earning_rates: String,
    pub cobrand_rewards: String,
    pub airport_lounge_access: String,
    pub travel_insurance: String,
    pub airport_transfers: String,
    pub hotel_discounts: String,
    pub cinema_offers: String,
    pub dining_discounts: String,
    pub golf_privileges: String,
    pub valet_parking: String,
    pub purchase_protection: String,
    pub extended_warranty: String,
    pub other_key_benefits: String,
    pub last_updated_at: DateTime<Utc>,
}

impl CardDetail {
    /// Build a record from extracted fields.
    ///
    /// The bank name always comes from the inventory; the card name prefers
    /// the extractor's value and falls back to the inventory name.
    pub fn from_extraction(
        url: &str,
        inventory_bank: &str,
        inventory_card_name: &str,
        fields: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Self {
        let text = |key: &str| field_text(fields.get(key));

        let card_name = fields
            .get(keys::CARD_NAME)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty() && !is_placeholder(name))
            .unwrap_or(inventory_card_name)
            .to_string();

        let minimum_salary_requirement = text(keys::MINIMUM_SALARY);
        let cashback_rates = text(keys::CASHBACK_RATES);
        let cashback = CashbackMetrics::from_text(&cashback_rates);

        Self {
            url: url.to_string(),
            bank_name: inventory_bank.to_string(),
            card_name,
            min_salary_numeric: parse_min_salary(&minimum_salary_requirement),
            minimum_salary_requirement,
            annual_fee: text(keys::ANNUAL_FEE),
            minimum_spend_requirement: text(keys::MINIMUM_SPEND),
            balance_transfer_eligibility: text(keys::BALANCE_TRANSFER),
            foreign_currency_fee: text(keys::FOREIGN_CURRENCY_FEE),
            welcome_bonus: text(keys::WELCOME_BONUS),
            max_cashback_rate: cashback.max_rate,
            is_uncapped: cashback.is_uncapped,
            cashback_type: cashback.cashback_type,
            cashback_rates,
            points_earning_rates: text(keys::POINTS_EARNING),
            cobrand_rewards: text(keys::COBRAND_REWARDS),
            airport_lounge_access: text(keys::LOUNGE_ACCESS),
            travel_insurance: text(keys::TRAVEL_INSURANCE),
            airport_transfers: text(keys::AIRPORT_TRANSFERS),
            hotel_discounts: text(keys::HOTEL_DISCOUNTS),
            cinema_offers: text(keys::CINEMA_OFFERS),
            dining_discounts: text(keys::DINING_DISCOUNTS),
            golf_privileges: text(keys::GOLF_PRIVILEGES),
            valet_parking: text(keys::VALET_PARKING),
            purchase_protection: text(keys::PURCHASE_PROTECTION),
            extended_warranty: text(keys::EXTENDED_WARRANTY),
            other_key_benefits: text(keys::OTHER_BENEFITS),
            last_updated_at: now,
        }
    }
}

fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == "-" || v.eq_ignore_ascii_case(NOT_MENTIONED) || v.eq_ignore_ascii_case("Not Found")
}

/// Flatten one extracted value into the text stored in its column.
fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NOT_MENTIONED.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => NOT_MENTIONED.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        // nested values are kept as compact JSON
        Some(other) => other.to_string(),
    }
}

/// Smallest number mentioned in the salary requirement, 0 when absent.
pub fn parse_min_salary(text: &str) -> f64 {
    if is_placeholder(text) {
        return 0.0;
    }
    let cleaned = text.replace(',', "");
    NUMBER_RE
        .find_iter(&cleaned)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .reduce(f64::min)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashbackMetrics {
    pub max_rate: f64,
    pub is_uncapped: bool,
    pub cashback_type: CashbackType,
}

impl CashbackMetrics {
    pub fn from_text(text: &str) -> Self {
        let mut metrics = Self {
            max_rate: 0.0,
            is_uncapped: false,
            cashback_type: CashbackType::Variable,
        };
        if is_placeholder(text) {
            return metrics;
        }

        let lowered = text.to_lowercase();
        let rates: Vec<&str> = PERCENT_RE
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        metrics.max_rate = rates
            .iter()
            .filter_map(|r| r.parse::<f64>().ok())
            .reduce(f64::max)
            .unwrap_or(0.0);
        metrics.is_uncapped = lowered.contains("unlimited") || lowered.contains("no cap");

        let mut distinct = rates.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if lowered.contains("flat") || (distinct.len() == 1 && !lowered.contains("up to")) {
            metrics.cashback_type = CashbackType::Flat;
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn salary_takes_the_smallest_number() {
        assert_eq!(parse_min_salary("AED 15,000 per month"), 15000.0);
        assert_eq!(parse_min_salary("AED 8,000 (salary transfer) or 12,000"), 8000.0);
        assert_eq!(parse_min_salary("Not Mentioned"), 0.0);
        assert_eq!(parse_min_salary("-"), 0.0);
        assert_eq!(parse_min_salary("on request"), 0.0);
    }

    #[test]
    fn cashback_metrics_from_tiered_text() {
        let m = CashbackMetrics::from_text("Up to 5% on groceries, 1% on everything else");
        assert_eq!(m.max_rate, 5.0);
        assert_eq!(m.cashback_type, CashbackType::Variable);
        assert!(!m.is_uncapped);
    }

    #[test]
    fn cashback_metrics_flat_and_uncapped() {
        let m = CashbackMetrics::from_text("1.5% unlimited cashback on all spends");
        assert_eq!(m.max_rate, 1.5);
        assert_eq!(m.cashback_type, CashbackType::Flat);
        assert!(m.is_uncapped);

        let explicit = CashbackMetrics::from_text("Flat cashback with no cap");
        assert_eq!(explicit.cashback_type, CashbackType::Flat);
        assert!(explicit.is_uncapped);
    }

    #[test]
    fn single_rate_with_up_to_is_variable() {
        let m = CashbackMetrics::from_text("Earn up to 10% cashback");
        assert_eq!(m.cashback_type, CashbackType::Variable);
    }

    #[test]
    fn detail_uses_inventory_bank_and_falls_back_for_name() {
        let now = Utc.with_ymd_and_hms(2025, 11, 20, 8, 0, 0).unwrap();
        let extracted = fields(json!({
            "Card Name": "Not Mentioned",
            "Bank Name": "Some Other Bank",
            "Annual Fee": "AED 300",
            "Cashback Rates": "5% on dining",
            "Airport Lounge Access": {"visits": 4, "programme": "LoungeKey"},
            "Golf Privileges": ""
        }));

        let detail = CardDetail::from_extraction("https://fab/x", "FAB", "Cashback Card", &extracted, now);
        assert_eq!(detail.bank_name, "FAB");
        assert_eq!(detail.card_name, "Cashback Card");
        assert_eq!(detail.annual_fee, "AED 300");
        assert_eq!(detail.golf_privileges, NOT_MENTIONED);
        assert_eq!(detail.travel_insurance, NOT_MENTIONED);
        assert_eq!(detail.airport_lounge_access, r#"{"programme":"LoungeKey","visits":4}"#);
        assert_eq!(detail.max_cashback_rate, 5.0);
        assert_eq!(detail.last_updated_at, now);
    }

    #[test]
    fn detail_prefers_extracted_card_name() {
        let now = Utc::now();
        let extracted = fields(json!({"Card Name": "  Platinum Plus  "}));
        let detail = CardDetail::from_extraction("u", "HSBC", "Inventory Name", &extracted, now);
        assert_eq!(detail.card_name, "Platinum Plus");
    }
}
