//! Bank registry
//!
//! Every issuer the crawler knows about, with its canonical display name
//! and the card-listing page a discovery pass starts from.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bank {
    Rakbank,
    Mashreq,
    ArabBank,
    Nbf,
    AdcbIslamic,
    Adcb,
    Adib,
    AjmanBank,
    AlHilalBank,
    AmericanExpress,
    Fab,
    Cbd,
    Cbi,
    Citibank,
    Dib,
    DubaiFirst,
    EmiratesIslamic,
    EmiratesNbd,
    FinanceHouse,
    Hsbc,
    StandardChartered,
    Uab,
    Sib,
    Nbq,
}

const ALL_BANKS: [Bank; 24] = [
    Bank::Rakbank,
    Bank::Mashreq,
    Bank::ArabBank,
    Bank::Nbf,
    Bank::AdcbIslamic,
    Bank::Adcb,
    Bank::Adib,
    Bank::AjmanBank,
    Bank::AlHilalBank,
    Bank::AmericanExpress,
    Bank::Fab,
    Bank::Cbd,
    Bank::Cbi,
    Bank::Citibank,
    Bank::Dib,
    Bank::DubaiFirst,
    Bank::EmiratesIslamic,
    Bank::EmiratesNbd,
    Bank::FinanceHouse,
    Bank::Hsbc,
    Bank::StandardChartered,
    Bank::Uab,
    Bank::Sib,
    Bank::Nbq,
];

/// Long-form names that show up in scraped or LLM-reported data.
const ALIASES: &[(&str, Bank)] = &[
    ("dubai islamic bank", Bank::Dib),
    ("first abu dhabi bank", Bank::Fab),
    ("commercial bank of dubai", Bank::Cbd),
    ("abu dhabi islamic bank", Bank::Adib),
    ("commercial bank international", Bank::Cbi),
    ("national bank of fujairah", Bank::Nbf),
    ("united arab bank", Bank::Uab),
    ("mashreq bank", Bank::Mashreq),
    ("mashreq neo", Bank::Mashreq),
    ("emirates islamic bank", Bank::EmiratesIslamic),
    ("standard chartered bank", Bank::StandardChartered),
    ("hsbc uae", Bank::Hsbc),
    ("citibank uae", Bank::Citibank),
    ("american express uae", Bank::AmericanExpress),
    ("amex", Bank::AmericanExpress),
    ("adcb islamic / simplylife", Bank::AdcbIslamic),
    ("sharjah islamic bank", Bank::Sib),
    ("national bank of umm al quwain", Bank::Nbq),
    ("abu dhabi commercial bank", Bank::Adcb),
];

impl Bank {
    /// All supported banks in discovery order.
    pub fn all() -> &'static [Bank] {
        &ALL_BANKS
    }

    /// Canonical name written to the `bank_name` columns.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Rakbank => "RAKBANK",
            Self::Mashreq => "Mashreq",
            Self::ArabBank => "Arab Bank",
            Self::Nbf => "NBF",
            Self::AdcbIslamic => "ADCB Islamic",
            Self::Adcb => "ADCB",
            Self::Adib => "ADIB",
            Self::AjmanBank => "Ajman Bank",
            Self::AlHilalBank => "Al Hilal Bank",
            Self::AmericanExpress => "American Express",
            Self::Fab => "FAB",
            Self::Cbd => "CBD",
            Self::Cbi => "CBI",
            Self::Citibank => "Citibank",
            Self::Dib => "DIB",
            Self::DubaiFirst => "Dubai First",
            Self::EmiratesIslamic => "Emirates Islamic",
            Self::EmiratesNbd => "Emirates NBD",
            Self::FinanceHouse => "Finance House",
            Self::Hsbc => "HSBC",
            Self::StandardChartered => "Standard Chartered",
            Self::Uab => "UAB",
            Self::Sib => "SIB",
            Self::Nbq => "NBQ",
        }
    }

    /// Card-listing page the discovery pass loads for this bank.
    pub fn listing_url(self) -> &'static str {
        match self {
            Self::Rakbank => "https://rakbank.ae/wps/portal/retail-banking/cards/credit-cards",
            Self::Mashreq => "https://www.mashreq.com/en/uae/neo/cards/",
            Self::ArabBank => "https://arabbank.ae/mainmenu/home/Consumer-Banking/cards/card-type",
            Self::Nbf => "https://nbf.ae/personal/cards/",
            Self::AdcbIslamic => "https://www.adcb.com/en/islamic/personal/cards/credit-cards/",
            Self::Adcb => "https://www.adcb.com/en/personal/cards/credit-cards/",
            Self::Adib => "https://www.adib.ae/personal/cards/",
            Self::AjmanBank => "https://www.ajmanbank.ae/site/bright-card.html",
            Self::AlHilalBank => "https://www.alhilalbank.ae/en/personal/cards/credit-cards/",
            Self::AmericanExpress => "https://www.americanexpress.ae/en-ae/cards/",
            Self::Fab => "https://www.bankfab.com/en-ae/personal/credit-cards",
            Self::Cbd => "https://www.cbd.ae/personal/cards/credit-cards",
            Self::Cbi => "https://www.cbiuae.com/en/personal/products-and-services/cards/",
            Self::Citibank => "https://www.citibank.ae/credit-cards",
            Self::Dib => {
                "https://www.dib.ae/personal/cards/?cardType=credit-cards&incomeMax=Any&incomeMin=Any&cardBenefit=All-Benefits&visible=24"
            }
            Self::DubaiFirst => "https://www.dubaifirst.com/en-ae",
            Self::EmiratesIslamic => "https://www.emiratesislamic.ae/en/personal-banking/cards/credit-cards",
            Self::EmiratesNbd => "https://www.emiratesnbd.com/en/cards/credit-cards",
            Self::FinanceHouse => "https://www.financehouse.ae/en/personal-finance/credit-cards/",
            Self::Hsbc => "https://www.hsbc.ae/credit-cards/products/",
            Self::StandardChartered => "https://www.sc.com/ae/personal/cards/credit-cards/",
            Self::Uab => "https://www.uab.ae/Compare-Credit-Cards",
            Self::Sib => "https://www.sib.ae/personal-banking/cards",
            Self::Nbq => "https://nbq.ae/personal/cards",
        }
    }

    /// Resolve a canonical name or a known alias, ignoring case and extra whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        ALL_BANKS
            .iter()
            .copied()
            .find(|bank| bank.display_name().to_lowercase() == wanted)
            .or_else(|| {
                ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == wanted)
                    .map(|(_, bank)| *bank)
            })
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
