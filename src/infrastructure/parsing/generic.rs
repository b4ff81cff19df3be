//! Bank-agnostic fallback: any deep link that mentions `credit-card`.

use scraper::Html;
use url::Url;

use super::dom::{resolve, selector, slug_title};
use super::{ExtractionStrategy, ParsingResult};
use crate::domain::CardRef;

#[derive(Debug, Clone, Copy, Default)]
pub struct GenericLinkStrategy;

impl GenericLinkStrategy {
    fn is_candidate(href: &str) -> bool {
        href.contains("credit-card")
            && href.matches('/').count() >= 3
            && !href.ends_with("/cards/")
            && !href.ends_with("/credit-cards/")
    }
}

impl ExtractionStrategy for GenericLinkStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        let links = selector("a[href]")?;
        Ok(html
            .select(&links)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| Self::is_candidate(href))
            .filter_map(|href| resolve(listing_url, href))
            .map(|url| {
                let name = slug_title(&url);
                CardRef::new(url, name)
            })
            .collect())
    }
}
