//! Declarative container/title/link strategy
//!
//! Most listing pages repeat one container element per card holding a
//! title element and a link. The per-bank differences are selectors, which
//! attribute carries the URL and a few keyword filters.

use scraper::{ElementRef, Html};
use tracing::debug;
use url::Url;

use super::dom::{find, resolve, selector, text_of};
use super::page_text::visible_text;
use super::{ExtractionStrategy, ParsingResult};
use crate::domain::CardRef;
use crate::domain::card::NAME_NOT_FOUND;

/// Where the card name comes from.
#[derive(Debug, Clone, Copy)]
pub enum NameSource {
    /// First match of this selector inside the container.
    Element(&'static str),
    /// Text of the link element itself.
    LinkText,
}

/// Rewrites a resolved product URL (scheme/host canonicalisation).
pub type UrlRewrite = fn(Url) -> Url;

#[derive(Debug, Clone)]
pub struct ContainerStrategy {
    container: &'static str,
    link: &'static str,
    link_attr: &'static str,
    link_text: Option<&'static str>,
    name: NameSource,
    name_required: bool,
    href_filter: fn(&str) -> bool,
    name_filter: fn(&str) -> bool,
    name_strip: Option<&'static str>,
    rewrite: Option<UrlRewrite>,
}

fn accept_all(_: &str) -> bool {
    true
}

impl ContainerStrategy {
    pub fn new(container: &'static str, link: &'static str, name: NameSource) -> Self {
        Self {
            container,
            link,
            link_attr: "href",
            link_text: None,
            name,
            name_required: true,
            href_filter: accept_all,
            name_filter: accept_all,
            name_strip: None,
            rewrite: None,
        }
    }

    /// Read the URL from another attribute (e.g. `data-href`).
    pub fn link_attr(mut self, attr: &'static str) -> Self {
        self.link_attr = attr;
        self
    }

    /// Only accept links whose text contains `text` (case-insensitive).
    pub fn link_text(mut self, text: &'static str) -> Self {
        self.link_text = Some(text);
        self
    }

    /// Keep cards without a title element, named `Name Not Found`.
    pub fn name_optional(mut self) -> Self {
        self.name_required = false;
        self
    }

    pub fn href_filter(mut self, filter: fn(&str) -> bool) -> Self {
        self.href_filter = filter;
        self
    }

    pub fn name_filter(mut self, filter: fn(&str) -> bool) -> Self {
        self.name_filter = filter;
        self
    }

    /// Remove a literal fragment from names (e.g. screen-reader suffixes).
    pub fn name_strip(mut self, fragment: &'static str) -> Self {
        self.name_strip = Some(fragment);
        self
    }

    pub fn rewrite(mut self, rewrite: UrlRewrite) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    fn card_from(
        &self,
        container: ElementRef<'_>,
        link_sel: &scraper::Selector,
        name_sel: Option<&scraper::Selector>,
        listing_url: &Url,
    ) -> Option<CardRef> {
        let link = match self.link_text {
            Some(wanted) => container.select(link_sel).find(|a| {
                text_of(*a).to_lowercase().contains(&wanted.to_lowercase())
            })?,
            None => find(container, link_sel)?,
        };
        let href = link.value().attr(self.link_attr)?;
        if !(self.href_filter)(href) {
            return None;
        }

        let name = match (self.name, name_sel) {
            (NameSource::LinkText, _) => Some(text_of(link)),
            (NameSource::Element(_), Some(sel)) => find(container, sel).map(text_of),
            (NameSource::Element(_), None) => None,
        };
        let name = match name {
            Some(name) => match self.name_strip {
                Some(fragment) => name.replace(fragment, "").trim().to_string(),
                None => name,
            },
            None if self.name_required => return None,
            None => NAME_NOT_FOUND.to_string(),
        };
        if !(self.name_filter)(&name) {
            return None;
        }

        let resolved = resolve(listing_url, href)?;
        let url = match self.rewrite {
            Some(rewrite) => Url::parse(&resolved).map(rewrite).map(String::from).unwrap_or(resolved),
            None => resolved,
        };
        Some(CardRef::new(url, name))
    }
}

impl ExtractionStrategy for ContainerStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        let container_sel = selector(self.container)?;
        let link_sel = selector(self.link)?;
        let name_sel = match self.name {
            NameSource::Element(css) => Some(selector(css)?),
            NameSource::LinkText => None,
        };

        let cards: Vec<CardRef> = html
            .select(&container_sel)
            .filter_map(|container| self.card_from(container, &link_sel, name_sel.as_ref(), listing_url))
            .collect();

        debug!("{} matched {} cards", self.container, cards.len());
        Ok(cards)
    }
}

/// Runs several strategies and concatenates their results.
pub struct CombinedStrategy {
    parts: Vec<Box<dyn ExtractionStrategy>>,
}

impl CombinedStrategy {
    pub fn new(parts: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { parts }
    }
}

impl ExtractionStrategy for CombinedStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        let mut cards = Vec::new();
        for part in &self.parts {
            cards.extend(part.extract(html, listing_url)?);
        }
        Ok(cards)
    }

    fn seeds(&self, listing_url: &Url) -> Vec<CardRef> {
        self.parts.iter().flat_map(|part| part.seeds(listing_url)).collect()
    }
}

/// Fixed entries for products the listing page does not link to. They are
/// reported through `seeds`, so a page where `inner` finds nothing still
/// counts as empty.
pub struct SeededStrategy {
    seeds: Vec<CardRef>,
    inner: Box<dyn ExtractionStrategy>,
}

impl SeededStrategy {
    pub fn new(seeds: Vec<CardRef>, inner: Box<dyn ExtractionStrategy>) -> Self {
        Self { seeds, inner }
    }
}

impl ExtractionStrategy for SeededStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        self.inner.extract(html, listing_url)
    }

    fn seeds(&self, listing_url: &Url) -> Vec<CardRef> {
        let mut seeds = self.seeds.clone();
        seeds.extend(self.inner.seeds(listing_url));
        seeds
    }
}

/// The listing page is itself the product page. It is reported only when
/// its visible text mentions `marker`.
pub struct ListingPageStrategy {
    name: &'static str,
    marker: &'static str,
}

impl ListingPageStrategy {
    pub fn new(name: &'static str, marker: &'static str) -> Self {
        Self { name, marker }
    }
}

impl ExtractionStrategy for ListingPageStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        let text = visible_text(html).to_lowercase();
        if text.contains(&self.marker.to_lowercase()) {
            Ok(vec![CardRef::new(listing_url.as_str(), self.name)])
        } else {
            debug!("Listing page {} does not mention {:?}", listing_url, self.marker);
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Url {
        Url::parse("https://www.bank.ae/cards/").unwrap()
    }

    #[test]
    fn title_and_link_inside_container() {
        let html = Html::parse_document(
            r#"<div class="item"><h3>Gold Card</h3><a class="go" href="gold">Go</a></div>
               <div class="item"><a class="go" href="untitled">Go</a></div>"#,
        );
        let strategy = ContainerStrategy::new("div.item", "a.go", NameSource::Element("h3"));
        let cards = strategy.extract(&html, &listing()).unwrap();
        assert_eq!(cards, vec![CardRef::new("https://www.bank.ae/cards/gold", "Gold Card")]);

        let lenient = strategy.name_optional().extract(&html, &listing()).unwrap();
        assert_eq!(lenient.len(), 2);
        assert_eq!(lenient[1].name, NAME_NOT_FOUND);
    }

    #[test]
    fn link_text_and_filters() {
        let html = Html::parse_document(
            r#"<div class="c"><a href="/a">Apply</a><a href="/debit-x">Learn more</a></div>
               <div class="c"><a href="/credit-y">LEARN MORE about Y</a></div>"#,
        );
        let strategy = ContainerStrategy::new("div.c", "a", NameSource::LinkText)
            .link_text("learn more")
            .href_filter(|h| !h.contains("debit"));
        let cards = strategy.extract(&html, &listing()).unwrap();
        assert_eq!(cards, vec![CardRef::new("https://www.bank.ae/credit-y", "LEARN MORE about Y")]);
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let html = Html::parse_document("<p></p>");
        let strategy = ContainerStrategy::new("div[", "a", NameSource::LinkText);
        assert!(strategy.extract(&html, &listing()).is_err());
    }

    #[test]
    fn seeds_are_kept_apart_from_extracted_cards() {
        let html = Html::parse_document("<p></p>");
        let inner = ContainerStrategy::new("div.item", "a", NameSource::LinkText);
        let strategy = SeededStrategy::new(vec![CardRef::new("https://x/seed", "Seed")], Box::new(inner));
        assert!(strategy.extract(&html, &listing()).unwrap().is_empty());
        assert_eq!(strategy.seeds(&listing()), vec![CardRef::new("https://x/seed", "Seed")]);
    }

    #[test]
    fn listing_page_needs_its_marker() {
        let strategy = ListingPageStrategy::new("All Cards", "credit card");
        let product = Html::parse_document("<h1>Our Credit Cards</h1><p>Apply today</p>");
        assert_eq!(
            strategy.extract(&product, &listing()).unwrap(),
            vec![CardRef::new("https://www.bank.ae/cards/", "All Cards")]
        );

        let maintenance = Html::parse_document("<p>Site under maintenance</p>");
        assert!(strategy.extract(&maintenance, &listing()).unwrap().is_empty());
    }
}
