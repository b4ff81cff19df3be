//! Per-bank listing heuristics
//!
//! Each bank's card page has its own markup. Most are handled by a
//! `ContainerStrategy` configuration; the rest need to walk the DOM in ways
//! a container/title/link triple cannot express.

use scraper::Html;
use url::Url;

use super::container::{CombinedStrategy, ContainerStrategy, ListingPageStrategy, NameSource, SeededStrategy};
use super::dom::{
    find, find_ancestor, find_previous_sibling, has_class, is_tag, resolve, selector, slug_title, text_of,
};
use super::{ExtractionStrategy, ParsingResult};
use crate::domain::card::NAME_NOT_FOUND;
use crate::domain::{Bank, CardRef};

const AJMAN_ULTRACASH_URL: &str = "https://www.ajmanbank.ae/site/mastercard_ultracash/en";

/// The strategy registered for `bank`.
pub fn strategy_for(bank: Bank) -> Box<dyn ExtractionStrategy> {
    use NameSource::{Element, LinkText};

    match bank {
        Bank::Mashreq => Box::new(
            ContainerStrategy::new(
                r#"div[class*="ProductCard_card__"]"#,
                r#"a[class*="Button_secondary__"]"#,
                Element(r#"h5[class*="ProductCardTop_title__"]"#),
            )
            .name_optional(),
        ),
        Bank::Adcb | Bank::AdcbIslamic => Box::new(
            ContainerStrategy::new("div.c-card", "div.c-card__image", Element("h3.c-card__title"))
                .link_attr("data-href")
                .href_filter(|href| href.contains("credit-cards/") && !href.contains("debit-cards/"))
                .name_optional(),
        ),
        Bank::Rakbank => Box::new(
            ContainerStrategy::new("div.product-card-horizontal__inner", "a.tertiary-cta", Element("h5.gradient-title"))
                .rewrite(canonical_www_https),
        ),
        Bank::EmiratesNbd => Box::new(
            ContainerStrategy::new("div.cc-block", "a.link-arrow", Element("h3.cc-block__title")).name_optional(),
        ),
        Bank::Fab => Box::new(ContainerStrategy::new("div.credit-card-item", "a.read-more", Element("h3.card-title"))),
        Bank::Hsbc => Box::new(
            ContainerStrategy::new(
                "li.M-CNT-ITEM-ART-DEV",
                "h3.link-header a",
                Element("h3.link-header a span.link.text"),
            )
            .href_filter(|href| !href.contains("/compare/"))
            .name_optional(),
        ),
        Bank::StandardChartered => Box::new(StandardCharteredStrategy),
        Bank::Cbd => Box::new(CbdStrategy),
        Bank::EmiratesIslamic => Box::new(ContainerStrategy::new(
            "div.card",
            "div.card-body a.link",
            Element("div.card-body h5.card-title"),
        )),
        Bank::ArabBank => Box::new(
            ContainerStrategy::new("div.listingItem", "div.listingTitle a", LinkText).href_filter(|href| {
                let lowered = href.to_lowercase();
                ["credit-card", "visa", "mastercard"].iter().any(|k| lowered.contains(k))
            }),
        ),
        Bank::Nbf => Box::new(NbfStrategy),
        Bank::Adib => Box::new(
            ContainerStrategy::new(
                "div.covered-wrapper",
                "a.arrow-anchor.black",
                Element("h4.new-covered-card__title"),
            )
            .name_filter(|name| name.to_lowercase().contains("card")),
        ),
        Bank::AjmanBank => Box::new(SeededStrategy::new(
            vec![CardRef::new(AJMAN_ULTRACASH_URL, "ULTRACASH Mastercard")],
            Box::new(ContainerStrategy::new(
                "div.js-scroll",
                "a.InnerPageBoxLink",
                Element("h5.card-title"),
            )),
        )),
        Bank::AlHilalBank => Box::new(
            ContainerStrategy::new(
                "div.c-discover-card-list__item",
                "a.o-btn",
                Element("h3.c-discover-card__title"),
            )
            .link_text("learn more"),
        ),
        Bank::AmericanExpress => Box::new(
            ContainerStrategy::new("div.dls-white-bg", "a.btn-secondary", Element("a.heading-3")).link_text("learn more"),
        ),
        Bank::Cbi => Box::new(CombinedStrategy::new(vec![
            Box::new(
                ContainerStrategy::new("div.owl-item", "a.marketing-link", Element("a.marketing-link h4"))
                    .name_filter(is_credit_card_name),
            ),
            Box::new(
                ContainerStrategy::new("div.compare-product", "a.btn-secondary", Element("p.sub"))
                    .name_filter(is_credit_card_name),
            ),
        ])),
        Bank::Citibank => Box::new(
            ContainerStrategy::new(
                r#"article[class*="cmp-contentfragment--citi"]"#,
                "a.bg-primary",
                Element("h3.cmp-contentfragment__title"),
            )
            .name_strip("(Opens In A New Tab)")
            .name_filter(|name| {
                let lowered = name.to_lowercase();
                lowered.contains("card") || lowered.contains("citi")
            }),
        ),
        Bank::Dib => Box::new(ContainerStrategy::new("div.card-list-item", "div.card-title-info a", LinkText)),
        Bank::DubaiFirst => Box::new(ContainerStrategy::new(
            "div.cards-list-grid-card",
            "div.cl-card-desc-link a",
            Element("h3.cl-card-desc-title"),
        )),
        // no per-card pages; the listing itself is the product page
        Bank::FinanceHouse => Box::new(ListingPageStrategy::new("Finance House Credit Cards", "credit card")),
        Bank::Uab => Box::new(UabStrategy),
        Bank::Sib => Box::new(SibStrategy),
        Bank::Nbq => Box::new(NbqStrategy),
    }
}

fn is_credit_card_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    lowered.contains("card") && !lowered.contains("debit")
}

/// Force `https://www.` so the same page is not stored under two URLs.
fn canonical_www_https(mut url: Url) -> Url {
    let _ = url.set_scheme("https");
    if let Some(host) = url.host_str().filter(|h| !h.starts_with("www.")).map(|h| format!("www.{h}")) {
        let _ = url.set_host(Some(&host));
    }
    url
}

/// Link in `div.product-action`, title in the preceding content box.
struct StandardCharteredStrategy;

impl ExtractionStrategy for StandardCharteredStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        let containers = selector("div.product-action")?;
        let link_sel = selector(r#"a[title="Find out more"]"#)?;
        let name_sel = selector("p.img-text")?;

        Ok(html
            .select(&containers)
            .filter_map(|container| {
                let href = find(container, &link_sel)?.value().attr("href")?;
                let name = find_previous_sibling(container, |e| is_tag(e, "div") && has_class(e, "product-box-content"))
                    .and_then(|content| find(content, &name_sel))
                    .map_or_else(|| NAME_NOT_FOUND.to_string(), text_of);
                Some(CardRef::new(resolve(listing_url, href)?, name))
            })
            .collect())
    }
}

/// Title heading wrapped by the product link.
struct CbdStrategy;

impl ExtractionStrategy for CbdStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        let containers = selector("div.card-box")?;
        let heading_sel = selector("h3.c-card-heading")?;

        Ok(html
            .select(&containers)
            .filter_map(|container| {
                let heading = find(container, &heading_sel)?;
                let link = find_ancestor(heading, |e| is_tag(e, "a"))?;
                let url = resolve(listing_url, link.value().attr("href")?)?;
                Some(CardRef::new(url, text_of(heading)))
            })
            .collect())
    }
}

/// Elementor page: a heading widget per card, with the "Read More" button
/// somewhere in the same full-width column.
struct NbfStrategy;

impl ExtractionStrategy for NbfStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        let widgets = selector("div.elementor-widget-heading")?;
        let title_sel = selector("h2.elementor-heading-title")?;
        let button_sel = selector("span.elementor-button-text")?;

        Ok(html
            .select(&widgets)
            .filter_map(|widget| {
                let name = text_of(find(widget, &title_sel)?);
                let lowered = name.to_lowercase();
                if lowered.contains("debit") || !lowered.contains("card") {
                    return None;
                }

                let column = find_ancestor(widget, |e| has_class(e, "e-con-full"))?;
                let read_more = column
                    .select(&button_sel)
                    .find(|span| text_of(*span).to_lowercase().contains("read more"))?;
                let link = find_ancestor(read_more, |e| is_tag(e, "a"))?;
                let url = resolve(listing_url, link.value().attr("href")?)?;
                Some(CardRef::new(url, name))
            })
            .collect())
    }
}

/// Card links live in the navigation menu.
struct UabStrategy;

impl ExtractionStrategy for UabStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        let links = selector("div.nav__col a.nav__sublink")?;
        let span_sel = selector("span")?;

        Ok(html
            .select(&links)
            .filter_map(|link| {
                let href = link.value().attr("href").filter(|h| h.contains("Credit-Cards"))?;
                let name = text_of(find(link, &span_sel)?);
                let lowered = name.to_lowercase();
                if name.is_empty() || lowered == "cards" || lowered.contains("shield") {
                    return None;
                }
                Some(CardRef::new(resolve(listing_url, href)?, name))
            })
            .collect())
    }
}

/// Carousel buttons; the title sits in the enclosing `div.card-item`, or
/// is derived from the URL when the carousel markup differs.
struct SibStrategy;

impl ExtractionStrategy for SibStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        let buttons = selector("a.btn.btn-outline-primary")?;
        let heading_sel = selector("h4, h5")?;

        Ok(html
            .select(&buttons)
            .filter_map(|link| {
                let href = link.value().attr("href").filter(|h| h.contains("/en/"))?;
                let name = match find_ancestor(link, |e| is_tag(e, "div") && has_class(e, "card-item")) {
                    Some(item) => text_of(find(item, &heading_sel)?),
                    None => slug_title(href),
                };
                Some(CardRef::new(resolve(listing_url, href)?, name))
            })
            .collect())
    }
}

/// Direct product links; the link text is the name unless it is a call to
/// action, in which case the closest preceding heading is used.
struct NbqStrategy;

impl NbqStrategy {
    fn is_product_link(href: &str) -> bool {
        href.contains("/personal/cards/nbq-") && href.contains("-credit-card")
    }

    fn is_usable_link_text(text: &str) -> bool {
        text.chars().count() > 3 && !text.contains("Read") && !text.contains("Apply")
    }
}

impl ExtractionStrategy for NbqStrategy {
    fn extract(&self, html: &Html, listing_url: &Url) -> ParsingResult<Vec<CardRef>> {
        // document order walk so "closest preceding heading" is well defined
        let walk = selector("h1, h2, h3, h4, h5, h6, a[href]")?;
        let mut last_heading: Option<String> = None;
        let mut cards = Vec::new();

        for element in html.select(&walk) {
            if !is_tag(element, "a") {
                last_heading = Some(text_of(element));
                continue;
            }
            let Some(href) = element.value().attr("href").filter(|h| Self::is_product_link(h)) else {
                continue;
            };

            let text = text_of(element);
            let name = if Self::is_usable_link_text(&text) {
                text
            } else {
                last_heading.clone().unwrap_or_else(|| slug_title(href))
            };
            if let Some(url) = resolve(listing_url, href) {
                cards.push(CardRef::new(url, name));
            }
        }

        Ok(cards)
    }
}
