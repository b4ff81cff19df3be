//! Small DOM helpers shared by the listing strategies.

use scraper::{ElementRef, Selector};
use url::Url;

use super::{ParsingError, ParsingResult};
use crate::domain::card::normalize_card_name;

pub fn selector(css: &str) -> ParsingResult<Selector> {
    Selector::parse(css).map_err(|e| ParsingError::invalid_selector(css, e))
}

/// First descendant of `scope` matching `css`.
pub fn find<'a>(scope: ElementRef<'a>, css: &Selector) -> Option<ElementRef<'a>> {
    scope.select(css).next()
}

/// Trimmed text content with inner whitespace collapsed.
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

pub fn has_class_containing(element: ElementRef<'_>, fragment: &str) -> bool {
    element.value().classes().any(|class| class.contains(fragment))
}

/// Nearest ancestor element satisfying `predicate`.
pub fn find_ancestor<'a>(
    element: ElementRef<'a>,
    predicate: impl Fn(ElementRef<'a>) -> bool,
) -> Option<ElementRef<'a>> {
    element.ancestors().filter_map(ElementRef::wrap).find(|e| predicate(*e))
}

/// Nearest preceding sibling element satisfying `predicate`.
pub fn find_previous_sibling<'a>(
    element: ElementRef<'a>,
    predicate: impl Fn(ElementRef<'a>) -> bool,
) -> Option<ElementRef<'a>> {
    element.prev_siblings().filter_map(ElementRef::wrap).find(|e| predicate(*e))
}

pub fn is_tag(element: ElementRef<'_>, name: &str) -> bool {
    element.value().name().eq_ignore_ascii_case(name)
}

pub fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Resolve `href` against the listing page. Script, anchor, mail and phone
/// links are not product pages.
pub fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    let lowered = href.to_ascii_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || ["javascript:", "mailto:", "tel:"].iter().any(|p| lowered.starts_with(p))
    {
        return None;
    }
    base.join(href).ok().map(String::from)
}

/// Last non-empty path segment of a URL or path.
pub fn last_segment(href: &str) -> &str {
    let without_query = href.split(['?', '#']).next().unwrap_or(href);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// Card name derived from the last path segment, e.g.
/// `/cards/titanium-credit-card/` becomes `Titanium Credit Card`.
pub fn slug_title(href: &str) -> String {
    normalize_card_name(&last_segment(href).replace(['-', '_'], " "))
}
