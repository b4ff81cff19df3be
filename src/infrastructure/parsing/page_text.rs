//! Visible text of a product page, as handed to the field extractor.

use scraper::{ElementRef, Html};

use super::dom::selector;

const SKIPPED: &[&str] = &["script", "style", "noscript", "template", "svg", "iframe", "head"];

const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "section", "summary", "table", "td", "th", "tr", "ul",
];

fn collect(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            let name = child.value().name();
            if SKIPPED.contains(&name) {
                continue;
            }
            let block = BLOCKS.contains(&name);
            if block {
                out.push('\n');
            }
            collect(child, out);
            if block {
                out.push('\n');
            }
        }
    }
}

/// Text a reader would see in `<body>`: one line per block, whitespace
/// collapsed, empty lines dropped.
pub fn visible_text(html: &Html) -> String {
    let mut raw = String::new();
    match selector("body").ok().and_then(|body| html.select(&body).next()) {
        Some(body) => collect(body, &mut raw),
        None => collect(html.root_element(), &mut raw),
    }

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_inline_runs_together_and_drops_scripts() {
        let html = Html::parse_document(
            r"<html><head><title>T</title><style>p{}</style></head><body>
                <h1>Platinum   Card</h1>
                <p>Earn <b>5%</b> cashback</p>
                <script>var x = 1;</script>
                <ul><li>Lounge access</li><li>Golf</li></ul>
              </body></html>",
        );
        assert_eq!(visible_text(&html), "Platinum Card\nEarn 5% cashback\nLounge access\nGolf");
    }

    #[test]
    fn empty_body_gives_empty_text() {
        let html = Html::parse_document("<html><body>  <script>x()</script> </body></html>");
        assert!(visible_text(&html).is_empty());
    }
}
