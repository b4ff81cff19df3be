//! Page fetching seam
//!
//! Services depend on `PageFetcher`, not on a concrete HTTP stack, so tests
//! can script pages and a rendering backend can be swapped in later.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use crate::infrastructure::http_client::HttpClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub requested_url: String,
    /// URL after redirects.
    pub final_url: String,
    pub html: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

pub struct HttpPageFetcher {
    client: Arc<HttpClient>,
}

impl HttpPageFetcher {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self.client.get_text(url).await?;
        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url: response.final_url,
            html: response.body,
        })
    }
}

/// Last path segment without extension, lowercased.
fn page_slug(url: &str) -> String {
    let path = Url::parse(url).map_or_else(|_| url.to_string(), |u| u.path().to_string());
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let stem = segment.split_once('.').map_or(segment, |(stem, _)| stem);
    stem.to_lowercase()
}

/// `true` when the server sent us to a different product (or a generic
/// landing page): the final URL's slug differs from the requested one.
pub fn is_redirected_away(requested: &str, final_url: &str) -> bool {
    page_slug(requested) != page_slug(final_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://b.ae/cards/gold", "https://b.ae/cards/gold", false)]
    #[case("https://b.ae/cards/gold", "https://www.b.ae/en/cards/gold/", false)]
    #[case("https://b.ae/cards/Gold.html", "https://b.ae/cards/gold", false)]
    #[case("https://b.ae/cards/gold?x=1", "https://b.ae/cards/gold#top", false)]
    #[case("https://b.ae/cards/gold", "https://b.ae/cards/", true)]
    #[case("https://b.ae/cards/gold", "https://b.ae/", true)]
    #[case("https://b.ae/cards/gold", "https://b.ae/cards/platinum", true)]
    fn redirect_detection(#[case] requested: &str, #[case] final_url: &str, #[case] expected: bool) {
        assert_eq!(is_redirected_away(requested, final_url), expected);
    }
}
