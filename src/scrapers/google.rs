//! Google web search, enabled by a browser session cookie.
//!
//! Without the cookie Google serves a consent page, so the backend reports
//! a missing credential and the aggregator moves on.

use super::{browser_headers, fetch_results_page, is_candidate_link, with_suffix};
use crate::error::SourceUnavailable;
use crate::models::SearchResult;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, instrument};

pub const ENGINE: &str = "google";

const EXCLUDED: &[&str] = &["google.com", "youtube.com", "webcache.googleusercontent.com"];

static RESULT_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.yuRUbf a[href]").expect("static selector"));
static ANY_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

#[derive(Clone)]
pub struct GoogleSearch {
    client: reqwest::Client,
    cookie: Option<String>,
    query_suffix: String,
    language: String,
}

impl std::fmt::Debug for GoogleSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSearch")
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .field("language", &self.language)
            .finish()
    }
}

impl GoogleSearch {
    pub fn new(
        client: reqwest::Client,
        cookie: Option<String>,
        query_suffix: &str,
        language: &str,
    ) -> Self {
        Self {
            client,
            cookie,
            query_suffix: query_suffix.to_string(),
            language: language.to_string(),
        }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn query(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<SearchResult, SourceUnavailable> {
        let Some(cookie) = self.cookie.as_deref() else {
            return Err(SourceUnavailable::MissingCredential { engine: ENGINE });
        };

        let url = format!(
            "https://www.google.com.hk/search?q={}&num={}&hl={}",
            urlencoding::encode(&with_suffix(keyword, &self.query_suffix)),
            max_results,
            self.language
        );
        let headers = browser_headers(&self.language, "https://www.google.com/", Some(cookie));
        let html = fetch_results_page(ENGINE, &self.client, &url, headers).await?;

        let links = parse_results(&html, max_results);
        info!(count = links.len(), "Google results parsed");
        Ok(links)
    }
}

/// Extract result links from a Google results page.
///
/// Uses the organic result containers first; if the markup yields nothing,
/// falls back to `/url?q=` redirect anchors.
pub fn parse_results(html: &str, max_results: usize) -> SearchResult {
    let document = Html::parse_document(html);

    let primary: Vec<String> = document
        .select(&RESULT_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| is_candidate_link(href, EXCLUDED))
        .take(max_results)
        .map(str::to_string)
        .collect();
    if !primary.is_empty() {
        return primary;
    }

    document
        .select(&ANY_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(decode_redirect)
        .filter(|url| is_candidate_link(url, EXCLUDED))
        .take(max_results)
        .collect()
}

/// `/url?q=https%3A%2F%2Fexample.com&sa=U` → `https://example.com`
fn decode_redirect(href: &str) -> Option<String> {
    let target = href.strip_prefix("/url?q=")?;
    let target = target.split('&').next().unwrap_or(target);
    urlencoding::decode(target).ok().map(|t| t.into_owned())
}
