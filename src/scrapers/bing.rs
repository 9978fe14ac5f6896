//! Bing web search.

use super::{browser_headers, fetch_results_page, is_candidate_link, with_suffix};
use crate::error::SourceUnavailable;
use crate::models::SearchResult;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, instrument};

pub const ENGINE: &str = "bing";

const EXCLUDED: &[&str] = &["bing.com", "microsoft.com", "youtube.com"];

static RESULT: Lazy<Selector> = Lazy::new(|| Selector::parse("li.b_algo").expect("static selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

#[derive(Debug, Clone)]
pub struct BingSearch {
    client: reqwest::Client,
    query_suffix: String,
    language: String,
}

impl BingSearch {
    pub fn new(client: reqwest::Client, query_suffix: &str, language: &str) -> Self {
        Self {
            client,
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
        // Bing pads its pages with cards we discard, so ask for twice as many.
        let url = format!(
            "https://www.bing.com/search?q={}&count={}&setlang={}",
            urlencoding::encode(&with_suffix(keyword, &self.query_suffix)),
            max_results * 2,
            self.language
        );
        let headers = browser_headers(&self.language, "https://www.bing.com/", None);
        let html = fetch_results_page(ENGINE, &self.client, &url, headers).await?;

        let links = parse_results(&html, max_results);
        info!(count = links.len(), "Bing results parsed");
        Ok(links)
    }
}

/// Extract the first link of each organic `li.b_algo` result.
pub fn parse_results(html: &str, max_results: usize) -> SearchResult {
    let document = Html::parse_document(html);
    document
        .select(&RESULT)
        .filter_map(|result| result.select(&LINK).next())
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| is_candidate_link(href, EXCLUDED))
        .take(max_results)
        .map(str::to_string)
        .collect()
}
