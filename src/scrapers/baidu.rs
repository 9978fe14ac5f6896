//! Baidu News search.
//!
//! Queries the news vertical directly, so no keyword suffix is added.
//! Result links back into baidu.com are dropped, except Baijiahao articles
//! which are hosted there.

use super::{browser_headers, fetch_results_page, is_candidate_link};
use crate::error::SourceUnavailable;
use crate::models::SearchResult;
use crate::utils::host_matches;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, instrument};

pub const ENGINE: &str = "baidu";

static RESULT: Lazy<Selector> = Lazy::new(|| Selector::parse("div.result").expect("static selector"));
static CONTAINER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.c-container").expect("static selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

#[derive(Debug, Clone)]
pub struct BaiduSearch {
    client: reqwest::Client,
}

impl BaiduSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn query(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<SearchResult, SourceUnavailable> {
        let url = format!(
            "https://www.baidu.com/s?tn=news&rtt=1&bsst=1&cl=2&wd={}",
            urlencoding::encode(keyword.trim())
        );
        let headers = browser_headers("zh-CN", "https://www.baidu.com", None);
        let html = fetch_results_page(ENGINE, &self.client, &url, headers).await?;

        let links = parse_results(&html, max_results);
        info!(count = links.len(), "Baidu results parsed");
        Ok(links)
    }
}

/// Extract the first link of each Baidu news result.
pub fn parse_results(html: &str, max_results: usize) -> SearchResult {
    let document = Html::parse_document(html);

    let mut results: Vec<_> = document.select(&RESULT).collect();
    if results.is_empty() {
        results = document.select(&CONTAINER).collect();
    }

    results
        .into_iter()
        .filter_map(|result| result.select(&LINK).next())
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| is_article_link(href))
        .take(max_results)
        .map(str::to_string)
        .collect()
}

fn is_article_link(url: &str) -> bool {
    is_candidate_link(url, &[])
        && (!host_matches(url, "baidu.com") || host_matches(url, "baijiahao.baidu.com"))
}
