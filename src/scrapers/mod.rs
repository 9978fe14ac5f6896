//! Search engine backends.
//!
//! Each engine lives in its own submodule and turns a keyword into an
//! ordered list of candidate article URLs. Engine markup changes are
//! contained in that submodule's `parse_results`.
//!
//! # Supported Engines
//!
//! | Engine | Module | Credential | Notes |
//! |--------|--------|------------|-------|
//! | Google | [`google`] | session cookie | Skipped without a cookie |
//! | Baidu News | [`baidu`] | none | News vertical (`tn=news`) |
//! | Bing | [`bing`] | none | Web results with a news suffix |
//!
//! New engines are added as a [`SearchBackend`] variant; the aggregator
//! only sees the [`SourceQuery`] trait.

pub mod baidu;
pub mod bing;
pub mod google;

use crate::config::PipelineConfig;
use crate::error::SourceUnavailable;
use crate::models::SearchResult;
use crate::utils::host_matches;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, REFERER, USER_AGENT,
};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One external search engine.
pub trait SourceQuery {
    /// Short engine name used in logs and aggregation reports.
    fn name(&self) -> &'static str;

    /// Query the engine, reporting why it could not contribute.
    async fn query(&self, keyword: &str, max_results: usize)
    -> Result<SearchResult, SourceUnavailable>;

    /// Best-effort search: any failure yields an empty result.
    #[cfg(test)]
    async fn search(&self, keyword: &str, max_results: usize) -> SearchResult {
        match self.query(keyword, max_results).await {
            Ok(urls) => urls,
            Err(SourceUnavailable::MissingCredential { engine }) => {
                tracing::debug!(engine, "No credential configured; skipping engine");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(engine = self.name(), error = %e, "Search engine failed");
                Vec::new()
            }
        }
    }
}

/// The closed set of engines the binary knows about.
#[derive(Debug, Clone)]
pub enum SearchBackend {
    Google(google::GoogleSearch),
    Baidu(baidu::BaiduSearch),
    Bing(bing::BingSearch),
}

impl SearchBackend {
    /// All engines in priority order: credentialed first.
    pub fn all(config: &PipelineConfig) -> Result<Vec<Self>, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.search_timeout())
            .build()?;
        Ok(vec![
            SearchBackend::Google(google::GoogleSearch::new(
                client.clone(),
                config.google_cookie.as_ref().map(|c| c.expose().to_string()),
                &config.query_suffix,
                &config.search_language,
            )),
            SearchBackend::Baidu(baidu::BaiduSearch::new(client.clone())),
            SearchBackend::Bing(bing::BingSearch::new(
                client,
                &config.query_suffix,
                &config.search_language,
            )),
        ])
    }
}

impl SourceQuery for SearchBackend {
    fn name(&self) -> &'static str {
        match self {
            SearchBackend::Google(_) => google::ENGINE,
            SearchBackend::Baidu(_) => baidu::ENGINE,
            SearchBackend::Bing(_) => bing::ENGINE,
        }
    }

    async fn query(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<SearchResult, SourceUnavailable> {
        match self {
            SearchBackend::Google(g) => g.query(keyword, max_results).await,
            SearchBackend::Baidu(b) => b.query(keyword, max_results).await,
            SearchBackend::Bing(b) => b.query(keyword, max_results).await,
        }
    }
}

/// Browser-like header set sent to every engine.
pub(crate) fn browser_headers(
    accept_language: &str,
    referer: &'static str,
    cookie: Option<&str>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    let lang = format!(
        "{accept_language},{};q=0.9,en;q=0.8",
        primary_language(accept_language)
    );
    if let Ok(lang) = HeaderValue::from_str(&lang) {
        headers.insert(ACCEPT_LANGUAGE, lang);
    }
    headers.insert(REFERER, HeaderValue::from_static(referer));
    if let Some(cookie) = cookie.and_then(|c| HeaderValue::from_str(c).ok()) {
        headers.insert(COOKIE, cookie);
    }
    headers
}

fn primary_language(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

/// GET `url` and return the body, mapping failures to [`SourceUnavailable`].
pub(crate) async fn fetch_results_page(
    engine: &'static str,
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
) -> Result<String, SourceUnavailable> {
    let response = client
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(|source| SourceUnavailable::Http { engine, source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceUnavailable::Status {
            engine,
            status: status.as_u16(),
        });
    }

    response
        .text()
        .await
        .map_err(|source| SourceUnavailable::Http { engine, source })
}

/// Absolute http(s) link that does not point at any excluded host.
pub(crate) fn is_candidate_link(url: &str, excluded: &[&str]) -> bool {
    (url.starts_with("http://") || url.starts_with("https://"))
        && !excluded.iter().any(|d| host_matches(url, d))
}

/// Keyword with the configured suffix, e.g. `"AI 新闻"`.
pub(crate) fn with_suffix(keyword: &str, suffix: &str) -> String {
    let suffix = suffix.trim();
    if suffix.is_empty() {
        keyword.trim().to_string()
    } else {
        format!("{} {}", keyword.trim(), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_headers() {
        let headers = browser_headers("zh-CN", "https://www.bing.com/", Some("NID=1"));
        assert_eq!(headers[USER_AGENT], BROWSER_USER_AGENT);
        assert_eq!(headers[ACCEPT_LANGUAGE], "zh-CN,zh;q=0.9,en;q=0.8");
        assert_eq!(headers[REFERER], "https://www.bing.com/");
        assert_eq!(headers[COOKIE], "NID=1");

        let headers = browser_headers("en-US", "https://www.bing.com/", None);
        assert!(headers.get(COOKIE).is_none());
    }

    #[test]
    fn test_is_candidate_link() {
        let excluded = ["bing.com", "youtube.com"];
        assert!(is_candidate_link("https://www.reuters.com/a", &excluded));
        assert!(!is_candidate_link("https://www.bing.com/news", &excluded));
        assert!(!is_candidate_link("https://m.youtube.com/watch", &excluded));
        assert!(!is_candidate_link("/relative/path", &excluded));
        assert!(!is_candidate_link("javascript:void(0)", &excluded));
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(with_suffix(" AI ", "新闻"), "AI 新闻");
        assert_eq!(with_suffix("AI", ""), "AI");
    }

    #[tokio::test]
    async fn test_backends_are_in_priority_order() {
        let config = PipelineConfig::default();
        let names: Vec<_> = SearchBackend::all(&config)
            .unwrap()
            .iter()
            .map(|b| b.name())
            .collect();
        assert_eq!(names, vec!["google", "baidu", "bing"]);
    }

    #[tokio::test]
    async fn test_google_without_cookie_is_silently_empty() {
        let config = PipelineConfig::default();
        let backends = SearchBackend::all(&config).unwrap();
        let google = &backends[0];
        assert!(matches!(
            google.query("AI", 5).await,
            Err(SourceUnavailable::MissingCredential { engine: "google" })
        ));
        assert!(google.search("AI", 5).await.is_empty());
    }
}
