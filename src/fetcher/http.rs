//! Primary fetch path: plain HTTP GET plus HTML extraction.

use super::PageSource;
use super::extract::extract_article;
use crate::error::FetchError;
use crate::models::ExtractedPage;
use crate::scrapers::BROWSER_USER_AGENT;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
    min_chars: usize,
}

impl HttpPageSource {
    pub fn new(timeout: Duration, min_chars: usize) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, min_chars })
    }
}

impl PageSource for HttpPageSource {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(level = "debug", skip(self))]
    async fn retrieve(&self, url: &str) -> Result<ExtractedPage, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let html = response.text().await?;
        debug!(bytes = html.len(), "Downloaded page");
        Ok(extract_article(&html, url, self.min_chars))
    }
}
