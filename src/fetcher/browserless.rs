//! Secondary fetch path for JavaScript-rendered pages.
//!
//! Delegates rendering to a Browserless-compatible headless Chrome service
//! (`POST /content`), then runs the same extractor on the rendered DOM.
//! Slow, so it only ever sees URLs the primary path already gave up on.

use super::PageSource;
use super::extract::extract_article;
use crate::config::RenderConfig;
use crate::error::FetchError;
use crate::models::ExtractedPage;
use crate::scrapers::BROWSER_USER_AGENT;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    user_agent: &'static str,
    viewport: Viewport,
    wait_for_timeout: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct Viewport {
    width: u32,
    height: u32,
}

pub struct BrowserlessPageSource {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    viewport: Viewport,
    wait_ms: u64,
    min_chars: usize,
}

impl std::fmt::Debug for BrowserlessPageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserlessPageSource")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BrowserlessPageSource {
    pub fn new(base_url: &str, config: &RenderConfig, min_chars: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let endpoint = format!("{}/content", base_url.trim_end_matches('/'));
        let token = config.token.as_ref().map(|t| t.expose().to_string());

        Ok(Self {
            client,
            endpoint,
            token,
            viewport: Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
            },
            wait_ms: config.wait_ms,
            min_chars,
        })
    }
}

impl BrowserlessPageSource {
    /// The token travels as a query parameter, added per request so it never
    /// sits in `endpoint`.
    fn request(&self, body: &ContentRequest<'_>) -> reqwest::RequestBuilder {
        let request = self.client.post(&self.endpoint).json(body);
        match &self.token {
            Some(token) => request.query(&[("token", token.as_str())]),
            None => request,
        }
    }
}

impl PageSource for BrowserlessPageSource {
    fn name(&self) -> &'static str {
        "browserless"
    }

    #[instrument(level = "debug", skip(self))]
    async fn retrieve(&self, url: &str) -> Result<ExtractedPage, FetchError> {
        let body = ContentRequest {
            url,
            user_agent: BROWSER_USER_AGENT,
            viewport: self.viewport,
            wait_for_timeout: self.wait_ms,
        };

        // Errors carry the request URL, which would include the token.
        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| FetchError::from(e.without_url()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Render(format!(
                "status {}: {}",
                status.as_u16(),
                crate::utils::truncate_for_log(&message, 120)
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::from(e.without_url()))?;
        debug!(bytes = html.len(), "Rendered page");
        Ok(extract_article(&html, url, self.min_chars))
    }
}
