//! Chat-completion access with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait, one request in, one message string out
//! - [`ChatClient`]: OpenAI-compatible `/chat/completions` over `reqwest`
//!   (DeepSeek by default)
//! - [`RetryAsk`]: decorator that retries transient failures of any
//!   `AskAsync` implementation
//!
//! # Retry Strategy
//!
//! Only errors for which [`AiError::is_transient`] holds are retried:
//! timeouts, connection failures, 429 and 5xx. The delay doubles from
//! `base_delay`, is capped at 30 seconds, and gets 0-250ms of jitter.
//! A response that arrives but cannot be used is never retried here.

use crate::config::AiConfig;
use crate::error::AiError;
use rand::{Rng, rng};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// When `false`, [`RetryAsk`] makes exactly one attempt.
    #[serde(skip)]
    pub retryable: bool,
}

impl ChatRequest {
    /// Single user prompt with free-text output.
    pub fn text(model: &str, prompt: String, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            temperature,
            response_format: None,
            retryable: true,
        }
    }

    /// Single user prompt, model constrained to emit a JSON object.
    pub fn json(model: &str, prompt: String, temperature: f32) -> Self {
        Self {
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
            ..Self::text(model, prompt, temperature)
        }
    }

    /// Opt out of backoff: the first failure is final.
    pub fn without_retry(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// The prompt text, for logging and tests.
    pub fn prompt(&self) -> &str {
        self.messages.last().map(|m| m.content.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Trait for async LLM interaction.
///
/// Implementors send a [`ChatRequest`] and return the assistant message.
/// This abstraction allows decorators (retry) and test doubles.
pub trait AskAsync {
    async fn ask(&self, request: &ChatRequest) -> Result<String, AiError>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..max_jitter)
/// ```
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
    max_jitter_ms: u64,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// ```ignore
    /// let client = ChatClient::new(&config.api_base, key, Duration::from_secs(90))?;
    /// let retry_client = RetryAsk::new(client, 2, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
            max_jitter_ms: 250,
        }
    }

    #[cfg(test)]
    pub fn with_jitter(mut self, max_jitter: StdDuration) -> Self {
        self.max_jitter_ms = max_jitter.as_millis() as u64;
        self
    }

    fn delay_for(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = if self.max_jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=self.max_jitter_ms)
        };
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    #[instrument(level = "debug", skip_all, fields(model = %request.model))]
    async fn ask(&self, request: &ChatRequest) -> Result<String, AiError> {
        if !request.retryable {
            debug!("Single-attempt request; backoff disabled");
            return self.inner.ask(request).await;
        }
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(request).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() || attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            transient = e.is_transient(),
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() giving up"
                        );
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// OpenAI-compatible chat-completion client.
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl ChatClient {
    pub fn new(api_base: &str, api_key: &str, timeout: StdDuration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }

    /// Client plus retry decorator, as configured.
    pub fn from_config(config: &AiConfig) -> Result<RetryAsk<Self>, crate::error::ConfigError> {
        let key = config
            .api_key
            .as_ref()
            .ok_or(crate::error::ConfigError::MissingApiKey)?;
        let client = Self::new(
            &config.api_base,
            key.expose(),
            StdDuration::from_secs(config.timeout_secs),
        )?;
        Ok(RetryAsk::new(client, config.max_retries, StdDuration::from_secs(1)))
    }

    fn headers(&self) -> Result<HeaderMap, AiError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
            AiError::Api {
                status: 401,
                message: "API key contains characters not allowed in a header".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl AskAsync for ChatClient {
    #[instrument(level = "debug", skip_all, fields(model = %request.model))]
    async fn ask(&self, request: &ChatRequest) -> Result<String, AiError> {
        let t0 = Instant::now();
        debug!(
            prompt_chars = request.prompt().chars().count(),
            json = request.response_format.is_some(),
            "Sending chat completion"
        );
        let response = self
            .http
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message: crate::utils::truncate_for_log(&message, 300),
            });
        }

        let body: ChatResponse = response.json().await?;
        debug!(elapsed_ms = t0.elapsed().as_millis(), "Chat completion received");
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails with the queued errors first, then answers "ok".
    struct Flaky {
        errors: Mutex<Vec<AiError>>,
        calls: Mutex<usize>,
    }

    impl Flaky {
        fn new(errors: Vec<AiError>) -> Self {
            Self {
                errors: Mutex::new(errors),
                calls: Mutex::new(0),
            }
        }
    }

    impl AskAsync for Flaky {
        async fn ask(&self, _request: &ChatRequest) -> Result<String, AiError> {
            *self.calls.lock().unwrap() += 1;
            match self.errors.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok("ok".to_string()),
            }
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::text("m", "hi".to_string(), 0.0)
    }

    fn retrying(inner: Flaky, max_retries: usize) -> RetryAsk<Flaky> {
        RetryAsk::new(inner, max_retries, StdDuration::from_millis(1)).with_jitter(StdDuration::ZERO)
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let api = retrying(Flaky::new(vec![AiError::Timeout, AiError::Timeout]), 2);
        assert_eq!(api.ask(&request()).await.unwrap(), "ok");
        assert_eq!(*api.inner.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let api = retrying(
            Flaky::new(vec![AiError::Timeout, AiError::Timeout, AiError::Timeout]),
            2,
        );
        assert!(matches!(api.ask(&request()).await, Err(AiError::Timeout)));
        assert_eq!(*api.inner.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_requests_bypass_backoff() {
        let api = retrying(Flaky::new(vec![AiError::Timeout]), 3);
        let once = ChatRequest::json("m", "p".into(), 0.3).without_retry();
        assert!(matches!(api.ask(&once).await, Err(AiError::Timeout)));
        assert_eq!(*api.inner.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let api = retrying(
            Flaky::new(vec![AiError::Api {
                status: 401,
                message: "bad key".to_string(),
            }]),
            5,
        );
        assert!(matches!(api.ask(&request()).await, Err(AiError::Api { status: 401, .. })));
        assert_eq!(*api.inner.calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let api = retrying(Flaky::new(vec![]), 3);
        assert_eq!(api.delay_for(1), StdDuration::from_millis(1));
        assert_eq!(api.delay_for(3), StdDuration::from_millis(4));
        assert_eq!(api.delay_for(60), StdDuration::from_secs(30));
    }

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_value(ChatRequest::json("deepseek-chat", "p".into(), 0.3)).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["response_format"]["type"], "json_object");

        let json = serde_json::to_value(ChatRequest::text("m", "p".into(), 0.0)).unwrap();
        assert!(json.get("response_format").is_none());
        assert_eq!(json["temperature"], 0.0);
    }

    #[test]
    fn test_response_parsing() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":" hi "}}]}"#,
        )
        .unwrap();
        assert_eq!(body.choices[0].message.content.as_deref(), Some(" hi "));
    }

    #[test]
    fn test_client_debug_hides_key() {
        let client = ChatClient::new("https://api.example/", "sk-secret", StdDuration::from_secs(1)).unwrap();
        let shown = format!("{client:?}");
        assert!(shown.contains("https://api.example/chat/completions"));
        assert!(!shown.contains("sk-secret"));
    }
}
