//! Run configuration.
//!
//! A [`PipelineConfig`] is built once in `main` (YAML file, then CLI and
//! environment overrides), validated, and passed down explicitly. There is
//! no process-wide configuration state.

use crate::blocklist::DEFAULT_BLOCKED_DOMAINS;
use crate::cli::Cli;
use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// A credential whose value never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Settings for the chat-completion capability.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_key: Option<Secret>,
    pub api_base: String,
    pub model: String,
    pub map_temperature: f32,
    pub reduce_temperature: f32,
    /// Character budget for each article body sent in the map phase.
    pub max_article_chars: usize,
    pub map_concurrency: usize,
    /// Retries for transient transport errors only.
    pub max_retries: usize,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            map_temperature: 0.0,
            reduce_temperature: 0.3,
            max_article_chars: 4000,
            map_concurrency: 4,
            max_retries: 2,
            timeout_secs: 90,
        }
    }
}

/// Settings for the headless-browser fallback fetch.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub token: Option<Secret>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Time the page gets to run its scripts before the DOM is captured.
    pub wait_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            token: None,
            viewport_width: 1920,
            viewport_height: 1080,
            wait_ms: 3000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_count: usize,
    /// Title similarity (0-100) above which an article counts as a duplicate.
    pub similarity_threshold: u8,
    /// Extracted text must be strictly longer than this many characters.
    pub min_content_len: usize,
    /// Each backend is asked for `remaining * over_request_factor` results.
    pub over_request_factor: usize,
    pub search_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub fetch_concurrency: usize,
    pub blocked_domains: Vec<String>,
    /// Appended to the keyword for engines that are not news-scoped.
    pub query_suffix: String,
    pub search_language: String,
    pub google_cookie: Option<Secret>,
    pub ai: AiConfig,
    pub render: RenderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_count: 10,
            similarity_threshold: 85,
            min_content_len: 200,
            over_request_factor: 2,
            search_timeout_secs: 10,
            fetch_timeout_secs: 15,
            fetch_concurrency: 4,
            blocked_domains: DEFAULT_BLOCKED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            query_suffix: "新闻".to_string(),
            search_language: "zh-CN".to_string(),
            google_cookie: None,
            ai: AiConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file, or start from defaults when no path is given.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_string(),
                    source,
                })?;
                Self::from_yaml(&raw).map_err(|source| ConfigError::Yaml {
                    path: path.to_string(),
                    source,
                })
            }
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Layer CLI flags and environment values over the file settings.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(n) = cli.max_links {
            self.target_count = n;
        }
        if let Some(key) = &cli.api_key {
            self.ai.api_key = Some(Secret::new(key.trim()));
        }
        if let Some(base) = &cli.api_base {
            self.ai.api_base = base.clone();
        }
        if let Some(model) = &cli.model {
            self.ai.model = model.clone();
        }
        if let Some(cookie) = &cli.google_cookie {
            self.google_cookie = Some(Secret::new(cookie.as_str()));
        }
        if cli.dynamic {
            self.render.enabled = true;
        }
        if let Some(url) = &cli.browserless_url {
            self.render.endpoint = Some(url.clone());
        }
        if let Some(token) = &cli.browserless_token {
            self.render.token = Some(Secret::new(token.as_str()));
        }
        self.normalize();
    }

    /// Clean up credentials pasted from a browser.
    fn normalize(&mut self) {
        self.google_cookie = self
            .google_cookie
            .take()
            .map(|c| Secret::new(c.expose().replace(['\n', '\r'], "").trim()))
            .filter(|c| !c.is_empty());
        self.ai.api_key = self.ai.api_key.take().filter(|k| !k.is_empty());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ai.api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.target_count == 0 {
            return Err(ConfigError::Invalid("target_count must be at least 1".into()));
        }
        if self.similarity_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold must be within 0..=100, got {}",
                self.similarity_threshold
            )));
        }
        if self.over_request_factor == 0 {
            return Err(ConfigError::Invalid("over_request_factor must be at least 1".into()));
        }
        if self.fetch_concurrency == 0 || self.ai.map_concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency limits must be at least 1".into()));
        }
        // A zero timeout would make every request fail immediately.
        for (name, secs) in [
            ("search_timeout_secs", self.search_timeout_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("ai.timeout_secs", self.ai.timeout_secs),
            ("render.timeout_secs", self.render.timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }
        if self.render.enabled && self.render.endpoint.is_none() {
            return Err(ConfigError::Invalid(
                "the rendering fallback needs a service URL (--browserless-url)".into(),
            ));
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
