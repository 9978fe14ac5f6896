//! Error types for every stage of the digest pipeline.
//!
//! Per-unit errors ([`SourceUnavailable`], [`FetchError`], [`AiError`]) are
//! absorbed by the stage that produced them. Only [`PipelineError`] ever
//! reaches the caller, and its `Display` is the diagnosis shown to the user.

use thiserror::Error;

/// One search backend could not contribute results.
#[derive(Debug, Error)]
pub enum SourceUnavailable {
    #[error("{engine}: no credential configured")]
    MissingCredential { engine: &'static str },

    #[error("{engine}: request failed: {source}")]
    Http {
        engine: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{engine}: returned status {status}")]
    Status { engine: &'static str, status: u16 },

    #[error("{engine}: cancelled")]
    Cancelled { engine: &'static str },
}

/// One article URL could not be turned into an [`crate::models::Article`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("domain is blocklisted")]
    Blocked,

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Http(reqwest::Error),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("extracted text too short ({len} chars)")]
    TooShort { len: usize },

    #[error("rendering service failed: {0}")]
    Render(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(err)
        }
    }
}

/// Failure talking to the chat-completion capability.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Http(reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("response contained no message content")]
    EmptyResponse,
}

impl AiError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Timeout => true,
            AiError::Http(e) => e.is_connect() || e.is_request(),
            AiError::Api { status, .. } => *status == 429 || *status >= 500,
            AiError::EmptyResponse => false,
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AiError::Timeout
        } else {
            AiError::Http(err)
        }
    }
}

/// Terminal outcome of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("keyword is empty")]
    EmptyKeyword,

    #[error("no news links found for '{keyword}'")]
    NoLinksFound { keyword: String },

    #[error("failed to fetch any of {attempted} articles")]
    NoArticlesFetched { attempted: usize },

    #[error("no articles left after removing duplicates")]
    NoArticlesAfterDedup,

    #[error("AI consolidation failed: {0}")]
    ConsolidationFailed(String),

    #[error("run cancelled during {stage}")]
    Cancelled { stage: &'static str },
}

/// Configuration could not be loaded or is unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("AI API key not found; set OPENAI_API_KEY or pass --api-key")]
    MissingApiKey,

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_messages_name_the_stage() {
        let e = PipelineError::NoLinksFound {
            keyword: "rates".to_string(),
        };
        assert_eq!(e.to_string(), "no news links found for 'rates'");
        assert_eq!(
            PipelineError::NoArticlesFetched { attempted: 5 }.to_string(),
            "failed to fetch any of 5 articles"
        );
        assert_eq!(
            PipelineError::Cancelled { stage: "fetch" }.to_string(),
            "run cancelled during fetch"
        );
    }

    #[test]
    fn test_ai_error_transience() {
        assert!(AiError::Timeout.is_transient());
        assert!(
            AiError::Api {
                status: 429,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            AiError::Api {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !AiError::Api {
                status: 401,
                message: "bad key".to_string()
            }
            .is_transient()
        );
        assert!(!AiError::EmptyResponse.is_transient());
    }
}
