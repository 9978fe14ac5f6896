//! Command-line interface definitions for News Digest.
//!
//! Every option can come from a flag; credentials can also come from the
//! environment so they never have to appear in shell history.

use clap::Parser;

/// Command-line arguments for one digest run.
///
/// ```sh
/// # Basic usage
/// news_digest "Fed rates" -j ./json -m ./markdown
///
/// # Google first, with a rendering fallback for JavaScript pages
/// GOOGLE_COOKIE=... news_digest "Fed rates" -j ./json -m ./markdown \
///     --dynamic --browserless-url http://localhost:3000
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Keyword or phrase to search news for
    pub keyword: String,

    /// Output directory for the JSON report
    #[arg(short, long, default_value = "reports")]
    pub json_output_dir: String,

    /// Output directory for the Markdown report
    #[arg(short, long, default_value = "reports")]
    pub markdown_output_dir: String,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Number of article links to collect across all search engines
    #[arg(short = 'n', long)]
    pub max_links: Option<usize>,

    /// API key for the OpenAI-compatible chat endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible chat endpoint
    #[arg(long, env = "AI_API_BASE")]
    pub api_base: Option<String>,

    /// Chat model identifier
    #[arg(long, env = "AI_MODEL")]
    pub model: Option<String>,

    /// Session cookie enabling the Google backend
    #[arg(long, env = "GOOGLE_COOKIE", hide_env_values = true)]
    pub google_cookie: Option<String>,

    /// Retry failed pages through a headless browser service
    #[arg(long)]
    pub dynamic: bool,

    /// Base URL of a Browserless-compatible rendering service
    #[arg(long, env = "BROWSERLESS_URL")]
    pub browserless_url: Option<String>,

    /// Token for the rendering service
    #[arg(long, env = "BROWSERLESS_TOKEN", hide_env_values = true)]
    pub browserless_token: Option<String>,
}
