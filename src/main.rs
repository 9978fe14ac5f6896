//! # News Digest
//!
//! Searches several engines for news on one keyword, fetches the articles,
//! drops near-duplicate stories and consolidates the rest into a single
//! structured report through an OpenAI-compatible chat API.
//!
//! ## Usage
//!
//! ```sh
//! OPENAI_API_KEY=... news_digest "Federal Reserve" -j ./json -m ./markdown
//! ```
//!
//! ## Architecture
//!
//! 1. **Search**: query Google, Baidu and Bing in priority order until enough links are found
//! 2. **Fetching**: download and extract every link concurrently, optionally via a rendering service
//! 3. **Dedup**: drop articles whose titles are near-duplicates of an earlier one
//! 4. **Summarize**: map each article to a digest, then reduce all digests into one report
//! 5. **Output**: write JSON and Markdown reports
//!
//! Any stage that ends up empty stops the run with a diagnosis.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregator;
mod api;
mod blocklist;
mod cancel;
mod cli;
mod config;
mod dedup;
mod error;
mod fetcher;
mod models;
mod outputs;
mod pipeline;
mod reducer;
mod scrapers;
mod utils;

use cancel::CancelToken;
use cli::Cli;
use config::PipelineConfig;
use outputs::{json, markdown};
use pipeline::LivePipeline;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_digest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(
        keyword = %args.keyword,
        ?args.json_output_dir,
        ?args.markdown_output_dir,
        ?args.config,
        "Parsed CLI arguments"
    );

    // ---- Load config ----
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    config.apply_cli(&args);
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }
    info!(
        target_count = config.target_count,
        model = %config.ai.model,
        google = config.google_cookie.is_some(),
        rendering = config.render.enabled,
        "Loaded configuration"
    );

    // Early check: ensure output dirs are writable before spending any AI calls
    for dir in [&args.json_output_dir, &args.markdown_output_dir] {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
    }

    // ---- Cancellation ----
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping after in-flight work");
                cancel.cancel();
            }
        });
    }

    // ---- Run pipeline ----
    let mut pipeline = LivePipeline::from_config(&config)?;
    let outcome = match pipeline.run(&args.keyword, &cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, elapsed = ?start_time.elapsed(), "Run failed");
            return Err(e.into());
        }
    };

    // ---- Outputs ----
    let generated_at = Local::now();
    if let Err(e) =
        json::write_report(&args.keyword, &outcome.report, &args.json_output_dir, generated_at).await
    {
        error!(error = %e, "Failed to write JSON report");
    }
    if let Err(e) = markdown::write_report(
        &args.keyword,
        &outcome.report,
        &args.markdown_output_dir,
        generated_at,
    )
    .await
    {
        error!(error = %e, "Failed to write Markdown report");
    }

    let stats = &outcome.stats;
    let elapsed = start_time.elapsed();
    info!(
        links = stats.links,
        unavailable_engines = stats.unavailable_engines,
        fetched = stats.fetched,
        fetch_failures = stats.fetch_failures,
        unique = stats.unique,
        entities = outcome.report.key_entities.len(),
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
