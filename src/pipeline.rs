//! Stage sequencing: search → fetch → dedup → summarize.
//!
//! Any stage that comes up empty ends the run with its own diagnosis, so
//! the AI capability is only ever called with at least one article.

use crate::aggregator::FallbackAggregator;
use crate::api::{AskAsync, ChatClient, RetryAsk};
use crate::blocklist::DomainBlocklist;
use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::error::{ConfigError, PipelineError};
use crate::fetcher::browserless::BrowserlessPageSource;
use crate::fetcher::http::HttpPageSource;
use crate::fetcher::{ArticleFetcher, PageSource};
use crate::models::Report;
use crate::reducer::SummaryReducer;
use crate::scrapers::{SearchBackend, SourceQuery};
use chrono::Local;
use tracing::{debug, info, instrument, warn};

/// Per-stage counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub links: usize,
    pub unavailable_engines: usize,
    pub fetched: usize,
    pub fetch_failures: usize,
    pub unique: usize,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    pub stats: RunStats,
}

pub struct Pipeline<Q, P, S, A> {
    aggregator: FallbackAggregator<Q>,
    fetcher: ArticleFetcher<P, S>,
    dedup: Deduplicator,
    reducer: SummaryReducer<A>,
    target_count: usize,
}

/// The pipeline wired to real engines, HTTP and the chat API.
pub type LivePipeline =
    Pipeline<SearchBackend, HttpPageSource, BrowserlessPageSource, RetryAsk<ChatClient>>;

impl LivePipeline {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let blocklist = DomainBlocklist::new(&config.blocked_domains);

        let aggregator = FallbackAggregator::new(
            SearchBackend::all(config)?,
            blocklist.clone(),
            config.over_request_factor,
        );

        let primary = HttpPageSource::new(config.fetch_timeout(), config.min_content_len)?;
        let secondary = match (config.render.enabled, &config.render.endpoint) {
            (true, Some(endpoint)) => Some(BrowserlessPageSource::new(
                endpoint,
                &config.render,
                config.min_content_len,
            )?),
            _ => None,
        };
        let fetcher = ArticleFetcher::new(
            primary,
            secondary,
            blocklist,
            config.min_content_len,
            config.fetch_concurrency,
        );

        let reducer = SummaryReducer::new(ChatClient::from_config(&config.ai)?, &config.ai);

        Ok(Pipeline::new(
            aggregator,
            fetcher,
            Deduplicator::new(config.similarity_threshold),
            reducer,
            config.target_count,
        ))
    }
}

impl<Q, P, S, A> Pipeline<Q, P, S, A>
where
    Q: SourceQuery,
    P: PageSource,
    S: PageSource,
    A: AskAsync,
{
    pub fn new(
        aggregator: FallbackAggregator<Q>,
        fetcher: ArticleFetcher<P, S>,
        dedup: Deduplicator,
        reducer: SummaryReducer<A>,
        target_count: usize,
    ) -> Self {
        Self {
            aggregator,
            fetcher,
            dedup,
            reducer,
            target_count,
        }
    }

    #[instrument(level = "info", skip(self, cancel))]
    pub async fn run(
        &mut self,
        keyword: &str,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, PipelineError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(PipelineError::EmptyKeyword);
        }
        let mut stats = RunStats::default();

        // 1. Search
        checkpoint(cancel, "search")?;
        info!(target = self.target_count, "Searching news");
        let aggregation = self.aggregator.aggregate(keyword, self.target_count, cancel).await;
        stats.unavailable_engines = aggregation.unavailable_count();
        debug!(sources = ?aggregation.sources, "Per-engine search results");
        checkpoint(cancel, "search")?;
        let links = aggregation.links.into_vec();
        stats.links = links.len();
        if links.is_empty() {
            return Err(PipelineError::NoLinksFound {
                keyword: keyword.to_string(),
            });
        }
        info!(count = links.len(), "Found links");

        // 2. Fetch
        let crawl = self.fetcher.fetch_all(&links, cancel).await;
        checkpoint(cancel, "fetch")?;
        stats.fetched = crawl.articles.len();
        stats.fetch_failures = crawl.failures.len();
        if crawl.articles.is_empty() {
            return Err(PipelineError::NoArticlesFetched {
                attempted: links.len(),
            });
        }
        info!(count = crawl.articles.len(), "Fetched articles");

        // 3. Dedup
        let unique = self.dedup.dedup(crawl.articles);
        stats.unique = unique.len();
        if unique.is_empty() {
            return Err(PipelineError::NoArticlesAfterDedup);
        }
        checkpoint(cancel, "dedup")?;

        // 4. Summarize
        let report = match self.reducer.run(keyword, &unique, Local::now(), cancel).await {
            Ok(report) => report,
            Err(e) => {
                debug!(state = ?self.reducer.state(), "Summarization stopped");
                return Err(e);
            }
        };
        info!(
            links = stats.links,
            fetched = stats.fetched,
            unique = stats.unique,
            "Analysis complete"
        );
        Ok(RunOutcome { report, stats })
    }
}

fn checkpoint(cancel: &CancelToken, stage: &'static str) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        warn!(stage, "Cancellation requested");
        return Err(PipelineError::Cancelled { stage });
    }
    Ok(())
}
