//! Article retrieval with per-URL failure isolation.
//!
//! [`ArticleFetcher`] runs every URL through a primary [`PageSource`]
//! concurrently, keeps pages whose text clears the content threshold, and
//! optionally retries the failures through a slower secondary source.
//! A failing URL only ever costs that URL.

pub mod browserless;
pub mod extract;
pub mod http;

use crate::blocklist::DomainBlocklist;
use crate::cancel::CancelToken;
use crate::error::FetchError;
use crate::models::{Article, ExtractedPage};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

/// Something that can turn a URL into a title and body.
pub trait PageSource {
    fn name(&self) -> &'static str;

    async fn retrieve(&self, url: &str) -> Result<ExtractedPage, FetchError>;
}

/// A URL that did not yield an article, and why.
#[derive(Debug)]
pub struct FetchFailure {
    pub url: String,
    pub error: FetchError,
}

/// Result of a batch fetch. Articles keep input order; rendering-path
/// recoveries are appended after the primary successes.
#[derive(Debug, Default)]
pub struct Crawl {
    pub articles: Vec<Article>,
    pub failures: Vec<FetchFailure>,
}

pub struct ArticleFetcher<P, S> {
    primary: P,
    secondary: Option<S>,
    blocklist: DomainBlocklist,
    min_content_len: usize,
    concurrency: usize,
}

impl<P: PageSource, S: PageSource> ArticleFetcher<P, S> {
    pub fn new(
        primary: P,
        secondary: Option<S>,
        blocklist: DomainBlocklist,
        min_content_len: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            primary,
            secondary,
            blocklist,
            min_content_len,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch one URL through the primary source.
    ///
    /// Blocklisted URLs are rejected without any network traffic.
    pub async fn fetch(&self, url: &str) -> Result<Article, FetchError> {
        if self.blocklist.is_blocked(url) {
            return Err(FetchError::Blocked);
        }
        self.fetch_via(&self.primary, url).await
    }

    async fn fetch_via<T: PageSource>(&self, source: &T, url: &str) -> Result<Article, FetchError> {
        let page = source.retrieve(url).await?;
        self.accept(url, page)
    }

    /// Apply the minimum-content rule and build the article.
    fn accept(&self, url: &str, page: ExtractedPage) -> Result<Article, FetchError> {
        let len = page.text.chars().count();
        if len <= self.min_content_len {
            return Err(FetchError::TooShort { len });
        }
        Ok(Article {
            url: url.to_string(),
            title: page.title.trim().to_string(),
            text: page.text,
        })
    }

    /// Fetch every URL, dropping the ones that fail.
    ///
    /// Pages are fetched through the primary source with bounded
    /// concurrency. Transport, status and too-short failures then get one
    /// more attempt through the secondary source when one is configured.
    ///
    /// # Arguments
    ///
    /// * `urls` - The links to fetch, in report order
    /// * `cancel` - Pages not yet started when it fires are skipped
    ///
    /// # Returns
    ///
    /// A [`Crawl`] with the articles in input order for the primary pass,
    /// recovered pages appended after them, and one failure per dropped URL.
    ///
    /// # Errors
    ///
    /// None. Individual failures are logged and collected in
    /// [`Crawl::failures`].
    #[instrument(level = "info", skip_all, fields(urls = urls.len()))]
    pub async fn fetch_all(&self, urls: &[String], cancel: &CancelToken) -> Crawl {
        let outcomes: Vec<(String, Result<Article, FetchError>)> = stream::iter(urls)
            .map(|url| async move {
                if cancel.is_cancelled() {
                    return (url.clone(), Err(FetchError::Cancelled));
                }
                let outcome = self.fetch(url).await;
                log_outcome(self.primary.name(), url, &outcome);
                (url.clone(), outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut crawl = Crawl::default();
        let mut retry = Vec::new();
        for (url, outcome) in outcomes {
            match outcome {
                Ok(article) => crawl.articles.push(article),
                Err(e @ (FetchError::Blocked | FetchError::Cancelled)) => {
                    crawl.failures.push(FetchFailure { url, error: e })
                }
                Err(e) => retry.push(FetchFailure { url, error: e }),
            }
        }

        match &self.secondary {
            Some(secondary) if !retry.is_empty() && !cancel.is_cancelled() => {
                info!(
                    count = retry.len(),
                    source = secondary.name(),
                    "Retrying failed pages through rendering fallback"
                );
                let recovered = self.recover(secondary, retry, cancel).await;
                for (failure, outcome) in recovered {
                    match outcome {
                        Ok(article) => crawl.articles.push(article),
                        Err(e) => crawl.failures.push(FetchFailure {
                            url: failure.url,
                            error: e,
                        }),
                    }
                }
            }
            _ => crawl.failures.extend(retry),
        }

        info!(
            fetched = crawl.articles.len(),
            failed = crawl.failures.len(),
            "Article fetch complete"
        );
        crawl
    }

    async fn recover(
        &self,
        secondary: &S,
        failures: Vec<FetchFailure>,
        cancel: &CancelToken,
    ) -> Vec<(FetchFailure, Result<Article, FetchError>)> {
        stream::iter(failures)
            .map(|failure| async move {
                if cancel.is_cancelled() {
                    return (failure, Err(FetchError::Cancelled));
                }
                let outcome = self.fetch_via(secondary, &failure.url).await;
                log_outcome(secondary.name(), &failure.url, &outcome);
                (failure, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

fn log_outcome(source: &'static str, url: &str, outcome: &Result<Article, FetchError>) {
    match outcome {
        Ok(article) => debug!(
            source,
            %url,
            title = %crate::utils::truncate_for_log(article.display_title(), 50),
            chars = article.text.chars().count(),
            "Fetched article"
        ),
        Err(FetchError::Blocked) => debug!(source, %url, "Skipping blocklisted domain"),
        Err(e) => warn!(source, %url, error = %e, "Article fetch failed"),
    }
}
