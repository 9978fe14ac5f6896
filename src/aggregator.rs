//! Priority-ordered fallback across search backends.
//!
//! Backends are asked one at a time, highest priority first, only for what
//! is still missing. The first backend that fills the quota ends the loop,
//! so lower-priority engines are never contacted needlessly.

use crate::blocklist::DomainBlocklist;
use crate::cancel::CancelToken;
use crate::error::SourceUnavailable;
use crate::models::LinkSet;
use crate::scrapers::SourceQuery;
use crate::utils::truncate_for_log;
use tracing::{debug, info, instrument, warn};

/// What one backend did during an aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// The quota was met before this backend's turn.
    NotQueried,
    Unavailable(String),
    Contributed {
        returned: usize,
        added: usize,
        blocked: usize,
        duplicates: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub engine: &'static str,
    pub status: SourceStatus,
}

/// Merged links plus a per-backend account of how they were gathered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub links: LinkSet,
    pub sources: Vec<SourceReport>,
}

impl Aggregation {
    pub fn unavailable_count(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.status, SourceStatus::Unavailable(_)))
            .count()
    }
}

pub struct FallbackAggregator<Q> {
    backends: Vec<Q>,
    blocklist: DomainBlocklist,
    over_request_factor: usize,
}

impl<Q: SourceQuery> FallbackAggregator<Q> {
    /// `backends` must already be in priority order.
    pub fn new(backends: Vec<Q>, blocklist: DomainBlocklist, over_request_factor: usize) -> Self {
        Self {
            backends,
            blocklist,
            over_request_factor: over_request_factor.max(1),
        }
    }

    /// Collect up to `target_count` unique, non-blocklisted URLs.
    ///
    /// Backends are asked in order, each only for the shortfall scaled by the
    /// over-request factor. The loop stops as soon as the target is met or
    /// `cancel` fires.
    ///
    /// # Arguments
    ///
    /// * `keyword` - The search term
    /// * `target_count` - How many links to collect at most
    /// * `cancel` - Checked before each backend is queried
    ///
    /// # Returns
    ///
    /// The links in discovery order plus one [`SourceReport`] per backend
    /// that was tried.
    ///
    /// # Errors
    ///
    /// None. A failing backend is recorded as unavailable and skipped, and
    /// falling short after every backend has been tried yields the partial set.
    #[instrument(level = "info", skip(self, cancel))]
    pub async fn aggregate(
        &self,
        keyword: &str,
        target_count: usize,
        cancel: &CancelToken,
    ) -> Aggregation {
        let mut links = LinkSet::with_capacity(target_count);
        let mut sources = Vec::with_capacity(self.backends.len());

        for (rank, backend) in self.backends.iter().enumerate() {
            let engine = backend.name();
            if links.is_full() || cancel.is_cancelled() {
                sources.push(SourceReport {
                    engine,
                    status: SourceStatus::NotQueried,
                });
                continue;
            }

            let wanted = links.remaining();
            let request = wanted * self.over_request_factor;
            info!(
                engine,
                priority = rank + 1,
                wanted,
                request,
                "Querying search engine"
            );

            let status = match backend.query(keyword, request).await {
                Ok(urls) => self.merge(engine, urls, &mut links),
                Err(e) => {
                    if matches!(e, SourceUnavailable::MissingCredential { .. }) {
                        debug!(engine, "Skipping engine without credential");
                    } else {
                        warn!(engine, error = %e, "Search engine unavailable");
                    }
                    SourceStatus::Unavailable(e.to_string())
                }
            };
            sources.push(SourceReport { engine, status });
            info!(engine, total = links.len(), target = target_count, "Link pool updated");
        }

        if links.is_empty() {
            warn!("No search engine produced usable links");
        } else if !links.is_full() {
            info!(
                found = links.len(),
                target = target_count,
                "All engines exhausted below target"
            );
        }

        Aggregation { links, sources }
    }

    fn merge(&self, engine: &'static str, urls: Vec<String>, links: &mut LinkSet) -> SourceStatus {
        let returned = urls.len();
        let (mut added, mut blocked, mut duplicates) = (0, 0, 0);

        for url in urls {
            if links.is_full() {
                break;
            }
            if self.blocklist.is_blocked(&url) {
                debug!(engine, url = %truncate_for_log(&url, 80), "Dropping blocklisted link");
                blocked += 1;
            } else if links.insert(&url) {
                added += 1;
            } else {
                duplicates += 1;
            }
        }

        SourceStatus::Contributed {
            returned,
            added,
            blocked,
            duplicates,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::SearchResult;
    use std::sync::Mutex;

    /// Scripted backend recording every request it receives.
    pub(crate) struct FakeEngine {
        pub name: &'static str,
        pub result: Result<Vec<&'static str>, &'static str>,
        pub calls: Mutex<Vec<usize>>,
    }

    impl FakeEngine {
        pub fn ok(name: &'static str, urls: Vec<&'static str>) -> Self {
            Self {
                name,
                result: Ok(urls),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn down(name: &'static str) -> Self {
            Self {
                name,
                result: Err("down"),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl SourceQuery for FakeEngine {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn query(
            &self,
            _keyword: &str,
            max_results: usize,
        ) -> Result<SearchResult, SourceUnavailable> {
            self.calls.lock().unwrap().push(max_results);
            match &self.result {
                Ok(urls) => Ok(urls.iter().take(max_results).map(|u| u.to_string()).collect()),
                Err(_) => Err(SourceUnavailable::Status {
                    engine: self.name,
                    status: 503,
                }),
            }
        }
    }

    impl SourceQuery for &FakeEngine {
        fn name(&self) -> &'static str {
            (*self).name()
        }

        async fn query(
            &self,
            keyword: &str,
            max_results: usize,
        ) -> Result<SearchResult, SourceUnavailable> {
            (*self).query(keyword, max_results).await
        }
    }

    fn aggregator<'a>(engines: Vec<&'a FakeEngine>) -> FallbackAggregator<&'a FakeEngine> {
        FallbackAggregator::new(engines, DomainBlocklist::default(), 2)
    }

    #[tokio::test]
    async fn test_first_backend_satisfies_target_and_second_is_never_called() {
        let a = FakeEngine::ok("a", vec!["https://a.example/1", "https://a.example/2"]);
        let b = FakeEngine::ok("b", vec!["https://b.example/1"]);
        let result = aggregator(vec![&a, &b])
            .aggregate("fed", 2, &CancelToken::new())
            .await;

        assert_eq!(result.links.len(), 2);
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 0);
        assert_eq!(result.sources[1].status, SourceStatus::NotQueried);
    }

    #[tokio::test]
    async fn test_fallback_merges_in_priority_order_without_duplicates() {
        let a = FakeEngine::ok("a", vec!["https://x.example/1", "https://x.example/2"]);
        let b = FakeEngine::ok(
            "b",
            vec!["https://x.example/2", "https://y.example/3", "https://y.example/4"],
        );
        let result = aggregator(vec![&a, &b])
            .aggregate("fed", 4, &CancelToken::new())
            .await;

        assert_eq!(
            result.links.as_slice(),
            &[
                "https://x.example/1".to_string(),
                "https://x.example/2".to_string(),
                "https://y.example/3".to_string(),
                "https://y.example/4".to_string(),
            ]
        );
        // The second engine is asked for twice what was still missing.
        assert_eq!(*a.calls.lock().unwrap(), vec![8]);
        assert_eq!(*b.calls.lock().unwrap(), vec![4]);
        assert_eq!(
            result.sources[1].status,
            SourceStatus::Contributed {
                returned: 3,
                added: 2,
                blocked: 0,
                duplicates: 1
            }
        );
    }

    #[tokio::test]
    async fn test_blocklisted_links_are_filtered() {
        let a = FakeEngine::ok(
            "a",
            vec![
                "https://www.zhihu.com/question/1",
                "https://news.example/1",
                "https://www.youtube.com/watch?v=2",
            ],
        );
        let result = aggregator(vec![&a])
            .aggregate("fed", 5, &CancelToken::new())
            .await;

        assert_eq!(result.links.as_slice(), &["https://news.example/1".to_string()]);
        assert!(matches!(
            result.sources[0].status,
            SourceStatus::Contributed { blocked: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_failing_backend_is_skipped() {
        let a = FakeEngine::down("a");
        let b = FakeEngine::ok("b", vec!["https://b.example/1"]);
        let result = aggregator(vec![&a, &b])
            .aggregate("fed", 3, &CancelToken::new())
            .await;

        assert_eq!(result.links.as_slice(), &["https://b.example/1".to_string()]);
        assert_eq!(result.unavailable_count(), 1);
        assert_eq!(b.call_count(), 1);
    }

    #[tokio::test]
    async fn test_all_backends_down_yields_empty_set() {
        let a = FakeEngine::down("a");
        let b = FakeEngine::down("b");
        let result = aggregator(vec![&a, &b])
            .aggregate("fed", 3, &CancelToken::new())
            .await;

        assert!(result.links.is_empty());
        assert_eq!(result.unavailable_count(), 2);
    }

    #[tokio::test]
    async fn test_never_exceeds_target_or_repeats_a_url() {
        let many: Vec<&'static str> = vec![
            "https://a.example/1",
            "https://a.example/1",
            "https://a.example/2",
            "https://a.example/3",
            "https://a.example/4",
        ];
        for target in 1..=6 {
            let a = FakeEngine::ok("a", many.clone());
            let b = FakeEngine::ok("b", many.clone());
            let result = aggregator(vec![&a, &b])
                .aggregate("fed", target, &CancelToken::new())
                .await;
            let urls = result.links.as_slice();
            assert!(urls.len() <= target);
            let unique: std::collections::HashSet<_> = urls.iter().collect();
            assert_eq!(unique.len(), urls.len());
        }
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_querying() {
        let a = FakeEngine::ok("a", vec!["https://a.example/1"]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = aggregator(vec![&a]).aggregate("fed", 3, &cancel).await;

        assert!(result.links.is_empty());
        assert_eq!(a.call_count(), 0);
    }
}
