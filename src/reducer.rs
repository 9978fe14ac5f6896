//! Two-phase map-reduce summarization.
//!
//! **Map**: each article body (clipped to a character budget) is digested
//! independently at temperature 0. A failed call degrades that one article
//! to a placeholder digest; it still reaches the reduce prompt by URL.
//!
//! **Reduce**: every digest, tagged with its source URL, goes into a single
//! consolidation call that must return a JSON object. A failed call or an
//! unparseable answer fails the whole stage; nothing is retried here.
//!
//! ```text
//! Idle -> Mapping -> Reducing -> Done
//!                        \-----> Failed
//! ```

use crate::api::{AskAsync, ChatRequest};
use crate::cancel::CancelToken;
use crate::config::AiConfig;
use crate::error::PipelineError;
use crate::models::{Article, Consolidation, Report, Summary};
use crate::utils::{looks_truncated, strip_code_fence, truncate_chars, truncate_for_log};
use chrono::{DateTime, Local};
use futures::stream::{self, StreamExt};
use tracing::{error, info, instrument, warn};

pub const MAP_FAILURE_PLACEHOLDER: &str = "Summary generation failed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerState {
    Idle,
    Mapping,
    Reducing,
    Done,
    Failed,
}

pub struct SummaryReducer<A> {
    ai: A,
    model: String,
    map_temperature: f32,
    reduce_temperature: f32,
    max_article_chars: usize,
    concurrency: usize,
    state: ReducerState,
}

impl<A: AskAsync> SummaryReducer<A> {
    pub fn new(ai: A, config: &AiConfig) -> Self {
        Self {
            ai,
            model: config.model.clone(),
            map_temperature: config.map_temperature,
            reduce_temperature: config.reduce_temperature,
            max_article_chars: config.max_article_chars,
            concurrency: config.map_concurrency.max(1),
            state: ReducerState::Idle,
        }
    }

    pub fn state(&self) -> ReducerState {
        self.state
    }

    /// Summarize, consolidate, and attach `sources` in article order.
    ///
    /// `now` anchors the prompt's "no dates after today" rule.
    #[instrument(level = "info", skip_all, fields(%keyword, articles = articles.len()))]
    pub async fn run(
        &mut self,
        keyword: &str,
        articles: &[Article],
        now: DateTime<Local>,
        cancel: &CancelToken,
    ) -> Result<Report, PipelineError> {
        self.state = ReducerState::Mapping;
        let summaries = self.map(articles, cancel).await;
        if cancel.is_cancelled() {
            self.state = ReducerState::Failed;
            return Err(PipelineError::Cancelled { stage: "summarize" });
        }

        self.state = ReducerState::Reducing;
        match self.reduce(keyword, &summaries, now).await {
            Ok(consolidation) => {
                let sources = articles.iter().map(|a| a.url.clone()).collect();
                self.state = ReducerState::Done;
                Ok(Report::from_consolidation(consolidation, sources))
            }
            Err(e) => {
                self.state = ReducerState::Failed;
                error!(error = %e, "Consolidation failed");
                Err(e)
            }
        }
    }

    /// Map phase; one [`Summary`] per article, same order.
    pub async fn map(&self, articles: &[Article], cancel: &CancelToken) -> Vec<Summary> {
        info!(
            count = articles.len(),
            concurrency = self.concurrency,
            "Map phase: summarizing articles"
        );
        let summaries: Vec<Summary> = stream::iter(articles.iter().enumerate())
            .map(|(i, article)| async move {
                if cancel.is_cancelled() {
                    return degraded(article);
                }
                info!(
                    index = i + 1,
                    total = articles.len(),
                    title = %truncate_for_log(article.display_title(), 40),
                    "Summarizing article"
                );
                self.summarize(article).await
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = summaries.iter().filter(|s| s.degraded).count();
        if failed > 0 {
            warn!(failed, total = summaries.len(), "Some article summaries degraded");
        }
        summaries
    }

    async fn summarize(&self, article: &Article) -> Summary {
        let prompt = map_prompt(truncate_chars(&article.text, self.max_article_chars));
        let request = ChatRequest::text(&self.model, prompt, self.map_temperature);
        match self.ai.ask(&request).await {
            Ok(text) => Summary {
                url: article.url.clone(),
                text,
                degraded: false,
            },
            Err(e) => {
                warn!(url = %article.url, error = %e, "Article summary failed; using placeholder");
                degraded(article)
            }
        }
    }

    async fn reduce(
        &self,
        keyword: &str,
        summaries: &[Summary],
        now: DateTime<Local>,
    ) -> Result<Consolidation, PipelineError> {
        info!(count = summaries.len(), "Reduce phase: consolidating summaries");
        let prompt = reduce_prompt(keyword, &reduce_context(summaries), now);
        // A failed consolidation ends the run; it is never retried.
        let request =
            ChatRequest::json(&self.model, prompt, self.reduce_temperature).without_retry();

        let raw = self
            .ai
            .ask(&request)
            .await
            .map_err(|e| PipelineError::ConsolidationFailed(e.to_string()))?;

        serde_json::from_str::<Consolidation>(strip_code_fence(&raw)).map_err(|e| {
            warn!(
                error = %e,
                response_preview = %truncate_for_log(&raw, 300),
                "Model returned non-conforming JSON"
            );
            let reason = if looks_truncated(&e) {
                format!("response was truncated: {e}")
            } else {
                format!("response was not valid report JSON: {e}")
            };
            PipelineError::ConsolidationFailed(reason)
        })
    }
}

fn degraded(article: &Article) -> Summary {
    Summary {
        url: article.url.clone(),
        text: MAP_FAILURE_PLACEHOLDER.to_string(),
        degraded: true,
    }
}

fn map_prompt(text: &str) -> String {
    format!(
        "Write a very concise summary (about 100 words) of the following news text, \
followed by exactly 3 key points. Answer in the language of the text.\n\n\
Text:\n{text}\n\n\
Output format:\n\
Summary: <summary>\n\
Key points:\n\
- <key point 1>\n\
- <key point 2>\n\
- <key point 3>"
    )
}

/// Digests tagged with their source URL, separated by `---` lines.
fn reduce_context(summaries: &[Summary]) -> String {
    summaries
        .iter()
        .enumerate()
        .map(|(i, s)| format!("Summary {} (source: {}):\n{}\n", i + 1, s.url, s.text))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn reduce_prompt(keyword: &str, context: &str, now: DateTime<Local>) -> String {
    let month = now.format("%B %Y");
    let today = now.format("%Y-%m-%d");
    format!(
        "Based on the following summaries about \"{keyword}\", extract four kinds of information. \
You must answer with a single JSON object and no Markdown.\n\n\
Fields:\n\
1. main_summary: string, 150-200 words synthesizing all of the information;\n\
2. key_sub_themes: list of strings, e.g. [\"technical impact\", \"market reaction\", \"ethics debate\"];\n\
3. key_entities: list of strings, at least 5 (people, companies, places);\n\
4. timeline: list of objects with date (YYYY-MM-DD, or YYYY-MM when the day is unknown), \
event (description) and source (URL of the article that mentions it).\n\n\
Important:\n\
- Timeline dates must come from real times mentioned in the summaries; never invent dates.\n\
- If a summary gives no explicit date, infer an approximate one from context only.\n\
- The current time is {month}. Do not produce any date after {today}.\n\
- The source field must be the URL of the summary the event came from.\n\
- Write in the language of the summaries.\n\n\
Summaries:\n{context}"
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::RetryAsk;
    use crate::error::AiError;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    pub(crate) const GOOD_REPORT: &str = r#"{
        "main_summary": "The Fed raised rates again.",
        "key_sub_themes": ["Monetary policy", "Markets"],
        "key_entities": ["Federal Reserve", "Jerome Powell", "Wall Street", "ECB", "Treasury"],
        "timeline": [{"date": "2026-09-17", "event": "Rate decision", "source": "https://a.example/1"}]
    }"#;

    /// Answers map prompts with a digest (or an error for URLs listed in
    /// `fail_on`), and the JSON prompt with `reduce_answer`.
    struct ScriptedAi {
        fail_on: Vec<&'static str>,
        reduce_answer: Result<&'static str, ()>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedAi {
        fn new(reduce_answer: Result<&'static str, ()>) -> Self {
            Self {
                fail_on: Vec::new(),
                reduce_answer,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, marker: &'static str) -> Self {
            self.fail_on.push(marker);
            self
        }

        fn reduce_request(&self) -> Option<ChatRequest> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.response_format.is_some())
                .cloned()
        }
    }

    impl AskAsync for ScriptedAi {
        async fn ask(&self, request: &ChatRequest) -> Result<String, AiError> {
            self.requests.lock().unwrap().push(request.clone());
            if request.response_format.is_some() {
                return self
                    .reduce_answer
                    .map(str::to_string)
                    .map_err(|_| AiError::Api {
                        status: 500,
                        message: "overloaded".to_string(),
                    });
            }
            if self.fail_on.iter().any(|m| request.prompt().contains(m)) {
                return Err(AiError::Timeout);
            }
            Ok("Summary: digest\nKey points:\n- a\n- b\n- c".to_string())
        }
    }

    fn article(n: usize, body: &str) -> Article {
        Article {
            url: format!("https://a.example/{n}"),
            title: format!("Title {n}"),
            text: format!("{body} {}", "filler ".repeat(40)),
        }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
    }

    fn reducer(ai: ScriptedAi) -> SummaryReducer<ScriptedAi> {
        SummaryReducer::new(ai, &AiConfig::default())
    }

    #[tokio::test]
    async fn test_sources_match_input_order() {
        let articles = vec![article(3, "c"), article(1, "a"), article(2, "b")];
        let mut r = reducer(ScriptedAi::new(Ok(GOOD_REPORT)));
        let report = r.run("fed", &articles, now(), &CancelToken::new()).await.unwrap();

        assert_eq!(
            report.sources,
            vec![
                "https://a.example/3".to_string(),
                "https://a.example/1".to_string(),
                "https://a.example/2".to_string()
            ]
        );
        assert_eq!(r.state(), ReducerState::Done);
    }

    #[tokio::test]
    async fn test_map_failure_becomes_placeholder_in_reduce_input() {
        let articles = vec![article(1, "alpha"), article(2, "BROKEN"), article(3, "gamma")];
        let ai = ScriptedAi::new(Ok(GOOD_REPORT)).failing_on("BROKEN");
        let mut r = reducer(ai);
        let report = r.run("fed", &articles, now(), &CancelToken::new()).await.unwrap();

        assert_eq!(report.key_entities.len(), 5);
        assert_eq!(report.sources.len(), 3);
        let reduce = r.ai.reduce_request().unwrap();
        assert!(reduce.prompt().contains(&format!(
            "Summary 2 (source: https://a.example/2):\n{MAP_FAILURE_PLACEHOLDER}"
        )));
        assert!(reduce.prompt().contains("Summary 1 (source: https://a.example/1)"));
    }

    #[tokio::test]
    async fn test_map_calls_are_deterministic_and_clipped() {
        let long = "y".repeat(10_000);
        let articles = vec![article(1, &long)];
        let mut r = reducer(ScriptedAi::new(Ok(GOOD_REPORT)));
        r.run("fed", &articles, now(), &CancelToken::new()).await.unwrap();

        let requests = r.ai.requests.lock().unwrap();
        let map = requests.iter().find(|q| q.response_format.is_none()).unwrap();
        assert_eq!(map.temperature, 0.0);
        assert!(map.prompt().contains(&"y".repeat(4000)));
        assert!(!map.prompt().contains(&"y".repeat(4001)));
        let reduce = requests.iter().find(|q| q.response_format.is_some()).unwrap();
        assert_eq!(reduce.temperature, 0.3);
    }

    #[tokio::test]
    async fn test_reduce_prompt_uses_runtime_date_anchor() {
        let mut r = reducer(ScriptedAi::new(Ok(GOOD_REPORT)));
        r.run("fed", &[article(1, "a")], now(), &CancelToken::new())
            .await
            .unwrap();
        let prompt = r.ai.reduce_request().unwrap().prompt().to_string();
        assert!(prompt.contains("October 2026"));
        assert!(prompt.contains("after 2026-10-16"));
        assert!(prompt.contains("\"fed\""));
    }

    #[tokio::test]
    async fn test_malformed_json_fails_the_stage() {
        let mut r = reducer(ScriptedAi::new(Ok("not json at all")));
        let err = r
            .run("fed", &[article(1, "a")], now(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ConsolidationFailed(_)));
        assert_eq!(r.state(), ReducerState::Failed);
    }

    #[tokio::test]
    async fn test_truncated_json_is_reported_as_such() {
        let mut r = reducer(ScriptedAi::new(Ok(r#"{"main_summary": "cut of"#)));
        let err = r
            .run("fed", &[article(1, "a")], now(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[tokio::test]
    async fn test_reduce_call_error_surfaces_verbatim() {
        let mut r = reducer(ScriptedAi::new(Err(())));
        let err = r
            .run("fed", &[article(1, "a")], now(), &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "AI consolidation failed: API error (status 500): overloaded"
        );
        // One map call, one reduce call: no automatic retry.
        assert_eq!(r.ai.requests.lock().unwrap().len(), 2);
    }

    /// Times out on every JSON-mode call, counting them.
    #[derive(Default)]
    struct StalledReduce {
        reduce_calls: Mutex<usize>,
    }

    impl AskAsync for &StalledReduce {
        async fn ask(&self, request: &ChatRequest) -> Result<String, AiError> {
            if request.response_format.is_some() {
                *self.reduce_calls.lock().unwrap() += 1;
                return Err(AiError::Timeout);
            }
            Ok("Summary: digest".to_string())
        }
    }

    #[tokio::test]
    async fn test_reduce_timeout_is_final_even_behind_retry_wrapper() {
        let stalled = StalledReduce::default();
        let config = AiConfig::default();
        let ai = RetryAsk::new(&stalled, config.max_retries, StdDuration::from_millis(1))
            .with_jitter(StdDuration::ZERO);
        let mut r = SummaryReducer::new(ai, &config);

        let err = r
            .run("fed", &[article(1, "a")], now(), &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "AI consolidation failed: request timed out");
        assert_eq!(*stalled.reduce_calls.lock().unwrap(), 1);
        assert_eq!(r.state(), ReducerState::Failed);
    }

    #[tokio::test]
    async fn test_fenced_json_is_accepted() {
        const FENCED: &str = "```json\n{\"main_summary\": \"ok\", \"key_entities\": [\"A\"]}\n```";
        let mut r = reducer(ScriptedAi::new(Ok(FENCED)));
        let report = r
            .run("fed", &[article(1, "a")], now(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.main_summary, "ok");
    }

    #[tokio::test]
    async fn test_cancel_skips_ai_calls() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut r = reducer(ScriptedAi::new(Ok(GOOD_REPORT)));
        let err = r.run("fed", &[article(1, "a")], now(), &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { stage: "summarize" }));
        assert!(r.ai.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reduce_context_layout() {
        let summaries = vec![
            Summary {
                url: "https://a.example/1".into(),
                text: "one".into(),
                degraded: false,
            },
            Summary {
                url: "https://a.example/2".into(),
                text: "two".into(),
                degraded: false,
            },
        ];
        assert_eq!(
            reduce_context(&summaries),
            "Summary 1 (source: https://a.example/1):\none\n\n---\nSummary 2 (source: https://a.example/2):\ntwo\n"
        );
    }
}
