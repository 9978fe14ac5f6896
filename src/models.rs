//! Data models flowing through the digest pipeline.
//!
//! Each stage produces a new collection from the previous one:
//! keyword → [`SearchResult`] / [`LinkSet`] → [`Article`] → [`Summary`] → [`Report`].
//! Nothing here outlives a single run.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered URLs returned by one search backend, best match first.
///
/// May contain duplicates; the aggregator is responsible for uniqueness.
pub type SearchResult = Vec<String>;

/// Insertion-ordered, duplicate-free, size-capped set of article URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    urls: Vec<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl LinkSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            urls: Vec::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `url` unless it is already present or the set is full.
    ///
    /// Returns `true` when the URL was added.
    pub fn insert(&mut self, url: &str) -> bool {
        if self.is_full() || self.seen.contains(url) {
            return false;
        }
        self.seen.insert(url.to_string());
        self.urls.push(url.to_string());
        true
    }

    pub fn is_full(&self) -> bool {
        self.urls.len() >= self.capacity
    }

    /// How many more URLs fit before the cap is reached.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.urls.len())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[String] {
        &self.urls
    }

    pub fn into_vec(self) -> Vec<String> {
        self.urls
    }
}

/// Title and body pulled out of a page, before the length check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    pub text: String,
}

/// A fetched article whose body passed the minimum-content check.
///
/// Only [`crate::fetcher::ArticleFetcher`] builds these, so `text` is always
/// longer than the configured threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    /// Empty when the page had no usable title.
    pub title: String,
    pub text: String,
}

impl Article {
    /// The title for logs and prompts; `"Untitled"` when there is none.
    pub fn display_title(&self) -> &str {
        match self.title.trim() {
            "" => "Untitled",
            title => title,
        }
    }
}

/// Per-article digest produced in the map phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// URL of the article the digest belongs to.
    pub url: String,
    pub text: String,
    /// `true` when the AI call failed and `text` is the placeholder.
    pub degraded: bool,
}

/// One dated event in the report timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub date: String,
    pub event: String,
    #[serde(default)]
    pub source: String,
}

/// Structured object the AI returns in the reduce phase.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Consolidation {
    pub main_summary: String,
    #[serde(default)]
    pub key_sub_themes: Vec<String>,
    #[serde(default)]
    pub key_entities: Vec<String>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
}

/// Final product of one run, handed to the output writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub main_summary: String,
    pub key_sub_themes: Vec<String>,
    pub key_entities: Vec<String>,
    pub timeline: Vec<TimelineEvent>,
    /// URLs of every article that survived de-duplication, in order.
    pub sources: Vec<String>,
}

impl Report {
    /// Attach `sources` to the AI's consolidation.
    ///
    /// Entities and sub-themes are de-duplicated keeping first occurrence.
    pub fn from_consolidation(consolidation: Consolidation, sources: Vec<String>) -> Self {
        Self {
            main_summary: consolidation.main_summary.trim().to_string(),
            key_sub_themes: consolidation
                .key_sub_themes
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unique()
                .collect(),
            key_entities: consolidation
                .key_entities
                .into_iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .unique()
                .collect(),
            timeline: consolidation.timeline,
            sources,
        }
    }
}
