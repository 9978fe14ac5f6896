//! Near-duplicate removal by fuzzy title comparison.
//!
//! Different outlets syndicate the same wire story under slightly reworded
//! headlines. Titles are normalized (lowercased, punctuation dropped,
//! tokens sorted) and compared with an indel ratio at both character and
//! token granularity; the higher score wins. The token view catches
//! headlines that differ by whole added words, the character view catches
//! spelling variants and unsegmented scripts such as Chinese. Titles that
//! normalize to nothing never match anything, so untitled pages all survive.

use crate::models::Article;
use rapidfuzz::distance::indel;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

pub const DEFAULT_THRESHOLD: u8 = 85;

#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    threshold: u8,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Deduplicator {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    /// Keep the first article of every group of similar titles, in order.
    ///
    /// Quadratic in the number of articles, which stays in the tens.
    #[instrument(level = "info", skip_all, fields(input = articles.len()))]
    pub fn dedup(&self, articles: Vec<Article>) -> Vec<Article> {
        let mut seen: Vec<String> = Vec::with_capacity(articles.len());
        let mut unique = Vec::with_capacity(articles.len());

        for article in articles {
            let normalized = normalize(&article.title);
            let duplicate_score = seen
                .iter()
                .map(|s| sorted_ratio(&normalized, s))
                .find(|score| *score > self.threshold);

            match duplicate_score {
                Some(score) => {
                    debug!(
                        score,
                        title = %article.display_title(),
                        url = %article.url,
                        "Dropping duplicate article"
                    );
                }
                None => {
                    seen.push(normalized);
                    unique.push(article);
                }
            }
        }

        info!(remaining = unique.len(), "Deduplication complete");
        unique
    }
}

/// Token-order-insensitive similarity of two titles, 0 to 100.
#[cfg(test)]
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    sorted_ratio(&normalize(a), &normalize(b))
}

/// Lowercase, replace non-alphanumerics with spaces, sort the tokens.
fn normalize(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Score two already-normalized titles.
fn sorted_ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let by_char = indel::normalized_similarity(a.chars(), b.chars());
    let mut ids = HashMap::new();
    let tokens_a = token_ids(a, &mut ids);
    let tokens_b = token_ids(b, &mut ids);
    let by_token = indel::normalized_similarity(tokens_a, tokens_b);
    (by_char.max(by_token) * 100.0).round() as u8
}

/// Map each token to a small integer so the indel metric can compare words.
fn token_ids<'a>(title: &'a str, ids: &mut HashMap<&'a str, u32>) -> Vec<u32> {
    title
        .split(' ')
        .map(|token| {
            let next = ids.len() as u32;
            *ids.entry(token).or_insert(next)
        })
        .collect()
}
