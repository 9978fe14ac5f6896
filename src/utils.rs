//! Small helpers shared across stages: string clipping for logs and prompts,
//! host matching, filename slugs, and output directory checks.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a byte
/// count of what was dropped.
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// First `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        None => s,
        Some((cut, _)) => &s[..cut],
    }
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").expect("static regex"));

/// Remove a surrounding Markdown code fence from a model response, if any.
pub fn strip_code_fence(s: &str) -> &str {
    let trimmed = s.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Does `url` point at `domain` or one of its subdomains?
///
/// Falls back to a plain substring test when the URL has no parseable host.
pub fn host_matches(url: &str, domain: &str) -> bool {
    match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase)) {
        Some(host) => {
            host == domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => url.contains(domain),
    }
}

/// Convert a keyword to a filesystem-friendly slug.
///
/// Lowercases, drops punctuation, and replaces whitespace with underscores.
/// Non-ASCII letters (e.g. CJK) are kept.
pub fn slugify(keyword: &str) -> String {
    let slug = keyword
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && !c.is_whitespace() && c != '-', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() { "report".to_string() } else { slug }
}

/// Create `path` if missing and prove new files can be written into it.
///
/// # Arguments
///
/// * `path` - The output directory to check
///
/// # Returns
///
/// `Ok(())` once a scratch file has been written and removed again.
///
/// # Errors
///
/// Returns the underlying I/O error if the directory cannot be created or
/// the scratch file cannot be written.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    let probe = Path::new(path).join(".news_digest_probe");
    fs::write(&probe, b"").await?;
    let _ = fs::remove_file(&probe).await;
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("Fed holds", 100), "Fed holds");
        let long = "z".repeat(250);
        let clipped = truncate_for_log(&long, 50);
        assert_eq!(clipped, format!("{}…(+200 bytes)", "z".repeat(50)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "美联储加息";
        assert_eq!(truncate_chars(s, 2), "美联");
        assert_eq!(truncate_chars(s, 10), s);
        assert!(truncate_for_log(s, 3).starts_with("美联储…"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_host_matches() {
        assert!(host_matches("https://www.youtube.com/watch?v=1", "youtube.com"));
        assert!(host_matches("https://youtube.com/", "youtube.com"));
        assert!(!host_matches("https://notyoutube.com/", "youtube.com"));
        assert!(!host_matches("https://example.com/youtube.com", "youtube.com"));
        assert!(host_matches("not a url youtube.com", "youtube.com"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Fed Raises Rates!"), "fed_raises_rates");
        assert_eq!(slugify("人工智能 新闻"), "人工智能_新闻");
        assert_eq!(slugify("???"), "report");
    }

    #[test]
    fn test_looks_truncated() {
        let cut = serde_json::from_str::<serde_json::Value>(r#"{"main_summary": "The Fed"#).unwrap_err();
        assert!(looks_truncated(&cut));
        let bad = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert!(!looks_truncated(&bad));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_nested_dirs() {
        let root = std::env::temp_dir().join(format!("news_digest_utils_{}", std::process::id()));
        let nested = root.join("a/b");
        ensure_writable_dir(&nested.to_string_lossy()).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join(".news_digest_probe").exists());
        let _ = std::fs::remove_dir_all(&root);
    }
}
