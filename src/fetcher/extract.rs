//! Generic main-content extraction from an article page.
//!
//! The body comes from `readability`'s content scoring first. When that
//! fails or finds too little, selector heuristics take over: paragraphs
//! inside `<article>`, then `<main>`, then anywhere, and finally the whole
//! body with scripts and styles removed.

use crate::models::ExtractedPage;
use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::io::Cursor;
use tracing::debug;
use url::Url;

static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("static selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("static selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));

static PARAGRAPH_SCOPES: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article p", "main p", "p"]
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
});

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Pull a title and body text out of `html` fetched from `url`.
///
/// # Arguments
///
/// * `html` - The raw or rendered page
/// * `url` - Where the page came from; resolves relative links for readability
/// * `min_chars` - Length a candidate body has to exceed to be accepted
///   without trying the next strategy
///
/// # Returns
///
/// The best title and text found. The text may still be short; the
/// caller applies its own threshold. The title is empty when the page has none.
pub fn extract_article(html: &str, url: &str, min_chars: usize) -> ExtractedPage {
    let document = Html::parse_document(html);
    let text = match readable_text(html, url) {
        Some(text) if text.chars().count() > min_chars => text,
        _ => fallback_text(&document, min_chars),
    };
    ExtractedPage {
        title: extract_title(&document),
        text,
    }
}

fn readable_text(html: &str, url: &str) -> Option<String> {
    let base = Url::parse(url).ok()?;
    let mut reader = Cursor::new(html.as_bytes());
    match readability::extractor::extract(&mut reader, &base) {
        Ok(product) => Some(collapse_whitespace(&product.text)).filter(|t| !t.is_empty()),
        Err(e) => {
            debug!(%url, error = %e, "Readability found no article body");
            None
        }
    }
}

fn extract_title(document: &Html) -> String {
    let og = document
        .select(&OG_TITLE)
        .filter_map(|m| m.value().attr("content"))
        .map(collapse_whitespace)
        .find(|t| !t.is_empty());
    if let Some(title) = og {
        return title;
    }

    [&*H1, &*TITLE]
        .into_iter()
        .flat_map(|sel| document.select(sel))
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

fn fallback_text(document: &Html, min_chars: usize) -> String {
    let mut best = String::new();
    for scope in PARAGRAPH_SCOPES.iter() {
        let text = document
            .select(scope)
            .map(|p| collapse_whitespace(&p.text().collect::<String>()))
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.chars().count() > min_chars {
            return text;
        }
        if text.len() > best.len() {
            best = text;
        }
    }

    let body = document
        .select(&BODY)
        .next()
        .map(visible_text)
        .unwrap_or_default();
    if body.chars().count() > best.chars().count() {
        body
    } else {
        best
    }
}

/// Text of `root` minus anything under script-like elements.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_TAGS.contains(&e.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}
