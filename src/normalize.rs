//! Normalization of fetched rich content.
//!
//! Comparison text is derived by stripping decorative inline media markers
//! (emoji images and other alt-tagged `<img>`s), dropping the remaining
//! markup, decoding entities, and collapsing whitespace. This text exists
//! only for equality checks; the raw content is what gets persisted.

use once_cell::sync::Lazy;
use regex::Regex;

static EMOJI_IMG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+class="[^"]*emoji[^"]*"[^>]*>"#).expect("emoji img regex")
});
static ALT_IMG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+alt="[^"]*"[^>]*>"#).expect("alt img regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static IMG_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src="([^"]+)""#).expect("img src regex"));

/// Text used for change comparison, never for display or persistence.
pub fn comparison_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let no_emoji = EMOJI_IMG_RE.replace_all(html, "");
    let no_decor = ALT_IMG_RE.replace_all(&no_emoji, "");
    let no_tags = TAG_RE.replace_all(&no_decor, "");
    let decoded = html_escape::decode_html_entities(&no_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ordered, deduplicated media references found in the content.
///
/// Protocol-relative URLs are absolutized and render-parameter suffixes
/// (`@...`) are dropped so the same upload compares equal across fetches.
pub fn media_refs(html: &str) -> Vec<String> {
    let mut refs = Vec::new();
    for cap in IMG_SRC_RE.captures_iter(html) {
        let mut src = cap[1].to_string();
        if src.starts_with("//") {
            src = format!("https:{src}");
        }
        if let Some(at) = src.find('@') {
            src.truncate(at);
        }
        if !refs.contains(&src) {
            refs.push(src);
        }
    }
    refs
}
