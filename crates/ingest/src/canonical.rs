//! Canonicalization and the content-addressable dedup hash.
//!
//! The hash must be stable across refetches of the same article even when
//! publishers re-serialize markup or append tracking parameters, so both
//! inputs are normalized first: links lose tracking params and case on
//! scheme/host, text loses case and whitespace variance.

use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters stripped during link canonicalization.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "ref",
];

/// Lowercase and collapse runs of whitespace to single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical form of an article link: lowercased scheme and host, tracking
/// parameters removed, fragment dropped. Unparseable links are passed
/// through trimmed so they still dedup against themselves.
pub fn canonical_link(link: &str) -> String {
    let trimmed = link.trim();
    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => return trimmed.to_string(),
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query: String = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    // Url lowercases scheme and host on parse already; make it explicit
    // for readers: the output is scheme://host with original path casing.
    url.to_string()
}

/// SHA-256 hex digest over the canonical (title, link, content) tuple.
pub fn content_hash(title: &str, link: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(title).as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_link(link).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_text(content).as_bytes());
    hex::encode(hasher.finalize())
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_collapses_whitespace() {
        assert_eq!(normalize_text("  Hello\n\tWorld  "), "hello world");
        assert_eq!(normalize_text("A  B   C"), "a b c");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_canonical_link_strips_tracking_params() {
        let link = "https://Example.COM/story?id=7&utm_source=rss&utm_medium=feed&fbclid=xyz";
        assert_eq!(canonical_link(link), "https://example.com/story?id=7");
    }

    #[test]
    fn test_canonical_link_drops_all_query_when_only_tracking() {
        let link = "https://example.com/story?utm_source=rss";
        assert_eq!(canonical_link(link), "https://example.com/story");
    }

    #[test]
    fn test_canonical_link_drops_fragment() {
        assert_eq!(
            canonical_link("https://example.com/a#section-2"),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_canonical_link_preserves_path_case() {
        assert_eq!(
            canonical_link("HTTPS://EXAMPLE.com/Story/ABC"),
            "https://example.com/Story/ABC"
        );
    }

    #[test]
    fn test_canonical_link_unparseable_passthrough() {
        assert_eq!(canonical_link("  not a url  "), "not a url");
    }

    #[test]
    fn test_content_hash_deterministic() {
        let a = content_hash("Title", "https://example.com/x", "Body text");
        let b = content_hash("Title", "https://example.com/x", "Body text");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_ignores_tracking_and_whitespace() {
        let a = content_hash(
            "Markets  Fall",
            "https://example.com/x?utm_source=rss",
            "Body   text",
        );
        let b = content_hash("markets fall", "https://example.com/x", "body text");
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_hash_differs_on_content() {
        let a = content_hash("T", "https://example.com/x", "one");
        let b = content_hash("T", "https://example.com/x", "two");
        assert_ne!(a, b);
    }
}
