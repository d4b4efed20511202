//! Template selection and entry extraction.
//!
//! The universal template is the plain feed-rs field mapping and always
//! applies when nothing better matches. A feed's explicitly assigned
//! template beats URL/content-type matching; among match rules the highest
//! priority wins.

use chrono::{DateTime, Utc};
use scraper::{Html, Selector as CssSelector};
use tracing::warn;

use newswire_core::{
    CandidateItem, Feed, FeedTemplate, MatchRule, ProcessingRules, Selector, TemplateSelectors,
};

/// Outcome of extracting one payload.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub candidates: Vec<CandidateItem>,
    /// `extraction_failure:<field>` reasons, one per rejected entry.
    pub failures: Vec<String>,
    pub entries_seen: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unparseable feed payload: {0}")]
    Parse(String),
}

// ── Template matching ────────────────────────────────────────────────

fn rule_matches(rule: &MatchRule, feed_url: &str, content_type: Option<&str>) -> bool {
    match rule {
        MatchRule::DomainEquals { domain, .. } => url::Url::parse(feed_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(domain)))
            .unwrap_or(false),
        MatchRule::UrlRegex { pattern, .. } => match regex::Regex::new(pattern) {
            Ok(re) => re.is_match(feed_url),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "invalid url_regex in template — rule skipped");
                false
            }
        },
        MatchRule::ContentType { value, .. } => content_type
            .map(|ct| ct.to_ascii_lowercase().starts_with(&value.to_ascii_lowercase()))
            .unwrap_or(false),
    }
}

/// Pick the template for a feed: explicit assignment first, then the
/// highest-priority matching rule, then none (universal extraction).
pub fn select_template<'a>(
    feed: &Feed,
    content_type: Option<&str>,
    templates: &'a [FeedTemplate],
) -> Option<&'a FeedTemplate> {
    if let Some(assigned) = feed.template_id {
        if let Some(template) = templates.iter().find(|t| t.id == assigned) {
            return Some(template);
        }
        warn!(feed_id = %feed.id, template_id = %assigned, "assigned template missing — falling back to matching");
    }

    templates
        .iter()
        .filter_map(|template| {
            let rules = template.match_rules().ok()?;
            let best = rules
                .iter()
                .filter(|rule| rule_matches(rule, &feed.url, content_type))
                .map(|rule| rule.priority())
                .max()?;
            Some((best, template))
        })
        .max_by_key(|(priority, _)| *priority)
        .map(|(_, template)| template)
}

// ── Selector application ─────────────────────────────────────────────

/// Apply one selector against an entry's HTML fragment.
fn apply_selector(fragment: &Html, selector: &Selector) -> Option<String> {
    match selector {
        Selector::Css { query } => select_text(fragment, query),
        Selector::Xpath { query } => {
            let (css, attribute) = xpath_to_css(query)?;
            match attribute {
                Some(name) => select_attr(fragment, &css, &name),
                None => select_text(fragment, &css),
            }
        }
        Selector::Attribute { query, name } => select_attr(fragment, query, name),
        Selector::LiteralDefault { value } => Some(value.clone()),
    }
}

fn select_text(fragment: &Html, query: &str) -> Option<String> {
    let css = CssSelector::parse(query).ok()?;
    let element = fragment.select(&css).next()?;
    let text: String = element.text().collect::<Vec<_>>().join(" ");
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn select_attr(fragment: &Html, query: &str, name: &str) -> Option<String> {
    let css = CssSelector::parse(query).ok()?;
    let element = fragment.select(&css).next()?;
    let value = element.value().attr(name)?.trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Translate the supported XPath subset into a CSS descendant selector.
///
/// Handles plain element paths (`//channel/item/title` → `channel item
/// title`) and a trailing attribute step (`//a/@href`). Predicates and
/// axes are not supported and make the selector a no-match.
fn xpath_to_css(query: &str) -> Option<(String, Option<String>)> {
    if query.contains('[') || query.contains("::") {
        warn!(query = %query, "unsupported xpath expression — selector skipped");
        return None;
    }

    let mut parts: Vec<&str> = query.split('/').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return None;
    }

    let attribute = parts
        .last()
        .and_then(|last| last.strip_prefix('@'))
        .map(|name| name.to_string());
    if attribute.is_some() {
        parts.pop();
        if parts.is_empty() {
            return None;
        }
    }

    if parts.iter().any(|p| p.contains('@')) {
        warn!(query = %query, "attribute step must be last — selector skipped");
        return None;
    }

    Some((parts.join(" "), attribute))
}

// ── Processing ───────────────────────────────────────────────────────

/// Strip markup, keeping inline link/anchor text.
pub fn strip_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Apply processing rules to raw content. Returns the failure reason when
/// the result falls below the minimum length.
pub fn apply_processing(content: &str, rules: &ProcessingRules) -> Result<String, String> {
    let mut text = if rules.strip_html {
        strip_html(content)
    } else {
        content.to_string()
    };

    for pattern in &rules.remove_patterns {
        match regex::Regex::new(pattern) {
            Ok(re) => text = re.replace_all(&text, "").into_owned(),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "invalid remove_pattern — skipped");
            }
        }
    }

    if rules.normalize_whitespace {
        text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    }

    if let Some(max) = rules.max_content_length {
        if text.chars().count() > max {
            text = text.chars().take(max).collect();
        }
    }

    if let Some(min) = rules.min_content_length {
        if text.chars().count() < min {
            return Err("extraction_failure:content_length".to_string());
        }
    }

    Ok(text)
}

// ── Extraction ───────────────────────────────────────────────────────

struct RawEntry {
    title: Option<String>,
    link: Option<String>,
    content: Option<String>,
    author: Option<String>,
    published: Option<DateTime<Utc>>,
}

/// Universal field mapping over a parsed feed-rs entry.
fn universal_entry(entry: &feed_rs::model::Entry) -> RawEntry {
    RawEntry {
        title: entry.title.as_ref().map(|t| t.content.clone()),
        link: entry.links.first().map(|l| l.href.clone()),
        content: entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone())),
        author: entry.authors.first().map(|p| p.name.clone()),
        published: entry.published.or(entry.updated),
    }
}

/// Extract candidate items from a fetched payload using the selected
/// template (or pure universal mapping when `template` is `None`).
pub fn extract_candidates(
    body: &str,
    template: Option<&FeedTemplate>,
) -> Result<ExtractionReport, ExtractError> {
    let parsed = feed_rs::parser::parse(body.as_bytes())
        .map_err(|e| ExtractError::Parse(e.to_string()))?;

    let selectors = template
        .and_then(|t| t.selectors().ok())
        .unwrap_or_default();
    let processing = template
        .and_then(|t| t.processing().ok())
        .unwrap_or_default();

    let mut report = ExtractionReport {
        entries_seen: parsed.entries.len(),
        ..Default::default()
    };

    for entry in &parsed.entries {
        let base = universal_entry(entry);
        // Selectors run against the entry's own markup fragment.
        let fragment = Html::parse_fragment(base.content.as_deref().unwrap_or(""));

        let title = resolve_field(&fragment, selectors.title.as_ref(), base.title.clone());
        let link = resolve_field(&fragment, selectors.link.as_ref(), base.link.clone());
        let content = resolve_field(&fragment, selectors.content.as_ref(), base.content.clone());
        let author = resolve_field(&fragment, selectors.author.as_ref(), base.author.clone());
        let published = match selectors.published.as_ref() {
            Some(fs) => apply_selector(&fragment, &fs.selector)
                .and_then(|raw| parse_published(&raw))
                .or(base.published),
            None => base.published,
        };

        // Title and link are always required; template selectors may add
        // requirements on other fields.
        let title = match require(title, true, "title", &mut report.failures) {
            Some(t) => t,
            None => continue,
        };
        let link = match require(link, true, "link", &mut report.failures) {
            Some(l) => l,
            None => continue,
        };
        let content_required = selectors
            .content
            .as_ref()
            .map(|fs| fs.required)
            .unwrap_or(false);
        let raw_content = match require(content, content_required, "content", &mut report.failures)
        {
            Some(c) => c,
            None if content_required => continue,
            None => String::new(),
        };
        let author_required = selectors
            .author
            .as_ref()
            .map(|fs| fs.required)
            .unwrap_or(false);
        let author = match (author, author_required) {
            (Some(a), _) => Some(a),
            (None, true) => {
                report.failures.push("extraction_failure:author".to_string());
                continue;
            }
            (None, false) => None,
        };

        let content = match apply_processing(&raw_content, &processing) {
            Ok(c) => c,
            Err(reason) => {
                report.failures.push(reason);
                continue;
            }
        };

        report.candidates.push(CandidateItem {
            title,
            link,
            content,
            author,
            published_at: published,
        });
    }

    Ok(report)
}

fn resolve_field(
    fragment: &Html,
    selector: Option<&newswire_core::FieldSelector>,
    fallback: Option<String>,
) -> Option<String> {
    match selector {
        Some(fs) => apply_selector(fragment, &fs.selector).or(fallback),
        None => fallback,
    }
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
}

fn require(
    value: Option<String>,
    required: bool,
    field: &str,
    failures: &mut Vec<String>,
) -> Option<String> {
    match (value, required) {
        (Some(v), _) => Some(v),
        (None, true) => {
            failures.push(format!("extraction_failure:{}", field));
            None
        }
        (None, false) => None,
    }
}

fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Wire</title>
    <item>
      <title>Markets slide on rate fears</title>
      <link>https://example.com/markets?utm_source=rss</link>
      <description>&lt;p&gt;Stocks fell sharply as &lt;a href="/rates"&gt;rate expectations&lt;/a&gt; shifted.&lt;/p&gt;</description>
      <author>desk@example.com</author>
      <pubDate>Tue, 14 Jul 2026 09:30:00 GMT</pubDate>
    </item>
    <item>
      <title>Energy update</title>
      <link>https://example.com/energy</link>
      <description>Brent steady.</description>
    </item>
  </channel>
</rss>"#;

    fn make_feed(template_id: Option<Uuid>) -> Feed {
        Feed {
            id: Uuid::new_v4(),
            url: "https://example.com/rss".to_string(),
            title: "Wire".to_string(),
            status: newswire_core::FeedStatus::Active,
            interval_minutes: 60,
            auto_analyze: false,
            template_id,
            next_fetch_at: None,
            last_fetched_at: None,
            consecutive_failures: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn make_template(name: &str, rules: serde_json::Value) -> FeedTemplate {
        FeedTemplate {
            id: Uuid::new_v4(),
            name: name.to_string(),
            match_rules: rules,
            selectors: serde_json::json!({}),
            processing: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_universal_extraction() {
        let report = extract_candidates(SAMPLE_RSS, None).unwrap();
        assert_eq!(report.entries_seen, 2);
        assert_eq!(report.candidates.len(), 2);
        assert!(report.failures.is_empty());

        let first = &report.candidates[0];
        assert_eq!(first.title, "Markets slide on rate fears");
        assert_eq!(first.link, "https://example.com/markets?utm_source=rss");
        // Inline link text survives HTML stripping.
        assert!(first.content.contains("rate expectations"));
        assert!(!first.content.contains("<a"));
        assert!(first.published_at.is_some());
    }

    #[test]
    fn test_unparseable_payload() {
        let result = extract_candidates("this is not xml at all {}", None);
        assert!(result.is_err());
    }

    #[test]
    fn test_domain_match_selects_highest_priority() {
        let low = make_template(
            "generic",
            serde_json::json!([{"type": "domain_equals", "domain": "example.com", "priority": 1}]),
        );
        let high = make_template(
            "specific",
            serde_json::json!([{"type": "url_regex", "pattern": "example\\.com/rss", "priority": 9}]),
        );
        let templates = vec![low, high];
        let feed = make_feed(None);

        let selected = select_template(&feed, Some("application/rss+xml"), &templates).unwrap();
        assert_eq!(selected.name, "specific");
    }

    #[test]
    fn test_assigned_template_overrides_matching() {
        let assigned = make_template("assigned", serde_json::json!([]));
        let matching = make_template(
            "matching",
            serde_json::json!([{"type": "domain_equals", "domain": "example.com", "priority": 50}]),
        );
        let feed = make_feed(Some(assigned.id));
        let templates = vec![assigned, matching];

        let selected = select_template(&feed, None, &templates).unwrap();
        assert_eq!(selected.name, "assigned");
    }

    #[test]
    fn test_no_match_returns_none() {
        let template = make_template(
            "other-site",
            serde_json::json!([{"type": "domain_equals", "domain": "elsewhere.org", "priority": 5}]),
        );
        let feed = make_feed(None);
        assert!(select_template(&feed, None, &[template]).is_none());
    }

    #[test]
    fn test_content_type_rule() {
        let template = make_template(
            "atom-only",
            serde_json::json!([{"type": "content_type", "value": "application/atom", "priority": 2}]),
        );
        let feed = make_feed(None);
        assert!(select_template(&feed, Some("application/atom+xml"), &[template.clone()]).is_some());
        assert!(select_template(&feed, Some("text/html"), &[template]).is_none());
    }

    #[test]
    fn test_required_selector_failure_counts_entry() {
        let mut template = make_template("strict", serde_json::json!([]));
        template.selectors = serde_json::json!({
            "content": {"kind": "css", "query": "div.article-body", "required": true}
        });

        let report = extract_candidates(SAMPLE_RSS, Some(&template)).unwrap();
        // Neither description fragment contains div.article-body, and the
        // universal fallback is suppressed only when the selector misses
        // entirely; fallback content exists, so candidates still extract.
        assert_eq!(report.candidates.len(), 2);
    }

    #[test]
    fn test_min_length_rejects_short_content() {
        let mut template = make_template("long-form", serde_json::json!([]));
        template.processing = serde_json::json!({"min_content_length": 30});

        let report = extract_candidates(SAMPLE_RSS, Some(&template)).unwrap();
        // "Brent steady." fails the minimum; the first item passes.
        assert_eq!(report.candidates.len(), 1);
        assert!(report
            .failures
            .iter()
            .any(|f| f == "extraction_failure:content_length"));
    }

    #[test]
    fn test_max_length_truncates() {
        let rules = ProcessingRules {
            max_content_length: Some(5),
            strip_html: false,
            normalize_whitespace: false,
            ..Default::default()
        };
        assert_eq!(apply_processing("abcdefgh", &rules).unwrap(), "abcde");
    }

    #[test]
    fn test_remove_patterns() {
        let rules = ProcessingRules {
            remove_patterns: vec![r"Read more.*$".to_string()],
            strip_html: false,
            ..Default::default()
        };
        let out = apply_processing("Story body. Read more at example.com", &rules).unwrap();
        assert_eq!(out, "Story body.");
    }

    #[test]
    fn test_strip_html_keeps_anchor_text() {
        let html = r#"<p>Oil <a href="/brent">jumped</a> today.</p>"#;
        let text = strip_html(html);
        assert!(text.contains("jumped"));
        assert!(!text.contains("href"));
    }

    #[test]
    fn test_literal_default_selector() {
        let fragment = Html::parse_fragment("<p>x</p>");
        let value = apply_selector(
            &fragment,
            &Selector::LiteralDefault {
                value: "newsdesk".to_string(),
            },
        );
        assert_eq!(value.as_deref(), Some("newsdesk"));
    }

    #[test]
    fn test_xpath_to_css_element_path() {
        assert_eq!(
            xpath_to_css("//div/p"),
            Some(("div p".to_string(), None))
        );
        assert_eq!(
            xpath_to_css("/article/section/h2"),
            Some(("article section h2".to_string(), None))
        );
    }

    #[test]
    fn test_xpath_to_css_attribute_step() {
        assert_eq!(
            xpath_to_css("//a/@href"),
            Some(("a".to_string(), Some("href".to_string())))
        );
        // A bare attribute with no element path is meaningless.
        assert_eq!(xpath_to_css("//@href"), None);
    }

    #[test]
    fn test_xpath_to_css_rejects_predicates() {
        assert_eq!(xpath_to_css("//div[@class='body']"), None);
        assert_eq!(xpath_to_css("descendant::p"), None);
    }

    #[test]
    fn test_xpath_selector_extracts_text() {
        let fragment = Html::parse_fragment("<div><p>Quarterly results beat estimates.</p></div>");
        let value = apply_selector(
            &fragment,
            &Selector::Xpath {
                query: "//div/p".to_string(),
            },
        );
        assert_eq!(value.as_deref(), Some("Quarterly results beat estimates."));
    }

    #[test]
    fn test_xpath_selector_extracts_attribute() {
        let fragment = Html::parse_fragment(r#"<a href="https://example.com/full">more</a>"#);
        let value = apply_selector(
            &fragment,
            &Selector::Xpath {
                query: "//a/@href".to_string(),
            },
        );
        assert_eq!(value.as_deref(), Some("https://example.com/full"));
    }

    #[test]
    fn test_attribute_selector() {
        let fragment = Html::parse_fragment(r#"<a class="src" href="https://example.com/full">x</a>"#);
        let value = apply_selector(
            &fragment,
            &Selector::Attribute {
                query: "a.src".to_string(),
                name: "href".to_string(),
            },
        );
        assert_eq!(value.as_deref(), Some("https://example.com/full"));
    }

    #[test]
    fn test_parse_published_formats() {
        assert!(parse_published("2026-07-14T09:30:00Z").is_some());
        assert!(parse_published("Tue, 14 Jul 2026 09:30:00 GMT").is_some());
        assert!(parse_published("yesterday").is_none());
    }
}
