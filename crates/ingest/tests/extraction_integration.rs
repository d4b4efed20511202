//! End-to-end extraction tests: realistic RSS/Atom payloads through
//! template selection, extraction, processing, and the dedup hash.

use chrono::Utc;
use uuid::Uuid;

use newswire_core::{Feed, FeedStatus, FeedTemplate};
use newswire_ingest::canonical::content_hash;
use newswire_ingest::template::{extract_candidates, select_template};

const RSS_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Wire</title>
    <link>https://wire.example.com</link>
    <item>
      <title>Parliament passes energy bill</title>
      <link>https://wire.example.com/politics/energy-bill?utm_source=rss&amp;utm_medium=feed</link>
      <description>&lt;div class="teaser"&gt;Lawmakers approved the &lt;a href="/bill"&gt;long-debated bill&lt;/a&gt; late Tuesday.&lt;/div&gt;</description>
      <author>politics@wire.example.com</author>
      <pubDate>Tue, 14 Jul 2026 21:04:00 GMT</pubDate>
    </item>
    <item>
      <title>Grid operator warns of shortfall</title>
      <link>https://wire.example.com/business/grid-warning</link>
      <description>Reserve margins are thinning ahead of the heat wave.</description>
      <pubDate>Tue, 14 Jul 2026 22:10:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

const ATOM_FIXTURE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Journal</title>
  <id>urn:uuid:3b7d1a40-0000-0000-0000-000000000000</id>
  <updated>2026-07-15T06:00:00Z</updated>
  <entry>
    <title>Chip maker beats expectations</title>
    <id>urn:uuid:3b7d1a40-0000-0000-0000-000000000001</id>
    <link href="https://journal.example.org/markets/chips-q2"/>
    <updated>2026-07-15T05:45:00Z</updated>
    <author><name>Markets Desk</name></author>
    <summary type="html">&lt;p&gt;Quarterly revenue rose 18 percent on data-center demand.&lt;/p&gt;</summary>
  </entry>
</feed>"#;

fn feed_for(url: &str, template_id: Option<Uuid>) -> Feed {
    Feed {
        id: Uuid::new_v4(),
        url: url.to_string(),
        title: String::new(),
        status: FeedStatus::Active,
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

fn template(name: &str, rules: serde_json::Value, processing: serde_json::Value) -> FeedTemplate {
    FeedTemplate {
        id: Uuid::new_v4(),
        name: name.to_string(),
        match_rules: rules,
        selectors: serde_json::json!({}),
        processing,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn rss_universal_extraction_end_to_end() {
    let report = extract_candidates(RSS_FIXTURE, None).unwrap();
    assert_eq!(report.entries_seen, 2);
    assert_eq!(report.candidates.len(), 2);
    assert!(report.failures.is_empty());

    let first = &report.candidates[0];
    assert_eq!(first.title, "Parliament passes energy bill");
    // Markup stripped, inline link text preserved.
    assert!(first.content.contains("long-debated bill"));
    assert!(!first.content.contains("<div"));
    assert!(first.author.is_some());
    assert!(first.published_at.is_some());
}

#[test]
fn atom_universal_extraction_end_to_end() {
    let report = extract_candidates(ATOM_FIXTURE, None).unwrap();
    assert_eq!(report.candidates.len(), 1);

    let entry = &report.candidates[0];
    assert_eq!(entry.title, "Chip maker beats expectations");
    assert_eq!(entry.link, "https://journal.example.org/markets/chips-q2");
    assert!(entry.content.contains("data-center demand"));
    assert_eq!(entry.author.as_deref(), Some("Markets Desk"));
}

#[test]
fn dedup_hash_stable_across_refetches() {
    let first = extract_candidates(RSS_FIXTURE, None).unwrap();
    let second = extract_candidates(RSS_FIXTURE, None).unwrap();

    let hashes = |report: &newswire_ingest::template::ExtractionReport| -> Vec<String> {
        report
            .candidates
            .iter()
            .map(|c| content_hash(&c.title, &c.link, &c.content))
            .collect()
    };

    // Refetching the same payload must reproduce every hash exactly —
    // this is what makes the second ingest pass a no-op.
    assert_eq!(hashes(&first), hashes(&second));

    // And distinct articles never collide.
    let all = hashes(&first);
    assert_ne!(all[0], all[1]);
}

#[test]
fn dedup_hash_ignores_tracking_params() {
    let report = extract_candidates(RSS_FIXTURE, None).unwrap();
    let tracked = &report.candidates[0];

    // The same article served without the tracking suffix hashes equal.
    let clean_hash = content_hash(
        &tracked.title,
        "https://wire.example.com/politics/energy-bill",
        &tracked.content,
    );
    let tracked_hash = content_hash(&tracked.title, &tracked.link, &tracked.content);
    assert_eq!(clean_hash, tracked_hash);
}

#[test]
fn domain_template_applies_processing() {
    let wire_template = template(
        "wire-short",
        serde_json::json!([
            {"type": "domain_equals", "domain": "wire.example.com", "priority": 10}
        ]),
        serde_json::json!({"max_content_length": 20}),
    );
    let other_template = template(
        "journal",
        serde_json::json!([
            {"type": "domain_equals", "domain": "journal.example.org", "priority": 10}
        ]),
        serde_json::json!({}),
    );
    let templates = vec![wire_template, other_template];

    let feed = feed_for("https://wire.example.com/feed.xml", None);
    let selected = select_template(&feed, Some("application/rss+xml"), &templates).unwrap();
    assert_eq!(selected.name, "wire-short");

    let report = extract_candidates(RSS_FIXTURE, Some(selected)).unwrap();
    for candidate in &report.candidates {
        assert!(candidate.content.chars().count() <= 20);
    }
}

#[test]
fn assigned_template_wins_over_domain_match() {
    let assigned = template("assigned", serde_json::json!([]), serde_json::json!({}));
    let assigned_id = assigned.id;
    let matching = template(
        "matching",
        serde_json::json!([
            {"type": "domain_equals", "domain": "wire.example.com", "priority": 99}
        ]),
        serde_json::json!({}),
    );
    let templates = vec![assigned, matching];

    let feed = feed_for("https://wire.example.com/feed.xml", Some(assigned_id));
    let selected = select_template(&feed, None, &templates).unwrap();
    assert_eq!(selected.name, "assigned");
}

#[test]
fn unparseable_payload_is_an_error_not_a_panic() {
    assert!(extract_candidates("<html><body>not a feed</body></html>", None).is_err());
    assert!(extract_candidates("", None).is_err());
}
