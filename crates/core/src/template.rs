//! Extraction template types.
//!
//! A template pairs match rules (which feeds/payloads it applies to) with
//! per-field selectors and post-processing rules. Stored as JSONB columns
//! on `feed_templates`; an implicit universal template always matches with
//! the lowest priority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ── Match rules (tagged union) ───────────────────────────────────────

/// One rule deciding whether a template applies to a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchRule {
    /// Feed URL host equals the given domain (case-insensitive).
    DomainEquals { domain: String, priority: i32 },
    /// Feed URL matches the given regex.
    UrlRegex { pattern: String, priority: i32 },
    /// Response content type starts with the given value.
    ContentType { value: String, priority: i32 },
}

impl MatchRule {
    pub fn priority(&self) -> i32 {
        match self {
            Self::DomainEquals { priority, .. }
            | Self::UrlRegex { priority, .. }
            | Self::ContentType { priority, .. } => *priority,
        }
    }
}

// ── Field selectors ──────────────────────────────────────────────────

/// How to pull one field out of an entry fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selector {
    /// CSS selector; the matched node's text is taken.
    Css { query: String },
    /// XPath location path (simple element paths and trailing `@attr`
    /// steps); the matched node's text or attribute value is taken.
    Xpath { query: String },
    /// CSS selector plus an attribute name whose value is taken.
    Attribute { query: String, name: String },
    /// Fixed fallback value.
    LiteralDefault { value: String },
}

/// A selector with its required bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldSelector {
    #[serde(flatten)]
    pub selector: Selector,
    #[serde(default)]
    pub required: bool,
}

/// Per-field selectors. A missing field falls back to the universal
/// (feed-level) value for that field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TemplateSelectors {
    pub title: Option<FieldSelector>,
    pub link: Option<FieldSelector>,
    pub content: Option<FieldSelector>,
    pub author: Option<FieldSelector>,
    pub published: Option<FieldSelector>,
}

// ── Processing rules ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProcessingRules {
    #[serde(default)]
    pub min_content_length: Option<usize>,
    #[serde(default)]
    pub max_content_length: Option<usize>,
    #[serde(default = "default_true")]
    pub strip_html: bool,
    /// Regex patterns whose matches are removed from the content.
    #[serde(default)]
    pub remove_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub normalize_whitespace: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ProcessingRules {
    fn default() -> Self {
        Self {
            min_content_length: None,
            max_content_length: None,
            strip_html: true,
            remove_patterns: Vec::new(),
            normalize_whitespace: true,
        }
    }
}

// ── Database row ─────────────────────────────────────────────────────

/// Row from the `feed_templates` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct FeedTemplate {
    pub id: Uuid,
    pub name: String,
    #[schema(value_type = Vec<Object>)]
    pub match_rules: serde_json::Value,
    #[schema(value_type = Object)]
    pub selectors: serde_json::Value,
    #[schema(value_type = Object)]
    pub processing: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedTemplate {
    pub fn match_rules(&self) -> Result<Vec<MatchRule>, serde_json::Error> {
        serde_json::from_value(self.match_rules.clone())
    }

    pub fn selectors(&self) -> Result<TemplateSelectors, serde_json::Error> {
        serde_json::from_value(self.selectors.clone())
    }

    pub fn processing(&self) -> Result<ProcessingRules, serde_json::Error> {
        serde_json::from_value(self.processing.clone())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_rule_roundtrip() {
        let rule = MatchRule::DomainEquals {
            domain: "reuters.com".to_string(),
            priority: 10,
        };
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains(r#""type":"domain_equals""#));
        let parsed: MatchRule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rule);
        assert_eq!(parsed.priority(), 10);
    }

    #[test]
    fn test_selector_tagged_union() {
        let json = r#"{"kind":"attribute","query":"a.headline","name":"href"}"#;
        let sel: Selector = serde_json::from_str(json).unwrap();
        assert_eq!(
            sel,
            Selector::Attribute {
                query: "a.headline".to_string(),
                name: "href".to_string()
            }
        );
    }

    #[test]
    fn test_field_selector_flatten_with_required() {
        let json = r#"{"kind":"css","query":"h1","required":true}"#;
        let fs: FieldSelector = serde_json::from_str(json).unwrap();
        assert!(fs.required);
        assert!(matches!(fs.selector, Selector::Css { .. }));
    }

    #[test]
    fn test_processing_defaults() {
        let rules: ProcessingRules = serde_json::from_str("{}").unwrap();
        assert!(rules.strip_html);
        assert!(rules.normalize_whitespace);
        assert!(rules.remove_patterns.is_empty());
        assert!(rules.min_content_length.is_none());
    }

    #[test]
    fn test_template_row_accessors() {
        let row = FeedTemplate {
            id: Uuid::new_v4(),
            name: "wire-service".to_string(),
            match_rules: serde_json::json!([
                {"type": "domain_equals", "domain": "apnews.com", "priority": 5}
            ]),
            selectors: serde_json::json!({
                "title": {"kind": "css", "query": "h1.headline", "required": true}
            }),
            processing: serde_json::json!({"max_content_length": 20000}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let rules = row.match_rules().unwrap();
        assert_eq!(rules.len(), 1);

        let selectors = row.selectors().unwrap();
        assert!(selectors.title.unwrap().required);

        let processing = row.processing().unwrap();
        assert_eq!(processing.max_content_length, Some(20000));
        assert!(processing.strip_html);
    }
}
