//! Classification prompt construction.

use crate::provider::{Message, Role};

const SYSTEM_PROMPT: &str = r#"You are a news classification engine. For each article you receive, respond with ONE JSON object and nothing else — no prose, no markdown fences.

The object has this exact shape:

{
  "sentiment": {
    "overall": {"label": "positive|neutral|negative", "score": -1.0..1.0, "confidence": 0.0..1.0},
    "market": {"bullish": 0..1, "bearish": 0..1, "uncertainty": 0..1, "time_horizon": "short|medium|long"},
    "urgency": 0..1,
    "themes": ["up to 6 short topic labels"]
  },
  "impact": {"overall": 0..1, "volatility": 0..1},
  "geopolitical": {
    "stability_score": -1..1,
    "economic_impact": -1..1,
    "security_relevance": 0..1,
    "diplomatic_impact": {"global": -1..1, "western": -1..1, "regional": -1..1},
    "impact_beneficiaries": ["up to 3 ISO-3166-1 alpha-2 codes or bloc tokens"],
    "impact_affected": ["up to 3"],
    "regions_affected": ["region tokens"],
    "time_horizon": "immediate|short_term|long_term",
    "confidence": 0..1,
    "escalation_potential": 0..1,
    "alliance_activation": ["alliance names"],
    "conflict_type": "diplomatic|economic|hybrid|interstate_war|nuclear_threat"
  }
}

Rules:
- Include "geopolitical" ONLY when the article has genuine geopolitical content; otherwise omit the key entirely.
- Every score must be inside its declared range.
- "themes" holds at most 6 entries."#;

/// Build the message pair for one classification call.
pub fn classification_messages(title: &str, summary: &str) -> Vec<Message> {
    let user = format!("Title: {}\n\nSummary: {}", title.trim(), summary.trim());
    vec![
        Message {
            role: Role::System,
            content: SYSTEM_PROMPT.to_string(),
        },
        Message {
            role: Role::User,
            content: user,
        },
    ]
}

/// Extract the JSON body from a model response, tolerating markdown fences
/// and leading prose.
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    // Fenced block first.
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }

    // Otherwise the outermost brace pair.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return trimmed[start..=end].trim();
        }
    }

    trimmed
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_shape() {
        let messages = classification_messages("Title here", "Summary here");
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0].role, Role::System));
        assert!(messages[0].content.contains("geopolitical"));
        assert!(messages[1].content.contains("Title here"));
        assert!(messages[1].content.contains("Summary here"));
    }

    #[test]
    fn test_extract_plain_json() {
        let raw = r#"{"a": 1}"#;
        assert_eq!(extract_json(raw), raw);
    }

    #[test]
    fn test_extract_fenced_json() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_fenced_without_language() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_with_leading_prose() {
        let raw = "Here is the classification:\n{\"a\": {\"b\": 2}}";
        assert_eq!(extract_json(raw), r#"{"a": {"b": 2}}"#);
    }
}
