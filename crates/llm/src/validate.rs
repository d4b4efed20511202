//! Boundary validation and normalization of model responses.
//!
//! The model is prompted for strict JSON but its output is never trusted:
//! scores are clamped to their declared ranges, unknown enum values map to
//! defaults, arrays are truncated, and vacant geopolitical blocks are
//! dropped rather than stored.

use serde_json::Value;

use newswire_core::{
    ConflictType, DiplomaticImpact, GeoTimeHorizon, GeopoliticalPayload, ImpactPayload,
    ItemAnalysisPayload, MarketSentiment, OverallSentiment, SentimentLabel, SentimentPayload,
    TimeHorizon, MAX_GEO_ACTORS, MAX_THEMES,
};

fn score(value: &Value, path: &[&str], min: f64, max: f64) -> f64 {
    let mut current = value;
    for key in path {
        current = &current[key];
    }
    current.as_f64().unwrap_or(0.0).clamp(min, max)
}

fn string_list(value: &Value, max_len: usize) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .take(max_len)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_enum<T: serde::de::DeserializeOwned + Default>(value: &Value) -> T {
    value
        .as_str()
        .and_then(|s| serde_json::from_value(Value::String(s.to_string())).ok())
        .unwrap_or_default()
}

/// Normalize a raw model response into the canonical payload.
///
/// Fails only when the response lacks the sentiment or impact objects
/// entirely — everything else degrades to clamped defaults.
pub fn normalize(raw: &Value, model_tag: &str) -> Result<ItemAnalysisPayload, String> {
    let sentiment_raw = raw
        .get("sentiment")
        .filter(|v| v.is_object())
        .ok_or_else(|| "missing sentiment object".to_string())?;
    let impact_raw = raw
        .get("impact")
        .filter(|v| v.is_object())
        .ok_or_else(|| "missing impact object".to_string())?;

    let sentiment = SentimentPayload {
        overall: OverallSentiment {
            label: parse_enum::<SentimentLabel>(&sentiment_raw["overall"]["label"]),
            score: score(sentiment_raw, &["overall", "score"], -1.0, 1.0),
            confidence: score(sentiment_raw, &["overall", "confidence"], 0.0, 1.0),
        },
        market: MarketSentiment {
            bullish: score(sentiment_raw, &["market", "bullish"], 0.0, 1.0),
            bearish: score(sentiment_raw, &["market", "bearish"], 0.0, 1.0),
            uncertainty: score(sentiment_raw, &["market", "uncertainty"], 0.0, 1.0),
            time_horizon: parse_enum::<TimeHorizon>(&sentiment_raw["market"]["time_horizon"]),
        },
        urgency: score(sentiment_raw, &["urgency"], 0.0, 1.0),
        themes: string_list(&sentiment_raw["themes"], MAX_THEMES),
    };

    let impact = ImpactPayload {
        overall: score(impact_raw, &["overall"], 0.0, 1.0),
        volatility: score(impact_raw, &["volatility"], 0.0, 1.0),
    };

    let geopolitical = raw
        .get("geopolitical")
        .filter(|v| v.is_object())
        .map(|geo| GeopoliticalPayload {
            stability_score: score(geo, &["stability_score"], -1.0, 1.0),
            economic_impact: score(geo, &["economic_impact"], -1.0, 1.0),
            security_relevance: score(geo, &["security_relevance"], 0.0, 1.0),
            diplomatic_impact: DiplomaticImpact {
                global: score(geo, &["diplomatic_impact", "global"], -1.0, 1.0),
                western: score(geo, &["diplomatic_impact", "western"], -1.0, 1.0),
                regional: score(geo, &["diplomatic_impact", "regional"], -1.0, 1.0),
            },
            impact_beneficiaries: string_list(&geo["impact_beneficiaries"], MAX_GEO_ACTORS),
            impact_affected: string_list(&geo["impact_affected"], MAX_GEO_ACTORS),
            regions_affected: string_list(&geo["regions_affected"], 8),
            time_horizon: parse_enum::<GeoTimeHorizon>(&geo["time_horizon"]),
            confidence: score(geo, &["confidence"], 0.0, 1.0),
            escalation_potential: score(geo, &["escalation_potential"], 0.0, 1.0),
            alliance_activation: string_list(&geo["alliance_activation"], 8),
            conflict_type: parse_enum::<ConflictType>(&geo["conflict_type"]),
        })
        // All-zero/empty blocks are synthetic; omit rather than store.
        .filter(|geo| !geo.is_vacant());

    Ok(ItemAnalysisPayload {
        sentiment,
        impact,
        geopolitical,
        model_tag: model_tag.to_string(),
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_raw() -> Value {
        json!({
            "sentiment": {
                "overall": {"label": "negative", "score": -0.7, "confidence": 0.9},
                "market": {"bullish": 0.1, "bearish": 0.8, "uncertainty": 0.3,
                           "time_horizon": "short"},
                "urgency": 0.6,
                "themes": ["sanctions", "energy"]
            },
            "impact": {"overall": 0.8, "volatility": 0.5}
        })
    }

    #[test]
    fn test_normalize_minimal() {
        let payload = normalize(&minimal_raw(), "claude-haiku-4-5").unwrap();
        assert_eq!(payload.sentiment.overall.label, SentimentLabel::Negative);
        assert_eq!(payload.sentiment.themes.len(), 2);
        assert!(payload.geopolitical.is_none());
        assert_eq!(payload.model_tag, "claude-haiku-4-5");
    }

    #[test]
    fn test_scores_clamped() {
        let mut raw = minimal_raw();
        raw["sentiment"]["overall"]["score"] = json!(-3.5);
        raw["sentiment"]["urgency"] = json!(7.0);
        raw["impact"]["overall"] = json!(-0.2);

        let payload = normalize(&raw, "m").unwrap();
        assert_eq!(payload.sentiment.overall.score, -1.0);
        assert_eq!(payload.sentiment.urgency, 1.0);
        assert_eq!(payload.impact.overall, 0.0);
    }

    #[test]
    fn test_unknown_enum_defaults() {
        let mut raw = minimal_raw();
        raw["sentiment"]["overall"]["label"] = json!("euphoric");
        raw["sentiment"]["market"]["time_horizon"] = json!("forever");

        let payload = normalize(&raw, "m").unwrap();
        assert_eq!(payload.sentiment.overall.label, SentimentLabel::Neutral);
        assert_eq!(payload.sentiment.market.time_horizon, TimeHorizon::Medium);
    }

    #[test]
    fn test_themes_truncated() {
        let mut raw = minimal_raw();
        raw["sentiment"]["themes"] = json!(["a", "b", "c", "d", "e", "f", "g", "h"]);
        let payload = normalize(&raw, "m").unwrap();
        assert_eq!(payload.sentiment.themes.len(), MAX_THEMES);
    }

    #[test]
    fn test_missing_sentiment_is_error() {
        let raw = json!({"impact": {"overall": 0.5, "volatility": 0.5}});
        assert!(normalize(&raw, "m").is_err());
    }

    #[test]
    fn test_missing_impact_is_error() {
        let mut raw = minimal_raw();
        raw.as_object_mut().unwrap().remove("impact");
        assert!(normalize(&raw, "m").is_err());
    }

    #[test]
    fn test_geopolitical_parsed_and_truncated() {
        let mut raw = minimal_raw();
        raw["geopolitical"] = json!({
            "stability_score": -0.5,
            "economic_impact": -0.4,
            "security_relevance": 0.9,
            "diplomatic_impact": {"global": -0.3, "western": -0.6, "regional": -0.9},
            "impact_beneficiaries": ["US", "GB", "FR", "DE"],
            "impact_affected": ["RU"],
            "regions_affected": ["eastern_europe"],
            "time_horizon": "immediate",
            "confidence": 0.8,
            "escalation_potential": 0.7,
            "alliance_activation": ["NATO"],
            "conflict_type": "hybrid"
        });

        let payload = normalize(&raw, "m").unwrap();
        let geo = payload.geopolitical.unwrap();
        assert_eq!(geo.impact_beneficiaries.len(), MAX_GEO_ACTORS);
        assert_eq!(geo.time_horizon, GeoTimeHorizon::Immediate);
        assert_eq!(geo.conflict_type, ConflictType::Hybrid);
    }

    #[test]
    fn test_vacant_geopolitical_dropped() {
        let mut raw = minimal_raw();
        raw["geopolitical"] = json!({
            "stability_score": 0.0,
            "economic_impact": 0.0,
            "security_relevance": 0.0,
            "impact_beneficiaries": [],
            "impact_affected": [],
            "regions_affected": [],
            "confidence": 0.0,
            "escalation_potential": 0.0,
            "alliance_activation": []
        });
        let payload = normalize(&raw, "m").unwrap();
        assert!(payload.geopolitical.is_none());
    }

    #[test]
    fn test_non_string_theme_entries_skipped() {
        let mut raw = minimal_raw();
        raw["sentiment"]["themes"] = json!(["ok", 42, null, "also-ok"]);
        let payload = normalize(&raw, "m").unwrap();
        assert_eq!(payload.sentiment.themes, vec!["ok", "also-ok"]);
    }
}
