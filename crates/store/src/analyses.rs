//! Stored per-item classifications (`item_analyses`).
//!
//! The JSONB columns are written only with payloads that passed boundary
//! normalization; the typed accessor re-validates on the way out so stale
//! or hand-edited rows cannot leak malformed structures.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use newswire_core::{
    GeopoliticalPayload, ImpactPayload, ItemAnalysisPayload, SentimentPayload,
};

use crate::error::StoreError;

/// Raw row from `item_analyses`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemAnalysisRow {
    pub item_id: Uuid,
    pub sentiment_json: serde_json::Value,
    pub impact_json: serde_json::Value,
    pub geopolitical_json: Option<serde_json::Value>,
    pub model_tag: String,
    pub updated_at: DateTime<Utc>,
}

impl ItemAnalysisRow {
    /// Typed accessor; enforces the payload schema on the way out.
    pub fn payload(&self) -> Result<ItemAnalysisPayload, serde_json::Error> {
        let sentiment: SentimentPayload = serde_json::from_value(self.sentiment_json.clone())?;
        let impact: ImpactPayload = serde_json::from_value(self.impact_json.clone())?;
        let geopolitical: Option<GeopoliticalPayload> = match &self.geopolitical_json {
            Some(v) => Some(serde_json::from_value(v.clone())?),
            None => None,
        };
        Ok(ItemAnalysisPayload {
            sentiment,
            impact,
            geopolitical,
            model_tag: self.model_tag.clone(),
        })
    }
}

/// Stateless store for `item_analyses`.
pub struct AnalysisStore;

impl AnalysisStore {
    /// Upsert keyed by item id. When `only_if_absent` is set the write is a
    /// no-op if a row already exists (first-writer-wins for runs with
    /// `override_existing=false`); returns whether a row was written.
    pub async fn upsert(
        pool: &PgPool,
        item_id: Uuid,
        payload: &ItemAnalysisPayload,
        only_if_absent: bool,
    ) -> Result<bool, StoreError> {
        let sentiment = serde_json::to_value(&payload.sentiment)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let impact = serde_json::to_value(&payload.impact)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let geopolitical = match &payload.geopolitical {
            Some(geo) => Some(
                serde_json::to_value(geo).map_err(|e| StoreError::Validation(e.to_string()))?,
            ),
            None => None,
        };

        let sql = if only_if_absent {
            "INSERT INTO item_analyses (item_id, sentiment_json, impact_json, geopolitical_json, model_tag)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (item_id) DO NOTHING"
        } else {
            "INSERT INTO item_analyses (item_id, sentiment_json, impact_json, geopolitical_json, model_tag)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (item_id) DO UPDATE SET
                sentiment_json = EXCLUDED.sentiment_json,
                impact_json = EXCLUDED.impact_json,
                geopolitical_json = EXCLUDED.geopolitical_json,
                model_tag = EXCLUDED.model_tag,
                updated_at = now()"
        };

        let result = sqlx::query(sql)
            .bind(item_id)
            .bind(sentiment)
            .bind(impact)
            .bind(geopolitical)
            .bind(&payload.model_tag)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(pool: &PgPool, item_id: Uuid) -> Result<Option<ItemAnalysisRow>, StoreError> {
        let row = sqlx::query_as::<_, ItemAnalysisRow>(
            "SELECT item_id, sentiment_json, impact_json, geopolitical_json, model_tag, updated_at
             FROM item_analyses WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    pub async fn exists(pool: &PgPool, item_id: Uuid) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM item_analyses WHERE item_id = $1)",
        )
        .bind(item_id)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    /// Which of the given item ids already have a stored analysis.
    pub async fn existing_among(
        pool: &PgPool,
        item_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT item_id FROM item_analyses WHERE item_id = ANY($1)",
        )
        .bind(item_ids)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }

    pub async fn count(pool: &PgPool) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM item_analyses")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// A recent analyzed row for the discovery examples endpoint.
    pub async fn example(pool: &PgPool) -> Result<Option<ItemAnalysisRow>, StoreError> {
        let row = sqlx::query_as::<_, ItemAnalysisRow>(
            "SELECT item_id, sentiment_json, impact_json, geopolitical_json, model_tag, updated_at
             FROM item_analyses ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use newswire_core::{
        MarketSentiment, OverallSentiment, SentimentLabel, SentimentPayload, TimeHorizon,
    };

    fn sample_row(geo: Option<serde_json::Value>) -> ItemAnalysisRow {
        ItemAnalysisRow {
            item_id: Uuid::new_v4(),
            sentiment_json: serde_json::json!({
                "overall": {"label": "neutral", "score": 0.0, "confidence": 0.5},
                "market": {"bullish": 0.2, "bearish": 0.3, "uncertainty": 0.5,
                           "time_horizon": "medium"},
                "urgency": 0.1,
                "themes": ["markets"]
            }),
            impact_json: serde_json::json!({"overall": 0.4, "volatility": 0.2}),
            geopolitical_json: geo,
            model_tag: "claude-haiku-4-5".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_typed_accessor_roundtrip() {
        let row = sample_row(None);
        let payload = row.payload().unwrap();
        assert_eq!(payload.sentiment.overall.label, SentimentLabel::Neutral);
        assert_eq!(payload.sentiment.market.time_horizon, TimeHorizon::Medium);
        assert!(payload.geopolitical.is_none());
        assert_eq!(payload.model_tag, "claude-haiku-4-5");
    }

    #[test]
    fn test_typed_accessor_rejects_malformed_sentiment() {
        let mut row = sample_row(None);
        row.sentiment_json = serde_json::json!({"overall": "broken"});
        assert!(row.payload().is_err());
    }

    #[test]
    fn test_typed_accessor_with_geopolitical() {
        let row = sample_row(Some(serde_json::json!({
            "stability_score": -0.3,
            "economic_impact": -0.2,
            "security_relevance": 0.6,
            "diplomatic_impact": {"global": -0.1, "western": -0.2, "regional": -0.5},
            "impact_beneficiaries": ["US"],
            "impact_affected": ["UA", "RU"],
            "regions_affected": ["eastern_europe"],
            "time_horizon": "short_term",
            "confidence": 0.7,
            "escalation_potential": 0.4,
            "alliance_activation": ["NATO"],
            "conflict_type": "economic"
        })));
        let payload = row.payload().unwrap();
        let geo = payload.geopolitical.unwrap();
        assert_eq!(geo.impact_affected.len(), 2);
        assert!((geo.stability_score + 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_payload_serialization_shape() {
        // The upsert path serializes exactly the stored column shapes.
        let payload = ItemAnalysisPayload {
            sentiment: SentimentPayload {
                overall: OverallSentiment {
                    label: SentimentLabel::Positive,
                    score: 0.4,
                    confidence: 0.9,
                },
                market: MarketSentiment {
                    bullish: 0.6,
                    bearish: 0.1,
                    uncertainty: 0.2,
                    time_horizon: TimeHorizon::Long,
                },
                urgency: 0.2,
                themes: vec![],
            },
            impact: ImpactPayload {
                overall: 0.3,
                volatility: 0.1,
            },
            geopolitical: None,
            model_tag: "m".to_string(),
        };
        let value = serde_json::to_value(&payload.sentiment).unwrap();
        assert_eq!(value["overall"]["label"], "positive");
        assert_eq!(value["market"]["time_horizon"], "long");
    }
}
