//! Canonical analysis payload stored per item.
//!
//! The structure mirrors what the classifier model is asked to emit:
//! sentiment + impact always, a geopolitical block only when the article
//! warrants one. All scores live in declared ranges; normalization at the
//! LLM boundary enforces them before anything is persisted.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MAX_THEMES: usize = 6;
pub const MAX_GEO_ACTORS: usize = 3;

// ── Sentiment ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl Default for SentimentLabel {
    fn default() -> Self {
        Self::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    Short,
    Medium,
    Long,
}

impl Default for TimeHorizon {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OverallSentiment {
    pub label: SentimentLabel,
    /// -1.0..1.0
    pub score: f64,
    /// 0.0..1.0
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MarketSentiment {
    /// 0..1
    pub bullish: f64,
    /// 0..1
    pub bearish: f64,
    /// 0..1
    pub uncertainty: f64,
    pub time_horizon: TimeHorizon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SentimentPayload {
    pub overall: OverallSentiment,
    pub market: MarketSentiment,
    /// 0..1
    pub urgency: f64,
    /// At most [`MAX_THEMES`] entries.
    pub themes: Vec<String>,
}

// ── Impact ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ImpactPayload {
    /// 0..1
    pub overall: f64,
    /// 0..1
    pub volatility: f64,
}

// ── Geopolitical (optional) ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GeoTimeHorizon {
    Immediate,
    ShortTerm,
    LongTerm,
}

impl Default for GeoTimeHorizon {
    fn default() -> Self {
        Self::ShortTerm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Diplomatic,
    Economic,
    Hybrid,
    InterstateWar,
    NuclearThreat,
}

impl Default for ConflictType {
    fn default() -> Self {
        Self::Diplomatic
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DiplomaticImpact {
    /// -1..1
    pub global: f64,
    /// -1..1
    pub western: f64,
    /// -1..1
    pub regional: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeopoliticalPayload {
    /// -1..1
    pub stability_score: f64,
    /// -1..1
    pub economic_impact: f64,
    /// 0..1
    pub security_relevance: f64,
    pub diplomatic_impact: DiplomaticImpact,
    /// ISO-3166-1 alpha-2 codes or bloc tokens; at most [`MAX_GEO_ACTORS`].
    pub impact_beneficiaries: Vec<String>,
    /// At most [`MAX_GEO_ACTORS`].
    pub impact_affected: Vec<String>,
    pub regions_affected: Vec<String>,
    pub time_horizon: GeoTimeHorizon,
    /// 0..1
    pub confidence: f64,
    /// 0..1
    pub escalation_potential: f64,
    pub alliance_activation: Vec<String>,
    pub conflict_type: ConflictType,
}

impl GeopoliticalPayload {
    /// True when every score is zero and every list empty — the model
    /// emitted a placeholder block that should be dropped, not stored.
    pub fn is_vacant(&self) -> bool {
        self.stability_score == 0.0
            && self.economic_impact == 0.0
            && self.security_relevance == 0.0
            && self.diplomatic_impact == DiplomaticImpact::default()
            && self.impact_beneficiaries.is_empty()
            && self.impact_affected.is_empty()
            && self.regions_affected.is_empty()
            && self.confidence == 0.0
            && self.escalation_potential == 0.0
            && self.alliance_activation.is_empty()
    }
}

// ── Combined payload ─────────────────────────────────────────────────

/// The full per-item analysis record, as stored and as served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemAnalysisPayload {
    pub sentiment: SentimentPayload,
    pub impact: ImpactPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geopolitical: Option<GeopoliticalPayload>,
    pub model_tag: String,
}

// ── Tests ────────────────────────────────────────────────────────────
