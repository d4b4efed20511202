//! Deterministic preview: scope + params → counts and cost, no side
//! effects. Identical inputs always produce identical counts and (within
//! float tolerance) identical estimates.

use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use newswire_core::{RunParams, RunScope};
use newswire_llm::pricing::price_for;
use newswire_store::{AnalysisStore, RunItemStore, StoreError};

use crate::scope::resolve_scope;

/// How many sample ids a preview carries.
const SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Preview {
    pub total_items: usize,
    pub already_analyzed: usize,
    pub to_analyze: usize,
    pub estimated_cost_usd: f64,
    pub estimated_duration_minutes: f64,
    pub sample_item_ids: Vec<Uuid>,
    /// True when some scoped item is already held by an active run.
    pub has_conflicts: bool,
}

/// Estimated USD cost for `to_analyze` items at the given average token
/// budget, using the model's per-1M estimation price.
pub fn estimate_cost(to_analyze: usize, avg_tokens_per_item: u32, model_tag: &str) -> f64 {
    let price_per_1m = price_for(model_tag).input_per_1m;
    to_analyze as f64 * avg_tokens_per_item as f64 * price_per_1m / 1_000_000.0
}

/// Estimated wall-clock minutes at the given request rate.
pub fn estimate_duration_minutes(to_analyze: usize, rate_per_second: f64) -> f64 {
    if rate_per_second <= 0.0 {
        return 0.0;
    }
    to_analyze as f64 / rate_per_second / 60.0
}

/// Compute the preview for a scope + params pair.
pub async fn compute_preview(
    pool: &PgPool,
    scope: &RunScope,
    params: &RunParams,
    model_tag: &str,
    avg_tokens_per_item: u32,
    rate_per_second: f64,
) -> Result<Preview, StoreError> {
    let ids = resolve_scope(pool, scope, params).await?;
    let total_items = ids.len();

    let already_analyzed = if ids.is_empty() {
        0
    } else {
        AnalysisStore::existing_among(pool, &ids).await?.len()
    };

    let to_analyze = if params.override_existing {
        total_items
    } else {
        total_items - already_analyzed
    };

    let has_conflicts = if ids.is_empty() {
        false
    } else {
        !RunItemStore::active_item_ids(pool, &ids).await?.is_empty()
    };

    let rate = params.rate_per_second.unwrap_or(rate_per_second);

    Ok(Preview {
        total_items,
        already_analyzed,
        to_analyze,
        estimated_cost_usd: estimate_cost(to_analyze, avg_tokens_per_item, model_tag),
        estimated_duration_minutes: estimate_duration_minutes(to_analyze, rate),
        sample_item_ids: ids.into_iter().take(SAMPLE_SIZE).collect(),
        has_conflicts,
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_cost_formula() {
        // 5 items × 500 tokens × price(haiku)=1.0/1M
        let cost = estimate_cost(5, 500, "claude-haiku-4-5");
        assert!((cost - 0.0025).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_cost_zero_items() {
        assert_eq!(estimate_cost(0, 500, "claude-haiku-4-5"), 0.0);
    }

    #[test]
    fn test_estimate_cost_is_deterministic() {
        let a = estimate_cost(123, 500, "gpt-4o-mini");
        let b = estimate_cost(123, 500, "gpt-4o-mini");
        assert_eq!(a, b);
    }

    #[test]
    fn test_estimate_duration() {
        // 120 items at 2/sec = 60 seconds = 1 minute.
        assert!((estimate_duration_minutes(120, 2.0) - 1.0).abs() < 1e-12);
        assert_eq!(estimate_duration_minutes(10, 0.0), 0.0);
    }
}
