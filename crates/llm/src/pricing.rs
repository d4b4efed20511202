//! Built-in per-model pricing table (USD per million tokens).

/// USD prices per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

/// Known model tags. Prefix-matched so dated tags (`claude-haiku-4-5-...`)
/// resolve to their family entry.
const PRICING: &[(&str, ModelPricing)] = &[
    (
        "claude-haiku-4-5",
        ModelPricing {
            input_per_1m: 1.0,
            output_per_1m: 5.0,
        },
    ),
    (
        "claude-sonnet-4-5",
        ModelPricing {
            input_per_1m: 3.0,
            output_per_1m: 15.0,
        },
    ),
    (
        "claude-opus-4-5",
        ModelPricing {
            input_per_1m: 5.0,
            output_per_1m: 25.0,
        },
    ),
    (
        "gpt-4o-mini",
        ModelPricing {
            input_per_1m: 0.15,
            output_per_1m: 0.6,
        },
    ),
    (
        "gpt-4o",
        ModelPricing {
            input_per_1m: 2.5,
            output_per_1m: 10.0,
        },
    ),
];

/// Fallback for unknown model tags.
const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input_per_1m: 3.0,
    output_per_1m: 15.0,
};

/// Price for a model tag; unknown tags get the default price.
pub fn price_for(model_tag: &str) -> ModelPricing {
    // Longest prefix wins so "gpt-4o" does not shadow "gpt-4o-mini".
    PRICING
        .iter()
        .filter(|(tag, _)| model_tag.starts_with(tag))
        .max_by_key(|(tag, _)| tag.len())
        .map(|(_, pricing)| *pricing)
        .unwrap_or(DEFAULT_PRICING)
}

/// Cost in USD for a single call's token usage.
pub fn cost_usd(model_tag: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let pricing = price_for(model_tag);
    (input_tokens as f64 * pricing.input_per_1m + output_tokens as f64 * pricing.output_per_1m)
        / 1_000_000.0
}

// ── Tests ────────────────────────────────────────────────────────────
