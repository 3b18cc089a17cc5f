//! Token pricing for realtime models.
//!
//! Single source of truth for per-token rates used by the session cost ledger.
//! Rates are USD per 1000 tokens for audio tokens, which dominate voice sessions.
//!
//! # Usage
//!
//! ```rust
//! use voice_relay::config::pricing::get_realtime_pricing;
//!
//! let pricing = get_realtime_pricing("openai", "gpt-realtime").unwrap();
//! let cost = pricing.cost(1000, 1000, 0);
//! assert!((cost - 0.096).abs() < 1e-9);
//! ```
//!
//! # Updates
//!
//! When provider pricing changes, update the table in this file.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Model used when the configured model has no pricing entry.
pub const FALLBACK_PRICING_MODEL: &str = "gpt-realtime";

/// Per-1K-token rates for a realtime model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenPricing {
    /// Price per 1000 uncached input tokens
    pub input_per_1k: f64,
    /// Price per 1000 output tokens
    pub output_per_1k: f64,
    /// Price per 1000 cached input tokens
    pub cached_per_1k: f64,
    /// Optional notes about pricing
    pub notes: Option<&'static str>,
}

impl TokenPricing {
    pub const fn new(input_per_1k: f64, output_per_1k: f64, cached_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
            cached_per_1k,
            notes: None,
        }
    }

    pub const fn with_notes(
        input_per_1k: f64,
        output_per_1k: f64,
        cached_per_1k: f64,
        notes: &'static str,
    ) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
            cached_per_1k,
            notes: Some(notes),
        }
    }

    /// Cost in USD of the given token counts. No rounding is applied.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64, cached_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_per_1k
            + (cached_tokens as f64 / 1000.0) * self.cached_per_1k
    }
}

impl Default for TokenPricing {
    fn default() -> Self {
        REALTIME_PRICING
            .get("openai:gpt-realtime")
            .copied()
            .unwrap_or(TokenPricing::new(0.032, 0.064, 0.0004))
    }
}

/// Realtime pricing database.
/// Key format: "provider:model" (lowercase)
static REALTIME_PRICING: LazyLock<HashMap<&'static str, TokenPricing>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // -------------------------------------------------------------------------
    // OpenAI Realtime (audio tokens)
    // https://openai.com/api/pricing/
    // -------------------------------------------------------------------------
    m.insert(
        "openai:gpt-realtime",
        TokenPricing::with_notes(0.032, 0.064, 0.0004, "$32/$64 per 1M, cached $0.40 per 1M"),
    );
    m.insert(
        "openai:gpt-4o-realtime-preview",
        TokenPricing::with_notes(0.04, 0.08, 0.0025, "$40/$80 per 1M, cached $2.50 per 1M"),
    );
    m.insert(
        "openai:gpt-4o-mini-realtime-preview",
        TokenPricing::with_notes(0.01, 0.02, 0.0003, "$10/$20 per 1M, cached $0.30 per 1M"),
    );

    m
});

/// Look up pricing for a provider/model pair (case-insensitive).
pub fn get_realtime_pricing(provider: &str, model: &str) -> Option<TokenPricing> {
    let key = format!("{}:{}", provider.to_lowercase(), model.to_lowercase());
    REALTIME_PRICING.get(key.as_str()).copied()
}

/// Pricing for a model, falling back to [`FALLBACK_PRICING_MODEL`] when unknown.
pub fn realtime_pricing_or_default(provider: &str, model: &str) -> TokenPricing {
    get_realtime_pricing(provider, model).unwrap_or_else(|| {
        tracing::warn!(
            provider,
            model,
            "No pricing entry for realtime model, using {} rates",
            FALLBACK_PRICING_MODEL
        );
        TokenPricing::default()
    })
}

/// List all priced realtime models as "provider:model" keys.
pub fn list_realtime_models() -> Vec<&'static str> {
    let mut models: Vec<_> = REALTIME_PRICING.keys().copied().collect();
    models.sort_unstable();
    models
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpt_realtime_pricing() {
        let p = get_realtime_pricing("openai", "gpt-realtime").unwrap();
        assert!((p.input_per_1k - 0.032).abs() < f64::EPSILON);
        assert!((p.output_per_1k - 0.064).abs() < f64::EPSILON);
        assert!((p.cached_per_1k - 0.0004).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pricing_case_insensitive() {
        let p1 = get_realtime_pricing("OPENAI", "GPT-Realtime");
        let p2 = get_realtime_pricing("openai", "gpt-realtime");
        assert!(p1.is_some());
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_rate_ordering() {
        // cached << input << output for every entry
        for key in list_realtime_models() {
            let (provider, model) = key.split_once(':').unwrap();
            let p = get_realtime_pricing(provider, model).unwrap();
            assert!(p.cached_per_1k < p.input_per_1k, "{key}");
            assert!(p.input_per_1k < p.output_per_1k, "{key}");
        }
    }

    #[test]
    fn test_cost_calculation() {
        let p = TokenPricing::new(0.032, 0.064, 0.0004);
        // 200 input, 100 output, 20 cached
        let cost = p.cost(200, 100, 20);
        assert!((cost - 0.012808).abs() < 1e-12);
        assert_eq!(p.cost(0, 0, 0), 0.0);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        assert!(get_realtime_pricing("openai", "nonexistent").is_none());
        let p = realtime_pricing_or_default("openai", "nonexistent");
        assert_eq!(p, TokenPricing::default());
        assert!((p.input_per_1k - 0.032).abs() < f64::EPSILON);
    }
}
