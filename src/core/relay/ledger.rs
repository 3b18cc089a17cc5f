//! Incremental cost accounting from cumulative usage counters.
//!
//! The upstream reports usage as running totals for the whole upstream session.
//! Billing each report as-is would charge earlier tokens again, so the ledger
//! keeps the previous snapshot and bills only the per-field difference.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::pricing::TokenPricing;

/// Cumulative token counters for one upstream session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
}

impl UsageSnapshot {
    pub const fn new(input_tokens: u64, output_tokens: u64, cached_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            cached_tokens,
        }
    }

    /// Read a snapshot from a `response.usage` object.
    ///
    /// Cached tokens live under `input_token_details.cached_tokens`. Missing or
    /// non-numeric counters read as zero. Returns `None` if `usage` is not an
    /// object or carries none of the three counters.
    pub fn from_usage(usage: &Value) -> Option<Self> {
        let obj = usage.as_object()?;
        let input = obj.get("input_tokens");
        let output = obj.get("output_tokens");
        let cached = usage.pointer("/input_token_details/cached_tokens");
        if input.is_none() && output.is_none() && cached.is_none() {
            return None;
        }

        let counter = |v: Option<&Value>| v.and_then(Value::as_u64).unwrap_or(0);
        Some(Self {
            input_tokens: counter(input),
            output_tokens: counter(output),
            cached_tokens: counter(cached),
        })
    }

    /// Per-field difference, clamped at zero.
    ///
    /// The second element is true if any counter went backwards.
    fn delta_since(&self, previous: &Self) -> (Self, bool) {
        let regressed = self.input_tokens < previous.input_tokens
            || self.output_tokens < previous.output_tokens
            || self.cached_tokens < previous.cached_tokens;

        let delta = Self {
            input_tokens: self.input_tokens.saturating_sub(previous.input_tokens),
            output_tokens: self.output_tokens.saturating_sub(previous.output_tokens),
            cached_tokens: self.cached_tokens.saturating_sub(previous.cached_tokens),
        };
        (delta, regressed)
    }
}

/// Cost payload sent to the client in `cost.update` messages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostData {
    pub total: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
}

/// Running cost for one relay session.
#[derive(Debug, Clone)]
pub struct CostLedger {
    pricing: TokenPricing,
    session_cost: f64,
    last: UsageSnapshot,
    anomalies: u32,
}

impl CostLedger {
    pub fn new(pricing: TokenPricing) -> Self {
        Self {
            pricing,
            session_cost: 0.0,
            last: UsageSnapshot::default(),
            anomalies: 0,
        }
    }

    /// Record a cumulative snapshot and return the cost of the tokens added since
    /// the previous one.
    ///
    /// A counter lower than its predecessor without an intervening [`reset`](Self::reset)
    /// contributes nothing and is counted as an anomaly. The stored snapshot still
    /// moves to the new values so later deltas are measured from them.
    pub fn update(&mut self, usage: UsageSnapshot) -> f64 {
        let (delta, regressed) = usage.delta_since(&self.last);
        if regressed {
            self.anomalies += 1;
            tracing::warn!(
                previous = ?self.last,
                current = ?usage,
                "Cumulative usage went backwards without a new session, clamping delta at zero"
            );
        }

        self.last = usage;

        let incremental = self
            .pricing
            .cost(delta.input_tokens, delta.output_tokens, delta.cached_tokens);
        self.session_cost += incremental;
        incremental
    }

    /// Forget all usage; the next update is billed in full.
    pub fn reset(&mut self) {
        self.session_cost = 0.0;
        self.last = UsageSnapshot::default();
    }

    /// Total cost accrued since the last reset.
    pub fn session_cost(&self) -> f64 {
        self.session_cost
    }

    /// Most recent cumulative snapshot.
    pub fn last_snapshot(&self) -> UsageSnapshot {
        self.last
    }

    /// Number of counter regressions observed over the ledger's lifetime.
    pub fn anomalies(&self) -> u32 {
        self.anomalies
    }

    pub fn pricing(&self) -> &TokenPricing {
        &self.pricing
    }

    /// Snapshot of the running totals for a `cost.update` message.
    pub fn cost_data(&self) -> CostData {
        CostData {
            total: self.session_cost,
            input_tokens: self.last.input_tokens,
            output_tokens: self.last.output_tokens,
            cached_tokens: self.last.cached_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ledger() -> CostLedger {
        CostLedger::new(TokenPricing::new(0.032, 0.064, 0.0004))
    }

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_successive_updates_bill_deltas() {
        let mut ledger = ledger();
        let pricing = *ledger.pricing();

        let s1 = UsageSnapshot::new(100, 50, 10);
        let s2 = UsageSnapshot::new(150, 80, 10);

        let first = ledger.update(s1);
        assert!(approx_eq(first, pricing.cost(100, 50, 10)));

        let second = ledger.update(s2);
        assert!(approx_eq(second, pricing.cost(50, 30, 0)));

        // Sum of incrementals equals the cost of the final cumulative snapshot
        assert!(approx_eq(first + second, pricing.cost(150, 80, 10)));
        assert!(approx_eq(ledger.session_cost(), pricing.cost(150, 80, 10)));
        assert_eq!(ledger.anomalies(), 0);
    }

    #[test]
    fn test_reset_restores_first_update_semantics() {
        let mut ledger = ledger();
        ledger.update(UsageSnapshot::new(500, 400, 300));
        ledger.reset();

        assert_eq!(ledger.session_cost(), 0.0);
        assert_eq!(ledger.last_snapshot(), UsageSnapshot::default());

        let cost = ledger.update(UsageSnapshot::new(20, 5, 0));
        assert!(approx_eq(cost, ledger.pricing().cost(20, 5, 0)));
        assert_eq!(ledger.anomalies(), 0);
    }

    #[test]
    fn test_repeated_snapshot_costs_nothing() {
        let mut ledger = ledger();
        ledger.update(UsageSnapshot::new(100, 50, 10));
        assert_eq!(ledger.update(UsageSnapshot::new(100, 50, 10)), 0.0);
    }

    #[test]
    fn test_regression_is_clamped_and_flagged() {
        let mut ledger = ledger();
        ledger.update(UsageSnapshot::new(100, 50, 10));
        let before = ledger.session_cost();

        // input went backwards, output advanced by 10
        let cost = ledger.update(UsageSnapshot::new(40, 60, 10));
        assert!(approx_eq(cost, ledger.pricing().cost(0, 10, 0)));
        assert!(cost >= 0.0);
        assert!(ledger.session_cost() >= before);
        assert_eq!(ledger.anomalies(), 1);
        assert_eq!(ledger.last_snapshot(), UsageSnapshot::new(40, 60, 10));
    }

    #[test]
    fn test_snapshot_from_usage_object() {
        let usage = json!({
            "total_tokens": 320,
            "input_tokens": 200,
            "output_tokens": 100,
            "input_token_details": { "cached_tokens": 20, "audio_tokens": 150 }
        });
        assert_eq!(
            UsageSnapshot::from_usage(&usage),
            Some(UsageSnapshot::new(200, 100, 20))
        );
    }

    #[test]
    fn test_snapshot_missing_fields_read_as_zero() {
        let usage = json!({ "output_tokens": 7 });
        assert_eq!(
            UsageSnapshot::from_usage(&usage),
            Some(UsageSnapshot::new(0, 7, 0))
        );
        assert_eq!(UsageSnapshot::from_usage(&json!(null)), None);
    }

    #[test]
    fn test_snapshot_requires_a_counter() {
        assert_eq!(UsageSnapshot::from_usage(&json!({})), None);
        assert_eq!(UsageSnapshot::from_usage(&json!({"total_tokens": 5})), None);
        assert_eq!(
            UsageSnapshot::from_usage(&json!({"input_token_details": {"cached_tokens": 3}})),
            Some(UsageSnapshot::new(0, 0, 3))
        );
    }

    #[test]
    fn test_cost_data_serializes_camel_case() {
        let mut ledger = ledger();
        ledger.update(UsageSnapshot::new(200, 100, 20));
        let value = serde_json::to_value(ledger.cost_data()).unwrap();

        assert_eq!(value["inputTokens"], 200);
        assert_eq!(value["outputTokens"], 100);
        assert_eq!(value["cachedTokens"], 20);
        assert!(approx_eq(value["total"].as_f64().unwrap(), 0.012808));
    }
}
