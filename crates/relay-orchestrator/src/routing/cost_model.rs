//! Cost model keyed by provider and model.

use crate::config::PricingEntry;
use relay_abstraction::{ProviderReply, Request, RequestKind, TokenUsage};
use std::collections::HashMap;
use tracing::debug;

/// Characters per token used when a provider does not report usage.
const CHARS_PER_TOKEN: usize = 4;

/// Price of one provider/model pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    /// USD per 1M input tokens.
    pub input_per_1m: f64,
    /// USD per 1M output tokens.
    pub output_per_1m: f64,
    /// Flat USD per media request.
    pub per_request: f64,
}

impl Pricing {
    /// Token-only pricing.
    #[must_use]
    pub fn per_token(input_per_1m: f64, output_per_1m: f64) -> Self {
        Self { input_per_1m, output_per_1m, per_request: 0.0 }
    }

    /// Flat per-request pricing.
    #[must_use]
    pub fn flat(per_request: f64) -> Self {
        Self { per_request, ..Self::default() }
    }
}

type PricingFn = Box<dyn Fn(&str, RequestKind) -> Pricing + Send + Sync>;

/// Computes request cost from token usage and a pricing table.
///
/// Lookup order: exact `provider:model`, then `provider:*`, then the
/// pricing function applied to the model id.
pub struct CostModel {
    table: HashMap<String, Pricing>,
    pricing_fn: PricingFn,
}

impl CostModel {
    /// Creates a cost model with default pattern-based pricing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pricing_fn(Box::new(Self::default_pricing))
    }

    /// Creates a cost model with a custom fallback pricing function.
    #[must_use]
    pub fn with_pricing_fn(pricing_fn: PricingFn) -> Self {
        Self { table: HashMap::new(), pricing_fn }
    }

    /// Creates a cost model with configured overrides on top of default pricing.
    #[must_use]
    pub fn from_entries(entries: &[PricingEntry]) -> Self {
        entries.iter().fold(Self::new(), |model, entry| {
            model.with_price(
                &entry.provider,
                &entry.model,
                Pricing {
                    input_per_1m: entry.input_per_1m,
                    output_per_1m: entry.output_per_1m,
                    per_request: entry.per_request,
                },
            )
        })
    }

    /// Sets the price of a provider/model pair. `model` may be `*`.
    #[must_use]
    pub fn with_price(mut self, provider: &str, model: &str, pricing: Pricing) -> Self {
        self.table.insert(format!("{}:{}", provider, model), pricing);
        self
    }

    /// Default pricing based on model id patterns.
    fn default_pricing(model_id: &str, kind: RequestKind) -> Pricing {
        let lower = model_id.to_lowercase();

        if lower.contains("echo") || lower.contains("mock") || lower.contains("local") {
            return Pricing::default();
        }

        match kind {
            RequestKind::Image => return Pricing::flat(0.04),
            RequestKind::Video => return Pricing::flat(0.50),
            RequestKind::Audio => return Pricing::flat(0.015),
            RequestKind::ThreeD => return Pricing::flat(0.20),
            _ => {}
        }

        if lower.contains("embed") {
            return Pricing::per_token(0.02, 0.0);
        }

        if lower.contains("haiku")
            || lower.contains("mini")
            || lower.contains("flash")
            || lower.contains("gpt-3.5")
        {
            return Pricing::per_token(0.25, 1.25);
        }

        if lower.contains("opus") || lower.contains("o1") {
            return Pricing::per_token(15.0, 75.0);
        }

        if lower.contains("sonnet") || lower.contains("gpt-4") || lower.contains("pro") {
            return Pricing::per_token(3.0, 15.0);
        }

        Pricing::per_token(1.0, 2.0)
    }

    /// Pricing for a provider/model pair.
    pub fn pricing(&self, provider: &str, model_id: &str, kind: RequestKind) -> Pricing {
        self.table
            .get(&format!("{}:{}", provider, model_id))
            .or_else(|| self.table.get(&format!("{}:*", provider)))
            .copied()
            .unwrap_or_else(|| (self.pricing_fn)(model_id, kind))
    }

    /// Estimates tokens for a character count.
    #[must_use]
    pub fn estimate_tokens(chars: usize) -> u64 {
        chars.div_ceil(CHARS_PER_TOKEN) as u64
    }

    /// Usage reported by the provider, or an estimate from request and output size.
    #[must_use]
    pub fn usage_for(request: &Request, reply: &ProviderReply) -> TokenUsage {
        reply.usage.unwrap_or_else(|| {
            TokenUsage::new(
                Self::estimate_tokens(request.input_chars()),
                Self::estimate_tokens(reply.payload.output_chars()),
            )
        })
    }

    /// Cost in USD of one successful call.
    pub fn cost(&self, provider: &str, model_id: &str, kind: RequestKind, usage: &TokenUsage) -> f64 {
        let pricing = self.pricing(provider, model_id, kind);
        let token_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * pricing.input_per_1m
            + (usage.completion_tokens as f64 / 1_000_000.0) * pricing.output_per_1m;
        let flat = if kind.is_media() { pricing.per_request } else { 0.0 };
        let cost = token_cost + flat;

        debug!(
            provider = provider,
            model_id = model_id,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cost = cost,
            "Computed request cost"
        );

        cost
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_abstraction::Payload;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(CostModel::estimate_tokens(0), 0);
        assert_eq!(CostModel::estimate_tokens(1), 1);
        assert_eq!(CostModel::estimate_tokens(8), 2);
        assert_eq!(CostModel::estimate_tokens(9), 3);
    }

    #[test]
    fn test_reported_usage_wins_over_estimate() {
        let request = Request::text("a".repeat(400));
        let reply = ProviderReply::new(Payload::text("b".repeat(40)), "m");
        assert_eq!(CostModel::usage_for(&request, &reply), TokenUsage::new(100, 10));

        let reported = reply.with_usage(TokenUsage::new(7, 3));
        assert_eq!(CostModel::usage_for(&request, &reported), TokenUsage::new(7, 3));
    }

    #[test]
    fn test_override_lookup_order() {
        let model = CostModel::new()
            .with_price("openai", "gpt-4o", Pricing::per_token(2.5, 10.0))
            .with_price("openai", "*", Pricing::per_token(9.0, 9.0));

        assert_eq!(model.pricing("openai", "gpt-4o", RequestKind::Text).input_per_1m, 2.5);
        assert_eq!(model.pricing("openai", "other", RequestKind::Text).input_per_1m, 9.0);
        assert_eq!(model.pricing("gemini", "gemini-flash", RequestKind::Text).input_per_1m, 0.25);
    }

    #[test]
    fn test_token_cost() {
        let model = CostModel::new().with_price("p", "m", Pricing::per_token(1.0, 2.0));
        let cost = model.cost("p", "m", RequestKind::Text, &TokenUsage::new(1_000_000, 500_000));
        assert!((cost - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_price_applies_only_to_media() {
        let model = CostModel::new().with_price("p", "m", Pricing::flat(0.1));
        let usage = TokenUsage::default();
        assert!((model.cost("p", "m", RequestKind::Image, &usage) - 0.1).abs() < 1e-9);
        assert_eq!(model.cost("p", "m", RequestKind::Text, &usage), 0.0);
    }

    #[test]
    fn test_from_entries() {
        let model = CostModel::from_entries(&[PricingEntry {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            input_per_1m: 2.5,
            output_per_1m: 10.0,
            per_request: 0.0,
        }]);
        assert_eq!(
            model.pricing("openai", "gpt-4o", RequestKind::Text),
            Pricing::per_token(2.5, 10.0)
        );
    }

    #[test]
    fn test_echo_models_are_free() {
        let model = CostModel::new();
        assert_eq!(model.pricing("echo", "echo-1", RequestKind::Image), Pricing::default());
    }
}
