//! # Estimating Converter
//!
//! Last resort when the deterministic table has no factor for a unit pair.
//! The inference endpoint is asked for a bare number, and that number is
//! clamped into a band around the input amount before it can reach stock.
//!
//! ## Guardrails
//!
//! For an input `amount` and estimate `e`:
//!
//! | Estimate | Result |
//! | --- | --- |
//! | `e <= 0` | `amount` (unconverted) |
//! | `e > 10_000 * amount` | `1_000 * amount` |
//! | `e < 0.0001 * amount` | `0.01 * amount` |
//! | otherwise | `e` |
//!
//! A reply that is not a finite number, or a failed call, also yields the
//! unconverted amount.

use tracing::{info, warn};

use crate::llm::{InferenceRequest, InferenceTask, LanguageModel};

const CEILING_RATIO: f64 = 10_000.0;
const CEILING_REPLACEMENT: f64 = 1_000.0;
const FLOOR_RATIO: f64 = 0.0001;
const FLOOR_REPLACEMENT: f64 = 0.01;

/// Clamp an untrusted estimate for `amount`
pub fn apply_guardrails(amount: f64, estimate: f64) -> f64 {
    if estimate <= 0.0 {
        amount
    } else if estimate > amount * CEILING_RATIO {
        amount * CEILING_REPLACEMENT
    } else if estimate < amount * FLOOR_RATIO {
        amount * FLOOR_REPLACEMENT
    } else {
        estimate
    }
}

/// Parse a bare numeric reply; non-finite values count as unparseable
pub fn parse_estimate(reply: &str) -> Option<f64> {
    reply
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Estimate `amount` of `ingredient` in `from_unit` expressed in `to_unit`
pub async fn estimate_conversion(
    model: &dyn LanguageModel,
    ingredient: &str,
    amount: f64,
    from_unit: &str,
    to_unit: &str,
) -> f64 {
    let request = InferenceRequest::new(
        InferenceTask::EstimateConversion,
        build_estimation_prompt(ingredient, amount, from_unit, to_unit),
    );

    let reply = match model.complete(&request).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(ingredient, error = %err, "Estimation call failed, keeping original amount");
            return amount;
        }
    };

    let Some(estimate) = parse_estimate(&reply) else {
        warn!(ingredient, reply = %reply.trim(), "Non-numeric estimate, keeping original amount");
        return amount;
    };

    let clamped = apply_guardrails(amount, estimate);
    if clamped != estimate {
        warn!(ingredient, estimate, clamped, "Estimate clamped by guardrails");
    }
    info!(
        ingredient,
        amount,
        from_unit,
        to_unit,
        result = clamped,
        "Estimated unit conversion"
    );
    clamped
}

fn build_estimation_prompt(ingredient: &str, amount: f64, from_unit: &str, to_unit: &str) -> String {
    format!(
        r#"You are estimating ingredient quantities for a cooking inventory app.

IMPORTANT:
- Conversion may be physically ambiguous
- Make a reasonable culinary assumption
- Approximation is acceptable

Ingredient: {ingredient}
Convert: {amount} {from_unit} -> {to_unit}

Rules:
- Return ONLY a number
- Round to 2 decimals
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_guardrail_clamps() {
        assert!(approx_eq(apply_guardrails(10.0, 999_999.0), 10_000.0));
        assert!(approx_eq(apply_guardrails(10.0, -5.0), 10.0));
        assert!(approx_eq(apply_guardrails(10.0, 0.0), 10.0));
        assert!(approx_eq(apply_guardrails(10.0, 0.00001), 0.1));
        assert!(approx_eq(apply_guardrails(10.0, 42.5), 42.5));
    }

    #[test]
    fn test_guardrail_boundaries_are_accepted() {
        assert!(approx_eq(apply_guardrails(10.0, 100_000.0), 100_000.0));
        assert!(approx_eq(apply_guardrails(10.0, 0.001), 0.001));
    }

    #[test]
    fn test_parse_estimate() {
        assert_eq!(parse_estimate(" 12.5\n"), Some(12.5));
        assert_eq!(parse_estimate("about 12"), None);
        assert_eq!(parse_estimate("NaN"), None);
        assert_eq!(parse_estimate("inf"), None);
    }

    #[tokio::test]
    async fn test_estimate_is_clamped() {
        let model =
            ScriptedModel::new().on(InferenceTask::EstimateConversion, "Saffron", "999999");
        let result = estimate_conversion(&model, "Saffron", 10.0, "pcs", "gram").await;
        assert!(approx_eq(result, 10_000.0));

        let prompt = &model.requests()[0].prompt;
        assert!(prompt.contains("Convert: 10 pcs -> gram"));
    }

    #[tokio::test]
    async fn test_unparseable_reply_keeps_amount() {
        let model = ScriptedModel::new().on(
            InferenceTask::EstimateConversion,
            "Egg",
            "roughly fifty grams",
        );
        let result = estimate_conversion(&model, "Egg", 3.0, "pcs", "gram").await;
        assert!(approx_eq(result, 3.0));
    }

    #[tokio::test]
    async fn test_failed_call_keeps_amount() {
        let model = ScriptedModel::new();
        let result = estimate_conversion(&model, "Egg", 3.0, "pcs", "gram").await;
        assert!(approx_eq(result, 3.0));
    }
}
