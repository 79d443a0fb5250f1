// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model pricing tables and cost estimation.
//!
//! Prices are USD per million units. A unit is a token for text models,
//! an input minute for whisper-1, and a generated image for dall-e-3;
//! the per-million rates below are scaled so the same formula applies
//! to all three.

/// Per-model pricing in USD per million input/output units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_munit: f64,
    pub output_per_munit: f64,
}

/// Look up pricing for a model identifier.
///
/// Unknown models fall back to gpt-4o-mini pricing so usage records are
/// never silently dropped.
pub fn get_pricing(model: &str) -> ModelPricing {
    let lower = model.to_lowercase();

    if lower.contains("gpt-4o-mini") {
        ModelPricing {
            input_per_munit: 0.15,
            output_per_munit: 0.60,
        }
    } else if lower.contains("gpt-4o") {
        ModelPricing {
            input_per_munit: 5.00,
            output_per_munit: 15.00,
        }
    } else if lower.contains("gpt-4") {
        // Covers gpt-4 and gpt-4-turbo.
        ModelPricing {
            input_per_munit: 10.00,
            output_per_munit: 30.00,
        }
    } else if lower.contains("gpt-3.5") {
        ModelPricing {
            input_per_munit: 0.50,
            output_per_munit: 1.50,
        }
    } else if lower.contains("whisper") {
        // $0.006 per minute of audio.
        ModelPricing {
            input_per_munit: 6000.0,
            output_per_munit: 0.0,
        }
    } else if lower.contains("dall-e") {
        // $0.04 per 1024x1024 image.
        ModelPricing {
            input_per_munit: 40_000.0,
            output_per_munit: 0.0,
        }
    } else {
        ModelPricing {
            input_per_munit: 0.15,
            output_per_munit: 0.60,
        }
    }
}

/// Estimate cost in USD for one call.
pub fn calculate_cost(model: &str, input_units: u64, output_units: u64) -> f64 {
    let pricing = get_pricing(model);
    let input = (input_units as f64 / 1_000_000.0) * pricing.input_per_munit;
    let output = (output_units as f64 / 1_000_000.0) * pricing.output_per_munit;
    input + output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpt_4o_mini_matches_before_gpt_4o() {
        let p = get_pricing("gpt-4o-mini");
        assert!((p.input_per_munit - 0.15).abs() < f64::EPSILON);
        let p = get_pricing("gpt-4o");
        assert!((p.input_per_munit - 5.00).abs() < f64::EPSILON);
    }

    #[test]
    fn gpt_4_turbo_uses_gpt_4_pricing() {
        let p = get_pricing("gpt-4-turbo");
        assert!((p.input_per_munit - 10.00).abs() < f64::EPSILON);
        assert!((p.output_per_munit - 30.00).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_model_falls_back_to_mini() {
        let p = get_pricing("some-new-model");
        assert!((p.input_per_munit - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn chat_cost_formula() {
        // 1000 input + 500 output on gpt-4o.
        let cost = calculate_cost("gpt-4o", 1000, 500);
        let expected = (1000.0 / 1e6) * 5.0 + (500.0 / 1e6) * 15.0;
        assert!((cost - expected).abs() < 1e-12);
    }

    #[test]
    fn one_dall_e_image_costs_four_cents() {
        let cost = calculate_cost("dall-e-3", 1, 0);
        assert!((cost - 0.04).abs() < 1e-9);
    }

    #[test]
    fn one_whisper_minute_costs_point_six_cents() {
        let cost = calculate_cost("whisper-1", 1, 0);
        assert!((cost - 0.006).abs() < 1e-9);
    }

    #[test]
    fn zero_units_zero_cost() {
        assert!((calculate_cost("gpt-4o", 0, 0) - 0.0).abs() < f64::EPSILON);
    }
}
