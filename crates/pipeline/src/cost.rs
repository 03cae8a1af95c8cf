//! Per-step cost estimation

use serde::Serialize;
use spurgeon_common::Usage;

/// USD per million billable (uncached) input tokens
const GPT5_INPUT_PER_MILLION: f64 = 1.25;
/// USD per million cached input tokens
const GPT5_CACHED_INPUT_PER_MILLION: f64 = 0.125;
/// USD per million output tokens
const GPT5_OUTPUT_PER_MILLION: f64 = 10.0;

/// Price table applied to a step's usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostModel {
    Gpt5,
    /// Embedding calls are not priced
    Embeddings,
}

impl CostModel {
    pub fn estimate(&self, usage: &Usage) -> f64 {
        match self {
            CostModel::Gpt5 => {
                (usage.billable_input_tokens() as f64 * GPT5_INPUT_PER_MILLION
                    + usage.cached_input_tokens as f64 * GPT5_CACHED_INPUT_PER_MILLION
                    + usage.output_tokens as f64 * GPT5_OUTPUT_PER_MILLION)
                    / 1_000_000.0
            }
            CostModel::Embeddings => 0.0,
        }
    }
}

/// Timing, usage and cost of one pipeline step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepMetrics {
    pub timings_ms: f64,
    pub tokens_used: Usage,
    pub estimated_cost: f64,
}

impl StepMetrics {
    pub fn new(timings_ms: f64, usage: Usage, model: CostModel) -> Self {
        Self {
            timings_ms,
            tokens_used: usage,
            estimated_cost: model.estimate(&usage),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_timings_ms: f64,
    pub total_estimated_cost: f64,
}

impl Summary {
    pub fn of(steps: &[&StepMetrics]) -> Self {
        Self {
            total_timings_ms: steps.iter().map(|s| s.timings_ms).sum(),
            total_estimated_cost: steps.iter().map(|s| s.estimated_cost).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_gpt5_pricing() {
        let usage = Usage::new(1_000_000, 0, 0, 0);
        assert!(close(CostModel::Gpt5.estimate(&usage), 1.25));

        let usage = Usage::new(1_000, 400, 200, 0);
        // 600 billable, 400 cached, 200 output
        let expected = (600.0 * 1.25 + 400.0 * 0.125 + 200.0 * 10.0) / 1e6;
        assert!(close(CostModel::Gpt5.estimate(&usage), expected));
    }

    #[test]
    fn test_cached_exceeding_input_is_not_negative() {
        let usage = Usage::new(10, 50, 0, 0);
        let cost = CostModel::Gpt5.estimate(&usage);
        assert!(close(cost, 50.0 * 0.125 / 1e6));
    }

    #[test]
    fn test_embeddings_are_free() {
        let usage = Usage::new(5_000, 0, 0, 0);
        assert_eq!(CostModel::Embeddings.estimate(&usage), 0.0);
    }

    #[test]
    fn test_summary_totals() {
        let a = StepMetrics::new(10.0, Usage::new(1_000_000, 0, 0, 0), CostModel::Gpt5);
        let b = StepMetrics::new(5.5, Usage::default(), CostModel::Embeddings);
        let summary = Summary::of(&[&a, &b]);
        assert!(close(summary.total_timings_ms, 15.5));
        assert!(close(summary.total_estimated_cost, 1.25));
    }
}
