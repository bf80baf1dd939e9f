//! Pipeline configuration
//!
//! Plain serde-backed value with defaults; the CLI loads overrides from
//! JSON. Every budget the passes consult lives here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Enable the abstract-interpretation lattice in constant propagation
    pub enhanced_constants: bool,

    /// Step bound for compile-time evaluation of pure calls
    pub partial_eval_step_bound: usize,

    /// Expressions above this node count are never sent to the solver
    pub smt_complexity_bound: usize,

    /// Per-query solver timeout (milliseconds); timeout reads as unknown
    pub smt_query_timeout_ms: u64,

    /// Wall-clock budget for the whole opaque-predicate pass
    pub smt_pass_budget_ms: u64,

    /// Weighted region-size + loop-count bound above which a dispatcher
    /// reconstruction aborts locally
    pub deflatten_complexity_bound: usize,

    /// Dispatcher detections scoring below this are not reconstructed
    pub deflatten_confidence_threshold: f64,

    /// Confidence-gated transformations (opaque-predicate replacement,
    /// renaming) below this threshold become suggestions instead
    pub apply_confidence_threshold: f64,

    /// Outer fixed-point rounds for prefix re-runs
    pub max_iterations: u32,

    /// Minimum observed calls before a function qualifies as a decoder
    pub decoder_min_calls: usize,

    /// Swap the structuring/renaming order
    pub rename_before_structuring: bool,

    /// Naming-helper request timeout (milliseconds)
    pub naming_helper_timeout_ms: u64,

    /// Continue past fatal pass errors, keeping the last consistent state
    pub best_effort: bool,

    /// Emit source-map mappings from the printer
    pub source_maps: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enhanced_constants: true,
            partial_eval_step_bound: 256,
            smt_complexity_bound: 64,
            smt_query_timeout_ms: 30_000,
            smt_pass_budget_ms: 120_000,
            deflatten_complexity_bound: 256,
            deflatten_confidence_threshold: 0.5,
            apply_confidence_threshold: 0.7,
            max_iterations: 2,
            decoder_min_calls: 1,
            rename_before_structuring: false,
            naming_helper_timeout_ms: 5_000,
            best_effort: false,
            source_maps: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, super::error::PipelineError> {
        serde_json::from_str(text)
            .map_err(|e| super::error::PipelineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.smt_query_timeout_ms, 30_000);
        assert_eq!(config.max_iterations, 2);
        assert!(!config.rename_before_structuring);
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = PipelineConfig::from_json(r#"{"max_iterations": 4}"#).unwrap();
        assert_eq!(config.max_iterations, 4);
        // Untouched fields keep their defaults
        assert_eq!(config.smt_complexity_bound, 64);
    }
}
