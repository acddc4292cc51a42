#![deny(warnings)]

//! Competitor intelligence.
//!
//! [`DecisionEngine`] turns a competitor and a read-only market context into
//! one [`sim_core::DecisionRecord`] per cycle. Base scores come from an
//! optional [`ActionPredictor`] guarded by a latency budget and circuit
//! breaker, with [`RuleBasedPredictor`] as the always-available fallback.
//! [`LearningLoop`] adapts profiles from realized outcomes and
//! [`InsightTracker`] reports notable behavior changes.

pub mod engine;
pub mod features;
pub mod insight;
pub mod learning;
pub mod predictor;

pub use engine::{Candidate, DecisionConfig, DecisionContext, DecisionEngine};
pub use features::{Feature, FeatureExtractor, FeatureVector, FEATURE_COUNT};
pub use insight::{BehaviorInsight, InsightKind, InsightTracker};
pub use learning::{KnowledgeTransfer, LearningConfig, LearningLoop, LearningReport};
pub use predictor::{
    ActionPredictor, ActionScores, FallbackReason, GuardConfig, GuardedPredictor, LinearModel,
    RuleBasedPredictor, Scored,
};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AiError {
    #[error("invalid ai config field: {0}")]
    InvalidConfig(&'static str),
}

/// Failures of a model predictor. Never surfaced from a decision; the guard
/// turns every one of them into a fallback.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("predictor unavailable")]
    Unavailable,
    #[error("model shape mismatch: expected {expected}, got {got}")]
    Shape { expected: usize, got: usize },
    #[error("model produced a non-finite value")]
    NonFinite,
    #[error("model file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("reading model: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_yaml() {
        let text = "selection_window: 2\nguard:\n  latency_budget_ms: 5\n";
        let cfg: DecisionConfig = serde_yaml::from_str(text).unwrap();
        assert_eq!(cfg.selection_window, 2);
        assert_eq!(cfg.guard.latency_budget_ms, 5);
        assert_eq!(cfg.guard.failure_threshold, GuardConfig::default().failure_threshold);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_window_is_rejected() {
        let cfg = DecisionConfig {
            selection_window: 0,
            ..DecisionConfig::default()
        };
        assert_eq!(
            DecisionEngine::new(cfg, None, 0).unwrap_err(),
            AiError::InvalidConfig("selection_window")
        );
    }
}
