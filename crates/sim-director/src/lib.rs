#![deny(warnings)]

//! Flow-seeking difficulty direction.
//!
//! [`DifficultyController`] watches a trailing window of player actions and
//! steers a single difficulty scalar so the player's performance score stays
//! inside the flow band, with bounded per-review deltas and immediate nudges
//! for acute events. Everything gameplay-facing is derived from that scalar
//! through [`DifficultySettings`].

pub mod controller;
pub mod level;
pub mod metrics;
pub mod settings;
pub mod skill;

pub use controller::{
    AcuteEvent, Adjustment, AdjustmentCause, AdjustmentTrigger, DifficultyConfig,
    DifficultyController, DirectorSnapshot, Evaluation, PhaseChange,
};
pub use level::{DifficultyLevel, DifficultyPhase};
pub use metrics::PerformanceMetrics;
pub use settings::DifficultySettings;
pub use skill::{SkillEstimate, SkillModel, SkillTrend};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DirectorError {
    /// A configuration field is out of range.
    #[error("invalid difficulty config field: {0}")]
    InvalidConfig(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes() {
        let c = DifficultyController::new(DifficultyConfig::default()).unwrap();
        let s = serde_json::to_string(&c.snapshot()).unwrap();
        let back: DirectorSnapshot = serde_json::from_str(&s).unwrap();
        assert_eq!(back, c.snapshot());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: DifficultyConfig = serde_json::from_str(r#"{"max_delta_per_cycle":0.08}"#).unwrap();
        assert_eq!(cfg.max_delta_per_cycle, 0.08);
        assert_eq!(cfg.window, DifficultyConfig::default().window);
        assert!(cfg.validate().is_ok());
    }
}
