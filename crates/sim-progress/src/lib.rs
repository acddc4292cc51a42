#![deny(warnings)]

//! Technological progression for Port Tycoon.
//!
//! A slow accumulator integrates research spend, agent learning and market
//! complexity into a progress scalar with diminishing returns near 1,
//! unlocking milestones that in turn raise global efficiency and the
//! capability snapshot consumed by the decision and forecast crates.

pub mod accumulator;
pub mod capability;
pub mod complexity;
pub mod milestone;

pub use accumulator::{
    AdvanceOutcome, Contributions, ProgressionAccumulator, ProgressionConfig, ProgressionEra,
    ProgressionState, MAX_PROGRESS,
};
pub use capability::Capabilities;
pub use complexity::MarketComplexity;
pub use milestone::{default_milestones, Feature, Milestone, MilestoneEffect, MilestoneUnlocked};

use thiserror::Error;

/// Errors raised while configuring progression. Stepping never fails.
#[derive(Debug, Error, PartialEq)]
pub enum ProgressionError {
    /// Milestone thresholds must be inside (0,1).
    #[error("milestone {id} threshold {threshold} is outside (0,1)")]
    ThresholdOutOfRange { id: String, threshold: f64 },
    /// Milestone impact must be in [0,1].
    #[error("milestone {id} impact {impact} is outside [0,1]")]
    ImpactOutOfRange { id: String, impact: f64 },
    /// Starting progress must be in [0,1).
    #[error("initial progress {0} is outside [0,1)")]
    ProgressOutOfRange(f64),
    /// A configuration field is out of range.
    #[error("invalid progression config field: {0}")]
    InvalidConfig(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes() {
        let acc =
            ProgressionAccumulator::new(ProgressionConfig::default(), default_milestones()).unwrap();
        let s = serde_json::to_string(&acc.snapshot()).unwrap();
        let back: ProgressionState = serde_json::from_str(&s).unwrap();
        assert_eq!(back, acc.snapshot());
    }
}
