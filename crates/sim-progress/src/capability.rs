//! Capability snapshot derived from achieved milestones.

use crate::milestone::{Feature, Milestone};
use serde::{Deserialize, Serialize};
use sim_core::clamp_unit;
use std::collections::BTreeSet;

const BASE_AUTOMATION: f64 = 0.1;
const BASE_DECISION_SPEED: f64 = 1.0;
const BASE_PREDICTION_ACCURACY: f64 = 0.5;
const MAX_DECISION_SPEED: f64 = 3.0;

/// What the simulation's technology currently allows. Always a pure
/// function of the achieved-milestone set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Share of operations that run without intervention, in [0,1].
    pub automation_level: f64,
    /// Multiplier on agent decision frequency, in [1,3].
    pub decision_speed: f64,
    /// Forecast quality, in [0,1].
    pub prediction_accuracy: f64,
    pub features: BTreeSet<Feature>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::from_milestones(&[])
    }
}

impl Capabilities {
    /// Recompute from scratch over the achieved milestones.
    pub fn from_milestones(milestones: &[Milestone]) -> Self {
        let mut automation = BASE_AUTOMATION;
        let mut speed = BASE_DECISION_SPEED;
        let mut accuracy = BASE_PREDICTION_ACCURACY;
        let mut features = BTreeSet::new();
        for m in milestones.iter().filter(|m| m.achieved()) {
            let e = m.effect();
            automation += e.automation;
            speed += e.decision_speed;
            accuracy += e.prediction_accuracy;
            features.extend(e.unlocks.iter().copied());
        }
        Self {
            automation_level: clamp_unit(automation),
            decision_speed: speed.clamp(BASE_DECISION_SPEED, MAX_DECISION_SPEED),
            prediction_accuracy: clamp_unit(accuracy),
            features,
        }
    }

    pub fn has(&self, f: Feature) -> bool {
        self.features.contains(&f)
    }

    pub fn advanced_compute_available(&self) -> bool {
        self.has(Feature::AdvancedCompute)
    }
}
