//! Technology milestones.

use crate::ProgressionError;
use serde::{Deserialize, Serialize};
use sim_core::SimTime;

/// Boolean features a milestone can switch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Feature {
    RouteOptimization,
    PredictiveAnalytics,
    AutomatedWarehousing,
    AdvancedCompute,
    AutonomousFleet,
    GlobalCoordination,
}

/// What achieving a milestone adds to the capability snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MilestoneEffect {
    pub automation: f64,
    pub decision_speed: f64,
    pub prediction_accuracy: f64,
    pub unlocks: Vec<Feature>,
}

/// A progress threshold that unlocks exactly once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    id: String,
    name: String,
    threshold: f64,
    impact: f64,
    effect: MilestoneEffect,
    achieved_at: Option<SimTime>,
}

impl Milestone {
    /// Build an unachieved milestone. The threshold must lie in (0,1) and the
    /// impact in [0,1].
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        threshold: f64,
        impact: f64,
        effect: MilestoneEffect,
    ) -> Result<Self, ProgressionError> {
        let id = id.into();
        if !(threshold.is_finite() && threshold > 0.0 && threshold < 1.0) {
            return Err(ProgressionError::ThresholdOutOfRange { id, threshold });
        }
        if !(0.0..=1.0).contains(&impact) {
            return Err(ProgressionError::ImpactOutOfRange { id, impact });
        }
        Ok(Self {
            id,
            name: name.into(),
            threshold,
            impact,
            effect,
            achieved_at: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Feedback weight into global efficiency once achieved.
    pub fn impact(&self) -> f64 {
        self.impact
    }

    pub fn effect(&self) -> &MilestoneEffect {
        &self.effect
    }

    pub fn achieved(&self) -> bool {
        self.achieved_at.is_some()
    }

    pub fn achieved_at(&self) -> Option<SimTime> {
        self.achieved_at
    }

    /// Mark achieved. Returns `false` if it already was; the original
    /// timestamp is kept.
    pub(crate) fn achieve(&mut self, at: SimTime) -> bool {
        if self.achieved_at.is_some() {
            return false;
        }
        self.achieved_at = Some(at);
        true
    }
}

/// Emitted once per milestone when it is achieved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MilestoneUnlocked {
    pub id: String,
    pub name: String,
    pub threshold: f64,
    /// Progress at the moment of unlocking.
    pub progress: f64,
    pub at: SimTime,
    pub unlocks: Vec<Feature>,
}

fn effect(automation: f64, speed: f64, accuracy: f64, unlocks: &[Feature]) -> MilestoneEffect {
    MilestoneEffect {
        automation,
        decision_speed: speed,
        prediction_accuracy: accuracy,
        unlocks: unlocks.to_vec(),
    }
}

/// The standard logistics technology ladder.
pub fn default_milestones() -> Vec<Milestone> {
    let table = [
        ("digital-manifests", "Digital Manifests", 0.05, 0.05, effect(0.05, 0.05, 0.02, &[])),
        (
            "route-optimization",
            "Route Optimization",
            0.12,
            0.08,
            effect(0.05, 0.1, 0.03, &[Feature::RouteOptimization]),
        ),
        (
            "predictive-analytics",
            "Predictive Analytics",
            0.25,
            0.1,
            effect(0.05, 0.05, 0.12, &[Feature::PredictiveAnalytics]),
        ),
        (
            "automated-warehousing",
            "Automated Warehousing",
            0.4,
            0.12,
            effect(0.2, 0.05, 0.0, &[Feature::AutomatedWarehousing]),
        ),
        (
            "advanced-compute",
            "Advanced Compute",
            0.55,
            0.15,
            effect(0.05, 0.2, 0.1, &[Feature::AdvancedCompute]),
        ),
        (
            "autonomous-fleet",
            "Autonomous Fleet",
            0.7,
            0.15,
            effect(0.3, 0.1, 0.05, &[Feature::AutonomousFleet]),
        ),
        (
            "global-coordination",
            "Global Coordination Network",
            0.85,
            0.2,
            effect(0.1, 0.2, 0.15, &[Feature::GlobalCoordination]),
        ),
        ("logistics-singularity", "Logistics Singularity", 0.95, 0.25, effect(0.2, 0.3, 0.2, &[])),
    ];
    table
        .into_iter()
        .filter_map(|(id, name, threshold, impact, eff)| {
            Milestone::new(id, name, threshold, impact, eff).ok()
        })
        .collect()
}
