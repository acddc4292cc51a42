//! Competitor personality.

use crate::clamp_unit;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of personality traits carried by a [`BehaviorProfile`].
pub const TRAIT_COUNT: usize = 20;

/// A single personality dimension. Every trait is a scalar in [0,1].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Trait {
    Aggressiveness,
    RiskTolerance,
    InnovationFocus,
    CollaborationTendency,
    LearningOrientation,
    MemoryCapacity,
    ExplorationBias,
    TrustLevel,
    Adaptability,
    Patience,
    PriceSensitivity,
    ExpansionDrive,
    EfficiencyFocus,
    Opportunism,
    Loyalty,
    Competitiveness,
    Resilience,
    Caution,
    ReputationFocus,
    SustainabilityFocus,
}

impl Trait {
    /// All traits in storage order.
    pub const ALL: [Trait; TRAIT_COUNT] = [
        Trait::Aggressiveness,
        Trait::RiskTolerance,
        Trait::InnovationFocus,
        Trait::CollaborationTendency,
        Trait::LearningOrientation,
        Trait::MemoryCapacity,
        Trait::ExplorationBias,
        Trait::TrustLevel,
        Trait::Adaptability,
        Trait::Patience,
        Trait::PriceSensitivity,
        Trait::ExpansionDrive,
        Trait::EfficiencyFocus,
        Trait::Opportunism,
        Trait::Loyalty,
        Trait::Competitiveness,
        Trait::Resilience,
        Trait::Caution,
        Trait::ReputationFocus,
        Trait::SustainabilityFocus,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Starting personality templates used when seeding a competitor field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Archetype {
    /// Expands fast, tolerates risk.
    Aggressive,
    /// Protects cash, avoids volatility.
    Conservative,
    /// Spends on research.
    Innovator,
    /// No strong bias.
    Balanced,
    /// Chases short-term market swings.
    Opportunist,
}

impl Archetype {
    /// Archetypes in the order they are assigned round-robin.
    pub const ALL: [Archetype; 5] = [
        Archetype::Aggressive,
        Archetype::Conservative,
        Archetype::Innovator,
        Archetype::Balanced,
        Archetype::Opportunist,
    ];

    fn template(self) -> BehaviorProfile {
        let mut p = BehaviorProfile::neutral();
        let overrides: &[(Trait, f64)] = match self {
            Archetype::Aggressive => &[
                (Trait::Aggressiveness, 0.85),
                (Trait::RiskTolerance, 0.75),
                (Trait::ExpansionDrive, 0.8),
                (Trait::Competitiveness, 0.8),
                (Trait::Caution, 0.2),
                (Trait::Patience, 0.3),
            ],
            Archetype::Conservative => &[
                (Trait::Aggressiveness, 0.2),
                (Trait::RiskTolerance, 0.15),
                (Trait::Caution, 0.85),
                (Trait::Patience, 0.8),
                (Trait::EfficiencyFocus, 0.7),
                (Trait::Loyalty, 0.7),
            ],
            Archetype::Innovator => &[
                (Trait::InnovationFocus, 0.9),
                (Trait::LearningOrientation, 0.85),
                (Trait::ExplorationBias, 0.7),
                (Trait::Adaptability, 0.75),
                (Trait::RiskTolerance, 0.55),
            ],
            Archetype::Balanced => &[],
            Archetype::Opportunist => &[
                (Trait::Opportunism, 0.9),
                (Trait::PriceSensitivity, 0.8),
                (Trait::Loyalty, 0.2),
                (Trait::TrustLevel, 0.3),
                (Trait::RiskTolerance, 0.6),
            ],
        };
        for &(t, v) in overrides {
            p.set(t, v);
        }
        p
    }
}

/// A competitor's personality: twenty scalars, each clamped to [0,1] on every
/// write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredProfile")]
pub struct BehaviorProfile {
    values: [f64; TRAIT_COUNT],
}

/// Wire shape of [`BehaviorProfile`]; converted through the clamp.
#[derive(Deserialize)]
struct StoredProfile {
    values: [f64; TRAIT_COUNT],
}

impl From<StoredProfile> for BehaviorProfile {
    fn from(stored: StoredProfile) -> Self {
        Self {
            values: stored.values.map(clamp_unit),
        }
    }
}

impl Default for BehaviorProfile {
    fn default() -> Self {
        Self::neutral()
    }
}

impl BehaviorProfile {
    /// Every trait at 0.5.
    pub fn neutral() -> Self {
        Self {
            values: [0.5; TRAIT_COUNT],
        }
    }

    /// Build a profile from an archetype, jittering every trait by up to
    /// `±jitter` with the supplied RNG.
    pub fn generate<R: Rng + ?Sized>(archetype: Archetype, jitter: f64, rng: &mut R) -> Self {
        let mut p = archetype.template();
        let jitter = clamp_unit(jitter);
        if jitter > 0.0 {
            for t in Trait::ALL {
                let noise = rng.gen_range(-jitter..=jitter);
                p.adjust(t, noise);
            }
        }
        p
    }

    /// Read a trait.
    pub fn get(&self, t: Trait) -> f64 {
        self.values[t.index()]
    }

    /// Overwrite a trait, clamping into [0,1].
    pub fn set(&mut self, t: Trait, value: f64) {
        self.values[t.index()] = clamp_unit(value);
    }

    /// Add `delta` to a trait, clamping into [0,1]. Returns the applied change.
    pub fn adjust(&mut self, t: Trait, delta: f64) -> f64 {
        let before = self.get(t);
        self.set(t, before + delta);
        self.get(t) - before
    }

    /// Move a trait a fraction `rate` of the way towards `target`.
    pub fn blend_towards(&mut self, t: Trait, target: f64, rate: f64) -> f64 {
        let current = self.get(t);
        self.adjust(t, (clamp_unit(target) - current) * clamp_unit(rate))
    }

    /// Iterate `(trait, value)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (Trait, f64)> + '_ {
        Trait::ALL.iter().map(move |&t| (t, self.get(t)))
    }

    pub fn aggressiveness(&self) -> f64 {
        self.get(Trait::Aggressiveness)
    }

    pub fn risk_tolerance(&self) -> f64 {
        self.get(Trait::RiskTolerance)
    }

    pub fn innovation_focus(&self) -> f64 {
        self.get(Trait::InnovationFocus)
    }

    pub fn collaboration_tendency(&self) -> f64 {
        self.get(Trait::CollaborationTendency)
    }

    pub fn learning_orientation(&self) -> f64 {
        self.get(Trait::LearningOrientation)
    }

    pub fn trust_level(&self) -> f64 {
        self.get(Trait::TrustLevel)
    }

    /// Largest absolute per-trait difference between two profiles.
    pub fn max_drift(&self, other: &BehaviorProfile) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}
