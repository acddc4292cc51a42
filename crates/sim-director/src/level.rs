//! The difficulty scalar and its phase bands.

use serde::{Deserialize, Serialize};
use sim_core::clamp_unit;
use std::fmt;

/// Five equal-width bands over the difficulty scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DifficultyPhase {
    VeryEasy,
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl DifficultyPhase {
    /// Band containing `value`; the upper edge of each band belongs to the
    /// next one and 1.0 is `VeryHard`.
    pub fn from_value(value: f64) -> Self {
        let v = clamp_unit(value);
        match (v * 5.0).floor() as u32 {
            0 => DifficultyPhase::VeryEasy,
            1 => DifficultyPhase::Easy,
            2 => DifficultyPhase::Medium,
            3 => DifficultyPhase::Hard,
            _ => DifficultyPhase::VeryHard,
        }
    }
}

impl fmt::Display for DifficultyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DifficultyPhase::VeryEasy => "very easy",
            DifficultyPhase::Easy => "easy",
            DifficultyPhase::Medium => "medium",
            DifficultyPhase::Hard => "hard",
            DifficultyPhase::VeryHard => "very hard",
        };
        f.write_str(s)
    }
}

/// Difficulty scalar in [0,1], clamped on every write.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct DifficultyLevel(f64);

impl Default for DifficultyLevel {
    fn default() -> Self {
        DifficultyLevel(0.5)
    }
}

impl DifficultyLevel {
    pub fn new(value: f64) -> Self {
        DifficultyLevel(clamp_unit(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn phase(self) -> DifficultyPhase {
        DifficultyPhase::from_value(self.0)
    }

    /// Level shifted by `delta`, clamped.
    pub fn shifted(self, delta: f64) -> Self {
        DifficultyLevel::new(self.0 + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn band_edges() {
        assert_eq!(DifficultyPhase::from_value(0.0), DifficultyPhase::VeryEasy);
        assert_eq!(DifficultyPhase::from_value(0.19), DifficultyPhase::VeryEasy);
        assert_eq!(DifficultyPhase::from_value(0.2), DifficultyPhase::Easy);
        assert_eq!(DifficultyPhase::from_value(0.5), DifficultyPhase::Medium);
        assert_eq!(DifficultyPhase::from_value(0.79), DifficultyPhase::Hard);
        assert_eq!(DifficultyPhase::from_value(1.0), DifficultyPhase::VeryHard);
    }

    proptest! {
        #[test]
        fn shifted_level_is_clamped(start in -2.0f64..2.0, delta in -3.0f64..3.0) {
            let l = DifficultyLevel::new(start).shifted(delta);
            prop_assert!((0.0..=1.0).contains(&l.value()));
        }
    }
}
