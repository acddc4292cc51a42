//! Gameplay knobs derived from the difficulty scalar.

use crate::level::{DifficultyLevel, DifficultyPhase};
use serde::{Deserialize, Serialize};

/// `lo + (hi - lo) * d` for `d` in [0,1].
fn lerp(lo: f64, hi: f64, d: f64) -> f64 {
    lo + (hi - lo) * d
}

/// Bundle of dependent tuning values, each an affine function of the
/// difficulty scalar. Recomputed whole on every change and broadcast to the
/// gameplay systems that consume it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifficultySettings {
    pub level: f64,
    pub phase: DifficultyPhase,
    /// Scales competitor expansion and acquisition appetite.
    pub ai_aggressiveness: f64,
    /// How sharply competitor agents optimize, in [0,1].
    pub ai_competence: f64,
    pub market_volatility: f64,
    pub price_sensitivity: f64,
    pub maintenance_multiplier: f64,
    pub fuel_cost_multiplier: f64,
    pub loan_interest_rate: f64,
    /// Expected disruptive events per simulated day.
    pub disaster_frequency: f64,
    pub storm_frequency: f64,
    pub economic_shock_frequency: f64,
    /// Reward multiplier applied to contract payouts.
    pub reward_multiplier: f64,
    pub starting_capital_multiplier: f64,
}

impl DifficultySettings {
    pub fn for_level(level: DifficultyLevel) -> Self {
        let d = level.value();
        Self {
            level: d,
            phase: level.phase(),
            ai_aggressiveness: lerp(0.3, 1.0, d),
            ai_competence: lerp(0.4, 0.95, d),
            market_volatility: lerp(0.1, 0.5, d),
            price_sensitivity: lerp(0.8, 1.4, d),
            maintenance_multiplier: lerp(0.75, 1.5, d),
            fuel_cost_multiplier: lerp(0.9, 1.3, d),
            loan_interest_rate: lerp(0.03, 0.09, d),
            disaster_frequency: lerp(0.01, 0.06, d),
            storm_frequency: lerp(0.05, 0.25, d),
            economic_shock_frequency: lerp(0.005, 0.03, d),
            reward_multiplier: lerp(1.3, 0.9, d),
            starting_capital_multiplier: lerp(1.5, 0.75, d),
        }
    }
}

impl Default for DifficultySettings {
    fn default() -> Self {
        Self::for_level(DifficultyLevel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harder_means_tougher_knobs() {
        let easy = DifficultySettings::for_level(DifficultyLevel::new(0.1));
        let hard = DifficultySettings::for_level(DifficultyLevel::new(0.9));
        assert!(hard.ai_aggressiveness > easy.ai_aggressiveness);
        assert!(hard.maintenance_multiplier > easy.maintenance_multiplier);
        assert!(hard.reward_multiplier < easy.reward_multiplier);
        assert_eq!(hard.phase, DifficultyPhase::VeryHard);
    }

    #[test]
    fn endpoints_match_ranges() {
        let s = DifficultySettings::for_level(DifficultyLevel::new(0.0));
        assert_eq!(s.ai_aggressiveness, 0.3);
        let s = DifficultySettings::for_level(DifficultyLevel::new(1.0));
        assert_eq!(s.ai_aggressiveness, 1.0);
    }
}
