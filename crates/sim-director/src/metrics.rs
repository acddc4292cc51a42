//! Player performance metrics over a window of recent actions.

use serde::{Deserialize, Serialize};
use sim_core::{clamp_unit, PlayerAction};
use std::collections::BTreeMap;
use std::time::Duration;

/// Actions at or under this duration count as fully fluent.
pub const FAST_ACTION: Duration = Duration::from_secs(5);
/// Actions at or over this duration count as fully hesitant.
pub const SLOW_ACTION: Duration = Duration::from_secs(60);
/// Failure streak length that saturates the frustration streak term.
const STREAK_SATURATION: f64 = 5.0;

/// Derived performance picture, every field in [0,1]. A stateless function
/// of the window it was computed from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub score: f64,
    pub consistency: f64,
    pub frustration: f64,
    pub boredom: f64,
    /// Number of actions in the window.
    pub samples: usize,
}

impl Default for PerformanceMetrics {
    /// Neutral metrics for an empty window: mid-band score, nothing to react to.
    fn default() -> Self {
        Self {
            score: 0.5,
            consistency: 0.5,
            frustration: 0.0,
            boredom: 0.0,
            samples: 0,
        }
    }
}

fn speed_score(d: Duration) -> f64 {
    let fast = FAST_ACTION.as_secs_f64();
    let slow = SLOW_ACTION.as_secs_f64();
    clamp_unit(1.0 - (d.as_secs_f64() - fast) / (slow - fast))
}

impl PerformanceMetrics {
    /// Compute metrics over a window of actions, oldest first.
    pub fn from_window(window: &[PlayerAction]) -> Self {
        if window.is_empty() {
            return Self::default();
        }
        let n = window.len() as f64;
        let successes = window.iter().filter(|a| a.success).count() as f64;
        let success_rate = successes / n;
        let failure_rate = 1.0 - success_rate;

        let speeds: Vec<f64> = window.iter().map(|a| speed_score(a.duration)).collect();
        let mean_speed = speeds.iter().sum::<f64>() / n;
        let score = clamp_unit(0.7 * success_rate + 0.3 * mean_speed);

        // Probability two random actions in the window share an outcome.
        let outcome_agreement = 1.0 - 2.0 * success_rate * failure_rate;
        let secs: Vec<f64> = window.iter().map(|a| a.duration.as_secs_f64()).collect();
        let mean_secs = secs.iter().sum::<f64>() / n;
        let duration_cv = if mean_secs > 0.0 {
            let var = secs.iter().map(|s| (s - mean_secs).powi(2)).sum::<f64>() / n;
            var.sqrt() / mean_secs
        } else {
            0.0
        };
        let consistency = clamp_unit(0.7 * outcome_agreement + 0.3 * (1.0 - duration_cv.min(1.0)));

        let trailing_failures = window.iter().rev().take_while(|a| !a.success).count() as f64;
        let slowness = 1.0 - mean_speed;
        let frustration = clamp_unit(
            0.5 * failure_rate
                + 0.3 * (trailing_failures / STREAK_SATURATION).min(1.0)
                + 0.2 * slowness,
        );

        let saturation = clamp_unit((success_rate - 0.9) / 0.1);
        let mut by_kind: BTreeMap<_, usize> = BTreeMap::new();
        for a in window {
            *by_kind.entry(a.kind).or_default() += 1;
        }
        let dominant = by_kind.values().copied().max().unwrap_or(0) as f64 / n;
        let repetition = clamp_unit((dominant - 0.5) / 0.5);
        let disengaged = window.iter().filter(|a| a.duration >= SLOW_ACTION).count() as f64 / n;
        let boredom = clamp_unit(0.5 * saturation + 0.3 * repetition + 0.2 * disengaged);

        Self {
            score,
            consistency,
            frustration,
            boredom,
            samples: window.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sim_core::{PlayerActionKind, SimTime};

    fn actions(outcomes: &[bool], secs: u64) -> Vec<PlayerAction> {
        const KINDS: [PlayerActionKind; 4] = [
            PlayerActionKind::BuyAsset,
            PlayerActionKind::CreateRoute,
            PlayerActionKind::SetPrice,
            PlayerActionKind::Research,
        ];
        outcomes
            .iter()
            .enumerate()
            .map(|(i, &ok)| {
                PlayerAction::new(
                    KINDS[i % KINDS.len()],
                    SimTime::from_secs(i as u64 * 10),
                    ok,
                    Duration::from_secs(secs),
                )
            })
            .collect()
    }

    #[test]
    fn empty_window_is_neutral() {
        assert_eq!(PerformanceMetrics::from_window(&[]), PerformanceMetrics::default());
    }

    #[test]
    fn nine_of_ten_fast_successes() {
        let mut outcomes = [true; 10];
        outcomes[4] = false;
        let m = PerformanceMetrics::from_window(&actions(&outcomes, 3));
        assert!(m.score > 0.9, "score {}", m.score);
        assert!(m.consistency > 0.8, "consistency {}", m.consistency);
        assert!(m.frustration < 0.2, "frustration {}", m.frustration);
        assert!(m.boredom < 0.3, "boredom {}", m.boredom);
    }

    #[test]
    fn failure_streak_raises_frustration() {
        let outcomes = [true, false, false, false, false, false, false, false];
        let m = PerformanceMetrics::from_window(&actions(&outcomes, 45));
        assert!(m.frustration > 0.7, "frustration {}", m.frustration);
        assert!(m.score < 0.4);
    }

    #[test]
    fn perfect_repetitive_play_is_boring() {
        let window: Vec<_> = (0..12)
            .map(|i| {
                PlayerAction::new(
                    PlayerActionKind::SetPrice,
                    SimTime::from_secs(i),
                    true,
                    Duration::from_secs(2),
                )
            })
            .collect();
        let m = PerformanceMetrics::from_window(&window);
        assert!(m.boredom > 0.6, "boredom {}", m.boredom);
    }

    proptest! {
        #[test]
        fn metrics_are_bounded(outcomes in proptest::collection::vec(any::<bool>(), 1..64),
                               secs in 0u64..600) {
            let m = PerformanceMetrics::from_window(&actions(&outcomes, secs));
            for v in [m.score, m.consistency, m.frustration, m.boredom] {
                prop_assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}
