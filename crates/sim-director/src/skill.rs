//! Long-horizon player skill estimate.

use crate::metrics::PerformanceMetrics;
use serde::{Deserialize, Serialize};
use sim_core::{clamp_unit, SimTime};

/// Change in the estimate below which the trend reads as steady.
const TREND_DEAD_ZONE: f64 = 0.02;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillTrend {
    Improving,
    Steady,
    Declining,
}

/// Output of one major assessment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillEstimate {
    /// Smoothed skill in [0,1].
    pub skill: f64,
    /// Change since the previous assessment.
    pub delta: f64,
    pub trend: SkillTrend,
    pub assessments: u32,
    pub at: SimTime,
}

impl Default for SkillEstimate {
    fn default() -> Self {
        Self {
            skill: 0.5,
            delta: 0.0,
            trend: SkillTrend::Steady,
            assessments: 0,
            at: SimTime::ZERO,
        }
    }
}

/// EWMA over per-assessment skill samples. A sample weighs the performance
/// score by how consistently it was achieved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillModel {
    alpha: f64,
    current: SkillEstimate,
}

impl SkillModel {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.01, 1.0),
            current: SkillEstimate::default(),
        }
    }

    pub fn current(&self) -> SkillEstimate {
        self.current
    }

    /// Fold one metrics sample in. Empty windows leave the estimate alone
    /// apart from its timestamp.
    pub fn observe(&mut self, metrics: &PerformanceMetrics, at: SimTime) -> SkillEstimate {
        if metrics.samples == 0 {
            self.current.at = at;
            self.current.delta = 0.0;
            self.current.trend = SkillTrend::Steady;
            return self.current;
        }
        let sample = clamp_unit(
            metrics.score * (0.75 + 0.25 * metrics.consistency) - 0.1 * metrics.frustration,
        );
        let prev = self.current.skill;
        let skill = if self.current.assessments == 0 {
            sample
        } else {
            prev + self.alpha * (sample - prev)
        };
        let delta = skill - prev;
        let trend = if delta > TREND_DEAD_ZONE {
            SkillTrend::Improving
        } else if delta < -TREND_DEAD_ZONE {
            SkillTrend::Declining
        } else {
            SkillTrend::Steady
        };
        self.current = SkillEstimate {
            skill: clamp_unit(skill),
            delta,
            trend,
            assessments: self.current.assessments.saturating_add(1),
            at,
        };
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(score: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            score,
            consistency: 1.0,
            frustration: 0.0,
            boredom: 0.0,
            samples: 10,
        }
    }

    #[test]
    fn rising_scores_read_as_improving() {
        let mut m = SkillModel::new(0.5);
        m.observe(&metrics(0.3), SimTime::from_secs(300));
        let e = m.observe(&metrics(0.9), SimTime::from_secs(600));
        assert_eq!(e.trend, SkillTrend::Improving);
        assert_eq!(e.assessments, 2);
        assert!(e.skill > 0.3 && e.skill < 0.9);
    }

    #[test]
    fn empty_window_keeps_estimate() {
        let mut m = SkillModel::new(0.3);
        let before = m.observe(&metrics(0.8), SimTime::from_secs(1));
        let after = m.observe(&PerformanceMetrics::default(), SimTime::from_secs(2));
        assert_eq!(before.skill, after.skill);
        assert_eq!(after.trend, SkillTrend::Steady);
    }
}
