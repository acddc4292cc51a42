//! Periodic cadences and the due-time bookkeeping of the deterministic
//! driver.

use serde::{Deserialize, Serialize};
use sim_core::SimTime;
use std::fmt;
use std::time::Duration;

use crate::config::ConfigError;

/// Every periodic job, in the order jobs due at the same instant run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Cadence {
    MarketForecast,
    PerformanceAnalysis,
    DifficultyReview,
    MajorAssessment,
    CompetitorUpdate,
    Decision,
    Learning,
    Progression,
    Health,
}

impl Cadence {
    pub const ALL: [Cadence; 9] = [
        Cadence::MarketForecast,
        Cadence::PerformanceAnalysis,
        Cadence::DifficultyReview,
        Cadence::MajorAssessment,
        Cadence::CompetitorUpdate,
        Cadence::Decision,
        Cadence::Learning,
        Cadence::Progression,
        Cadence::Health,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Periods in simulated seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub decision_secs: u64,
    pub competitor_update_secs: u64,
    pub performance_analysis_secs: u64,
    pub difficulty_review_secs: u64,
    pub health_secs: u64,
    pub forecast_secs: u64,
    pub major_assessment_secs: u64,
    pub learning_secs: u64,
    pub progression_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            decision_secs: 5,
            competitor_update_secs: 10,
            performance_analysis_secs: 30,
            difficulty_review_secs: 60,
            health_secs: 60,
            forecast_secs: 300,
            major_assessment_secs: 300,
            learning_secs: 30,
            progression_secs: 5,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Cadence::ALL.iter().any(|&c| self.period_secs(c) == 0) {
            return Err(ConfigError::Invalid("schedule"));
        }
        Ok(())
    }

    pub fn period_secs(&self, c: Cadence) -> u64 {
        match c {
            Cadence::MarketForecast => self.forecast_secs,
            Cadence::PerformanceAnalysis => self.performance_analysis_secs,
            Cadence::DifficultyReview => self.difficulty_review_secs,
            Cadence::MajorAssessment => self.major_assessment_secs,
            Cadence::CompetitorUpdate => self.competitor_update_secs,
            Cadence::Decision => self.decision_secs,
            Cadence::Learning => self.learning_secs,
            Cadence::Progression => self.progression_secs,
            Cadence::Health => self.health_secs,
        }
    }

    pub fn period(&self, c: Cadence) -> Duration {
        Duration::from_secs(self.period_secs(c))
    }
}

/// Next due time of every cadence.
#[derive(Clone, Debug)]
pub struct Schedule {
    cfg: ScheduleConfig,
    next_due: [SimTime; 9],
}

impl Schedule {
    /// Every cadence is due at time zero.
    pub fn new(cfg: ScheduleConfig) -> Self {
        Self {
            cfg,
            next_due: [SimTime::ZERO; 9],
        }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.cfg
    }

    /// Earliest pending due time.
    pub fn next_due(&self) -> SimTime {
        self.next_due.iter().copied().min().unwrap_or(SimTime::ZERO)
    }

    /// Cadences due at or before `now`, in run order.
    pub fn due(&self, now: SimTime) -> Vec<Cadence> {
        Cadence::ALL
            .iter()
            .copied()
            .filter(|c| self.next_due[c.index()] <= now)
            .collect()
    }

    /// Record that `c` ran at `at`; its next run is one period later.
    pub fn mark_ran(&mut self, c: Cadence, at: SimTime) {
        self.next_due[c.index()] = at.saturating_add(self.cfg.period(c));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_runs_first_at_zero() {
        let s = Schedule::new(ScheduleConfig::default());
        assert_eq!(s.due(SimTime::ZERO), Cadence::ALL.to_vec());
    }

    #[test]
    fn periods_follow_config() {
        let mut s = Schedule::new(ScheduleConfig::default());
        for c in Cadence::ALL {
            s.mark_ran(c, SimTime::ZERO);
        }
        assert_eq!(s.next_due(), SimTime::from_secs(5));
        assert_eq!(
            s.due(SimTime::from_secs(5)),
            vec![Cadence::Decision, Cadence::Progression]
        );
        assert_eq!(s.due(SimTime::from_secs(60)).len(), 7);
        assert!(s.due(SimTime::from_secs(300)).contains(&Cadence::MajorAssessment));
    }

    #[test]
    fn zero_period_is_rejected() {
        let cfg = ScheduleConfig {
            health_secs: 0,
            ..ScheduleConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
