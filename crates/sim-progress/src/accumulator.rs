//! Saturating progression integrator.

use crate::capability::Capabilities;
use crate::complexity::MarketComplexity;
use crate::milestone::{Milestone, MilestoneUnlocked};
use crate::ProgressionError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{clamp_unit, LearningState, SimTime};
use std::time::Duration;
use tracing::{debug, info};

/// Largest representable progress; the scalar never reaches 1.
pub const MAX_PROGRESS: f64 = 1.0 - f64::EPSILON;

/// Tuning for [`ProgressionAccumulator`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// Progress per simulated second per unit of source contribution.
    pub progression_rate: f64,
    /// Research spend (USD) that yields `ln 2` of research contribution.
    pub research_scale: f64,
    /// Second-order effect of research on global efficiency.
    pub efficiency_k: f64,
    /// Efficiency gained per unit of achieved milestone impact.
    pub milestone_boost: f64,
    pub research_weight: f64,
    pub agent_weight: f64,
    pub market_weight: f64,
    /// Share of the market source taken from complexity; the rest is trade
    /// volume.
    pub complexity_share: f64,
    /// Cap on the share of the remaining gap one step may close.
    pub max_step_fraction: f64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            progression_rate: 1e-5,
            research_scale: 1_000_000.0,
            efficiency_k: 0.1,
            milestone_boost: 0.5,
            research_weight: 1.0,
            agent_weight: 1.0,
            market_weight: 1.0,
            complexity_share: 0.6,
            max_step_fraction: 0.5,
        }
    }
}

impl ProgressionConfig {
    pub fn validate(&self) -> Result<(), ProgressionError> {
        let non_negative = [
            ("progression_rate", self.progression_rate),
            ("efficiency_k", self.efficiency_k),
            ("milestone_boost", self.milestone_boost),
            ("research_weight", self.research_weight),
            ("agent_weight", self.agent_weight),
            ("market_weight", self.market_weight),
        ];
        for (name, v) in non_negative {
            if !(v.is_finite() && v >= 0.0) {
                return Err(ProgressionError::InvalidConfig(name));
            }
        }
        if !(self.research_scale.is_finite() && self.research_scale > 0.0) {
            return Err(ProgressionError::InvalidConfig("research_scale"));
        }
        if !(0.0..=1.0).contains(&self.complexity_share) {
            return Err(ProgressionError::InvalidConfig("complexity_share"));
        }
        if !(self.max_step_fraction > 0.0 && self.max_step_fraction < 1.0) {
            return Err(ProgressionError::InvalidConfig("max_step_fraction"));
        }
        Ok(())
    }

    /// `ln(1 + investment / scale)`, zero for non-positive spend.
    pub fn research_term(&self, investment: Decimal) -> f64 {
        let inv = investment.to_f64().unwrap_or(0.0).max(0.0);
        (inv / self.research_scale).ln_1p()
    }
}

/// Inputs for one integration step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Contributions {
    /// Cumulative research investment in USD.
    pub research_investment: Decimal,
    /// Σ experience × singularity weight across agents.
    pub agent_learning: f64,
    pub market: MarketComplexity,
}

impl Contributions {
    /// Sum the agent term over a set of learning states.
    pub fn agent_term<'a>(states: impl IntoIterator<Item = &'a LearningState>) -> f64 {
        states.into_iter().map(LearningState::contribution).sum()
    }
}

/// Coarse phase of technological development.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProgressionEra {
    Foundational,
    Digitized,
    Automated,
    Intelligent,
    Autonomous,
}

impl ProgressionEra {
    /// Era for a progress value (five equal bands).
    pub fn from_progress(progress: f64) -> Self {
        match clamp_unit(progress) {
            p if p < 0.2 => ProgressionEra::Foundational,
            p if p < 0.4 => ProgressionEra::Digitized,
            p if p < 0.6 => ProgressionEra::Automated,
            p if p < 0.8 => ProgressionEra::Intelligent,
            _ => ProgressionEra::Autonomous,
        }
    }
}

/// Published progression snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressionState {
    pub progress: f64,
    pub era: ProgressionEra,
    /// Sorted by ascending threshold.
    pub milestones: Vec<Milestone>,
    pub capabilities: Capabilities,
    /// Global efficiency applied during the last step.
    pub efficiency: f64,
    pub updated_at: SimTime,
}

impl ProgressionState {
    pub fn achieved_count(&self) -> usize {
        self.milestones.iter().filter(|m| m.achieved()).count()
    }

    /// Lowest unachieved milestone.
    pub fn next_milestone(&self) -> Option<&Milestone> {
        self.milestones.iter().find(|m| !m.achieved())
    }
}

/// Result of one [`ProgressionAccumulator::advance`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct AdvanceOutcome {
    pub delta: f64,
    pub unlocked: Vec<MilestoneUnlocked>,
    pub era_changed: Option<(ProgressionEra, ProgressionEra)>,
}

/// Owns the progression state; the only writer of it.
#[derive(Clone, Debug)]
pub struct ProgressionAccumulator {
    config: ProgressionConfig,
    state: ProgressionState,
}

impl ProgressionAccumulator {
    /// Start at zero progress with the given milestone ladder.
    pub fn new(
        config: ProgressionConfig,
        milestones: Vec<Milestone>,
    ) -> Result<Self, ProgressionError> {
        Self::with_progress(config, milestones, 0.0)
    }

    /// Start at an explicit progress value in [0,1).
    pub fn with_progress(
        config: ProgressionConfig,
        mut milestones: Vec<Milestone>,
        progress: f64,
    ) -> Result<Self, ProgressionError> {
        config.validate()?;
        if !(progress.is_finite() && (0.0..1.0).contains(&progress)) {
            return Err(ProgressionError::ProgressOutOfRange(progress));
        }
        milestones.sort_by(|a, b| a.threshold().total_cmp(&b.threshold()));
        let capabilities = Capabilities::from_milestones(&milestones);
        Ok(Self {
            config,
            state: ProgressionState {
                progress,
                era: ProgressionEra::from_progress(progress),
                milestones,
                capabilities,
                efficiency: 1.0,
                updated_at: SimTime::ZERO,
            },
        })
    }

    pub fn state(&self) -> &ProgressionState {
        &self.state
    }

    pub fn config(&self) -> &ProgressionConfig {
        &self.config
    }

    /// Copy of the current state for publishing.
    pub fn snapshot(&self) -> ProgressionState {
        self.state.clone()
    }

    /// `(1 + ln(1+inv/scale)·k) · (1 + Σ achieved impact · boost)`.
    pub fn global_efficiency(&self, research_investment: Decimal) -> f64 {
        let research = self.config.research_term(research_investment);
        let impact: f64 = self
            .state
            .milestones
            .iter()
            .filter(|m| m.achieved())
            .map(Milestone::impact)
            .sum();
        (1.0 + research * self.config.efficiency_k) * (1.0 + impact * self.config.milestone_boost)
    }

    /// Integrate one step of `dt`, then unlock milestones and recompute
    /// capabilities.
    pub fn advance(&mut self, dt: Duration, c: &Contributions, now: SimTime) -> AdvanceOutcome {
        let cfg = &self.config;
        let research = cfg.research_term(c.research_investment) * cfg.research_weight;
        let agents = c.agent_learning.max(0.0) * cfg.agent_weight;
        let market = (cfg.complexity_share * clamp_unit(c.market.complexity)
            + (1.0 - cfg.complexity_share) * clamp_unit(c.market.trade_volume))
            * cfg.market_weight;
        let sources = [research, agents, market]
            .into_iter()
            .filter(|v| v.is_finite())
            .map(|v| v.max(0.0))
            .sum::<f64>();

        let efficiency = self.global_efficiency(c.research_investment);
        let p = self.state.progress;
        let saturation = 1.0 - p * p;
        let mut delta =
            sources * self.config.progression_rate * dt.as_secs_f64() * efficiency * saturation;
        if !delta.is_finite() || delta < 0.0 {
            delta = 0.0;
        }
        delta = delta.min((1.0 - p) * self.config.max_step_fraction);
        let next = (p + delta).min(MAX_PROGRESS);
        let applied = next - p;

        let old_era = self.state.era;
        self.state.progress = next;
        self.state.era = ProgressionEra::from_progress(next);
        self.state.efficiency = efficiency;
        self.state.updated_at = now;
        debug!(progress = next, delta = applied, efficiency, sources, "progression advanced");

        let unlocked = self.unlock_reached(now);
        if !unlocked.is_empty() {
            self.state.capabilities = Capabilities::from_milestones(&self.state.milestones);
        }
        let era_changed = (old_era != self.state.era).then_some((old_era, self.state.era));
        if let Some((from, to)) = era_changed {
            info!(?from, ?to, progress = next, "progression era changed");
        }
        AdvanceOutcome {
            delta: applied,
            unlocked,
            era_changed,
        }
    }

    fn unlock_reached(&mut self, now: SimTime) -> Vec<MilestoneUnlocked> {
        let progress = self.state.progress;
        let mut unlocked = Vec::new();
        for m in self.state.milestones.iter_mut() {
            if m.threshold() > progress {
                break;
            }
            if m.achieve(now) {
                info!(milestone = m.id(), threshold = m.threshold(), progress, "milestone unlocked");
                unlocked.push(MilestoneUnlocked {
                    id: m.id().to_string(),
                    name: m.name().to_string(),
                    threshold: m.threshold(),
                    progress,
                    at: now,
                    unlocks: m.effect().unlocks.clone(),
                });
            }
        }
        unlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milestone::{default_milestones, MilestoneEffect};
    use proptest::prelude::*;

    fn acc(progress: f64) -> ProgressionAccumulator {
        ProgressionAccumulator::with_progress(
            ProgressionConfig::default(),
            default_milestones(),
            progress,
        )
        .unwrap()
    }

    fn busy() -> Contributions {
        Contributions {
            research_investment: Decimal::new(5_000_000, 0),
            agent_learning: 2.0,
            market: MarketComplexity {
                complexity: 0.6,
                trade_volume: 0.5,
            },
        }
    }

    #[test]
    fn zero_contributions_leave_progress_unchanged() {
        let mut a = acc(0.05);
        for i in 0..100 {
            let out = a.advance(Duration::from_secs(5), &Contributions::default(), SimTime::from_secs(i));
            assert_eq!(out.delta, 0.0);
        }
        assert_eq!(a.state().progress, 0.05);
    }

    #[test]
    fn research_compounds_through_efficiency() {
        let a = acc(0.0);
        assert_eq!(a.global_efficiency(Decimal::ZERO), 1.0);
        let e = a.global_efficiency(Decimal::new(1_000_000, 0));
        assert!((e - (1.0 + 2f64.ln() * 0.1)).abs() < 1e-12);
    }

    #[test]
    fn milestones_unlock_once_in_threshold_order() {
        let mut a = acc(0.0);
        let mut seen = Vec::new();
        for i in 0..20_000u64 {
            let out = a.advance(Duration::from_secs(5), &busy(), SimTime::from_secs(i * 5));
            seen.extend(out.unlocked.into_iter().map(|u| u.threshold));
            if a.state().progress > 0.6 {
                break;
            }
        }
        assert!(seen.len() >= 4);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        let achieved = a.state().achieved_count();
        assert_eq!(achieved, seen.len());
        assert!(a.state().capabilities.advanced_compute_available());
    }

    #[test]
    fn huge_step_never_reaches_one() {
        let mut a = acc(0.9);
        let mut c = busy();
        c.agent_learning = 1e12;
        for i in 0..2_000 {
            a.advance(Duration::from_secs(3_600), &c, SimTime::from_secs(i));
            assert!(a.state().progress < 1.0);
        }
        assert!(a.state().milestones.iter().all(Milestone::achieved));
    }

    #[test]
    fn achieved_milestone_keeps_first_timestamp() {
        let m = Milestone::new("m", "M", 0.01, 0.1, MilestoneEffect::default()).unwrap();
        let mut a =
            ProgressionAccumulator::with_progress(ProgressionConfig::default(), vec![m], 0.02)
                .unwrap();
        let first = a.advance(Duration::ZERO, &Contributions::default(), SimTime::from_secs(1));
        assert_eq!(first.unlocked.len(), 1);
        let again = a.advance(Duration::ZERO, &Contributions::default(), SimTime::from_secs(2));
        assert!(again.unlocked.is_empty());
        assert_eq!(a.state().milestones[0].achieved_at(), Some(SimTime::from_secs(1)));
    }

    #[test]
    fn rejects_bad_start() {
        assert!(ProgressionAccumulator::with_progress(
            ProgressionConfig::default(),
            vec![],
            1.0
        )
        .is_err());
        let cfg = ProgressionConfig {
            max_step_fraction: 1.0,
            ..ProgressionConfig::default()
        };
        assert!(ProgressionAccumulator::new(cfg, vec![]).is_err());
    }

    proptest! {
        #[test]
        fn progress_is_monotone_and_below_one(
            steps in proptest::collection::vec((0u64..10_000, 0.0f64..50.0, 0.0f64..1.0), 1..80),
            start in 0.0f64..0.99,
        ) {
            let mut a = acc(start);
            let mut last = a.state().progress;
            let mut achieved_before = 0;
            for (i, (secs, agents, market)) in steps.into_iter().enumerate() {
                let c = Contributions {
                    research_investment: Decimal::new(i as i64 * 100_000, 0),
                    agent_learning: agents,
                    market: MarketComplexity { complexity: market, trade_volume: market },
                };
                a.advance(Duration::from_secs(secs), &c, SimTime::from_secs(i as u64));
                let p = a.state().progress;
                prop_assert!(p >= last);
                prop_assert!(p < 1.0);
                let achieved = a.state().achieved_count();
                prop_assert!(achieved >= achieved_before);
                achieved_before = achieved;
                last = p;
            }
        }
    }
}
