//! Batch learning from realized outcomes, and knowledge sharing between
//! collaborative competitors.

use crate::AiError;
use serde::{Deserialize, Serialize};
use sim_core::{clamp_unit, ActionKind, CompetitorId, CompetitorState, Trait};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Trait step per unit of surprise at full learning orientation.
    pub adaptation_rate: f64,
    /// Experience gained by a session that processed outcomes.
    pub experience_gain: f64,
    /// Collaboration tendency above which an agent shares.
    pub collaboration_threshold: f64,
    /// Fraction of the trait gap closed per sharing round at full trust.
    pub transfer_rate: f64,
    /// Minimum success-rate gap before a peer is considered better.
    pub min_performance_gap: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            adaptation_rate: 0.05,
            experience_gain: 0.05,
            collaboration_threshold: 0.6,
            transfer_rate: 0.1,
            min_performance_gap: 0.1,
        }
    }
}

impl LearningConfig {
    pub fn validate(&self) -> Result<(), AiError> {
        for (v, name) in [
            (self.adaptation_rate, "adaptation_rate"),
            (self.experience_gain, "experience_gain"),
            (self.collaboration_threshold, "collaboration_threshold"),
            (self.transfer_rate, "transfer_rate"),
            (self.min_performance_gap, "min_performance_gap"),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(AiError::InvalidConfig(name));
            }
        }
        Ok(())
    }
}

/// Trait most closely tied to the success of each action kind.
fn affinity(kind: ActionKind) -> Trait {
    match kind {
        ActionKind::AcquireAsset => Trait::Aggressiveness,
        ActionKind::DisposeAsset => Trait::Caution,
        ActionKind::InvestResearch => Trait::InnovationFocus,
        ActionKind::OpenTradeRoute => Trait::ExplorationBias,
        ActionKind::AdjustPricing => Trait::PriceSensitivity,
        ActionKind::ExpandRegion => Trait::ExpansionDrive,
        ActionKind::Wait => Trait::Patience,
    }
}

/// Traits copied between agents during knowledge sharing.
const SHARED_TRAITS: [Trait; 5] = [
    Trait::RiskTolerance,
    Trait::Aggressiveness,
    Trait::InnovationFocus,
    Trait::ExpansionDrive,
    Trait::PriceSensitivity,
];

/// Result of one learning session for one competitor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearningReport {
    pub competitor: CompetitorId,
    /// Newly resolved outcomes consumed by this session.
    pub outcomes: usize,
    pub experience_delta: f64,
    /// Applied per-trait changes, in the order they happened.
    pub adjustments: Vec<(Trait, f64)>,
    /// Largest per-trait change against the profile before the session.
    pub drift: f64,
}

impl LearningReport {
    /// Net applied change to `t`.
    pub fn net(&self, t: Trait) -> f64 {
        self.adjustments
            .iter()
            .filter(|(x, _)| *x == t)
            .map(|(_, d)| d)
            .sum()
    }
}

/// One peer-to-peer trait transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeTransfer {
    pub from: CompetitorId,
    pub to: CompetitorId,
    pub drift: f64,
}

/// Consumes each competitor's newly resolved outcomes exactly once.
#[derive(Clone, Debug, Default)]
pub struct LearningLoop {
    cfg: LearningConfig,
}

impl LearningLoop {
    pub fn new(cfg: LearningConfig) -> Result<Self, AiError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &LearningConfig {
        &self.cfg
    }

    /// Adapt `state`'s profile from outcomes resolved since the last call.
    ///
    /// Each outcome nudges the trait tied to its action kind by the surprise
    /// (`realized - expected`), and moves risk tolerance by the surprise
    /// weighted by the action's risk. Steps scale with learning orientation.
    /// Outcomes still unresolved are picked up by a later session.
    pub fn learn(&mut self, state: &mut CompetitorState) -> LearningReport {
        let before = state.profile.clone();
        let orientation = state.profile.learning_orientation();
        let step = self.cfg.adaptation_rate * orientation;
        let outcomes = state.history.take_unlearned();

        let mut adjustments = Vec::with_capacity(outcomes.len() * 2);
        for (kind, surprise) in &outcomes {
            let s = surprise.clamp(-1.0, 1.0);
            let d = state.profile.adjust(affinity(*kind), step * s);
            adjustments.push((affinity(*kind), d));
            if *kind != ActionKind::Wait {
                let d = state
                    .profile
                    .adjust(Trait::RiskTolerance, step * s * kind.base_risk());
                adjustments.push((Trait::RiskTolerance, d));
            }
        }

        let experience_delta = if outcomes.is_empty() {
            0.0
        } else {
            let volume = outcomes.len() as f64 / (outcomes.len() as f64 + 4.0);
            state
                .learning
                .gain_experience(self.cfg.experience_gain * (0.5 + orientation) * volume)
        };
        let report = LearningReport {
            competitor: state.id,
            outcomes: outcomes.len(),
            experience_delta,
            drift: state.profile.max_drift(&before),
            adjustments,
        };
        if report.outcomes > 0 {
            debug!(
                competitor = %state.id,
                outcomes = report.outcomes,
                drift = report.drift,
                experience = state.learning.experience(),
                "learning session"
            );
        }
        report
    }

    /// Collaborative agents move shared traits towards the best-performing
    /// collaborative peer, weighted by their own trust level.
    pub fn share_knowledge(&self, states: &mut [CompetitorState]) -> Vec<KnowledgeTransfer> {
        let collaborative: Vec<(usize, f64)> = states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.profile.collaboration_tendency() > self.cfg.collaboration_threshold)
            .filter_map(|(i, s)| {
                let st = s.history.stats();
                (st.resolved > 0).then_some((i, st.success_rate))
            })
            .collect();
        let Some(&(leader, best)) = collaborative
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        else {
            return Vec::new();
        };
        let mentor = states[leader].profile.clone();
        let from = states[leader].id;

        let mut transfers = Vec::new();
        for &(i, rate) in &collaborative {
            if i == leader || best - rate < self.cfg.min_performance_gap {
                continue;
            }
            let learner = &mut states[i];
            let before = learner.profile.clone();
            let weight = clamp_unit(self.cfg.transfer_rate * learner.profile.trust_level() * 2.0);
            for t in SHARED_TRAITS {
                learner.profile.blend_towards(t, mentor.get(t), weight);
            }
            let drift = learner.profile.max_drift(&before);
            debug!(from = %from, to = %learner.id, drift, "knowledge shared");
            transfers.push(KnowledgeTransfer {
                from,
                to: learner.id,
                drift,
            });
        }
        transfers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use sim_core::{
        Action, BehaviorProfile, DecisionRecord, Finances, ScoreSource, SimTime,
    };

    fn agent(id: u32, collaboration: f64) -> CompetitorState {
        let mut p = BehaviorProfile::neutral();
        p.set(Trait::CollaborationTendency, collaboration);
        p.set(Trait::LearningOrientation, 0.8);
        CompetitorState::new(
            CompetitorId(id),
            format!("Agent {id}"),
            p,
            Finances::new(Decimal::new(1_000_000, 0), Decimal::ZERO, 1, 50.0),
            32,
        )
    }

    fn record(id: u32, action: Action) -> DecisionRecord {
        let kind = action.kind();
        DecisionRecord {
            competitor: CompetitorId(id),
            action,
            confidence: 0.5,
            expected_return: kind.base_return(),
            risk_level: kind.base_risk(),
            rationale: String::new(),
            source: ScoreSource::RuleBased,
            decided_at: SimTime::ZERO,
        }
    }

    fn acquire() -> Action {
        Action::AcquireAsset {
            class: sim_core::AssetClass::Ship,
            budget: Decimal::new(100, 0),
        }
    }

    #[test]
    fn good_outcome_reinforces_trait_and_counts_once() {
        let mut s = agent(1, 0.5);
        let seq = s.history.push(record(1, acquire()));
        s.history.resolve(seq, 0.6);
        let mut l = LearningLoop::default();
        let r = l.learn(&mut s);
        assert_eq!(r.outcomes, 1);
        assert!(r.net(Trait::Aggressiveness) > 0.0);
        assert!(r.net(Trait::RiskTolerance) > 0.0);
        assert!(r.experience_delta > 0.0);
        let again = l.learn(&mut s);
        assert_eq!(again.outcomes, 0);
        assert_eq!(again.drift, 0.0);
    }

    #[test]
    fn bad_outcome_lowers_risk_appetite() {
        let mut s = agent(1, 0.5);
        let seq = s.history.push(record(1, acquire()));
        s.history.resolve(seq, -0.5);
        let r = LearningLoop::default().learn(&mut s);
        assert!(r.net(Trait::RiskTolerance) < 0.0);
        assert!(s.profile.risk_tolerance() < 0.5);
    }

    #[test]
    fn missing_outcome_does_not_stall_learning() {
        let mut s = agent(1, 0.5);
        let first = s.history.push(record(1, acquire()));
        for _ in 0..9 {
            let seq = s.history.push(record(1, Action::Wait));
            s.history.resolve(seq, 0.1);
        }
        let mut l = LearningLoop::default();
        let r = l.learn(&mut s);
        assert_eq!(r.outcomes, 9);
        assert!(r.experience_delta > 0.0);
        assert_eq!(l.learn(&mut s).outcomes, 0);
        s.history.resolve(first, 0.2);
        assert_eq!(l.learn(&mut s).outcomes, 1);
    }

    #[test]
    fn zero_orientation_does_not_adapt() {
        let mut s = agent(1, 0.5);
        s.profile.set(Trait::LearningOrientation, 0.0);
        let seq = s.history.push(record(1, acquire()));
        s.history.resolve(seq, 1.0);
        let r = LearningLoop::default().learn(&mut s);
        assert_eq!(r.drift, 0.0);
    }

    #[test]
    fn laggards_learn_from_the_leader() {
        let mut a = agent(1, 0.9);
        a.profile.set(Trait::RiskTolerance, 0.9);
        let seq = a.history.push(record(1, acquire()));
        a.history.resolve(seq, 0.5);
        let mut b = agent(2, 0.9);
        b.profile.set(Trait::RiskTolerance, 0.1);
        let seq = b.history.push(record(2, acquire()));
        b.history.resolve(seq, -0.5);
        let mut loner = agent(3, 0.1);
        let seq = loner.history.push(record(3, acquire()));
        loner.history.resolve(seq, -0.5);
        let mut states = vec![a, b, loner];
        let t = LearningLoop::default().share_knowledge(&mut states);
        assert_eq!(t.len(), 1);
        assert_eq!((t[0].from, t[0].to), (CompetitorId(1), CompetitorId(2)));
        assert!(states[1].profile.risk_tolerance() > 0.1);
        assert_eq!(states[2].profile.risk_tolerance(), 0.5);
        assert_eq!(states[0].profile.risk_tolerance(), 0.9);
    }

    #[test]
    fn bad_config_is_rejected() {
        let cfg = LearningConfig {
            transfer_rate: 1.5,
            ..LearningConfig::default()
        };
        assert!(matches!(
            LearningLoop::new(cfg),
            Err(AiError::InvalidConfig("transfer_rate"))
        ));
    }

    proptest! {
        #[test]
        fn traits_stay_unit(returns in proptest::collection::vec(-10.0f64..10.0, 1..30)) {
            let mut s = agent(1, 0.5);
            for r in &returns {
                let seq = s.history.push(record(1, acquire()));
                s.history.resolve(seq, *r);
            }
            let mut l = LearningLoop::default();
            l.learn(&mut s);
            for (_, v) in s.profile.iter() {
                prop_assert!((0.0..=1.0).contains(&v));
            }
            prop_assert!((0.0..=1.0).contains(&s.learning.experience()));
        }
    }
}
