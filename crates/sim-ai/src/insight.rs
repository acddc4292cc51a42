//! Behavior insights: notable changes in how competitors act, derived by
//! comparing successive observations of each agent.

use crate::predictor::FallbackReason;
use serde::{Deserialize, Serialize};
use sim_core::{ActionKind, CompetitorId, CompetitorState, SimTime};
use sim_director::SkillEstimate;
use std::collections::BTreeMap;

/// Decisions considered when computing an agent's dominant strategy.
const STRATEGY_WINDOW: usize = 10;
/// Minimum share of the window a kind needs to count as dominant.
const DOMINANCE_SHARE: f64 = 0.4;
/// Minimum risk-tolerance change reported as an appetite shift.
const RISK_SHIFT: f64 = 0.05;
/// Experience is reported each time it crosses a multiple of this.
const EXPERIENCE_STEP: f64 = 0.25;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InsightKind {
    StrategyShift {
        from: Option<ActionKind>,
        to: ActionKind,
    },
    RiskAppetiteChange {
        from: f64,
        to: f64,
    },
    LearningMilestone {
        experience: f64,
    },
    FallbackUsage {
        reason: FallbackReason,
    },
    /// Periodic estimate of the player's skill.
    SkillAssessment(SkillEstimate),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorInsight {
    /// `None` for player-level insights.
    pub competitor: Option<CompetitorId>,
    pub kind: InsightKind,
    pub at: SimTime,
}

impl BehaviorInsight {
    pub fn skill(estimate: SkillEstimate) -> Self {
        Self {
            competitor: None,
            at: estimate.at,
            kind: InsightKind::SkillAssessment(estimate),
        }
    }

    pub fn fallback(competitor: CompetitorId, reason: FallbackReason, at: SimTime) -> Self {
        Self {
            competitor: Some(competitor),
            kind: InsightKind::FallbackUsage { reason },
            at,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Seen {
    strategy: Option<ActionKind>,
    risk_tolerance: f64,
    experience_level: u32,
}

fn dominant_strategy(state: &CompetitorState) -> Option<ActionKind> {
    let window = state.history.len().min(STRATEGY_WINDOW);
    if window == 0 {
        return None;
    }
    ActionKind::ALL
        .iter()
        .map(|&k| (k, state.history.recent_kind_count(k, STRATEGY_WINDOW)))
        .filter(|(_, n)| *n as f64 / window as f64 >= DOMINANCE_SHARE)
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(k, _)| k)
}

fn experience_level(experience: f64) -> u32 {
    (experience / EXPERIENCE_STEP).floor() as u32
}

/// Remembers the last observation of each competitor.
#[derive(Clone, Debug, Default)]
pub struct InsightTracker {
    seen: BTreeMap<CompetitorId, Seen>,
}

impl InsightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `state` with its previous observation. The first observation
    /// only establishes a baseline.
    pub fn observe(&mut self, state: &CompetitorState, now: SimTime) -> Vec<BehaviorInsight> {
        let current = Seen {
            strategy: dominant_strategy(state),
            risk_tolerance: state.profile.risk_tolerance(),
            experience_level: experience_level(state.learning.experience()),
        };
        let Some(prev) = self.seen.get(&state.id).cloned() else {
            self.seen.insert(state.id, current);
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut emit = |kind| {
            out.push(BehaviorInsight {
                competitor: Some(state.id),
                kind,
                at: now,
            })
        };
        if let Some(to) = current.strategy {
            if prev.strategy != Some(to) {
                emit(InsightKind::StrategyShift {
                    from: prev.strategy,
                    to,
                });
            }
        }
        // The risk baseline only moves when a shift is reported, so slow
        // drift accumulates until it crosses the threshold.
        let risk_shifted = (current.risk_tolerance - prev.risk_tolerance).abs() >= RISK_SHIFT;
        if risk_shifted {
            emit(InsightKind::RiskAppetiteChange {
                from: prev.risk_tolerance,
                to: current.risk_tolerance,
            });
        }
        if current.experience_level > prev.experience_level {
            emit(InsightKind::LearningMilestone {
                experience: state.learning.experience(),
            });
        }
        self.seen.insert(
            state.id,
            Seen {
                risk_tolerance: if risk_shifted {
                    current.risk_tolerance
                } else {
                    prev.risk_tolerance
                },
                ..current
            },
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sim_core::{Action, BehaviorProfile, DecisionRecord, Finances, ScoreSource, Trait};
    use sim_director::SkillTrend;

    fn agent() -> CompetitorState {
        CompetitorState::new(
            CompetitorId(4),
            "Gulf Freight",
            BehaviorProfile::neutral(),
            Finances::new(Decimal::new(1_000, 0), Decimal::ZERO, 0, 50.0),
            32,
        )
    }

    fn push(s: &mut CompetitorState, action: Action) {
        s.history.push(DecisionRecord {
            competitor: s.id,
            action,
            confidence: 1.0,
            expected_return: 0.0,
            risk_level: 0.05,
            rationale: String::new(),
            source: ScoreSource::RuleBased,
            decided_at: SimTime::ZERO,
        });
    }

    #[test]
    fn first_observation_is_a_baseline() {
        let mut t = InsightTracker::new();
        let mut s = agent();
        push(&mut s, Action::Wait);
        assert!(t.observe(&s, SimTime::ZERO).is_empty());
    }

    #[test]
    fn strategy_shift_is_reported_once() {
        let mut t = InsightTracker::new();
        let mut s = agent();
        t.observe(&s, SimTime::ZERO);
        for _ in 0..4 {
            push(&mut s, Action::AdjustPricing { magnitude: 0.05 });
        }
        let out = t.observe(&s, SimTime::from_secs(10));
        assert_eq!(
            out[0].kind,
            InsightKind::StrategyShift {
                from: None,
                to: ActionKind::AdjustPricing
            }
        );
        assert!(t.observe(&s, SimTime::from_secs(20)).is_empty());
    }

    #[test]
    fn slow_risk_drift_accumulates() {
        let mut t = InsightTracker::new();
        let mut s = agent();
        t.observe(&s, SimTime::ZERO);
        s.profile.adjust(Trait::RiskTolerance, 0.03);
        assert!(t.observe(&s, SimTime::from_secs(1)).is_empty());
        s.profile.adjust(Trait::RiskTolerance, 0.03);
        let out = t.observe(&s, SimTime::from_secs(2));
        assert!(matches!(
            out[0].kind,
            InsightKind::RiskAppetiteChange { from, .. } if from == 0.5
        ));
    }

    #[test]
    fn experience_crossing_a_step_is_a_milestone() {
        let mut t = InsightTracker::new();
        let mut s = agent();
        t.observe(&s, SimTime::ZERO);
        s.learning.gain_experience(0.3);
        let out = t.observe(&s, SimTime::from_secs(5));
        assert!(matches!(out[0].kind, InsightKind::LearningMilestone { .. }));
    }

    #[test]
    fn skill_insight_is_player_level() {
        let i = BehaviorInsight::skill(SkillEstimate {
            skill: 0.6,
            delta: 0.1,
            trend: SkillTrend::Improving,
            assessments: 2,
            at: SimTime::from_secs(300),
        });
        assert_eq!(i.competitor, None);
        assert_eq!(i.at, SimTime::from_secs(300));
    }
}
