//! Competitor agents: identity, finances, history and learning state.

use crate::action::{ActionKind, DecisionRecord};
use crate::profile::BehaviorProfile;
use crate::time::SimTime;
use crate::{clamp_unit, ValidationError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Stable competitor identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompetitorId(pub u32);

impl fmt::Display for CompetitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Financial and operational snapshot of a competitor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finances {
    /// Cash on hand in USD (never negative).
    pub cash: Decimal,
    /// Book value of owned assets in USD.
    pub asset_value: Decimal,
    /// Number of owned assets.
    pub assets_owned: u32,
    /// Number of regions served.
    pub regions: u32,
    /// Number of active trade routes.
    pub trade_routes: u32,
    /// Accumulated research level in [0,1].
    pub research_level: f64,
    /// Fraction of fleet capacity in use, in [0,1].
    pub utilization: f64,
    reputation: f64,
}

impl Finances {
    /// Build a finance snapshot; reputation is clamped into [0,100].
    pub fn new(cash: Decimal, asset_value: Decimal, assets_owned: u32, reputation: f64) -> Self {
        let mut f = Self {
            cash: cash.max(Decimal::ZERO),
            asset_value: asset_value.max(Decimal::ZERO),
            assets_owned,
            regions: 1,
            trade_routes: 1,
            research_level: 0.0,
            utilization: 0.5,
            reputation: 0.0,
        };
        f.set_reputation(reputation);
        f
    }

    /// Reputation in [0,100].
    pub fn reputation(&self) -> f64 {
        self.reputation
    }

    /// Overwrite reputation, clamping into [0,100].
    pub fn set_reputation(&mut self, value: f64) {
        self.reputation = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 100.0)
        };
    }

    /// Cash plus asset value.
    pub fn net_worth(&self) -> Decimal {
        self.cash + self.asset_value
    }

    /// Cash as a float for scoring math.
    pub fn cash_f64(&self) -> f64 {
        self.cash.to_f64().unwrap_or(0.0)
    }

    /// Share of net worth held as cash, in [0,1].
    pub fn liquidity_ratio(&self) -> f64 {
        let worth = self.net_worth().to_f64().unwrap_or(0.0);
        if worth <= 0.0 {
            return 0.0;
        }
        clamp_unit(self.cash_f64() / worth)
    }
}

/// One slot of the performance ring: a decision and, once the execution
/// layer reports back, its realized return.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonic per-competitor sequence number.
    pub seq: u64,
    pub record: DecisionRecord,
    /// Realized fractional return, set at most once.
    pub realized_return: Option<f64>,
    /// Whether learning has consumed the realized return.
    #[serde(default)]
    learned: bool,
}

impl HistoryEntry {
    pub fn learned(&self) -> bool {
        self.learned
    }
}

/// Aggregate over the resolved part of a performance history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub decisions: usize,
    pub resolved: usize,
    /// Share of resolved decisions with a positive return.
    pub success_rate: f64,
    pub mean_return: f64,
    /// Mean of `realized - expected` over resolved decisions.
    pub mean_surprise: f64,
}

/// Bounded ring of past decisions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceHistory {
    capacity: usize,
    next_seq: u64,
    entries: VecDeque<HistoryEntry>,
}

impl PerformanceHistory {
    /// Empty history holding at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            next_seq: 0,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a record, evicting the oldest when full. Returns its sequence.
    pub fn push(&mut self, record: DecisionRecord) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            seq,
            record,
            realized_return: None,
            learned: false,
        });
        seq
    }

    /// Attach a realized return to an entry. Returns `false` when the entry
    /// has been evicted or was already resolved.
    pub fn resolve(&mut self, seq: u64, realized_return: f64) -> bool {
        match self.entries.iter_mut().find(|e| e.seq == seq) {
            Some(e) if e.realized_return.is_none() && realized_return.is_finite() => {
                e.realized_return = Some(realized_return);
                true
            }
            _ => false,
        }
    }

    /// Resolved entries learning has not seen yet, oldest first, as
    /// `(kind, realized - expected)`. Each entry is handed out once; entries
    /// still waiting for an outcome do not hold back later ones.
    pub fn take_unlearned(&mut self) -> Vec<(ActionKind, f64)> {
        self.entries
            .iter_mut()
            .filter(|e| !e.learned)
            .filter_map(|e| {
                let r = e.realized_return?;
                e.learned = true;
                Some((e.record.action.kind(), r - e.record.expected_return))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Count of the last `n` decisions that chose `kind`.
    pub fn recent_kind_count(&self, kind: ActionKind, n: usize) -> usize {
        self.entries
            .iter()
            .rev()
            .take(n)
            .filter(|e| e.record.action.kind() == kind)
            .count()
    }

    /// Summary over resolved entries.
    pub fn stats(&self) -> HistoryStats {
        let mut stats = HistoryStats {
            decisions: self.entries.len(),
            ..HistoryStats::default()
        };
        let mut wins = 0usize;
        let mut total = 0.0;
        let mut surprise = 0.0;
        for e in &self.entries {
            if let Some(r) = e.realized_return {
                stats.resolved += 1;
                if r > 0.0 {
                    wins += 1;
                }
                total += r;
                surprise += r - e.record.expected_return;
            }
        }
        if stats.resolved > 0 {
            let n = stats.resolved as f64;
            stats.success_rate = wins as f64 / n;
            stats.mean_return = total / n;
            stats.mean_surprise = surprise / n;
        }
        stats
    }
}

/// Per-agent learning accumulator feeding technological progression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    experience: f64,
    singularity_weight: f64,
    /// Learning sessions completed.
    pub sessions: u32,
}

impl LearningState {
    pub fn new(singularity_weight: f64) -> Self {
        Self {
            experience: 0.0,
            singularity_weight: clamp_unit(singularity_weight),
            sessions: 0,
        }
    }

    /// Experience in [0,1].
    pub fn experience(&self) -> f64 {
        self.experience
    }

    /// How strongly this agent's learning drives progression, in [0,1].
    pub fn singularity_weight(&self) -> f64 {
        self.singularity_weight
    }

    /// Grow experience towards 1 by `gain` of the remaining gap.
    pub fn gain_experience(&mut self, gain: f64) -> f64 {
        let before = self.experience;
        self.experience = clamp_unit(before + (1.0 - before) * clamp_unit(gain));
        self.sessions = self.sessions.saturating_add(1);
        self.experience - before
    }

    pub fn set_singularity_weight(&mut self, w: f64) {
        self.singularity_weight = clamp_unit(w);
    }

    /// This agent's contribution to the progression agent term.
    pub fn contribution(&self) -> f64 {
        self.experience * self.singularity_weight
    }
}

/// A competitor agent. Created once per session and mutated in place by the
/// agents partition; every other reader works on clones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompetitorState {
    pub id: CompetitorId,
    pub name: String,
    pub profile: BehaviorProfile,
    pub finances: Finances,
    pub history: PerformanceHistory,
    pub learning: LearningState,
    /// When the last decision was made, if any.
    pub last_decision_at: Option<SimTime>,
    /// No decision before this time.
    pub cooldown_until: SimTime,
}

impl CompetitorState {
    pub fn new(
        id: CompetitorId,
        name: impl Into<String>,
        profile: BehaviorProfile,
        finances: Finances,
        history_capacity: usize,
    ) -> Self {
        let singularity = 0.5 * (profile.innovation_focus() + profile.learning_orientation());
        Self {
            id,
            name: name.into(),
            profile,
            finances,
            history: PerformanceHistory::with_capacity(history_capacity),
            learning: LearningState::new(singularity),
            last_decision_at: None,
            cooldown_until: SimTime::ZERO,
        }
    }

    /// Whether the cooldown gate allows a decision at `now`.
    pub fn ready_to_decide(&self, now: SimTime) -> bool {
        now >= self.cooldown_until
    }

    /// Time since the last decision, or `None` before the first one.
    pub fn time_since_last_decision(&self, now: SimTime) -> Option<Duration> {
        self.last_decision_at.map(|t| now.since(t))
    }

    /// Append a decision and arm the cooldown. Returns the history sequence.
    pub fn record_decision(&mut self, record: DecisionRecord, cooldown: Duration) -> u64 {
        let at = record.decided_at;
        self.last_decision_at = Some(at);
        self.cooldown_until = at.saturating_add(cooldown);
        self.history.push(record)
    }

    /// Structural sanity check used when loading externally built states.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.finances.cash < Decimal::ZERO || self.finances.asset_value < Decimal::ZERO {
            return Err(ValidationError::NegativeMoney);
        }
        if !(0.0..=1.0).contains(&self.finances.utilization)
            || !(0.0..=1.0).contains(&self.finances.research_level)
        {
            return Err(ValidationError::OutOfUnitRange("finances"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ScoreSource};
    use proptest::prelude::*;

    fn record(at: u64, expected: f64) -> DecisionRecord {
        DecisionRecord {
            competitor: CompetitorId(1),
            action: Action::Wait,
            confidence: 0.5,
            expected_return: expected,
            risk_level: 0.05,
            rationale: "test".into(),
            source: ScoreSource::RuleBased,
            decided_at: SimTime::from_secs(at),
        }
    }

    #[test]
    fn ring_evicts_oldest() {
        let mut h = PerformanceHistory::with_capacity(3);
        for i in 0..5 {
            h.push(record(i, 0.0));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.iter().next().map(|e| e.seq), Some(2));
        assert!(!h.resolve(0, 1.0), "evicted entries cannot resolve");
    }

    #[test]
    fn resolve_only_once() {
        let mut h = PerformanceHistory::with_capacity(4);
        let s = h.push(record(1, 0.1));
        assert!(h.resolve(s, 0.2));
        assert!(!h.resolve(s, -0.5));
        let stats = h.stats();
        assert_eq!(stats.resolved, 1);
        assert!((stats.mean_return - 0.2).abs() < 1e-12);
        assert!((stats.mean_surprise - 0.1).abs() < 1e-12);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[test]
    fn unresolved_entry_does_not_block_later_outcomes() {
        let mut h = PerformanceHistory::with_capacity(16);
        let seqs: Vec<u64> = (0..10).map(|i| h.push(record(i, 0.1))).collect();
        for &s in &seqs[1..] {
            assert!(h.resolve(s, 0.3));
        }
        let taken = h.take_unlearned();
        assert_eq!(taken.len(), 9);
        assert!(taken.iter().all(|&(k, d)| k == ActionKind::Wait && (d - 0.2).abs() < 1e-12));
        assert!(h.take_unlearned().is_empty());
        assert!(h.resolve(seqs[0], -0.1));
        assert_eq!(h.take_unlearned().len(), 1);
        assert!(h.iter().all(HistoryEntry::learned));
    }

    #[test]
    fn cooldown_gates_decisions() {
        let mut c = CompetitorState::new(
            CompetitorId(3),
            "Harbor Lines",
            BehaviorProfile::neutral(),
            Finances::new(Decimal::new(1_000, 0), Decimal::ZERO, 0, 50.0),
            8,
        );
        assert!(c.ready_to_decide(SimTime::ZERO));
        c.record_decision(record(10, 0.0), Duration::from_secs(5));
        assert!(!c.ready_to_decide(SimTime::from_secs(12)));
        assert!(c.ready_to_decide(SimTime::from_secs(15)));
        assert_eq!(
            c.time_since_last_decision(SimTime::from_secs(13)),
            Some(Duration::from_secs(3))
        );
        assert!(c.validate().is_ok());
    }

    proptest! {
        #[test]
        fn reputation_is_clamped(r in -1_000.0f64..1_000.0) {
            let f = Finances::new(Decimal::ZERO, Decimal::ZERO, 0, r);
            prop_assert!((0.0..=100.0).contains(&f.reputation()));
        }

        #[test]
        fn experience_stays_below_one(gains in proptest::collection::vec(0.0f64..3.0, 0..50)) {
            let mut l = LearningState::new(0.7);
            for g in gains {
                l.gain_experience(g);
                prop_assert!((0.0..=1.0).contains(&l.experience()));
            }
        }
    }
}
