//! Competitor decision making.
//!
//! Base scores come from the guarded predictor; the engine then applies the
//! market, risk, behavior, difficulty and feasibility adjustments and picks
//! from the top of the ranking with a window that widens with the agent's
//! risk tolerance.

use crate::features::{Feature, FeatureExtractor, FeatureVector};
use crate::predictor::{
    ActionPredictor, ActionScores, FallbackReason, GuardConfig, GuardedPredictor,
};
use crate::AiError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{
    clamp_unit, Action, ActionKind, AssetClass, CompetitorState, DecisionRecord, GameContext,
    ScoreSource, SimTime, Trait,
};
use sim_director::DifficultySettings;
use sim_econ::MarketOutlook;
use sim_progress::ProgressionState;
use std::cmp::Ordering;
use tracing::debug;

/// Read-only context for one decision. Every field is a snapshot.
#[derive(Clone, Copy, Debug)]
pub struct DecisionContext<'a> {
    pub game: &'a GameContext,
    pub progression: &'a ProgressionState,
    pub difficulty: &'a DifficultySettings,
    pub outlook: &'a MarketOutlook,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Upper bound on how far down the ranking selection may reach.
    pub selection_window: usize,
    /// Weight of the market-favorability term.
    pub market_weight: f64,
    /// Strength of the risk penalty at zero risk tolerance.
    pub risk_penalty: f64,
    /// Minimum adjusted score of `Wait`.
    pub wait_floor: f64,
    /// Share of cash an agent is willing to put into research at once.
    pub research_budget_fraction: f64,
    /// Largest price change proposed by `AdjustPricing`.
    pub max_price_move: f64,
    /// Simulated seconds between decisions at decision speed 1.
    pub cooldown_secs: u64,
    pub history_capacity: usize,
    pub guard: GuardConfig,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            selection_window: 3,
            market_weight: 0.3,
            risk_penalty: 0.5,
            wait_floor: 0.05,
            research_budget_fraction: 0.1,
            max_price_move: 0.15,
            cooldown_secs: 5,
            history_capacity: 64,
            guard: GuardConfig::default(),
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<(), AiError> {
        if self.selection_window == 0 {
            return Err(AiError::InvalidConfig("selection_window"));
        }
        for (v, name) in [
            (self.market_weight, "market_weight"),
            (self.risk_penalty, "risk_penalty"),
            (self.research_budget_fraction, "research_budget_fraction"),
            (self.max_price_move, "max_price_move"),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(AiError::InvalidConfig(name));
            }
        }
        if !self.wait_floor.is_finite() || self.wait_floor <= 0.0 || self.wait_floor > 1.0 {
            return Err(AiError::InvalidConfig("wait_floor"));
        }
        if self.history_capacity == 0 {
            return Err(AiError::InvalidConfig("history_capacity"));
        }
        Ok(())
    }
}

/// One scored option, after adjustments.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub action: Action,
    pub base: f64,
    pub adjusted: f64,
}

fn is_growth(kind: ActionKind) -> bool {
    matches!(
        kind,
        ActionKind::AcquireAsset | ActionKind::OpenTradeRoute | ActionKind::ExpandRegion
    )
}

/// Scores, filters and selects actions for competitor agents.
#[derive(Debug)]
pub struct DecisionEngine {
    cfg: DecisionConfig,
    predictor: GuardedPredictor,
    rng: ChaCha8Rng,
    last_fallback: Option<FallbackReason>,
}

impl DecisionEngine {
    pub fn new(
        cfg: DecisionConfig,
        model: Option<Box<dyn ActionPredictor>>,
        seed: u64,
    ) -> Result<Self, AiError> {
        cfg.validate()?;
        Ok(Self {
            predictor: GuardedPredictor::new(model, cfg.guard.clone()),
            rng: ChaCha8Rng::seed_from_u64(seed),
            last_fallback: None,
            cfg,
        })
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.cfg
    }

    pub fn has_model(&self) -> bool {
        self.predictor.has_model()
    }

    /// Concrete parameters for `kind` given the agent and market.
    fn plan(&self, kind: ActionKind, state: &CompetitorState, ctx: &DecisionContext<'_>) -> Action {
        let market = &ctx.game.market;
        let region = state.finances.regions;
        match kind {
            ActionKind::AcquireAsset => Action::AcquireAsset {
                class: if state.finances.assets_owned % 3 == 2 {
                    AssetClass::Warehouse
                } else {
                    AssetClass::Ship
                },
                budget: market.asset_price,
            },
            ActionKind::DisposeAsset => Action::DisposeAsset {
                asset_index: state.finances.assets_owned.saturating_sub(1),
                expected_proceeds: if state.finances.assets_owned > 0 {
                    state.finances.asset_value / Decimal::from(state.finances.assets_owned)
                } else {
                    Decimal::ZERO
                },
            },
            ActionKind::InvestResearch => {
                let share = self.cfg.research_budget_fraction
                    * (0.5 + state.profile.innovation_focus());
                let fraction = Decimal::from_f64(share.min(1.0)).unwrap_or(Decimal::ZERO);
                Action::InvestResearch {
                    budget: (state.finances.cash * fraction).round_dp(2),
                }
            }
            ActionKind::OpenTradeRoute => Action::OpenTradeRoute {
                origin: format!("R{}", region.saturating_sub(1)),
                destination: format!("R{region}"),
                budget: market.route_cost,
            },
            ActionKind::AdjustPricing => {
                let push = (market.demand_index - 0.5) * 0.2 - 0.05 * market.competition_intensity;
                Action::AdjustPricing {
                    magnitude: push.clamp(-self.cfg.max_price_move, self.cfg.max_price_move),
                }
            }
            ActionKind::ExpandRegion => Action::ExpandRegion {
                region: format!("R{}", region + 1),
                budget: market.region_entry_cost,
            },
            ActionKind::Wait => Action::Wait,
        }
    }

    fn market_term(&self, kind: ActionKind, x: &FeatureVector) -> f64 {
        let favorability = 0.5 * x.get(Feature::Favorability) + 0.5 * x.get(Feature::DemandIndex);
        let tilt = self.cfg.market_weight * 2.0 * (favorability - 0.5);
        match kind {
            k if is_growth(k) => 1.0 + tilt,
            ActionKind::DisposeAsset => 1.0 - tilt,
            ActionKind::AdjustPricing => {
                1.0 + 0.5 * self.cfg.market_weight * x.get(Feature::MarketVolatility)
            }
            _ => 1.0,
        }
    }

    fn behavior_multiplier(kind: ActionKind, state: &CompetitorState) -> f64 {
        let p = &state.profile;
        match kind {
            ActionKind::AcquireAsset => 0.7 + 0.6 * p.aggressiveness(),
            ActionKind::DisposeAsset => 0.7 + 0.6 * p.get(Trait::Caution),
            ActionKind::InvestResearch => 0.6 + 0.8 * p.innovation_focus(),
            ActionKind::OpenTradeRoute => {
                0.7 + 0.3 * p.collaboration_tendency() + 0.3 * p.get(Trait::ExplorationBias)
            }
            ActionKind::AdjustPricing => 0.7 + 0.6 * p.get(Trait::PriceSensitivity),
            ActionKind::ExpandRegion => {
                0.6 + 0.4 * p.aggressiveness() + 0.4 * p.get(Trait::ExpansionDrive)
            }
            ActionKind::Wait => 0.6 + 0.8 * p.get(Trait::Patience),
        }
    }

    fn difficulty_multiplier(kind: ActionKind, settings: &DifficultySettings) -> f64 {
        let a = clamp_unit(settings.ai_aggressiveness);
        match kind {
            k if is_growth(k) => 0.75 + 0.5 * a,
            ActionKind::Wait => 1.25 - 0.5 * a,
            _ => 1.0,
        }
    }

    fn feasible(action: &Action, state: &CompetitorState) -> bool {
        match action {
            Action::DisposeAsset { .. } => state.finances.assets_owned > 0,
            Action::InvestResearch { budget } => {
                *budget > Decimal::ZERO && *budget <= state.finances.cash
            }
            other => other.required_budget() <= state.finances.cash,
        }
    }

    /// Every candidate with its adjusted score, in [`ActionKind::ALL`] order.
    /// Infeasible candidates score exactly 0; `Wait` never does.
    pub fn candidates(
        &self,
        state: &CompetitorState,
        ctx: &DecisionContext<'_>,
        features: &FeatureVector,
        scores: &ActionScores,
    ) -> Vec<Candidate> {
        let rt = state.profile.risk_tolerance();
        ActionKind::ALL
            .iter()
            .map(|&kind| {
                let action = self.plan(kind, state, ctx);
                let base = scores.get(kind);
                let adjusted = if Self::feasible(&action, state) {
                    let risk = 1.0 - self.cfg.risk_penalty * kind.base_risk() * (1.0 - rt);
                    let s = base
                        * self.market_term(kind, features)
                        * risk
                        * Self::behavior_multiplier(kind, state)
                        * Self::difficulty_multiplier(kind, ctx.difficulty);
                    if s.is_finite() {
                        s.max(0.0)
                    } else {
                        0.0
                    }
                } else {
                    0.0
                };
                let adjusted = if kind == ActionKind::Wait {
                    adjusted.max(self.cfg.wait_floor)
                } else {
                    adjusted
                };
                Candidate {
                    action,
                    base,
                    adjusted,
                }
            })
            .collect()
    }

    /// Index into a ranking of `n` feasible candidates.
    fn select_index(&mut self, risk_tolerance: f64, n: usize) -> usize {
        let window = n.min(self.cfg.selection_window);
        if window <= 1 {
            return 0;
        }
        let u: f64 = self.rng.gen();
        let idx = (u * clamp_unit(risk_tolerance) * window as f64).floor() as usize;
        idx.min(window - 1)
    }

    /// Decide the next action for `state`. Total: always returns a record.
    pub fn decide(&mut self, state: &CompetitorState, ctx: &DecisionContext<'_>) -> DecisionRecord {
        let now = ctx.game.time.now;
        let features = FeatureExtractor::extract(state, ctx);
        let scored = self.predictor.score(&features, now);
        let mut ranked: Vec<Candidate> = self
            .candidates(state, ctx, &features, &scored.scores)
            .into_iter()
            .filter(|c| c.adjusted > 0.0)
            .collect();
        ranked.sort_by(|a, b| {
            b.adjusted
                .partial_cmp(&a.adjusted)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.action.kind().cmp(&b.action.kind()))
        });
        if ranked.is_empty() {
            ranked.push(Candidate {
                action: Action::Wait,
                base: 0.0,
                adjusted: self.cfg.wait_floor,
            });
        }
        let total: f64 = ranked.iter().map(|c| c.adjusted).sum();
        let rt = state.profile.risk_tolerance();
        let idx = self.select_index(rt, ranked.len());
        let n = ranked.len();
        let chosen = ranked.swap_remove(idx);
        let kind = chosen.action.kind();
        let confidence = if total > 0.0 {
            clamp_unit(chosen.adjusted / total)
        } else {
            1.0
        };
        let expected_return = kind.base_return() * self.market_term(kind, &features);
        let rationale = rationale(
            kind,
            &chosen,
            idx,
            n,
            rt,
            scored.source,
            scored.fallback.as_ref(),
        );
        self.last_fallback = scored.fallback;
        debug!(
            competitor = %state.id,
            action = %kind,
            score = chosen.adjusted,
            rank = idx + 1,
            source = %scored.source,
            "decision made"
        );
        DecisionRecord {
            competitor: state.id,
            action: chosen.action,
            confidence,
            expected_return,
            risk_level: kind.base_risk(),
            rationale,
            source: scored.source,
            decided_at: now,
        }
    }

    /// Why the most recent decision did not use the model, if it did not.
    pub fn last_fallback(&self) -> Option<&FallbackReason> {
        self.last_fallback.as_ref()
    }

    /// Whether the model is currently bypassed after repeated failures.
    pub fn circuit_open(&self, now: SimTime) -> bool {
        self.predictor.circuit_open(now)
    }
}

fn rationale(
    kind: ActionKind,
    chosen: &Candidate,
    idx: usize,
    n: usize,
    risk_tolerance: f64,
    source: ScoreSource,
    fallback: Option<&FallbackReason>,
) -> String {
    let mut s = format!(
        "{kind} scored {:.3} (base {:.3}), rank {} of {n} at risk tolerance {risk_tolerance:.2}; scored by {source}",
        chosen.adjusted,
        chosen.base,
        idx + 1,
    );
    if let Some(reason) = fallback {
        s.push_str(&format!(" ({reason})"));
    }
    s
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sim_core::{BehaviorProfile, CompetitorId, Finances, MarketSnapshot, TimeContext};
    use sim_director::DifficultyLevel;
    use sim_progress::{default_milestones, ProgressionAccumulator, ProgressionConfig};
    use std::collections::BTreeSet;

    pub(crate) struct Fixture {
        pub game: GameContext,
        pub progression: ProgressionState,
        pub difficulty: DifficultySettings,
        pub outlook: MarketOutlook,
    }

    impl Fixture {
        pub fn new() -> Self {
            let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            Self {
                game: GameContext {
                    player_assets: Decimal::new(10_000_000, 0),
                    market: MarketSnapshot::default(),
                    competitors: Vec::new(),
                    time: TimeContext::at(start, SimTime::from_secs(100), 60),
                },
                progression: ProgressionAccumulator::new(
                    ProgressionConfig::default(),
                    default_milestones(),
                )
                .unwrap()
                .snapshot(),
                difficulty: DifficultySettings::for_level(DifficultyLevel::new(0.5)),
                outlook: MarketOutlook::default(),
            }
        }

        pub fn ctx(&self) -> DecisionContext<'_> {
            DecisionContext {
                game: &self.game,
                progression: &self.progression,
                difficulty: &self.difficulty,
                outlook: &self.outlook,
            }
        }

        pub fn competitor(&self, risk_tolerance: f64, cash: i64) -> CompetitorState {
            let mut profile = BehaviorProfile::neutral();
            profile.set(Trait::RiskTolerance, risk_tolerance);
            CompetitorState::new(
                CompetitorId(7),
                "Blue Anchor",
                profile,
                Finances::new(Decimal::new(cash, 0), Decimal::new(6_000_000, 0), 3, 55.0),
                16,
            )
        }
    }

    fn engine(seed: u64) -> DecisionEngine {
        DecisionEngine::new(DecisionConfig::default(), None, seed).unwrap()
    }

    fn ranking(e: &DecisionEngine, state: &CompetitorState, fx: &Fixture) -> Vec<ActionKind> {
        let ctx = fx.ctx();
        let x = FeatureExtractor::extract(state, &ctx);
        let scores = crate::predictor::RuleBasedPredictor.scores(&x);
        let mut c: Vec<_> = e
            .candidates(state, &ctx, &x, &scores)
            .into_iter()
            .filter(|c| c.adjusted > 0.0)
            .collect();
        c.sort_by(|a, b| {
            b.adjusted
                .partial_cmp(&a.adjusted)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.action.kind().cmp(&b.action.kind()))
        });
        c.into_iter().map(|c| c.action.kind()).collect()
    }

    #[test]
    fn zero_risk_tolerance_always_takes_the_top() {
        let fx = Fixture::new();
        let state = fx.competitor(0.0, 50_000_000);
        let mut e = engine(1);
        let top = ranking(&e, &state, &fx)[0];
        for _ in 0..200 {
            assert_eq!(e.decide(&state, &fx.ctx()).action.kind(), top);
        }
    }

    #[test]
    fn full_risk_tolerance_ranges_over_top_three() {
        let fx = Fixture::new();
        let state = fx.competitor(1.0, 50_000_000);
        let mut e = engine(2);
        let top3: BTreeSet<_> = ranking(&e, &state, &fx).into_iter().take(3).collect();
        assert_eq!(top3.len(), 3);
        let mut seen = BTreeSet::new();
        for _ in 0..300 {
            let k = e.decide(&state, &fx.ctx()).action.kind();
            assert!(top3.contains(&k), "{k} outside the top three");
            seen.insert(k);
        }
        assert_eq!(seen, top3);
    }

    #[test]
    fn broke_agent_without_model_still_decides() {
        let fx = Fixture::new();
        let mut state = fx.competitor(0.6, 0);
        state.finances.assets_owned = 0;
        let mut e = engine(3);
        for _ in 0..20 {
            let r = e.decide(&state, &fx.ctx());
            assert_eq!(r.source, ScoreSource::RuleBased);
            assert!(r.action.required_budget() <= state.finances.cash);
            assert!(matches!(r.action, Action::Wait | Action::AdjustPricing { .. }));
            assert!(r.rationale.contains("rule-based fallback"));
        }
    }

    #[test]
    fn unaffordable_actions_score_zero() {
        let fx = Fixture::new();
        let state = fx.competitor(0.5, 100_000);
        let e = engine(4);
        let ctx = fx.ctx();
        let x = FeatureExtractor::extract(&state, &ctx);
        let scores = crate::predictor::RuleBasedPredictor.scores(&x);
        let c = e.candidates(&state, &ctx, &x, &scores);
        assert_eq!(c[ActionKind::AcquireAsset.index()].adjusted, 0.0);
        assert_eq!(c[ActionKind::ExpandRegion.index()].adjusted, 0.0);
        assert!(c[ActionKind::Wait.index()].adjusted > 0.0);
    }

    #[test]
    fn same_seed_same_decisions() {
        let fx = Fixture::new();
        let state = fx.competitor(0.8, 20_000_000);
        let mut a = engine(9);
        let mut b = engine(9);
        for _ in 0..50 {
            assert_eq!(a.decide(&state, &fx.ctx()), b.decide(&state, &fx.ctx()));
        }
    }

    #[test]
    fn record_carries_fixed_risk_and_normalized_confidence() {
        let fx = Fixture::new();
        let state = fx.competitor(0.4, 20_000_000);
        let r = engine(5).decide(&state, &fx.ctx());
        assert_eq!(r.risk_level, r.action.kind().base_risk());
        assert!(r.confidence > 0.0 && r.confidence <= 1.0);
        assert_eq!(r.competitor, CompetitorId(7));
        assert_eq!(r.decided_at, SimTime::from_secs(100));
    }

    #[derive(Debug)]
    struct Sleepy;

    impl ActionPredictor for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn predict(&self, x: &FeatureVector) -> Result<ActionScores, crate::PredictorError> {
            std::thread::sleep(std::time::Duration::from_secs(2));
            Ok(crate::predictor::RuleBasedPredictor.scores(x))
        }
    }

    #[test]
    fn slow_model_decides_within_budget() {
        let fx = Fixture::new();
        let state = fx.competitor(0.4, 20_000_000);
        let mut e =
            DecisionEngine::new(DecisionConfig::default(), Some(Box::new(Sleepy)), 6).unwrap();
        let started = std::time::Instant::now();
        let r = e.decide(&state, &fx.ctx());
        assert!(started.elapsed() < std::time::Duration::from_millis(500));
        assert_eq!(r.source, ScoreSource::RuleBased);
        assert!(matches!(e.last_fallback(), Some(FallbackReason::OverBudget(_))));
    }
}
