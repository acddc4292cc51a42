//! Partitions own disjoint slices of session state. Each one is the only
//! writer of its state and of the bus topics it publishes; everything else
//! it needs is read from the latest bus snapshots.

use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_ai::{
    ActionPredictor, BehaviorInsight, DecisionContext, DecisionEngine, InsightTracker,
    LearningLoop,
};
use sim_core::{
    clamp_unit, Action, Archetype, BehaviorProfile, CommodityData, CommodityId,
    CompetitorId, CompetitorState, CompetitorSummary, Finances, GameContext, HistoricalSeries,
    MarketSnapshot, PlayerAction, SimTime, TimeContext,
};
use sim_director::{
    AcuteEvent, Adjustment, DifficultyController, DirectorSnapshot, Evaluation, PerformanceMetrics,
    SkillEstimate,
};
use sim_econ::{ForecastContext, MarketForecastEnsemble, MarketOutlook, PriceModel};
use sim_progress::{
    default_milestones, AdvanceOutcome, Contributions, MarketComplexity, ProgressionAccumulator,
    ProgressionState,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::bus::{AgentDigest, CoordinationBus, ForecastSnapshot};
use crate::config::{MarketSection, SessionConfig};
use crate::event::{EventHub, SessionEvent};
use crate::feed::MarketFeed;
use crate::health::{HealthAggregator, HealthReport, RecoveryAction, RefreshRequests};
use crate::metrics::RuntimeMetrics;
use crate::RuntimeError;

/// Handles every partition holds.
#[derive(Clone, Debug)]
pub struct Shared {
    pub bus: Arc<CoordinationBus>,
    pub events: EventHub,
    pub metrics: Arc<RuntimeMetrics>,
    pub refresh: Arc<RefreshRequests>,
}

impl Shared {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            bus: Arc::new(CoordinationBus::new()),
            events: EventHub::new(event_capacity),
            metrics: Arc::new(RuntimeMetrics::default()),
            refresh: Arc::new(RefreshRequests::default()),
        }
    }
}

/// Input from the surrounding game about the human player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlayerSignal {
    Action(PlayerAction),
    Acute(AcuteEvent),
}

/// Realized return of an earlier decision, reported once it settles.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub competitor: CompetitorId,
    /// Sequence from the matching [`SessionEvent::Decision`].
    pub seq: u64,
    pub realized_return: f64,
}

/// Window used to compare the latest price with its recent average.
const PRICE_WINDOW: usize = 30;

/// Commodity prices and forecasts. Publishes the forecast topic.
#[derive(Debug)]
pub struct MarketPartition {
    ensemble: MarketForecastEnsemble,
    feed: Box<dyn MarketFeed>,
    history: BTreeMap<CommodityId, HistoricalSeries>,
    horizon_days: f64,
    history_cap: usize,
    reference_volume: f64,
}

impl MarketPartition {
    /// Builds the ensemble and samples `cfg.warmup` observations so the
    /// first forecast has history to work with.
    pub fn new(
        cfg: &MarketSection,
        feed: Box<dyn MarketFeed>,
        model: Option<Box<dyn PriceModel>>,
    ) -> Result<Self, RuntimeError> {
        let mut p = Self {
            ensemble: MarketForecastEnsemble::new(&cfg.ensemble, model)?,
            feed,
            history: BTreeMap::new(),
            horizon_days: cfg.horizon_days,
            history_cap: cfg.history_cap,
            reference_volume: cfg.reference_volume,
        };
        for _ in 0..cfg.warmup {
            let sample = p.feed.sample(SimTime::ZERO);
            p.record(&sample);
        }
        info!(feed = p.feed.name(), warmup = cfg.warmup, "market partition ready");
        Ok(p)
    }

    pub fn history(&self, id: &CommodityId) -> Option<&HistoricalSeries> {
        self.history.get(id)
    }

    fn record(&mut self, commodities: &[CommodityData]) {
        for c in commodities {
            self.history.entry(c.id.clone()).or_default().push(
                c.current_price,
                c.demand,
                c.supply,
                self.history_cap,
            );
        }
    }

    /// One forecast cycle. Returns the number of predictions published.
    pub fn forecast(&mut self, shared: &Shared, now: SimTime) -> usize {
        let commodities = self.feed.sample(now);
        let defaults = ForecastContext::default();
        let ctx = ForecastContext {
            horizon_days: self.horizon_days,
            market_volatility: shared
                .bus
                .difficulty
                .value()
                .map_or(defaults.market_volatility, |d| d.settings.market_volatility),
            advanced_compute: shared
                .bus
                .progression
                .value()
                .is_some_and(|p| p.capabilities.advanced_compute_available()),
        };
        let empty = HistoricalSeries::default();
        let predictions = self.ensemble.forecast_all(
            commodities
                .iter()
                .map(|c| (c, self.history.get(&c.id).unwrap_or(&empty))),
            &ctx,
            now,
        );
        let outlook = MarketOutlook::from_predictions(&predictions, now);
        let rivals = shared.bus.agents.value().map_or(0, |a| a.summaries.len());
        let market = self.market_snapshot(&commodities, rivals);
        let complexity = MarketComplexity::from_commodities(&commodities, self.reference_volume);
        self.record(&commodities);

        let n = predictions.len();
        let favorability = outlook.favorability;
        shared.bus.forecast.publish(
            ForecastSnapshot {
                predictions,
                outlook,
                market,
                complexity,
            },
            now,
        );
        shared.metrics.record_forecast_cycle(n);
        shared.events.emit(SessionEvent::ForecastCycle {
            commodities: n,
            favorability,
            at: now,
        });
        n
    }

    /// Aggregate conditions from the raw commodities, before they are
    /// appended to history.
    fn market_snapshot(&self, commodities: &[CommodityData], rivals: usize) -> MarketSnapshot {
        let base = MarketSnapshot::default();
        if commodities.is_empty() {
            return base;
        }
        let n = commodities.len() as f64;
        let mean = |f: &dyn Fn(&CommodityData) -> f64| commodities.iter().map(f).sum::<f64>() / n;
        let demand_index = mean(&|c| {
            let total = c.demand + c.supply;
            if total > 0.0 {
                c.demand / total
            } else {
                0.5
            }
        });
        // 0.5 when prices sit on their recent average, 1 at double.
        let price_index = mean(&|c| {
            let avg = self
                .history
                .get(&c.id)
                .and_then(|h| h.mean_price(PRICE_WINDOW))
                .unwrap_or(c.current_price);
            if avg > 0.0 {
                clamp_unit(0.5 * c.current_price / avg)
            } else {
                0.5
            }
        });
        let cost_scale = 0.5 + price_index;
        let scaled = |d: Decimal| d * Decimal::new((cost_scale * 1000.0).round() as i64, 3);
        MarketSnapshot {
            demand_index: clamp_unit(demand_index),
            price_index: clamp_unit(price_index),
            volatility: clamp_unit(mean(&|c| c.volatility)),
            competition_intensity: if rivals == 0 {
                base.competition_intensity
            } else {
                clamp_unit(rivals as f64 / (rivals as f64 + 4.0))
            },
            growth_rate: mean(&|c| c.factors.gdp_growth),
            fuel_price_index: mean(&|c| c.factors.fuel_price_index),
            asset_price: scaled(base.asset_price),
            route_cost: scaled(base.route_cost),
            region_entry_cost: scaled(base.region_entry_cost),
        }
    }
}

/// Difficulty controller. Publishes the difficulty topic.
#[derive(Debug)]
pub struct DirectorPartition {
    controller: DifficultyController,
}

impl DirectorPartition {
    pub fn new(cfg: &SessionConfig) -> Result<Self, RuntimeError> {
        Ok(Self {
            controller: DifficultyController::new(cfg.difficulty.clone())?,
        })
    }

    pub fn snapshot(&self) -> DirectorSnapshot {
        self.controller.snapshot()
    }

    fn publish(&self, shared: &Shared, now: SimTime) {
        shared.bus.difficulty.publish(self.controller.snapshot(), now);
    }

    fn applied(&self, shared: &Shared, adj: Adjustment) {
        shared.metrics.record_adjustment();
        shared.events.emit(SessionEvent::DifficultyAdjusted(adj));
        if let Some(pc) = adj.phase_change {
            shared.events.emit(SessionEvent::PhaseChanged(pc));
        }
    }

    /// Player actions feed the performance window. Acute events move the
    /// level immediately and republish.
    pub fn ingest(&mut self, shared: &Shared, signal: PlayerSignal, now: SimTime) {
        match signal {
            PlayerSignal::Action(a) => self.controller.record_action(a),
            PlayerSignal::Acute(ev) => {
                if let Some(adj) = self.controller.apply_acute(ev, now) {
                    self.applied(shared, adj);
                }
                self.publish(shared, now);
            }
        }
    }

    pub fn analyze(&mut self, now: SimTime) -> PerformanceMetrics {
        self.controller.analyze(now)
    }

    /// Periodic review. The snapshot is republished whether or not the
    /// level moved.
    pub fn review(&mut self, shared: &Shared, now: SimTime) -> Evaluation {
        let eval = self.controller.evaluate(now);
        if let Some(adj) = eval.adjustment {
            self.applied(shared, adj);
        }
        self.publish(shared, now);
        eval
    }

    /// Republish the current snapshot without evaluating.
    pub fn republish(&self, shared: &Shared, now: SimTime) {
        self.publish(shared, now);
    }

    pub fn assess(&mut self, shared: &Shared, now: SimTime) -> SkillEstimate {
        let estimate = self.controller.assess_skill(now);
        self.publish(shared, now);
        shared.metrics.record_insights(1);
        shared
            .events
            .emit(SessionEvent::Insight(BehaviorInsight::skill(estimate)));
        estimate
    }
}

const NAMES: [&str; 12] = [
    "Blue Anchor",
    "Meridian Lines",
    "Northwind Cargo",
    "Saltmarsh & Co",
    "Harborlight",
    "Iron Gull Freight",
    "Cape Tern",
    "Redfield Maritime",
    "Ostrava Shipping",
    "Pelican Bay",
    "Coral Route",
    "Greywater Haulage",
];

/// Number of assets every competitor starts with.
const STARTING_ASSETS: u32 = 3;
const STARTING_REPUTATION: f64 = 50.0;

/// Seeded competitor field, archetypes assigned round-robin.
pub fn generate_competitors(cfg: &SessionConfig) -> Vec<CompetitorState> {
    let s = &cfg.session;
    let mut rng = ChaCha8Rng::seed_from_u64(s.seed.wrapping_add(1));
    let cash = Decimal::from(s.starting_cash);
    (0..s.competitors)
        .map(|i| {
            let idx = i as usize;
            let archetype = Archetype::ALL[idx % Archetype::ALL.len()];
            let profile = BehaviorProfile::generate(archetype, s.profile_jitter, &mut rng);
            let name = match idx / NAMES.len() {
                0 => NAMES[idx].to_string(),
                round => format!("{} {}", NAMES[idx % NAMES.len()], round + 1),
            };
            let finances = Finances::new(
                cash,
                cash / Decimal::TWO,
                STARTING_ASSETS,
                STARTING_REPUTATION,
            );
            CompetitorState::new(
                CompetitorId(i + 1),
                name,
                profile,
                finances,
                cfg.decision.history_capacity,
            )
        })
        .collect()
}

/// Competitor agents: decisions, learning and insights. Publishes the
/// agents and behavior-insight topics.
#[derive(Debug)]
pub struct AgentsPartition {
    competitors: Vec<CompetitorState>,
    engine: DecisionEngine,
    learning: LearningLoop,
    tracker: InsightTracker,
    research_investment: Decimal,
    decisions: u64,
    player_assets: Decimal,
    start_date: NaiveDate,
    secs_per_day: u32,
    base_cooldown: Duration,
    // Read until the first publish on the matching topic.
    initial_difficulty: DirectorSnapshot,
    initial_progression: ProgressionState,
}

impl AgentsPartition {
    pub fn new(
        cfg: &SessionConfig,
        model: Option<Box<dyn ActionPredictor>>,
    ) -> Result<Self, RuntimeError> {
        let competitors = generate_competitors(cfg);
        Ok(Self {
            engine: DecisionEngine::new(cfg.decision.clone(), model, cfg.session.seed)?,
            learning: LearningLoop::new(cfg.learning.clone())?,
            tracker: InsightTracker::new(),
            research_investment: Decimal::ZERO,
            decisions: 0,
            player_assets: Decimal::from(cfg.session.player_net_worth),
            start_date: cfg.session.start_date,
            secs_per_day: cfg.session.secs_per_day,
            base_cooldown: cfg.base_cooldown(),
            initial_difficulty: DifficultyController::new(cfg.difficulty.clone())?.snapshot(),
            initial_progression: ProgressionAccumulator::new(
                cfg.progression.clone(),
                default_milestones(),
            )?
            .snapshot(),
            competitors,
        })
    }

    pub fn competitors(&self) -> &[CompetitorState] {
        &self.competitors
    }

    pub fn research_investment(&self) -> Decimal {
        self.research_investment
    }

    pub fn digest(&self) -> AgentDigest {
        AgentDigest {
            summaries: self.competitors.iter().map(CompetitorSummary::from).collect(),
            agent_learning: Contributions::agent_term(self.competitors.iter().map(|c| &c.learning)),
            research_investment: self.research_investment,
            decisions: self.decisions,
        }
    }

    pub fn update(&self, shared: &Shared, now: SimTime) {
        shared.bus.agents.publish(self.digest(), now);
    }

    /// Decide for every competitor whose cooldown has elapsed. Returns the
    /// number of decisions made.
    pub fn decide(&mut self, shared: &Shared, now: SimTime) -> usize {
        let forecast = shared.bus.forecast.value().unwrap_or_default();
        let difficulty = shared
            .bus
            .difficulty
            .value()
            .unwrap_or_else(|| Arc::new(self.initial_difficulty.clone()));
        let progression = shared
            .bus
            .progression
            .value()
            .unwrap_or_else(|| Arc::new(self.initial_progression.clone()));
        let game = GameContext {
            player_assets: self.player_assets,
            market: forecast.market.clone(),
            competitors: self.competitors.iter().map(CompetitorSummary::from).collect(),
            time: TimeContext::at(self.start_date, now, self.secs_per_day),
        };
        let ctx = DecisionContext {
            game: &game,
            progression: &progression,
            difficulty: &difficulty.settings,
            outlook: &forecast.outlook,
        };
        let cooldown = self
            .base_cooldown
            .div_f64(progression.capabilities.decision_speed.max(1.0));

        let mut made = 0;
        for state in self.competitors.iter_mut() {
            if !state.ready_to_decide(now) {
                continue;
            }
            let record = self.engine.decide(state, &ctx);
            let fallback = self.engine.last_fallback().cloned();
            if let Action::InvestResearch { budget } = &record.action {
                self.research_investment += *budget;
            }
            shared.metrics.record_decision(fallback.is_some());
            if let (Some(reason), true) = (fallback, self.engine.has_model()) {
                shared.metrics.record_insights(1);
                shared.events.emit(SessionEvent::Insight(BehaviorInsight::fallback(
                    state.id, reason, now,
                )));
            }
            let seq = state.record_decision(record.clone(), cooldown);
            shared.events.emit(SessionEvent::Decision { seq, record });
            self.decisions += 1;
            made += 1;
        }
        if made > 0 {
            debug!(decisions = made, at = %now, "decision cycle complete");
        }
        made
    }

    /// Learning session for every competitor, then knowledge sharing and
    /// insight detection. Publishes this cycle's insights.
    pub fn learn(&mut self, shared: &Shared, now: SimTime) -> Vec<BehaviorInsight> {
        for state in self.competitors.iter_mut() {
            let report = self.learning.learn(state);
            if report.outcomes > 0 {
                debug!(
                    competitor = %report.competitor,
                    outcomes = report.outcomes,
                    drift = report.drift,
                    "learned from outcomes"
                );
            }
        }
        let transfers = self.learning.share_knowledge(&mut self.competitors);
        if !transfers.is_empty() {
            debug!(transfers = transfers.len(), "knowledge shared");
        }
        let mut insights = Vec::new();
        for state in &self.competitors {
            insights.extend(self.tracker.observe(state, now));
        }
        shared.metrics.record_insights(insights.len());
        for i in &insights {
            shared.events.emit(SessionEvent::Insight(i.clone()));
        }
        shared.bus.insights.publish(insights.clone(), now);
        insights
    }

    /// Attach a realized return to a past decision. Unknown competitors or
    /// sequences are ignored.
    pub fn report_outcome(&mut self, shared: &Shared, report: OutcomeReport) -> bool {
        let Some(state) = self.competitors.iter_mut().find(|c| c.id == report.competitor) else {
            debug!(competitor = %report.competitor, "outcome for unknown competitor");
            return false;
        };
        let resolved = state.history.resolve(report.seq, report.realized_return);
        if resolved {
            shared.metrics.record_outcome();
        }
        resolved
    }
}

/// Technology progression. Publishes the progression topic.
#[derive(Debug)]
pub struct ProgressionPartition {
    accumulator: ProgressionAccumulator,
    last_run: Option<SimTime>,
}

impl ProgressionPartition {
    pub fn new(cfg: &SessionConfig) -> Result<Self, RuntimeError> {
        Ok(Self {
            accumulator: ProgressionAccumulator::new(cfg.progression.clone(), default_milestones())?,
            last_run: None,
        })
    }

    pub fn state(&self) -> &ProgressionState {
        self.accumulator.state()
    }

    /// Integrate over the time since the previous run. The first run only
    /// publishes.
    pub fn advance(&mut self, shared: &Shared, now: SimTime) -> AdvanceOutcome {
        let dt = self.last_run.map_or(Duration::ZERO, |t| now.since(t));
        self.last_run = Some(now);
        let agents = shared.bus.agents.value().unwrap_or_default();
        let contributions = Contributions {
            research_investment: agents.research_investment,
            agent_learning: agents.agent_learning,
            market: shared
                .bus
                .forecast
                .value()
                .map(|f| f.complexity)
                .unwrap_or_default(),
        };
        let outcome = self.accumulator.advance(dt, &contributions, now);
        shared.bus.progression.publish(self.accumulator.snapshot(), now);
        shared.metrics.record_unlocks(outcome.unlocked.len());
        for m in &outcome.unlocked {
            shared
                .events
                .emit(SessionEvent::MilestoneUnlocked(m.clone()));
        }
        if let Some((from, to)) = outcome.era_changed {
            shared.events.emit(SessionEvent::EraChanged { from, to, at: now });
        }
        outcome
    }
}

/// Coordination health. Publishes nothing; requests refreshes.
#[derive(Debug)]
pub struct HealthPartition {
    aggregator: HealthAggregator,
}

impl HealthPartition {
    pub fn new(cfg: &SessionConfig, recovery: Box<dyn RecoveryAction>) -> Self {
        Self {
            aggregator: HealthAggregator::new(cfg.health.clone(), cfg.schedule.clone(), recovery),
        }
    }

    pub fn last(&self) -> Option<&HealthReport> {
        self.aggregator.last()
    }

    pub fn check(&mut self, shared: &Shared, now: SimTime) -> HealthReport {
        let (report, acted) = self.aggregator.check(&shared.bus, now);
        shared.metrics.record_health_check(!acted.is_empty());
        if !report.healthy {
            shared.events.emit(SessionEvent::HealthDegraded {
                composite: report.composite,
                stale: report.stale(),
                at: now,
            });
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::RandomWalkFeed;
    use crate::bus::Topic;
    use crate::health::RefreshStale;
    use sim_core::PlayerActionKind;

    fn cfg() -> SessionConfig {
        SessionConfig::default()
    }

    #[test]
    fn competitors_are_seeded_and_named() {
        let mut c = cfg();
        c.session.competitors = 14;
        let a = generate_competitors(&c);
        let b = generate_competitors(&c);
        assert_eq!(a.len(), 14);
        assert_eq!(a[0].name, "Blue Anchor");
        assert_eq!(a[12].name, "Blue Anchor 2");
        assert_eq!(a[0].id, CompetitorId(1));
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.profile, y.profile);
        }
    }

    #[test]
    fn forecast_publishes_snapshot_and_event() {
        let c = cfg();
        let shared = Shared::new(64);
        let mut rx = shared.events.subscribe();
        let feed = Box::new(RandomWalkFeed::new(c.market.commodities, 5));
        let mut market = MarketPartition::new(&c.market, feed, None).unwrap();
        let n = market.forecast(&shared, SimTime::from_secs(1));
        assert_eq!(n, c.market.commodities);
        let snap = shared.bus.forecast.latest().unwrap();
        assert_eq!(snap.seq, 1);
        assert_eq!(snap.value.predictions.len(), n);
        assert!(sim_core::validate_market(&snap.value.market).is_ok());
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::ForecastCycle { commodities, .. } if commodities == n
        ));
        let first = &snap.value.predictions[0].commodity;
        assert_eq!(
            market.history(first).map(|h| h.prices.len()),
            Some(c.market.warmup + 1)
        );
    }

    #[test]
    fn acute_event_republishes_difficulty() {
        let shared = Shared::new(64);
        let mut director = DirectorPartition::new(&cfg()).unwrap();
        let before = director.snapshot().level;
        director.ingest(
            &shared,
            PlayerSignal::Acute(AcuteEvent::MajorLoss),
            SimTime::from_secs(3),
        );
        let snap = shared.bus.difficulty.value().unwrap();
        assert!(snap.level < before);
        assert_eq!(shared.metrics.snapshot().adjustments, 1);
    }

    #[test]
    fn player_actions_only_feed_the_window() {
        let shared = Shared::new(64);
        let mut director = DirectorPartition::new(&cfg()).unwrap();
        director.ingest(
            &shared,
            PlayerSignal::Action(PlayerAction::new(
                PlayerActionKind::BuyAsset,
                SimTime::from_secs(1),
                true,
                Duration::from_secs(2),
            )),
            SimTime::from_secs(1),
        );
        assert!(shared.bus.difficulty.latest().is_none());
    }

    #[test]
    fn decisions_respect_cooldown_and_resolve_outcomes() {
        let c = cfg();
        let shared = Shared::new(256);
        let mut rx = shared.events.subscribe();
        let mut agents = AgentsPartition::new(&c, None).unwrap();
        assert_eq!(agents.decide(&shared, SimTime::ZERO), c.session.competitors as usize);
        assert_eq!(agents.decide(&shared, SimTime::from_secs(1)), 0);
        let m = shared.metrics.snapshot();
        assert_eq!(m.decisions, u64::from(c.session.competitors));
        assert_eq!(m.fallbacks, m.decisions);

        let Ok(SessionEvent::Decision { seq, record }) = rx.try_recv() else {
            panic!("expected a decision event");
        };
        let report = OutcomeReport {
            competitor: record.competitor,
            seq,
            realized_return: record.expected_return + 0.02,
        };
        assert!(agents.report_outcome(&shared, report));
        assert!(!agents.report_outcome(
            &shared,
            OutcomeReport {
                competitor: CompetitorId(999),
                ..report
            }
        ));
        assert_eq!(shared.metrics.snapshot().outcomes, 1);
    }

    #[test]
    fn learning_publishes_insights() {
        let shared = Shared::new(64);
        let mut agents = AgentsPartition::new(&cfg(), None).unwrap();
        agents.decide(&shared, SimTime::ZERO);
        agents.learn(&shared, SimTime::from_secs(30));
        assert!(shared.bus.insights.latest().is_some());
    }

    #[test]
    fn progression_reads_agent_digest() {
        let c = cfg();
        let shared = Shared::new(64);
        let agents = AgentsPartition::new(&c, None).unwrap();
        let mut progression = ProgressionPartition::new(&c).unwrap();
        agents.update(&shared, SimTime::ZERO);
        let first = progression.advance(&shared, SimTime::ZERO);
        assert_eq!(first.delta, 0.0);
        let later = progression.advance(&shared, SimTime::from_secs(600));
        assert!(later.delta >= 0.0);
        assert_eq!(
            shared.bus.progression.value().unwrap().progress,
            progression.state().progress
        );
    }

    #[test]
    fn empty_bus_is_degraded() {
        let c = cfg();
        let shared = Shared::new(64);
        let mut rx = shared.events.subscribe();
        let mut health = HealthPartition::new(
            &c,
            Box::new(RefreshStale::new(Arc::clone(&shared.refresh))),
        );
        let report = health.check(&shared, SimTime::from_secs(1));
        assert!(!report.healthy);
        assert!(shared.refresh.take(Topic::Forecast));
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::HealthDegraded { .. }));
        assert_eq!(shared.metrics.snapshot().recoveries, 1);
    }
}
