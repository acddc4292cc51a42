//! Session drivers.
//!
//! [`Simulation`] steps every cadence deterministically in simulated time;
//! it is what tests, benches and replays use. [`spawn_session`] hands the
//! same partitions to one tokio task each, paced by wall-clock intervals,
//! coordinating only through the bus and the event channel.

use serde::{Deserialize, Serialize};
use sim_ai::ActionPredictor;
use sim_core::{CompetitorId, CompetitorState, SimTime};
use sim_director::DifficultyPhase;
use sim_econ::PriceModel;
use sim_progress::ProgressionEra;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::bus::{CoordinationBus, Topic};
use crate::config::SessionConfig;
use crate::event::SessionEvent;
use crate::feed::{MarketFeed, RandomWalkFeed};
use crate::health::{publisher, RefreshStale};
use crate::metrics::MetricsSnapshot;
use crate::partition::{
    AgentsPartition, DirectorPartition, HealthPartition, MarketPartition, OutcomeReport,
    PlayerSignal, ProgressionPartition, Shared,
};
use crate::schedule::{Cadence, Schedule, ScheduleConfig};
use crate::RuntimeError;

/// Optional external collaborators. Anything left out is replaced by the
/// built-in default: a seeded random-walk feed and rule-based scoring.
#[derive(Debug, Default)]
pub struct Collaborators {
    pub feed: Option<Box<dyn MarketFeed>>,
    pub action_model: Option<Box<dyn ActionPredictor>>,
    pub price_model: Option<Box<dyn PriceModel>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompetitorReport {
    pub id: CompetitorId,
    pub name: String,
    pub decisions: usize,
    pub resolved: usize,
    pub experience: f64,
    pub risk_tolerance: f64,
}

impl From<&CompetitorState> for CompetitorReport {
    fn from(c: &CompetitorState) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            decisions: c.history.len(),
            resolved: c.history.iter().filter(|e| e.realized_return.is_some()).count(),
            experience: c.learning.experience(),
            risk_tolerance: c.profile.risk_tolerance(),
        }
    }
}

/// End-of-session overview.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub now: SimTime,
    pub metrics: MetricsSnapshot,
    pub difficulty: Option<(f64, DifficultyPhase)>,
    pub progression: Option<(f64, ProgressionEra)>,
    pub favorability: Option<f64>,
    pub competitors: Vec<CompetitorReport>,
}

impl SessionSummary {
    fn collect(shared: &Shared, competitors: &[CompetitorState], now: SimTime) -> Self {
        let bus = &shared.bus;
        Self {
            now,
            metrics: shared.metrics.snapshot(),
            difficulty: bus.difficulty.value().map(|d| (d.level, d.phase)),
            progression: bus.progression.value().map(|p| (p.progress, p.era)),
            favorability: bus.forecast.value().map(|f| f.outlook.favorability),
            competitors: competitors.iter().map(CompetitorReport::from).collect(),
        }
    }
}

struct Partitions {
    market: MarketPartition,
    director: DirectorPartition,
    agents: AgentsPartition,
    progression: ProgressionPartition,
    health: HealthPartition,
}

impl Partitions {
    fn build(
        cfg: &SessionConfig,
        shared: &Shared,
        parts: Collaborators,
    ) -> Result<Self, RuntimeError> {
        let feed = parts.feed.unwrap_or_else(|| {
            Box::new(RandomWalkFeed::new(
                cfg.market.commodities,
                cfg.session.seed.wrapping_add(2),
            ))
        });
        Ok(Self {
            market: MarketPartition::new(&cfg.market, feed, parts.price_model)?,
            director: DirectorPartition::new(cfg)?,
            agents: AgentsPartition::new(cfg, parts.action_model)?,
            progression: ProgressionPartition::new(cfg)?,
            health: HealthPartition::new(
                cfg,
                Box::new(RefreshStale::new(Arc::clone(&shared.refresh))),
            ),
        })
    }

    fn run(&mut self, c: Cadence, shared: &Shared, now: SimTime) {
        match c {
            Cadence::MarketForecast => {
                self.market.forecast(shared, now);
            }
            Cadence::PerformanceAnalysis => {
                self.director.analyze(now);
            }
            Cadence::DifficultyReview => {
                self.director.review(shared, now);
            }
            Cadence::MajorAssessment => {
                self.director.assess(shared, now);
            }
            Cadence::CompetitorUpdate => self.agents.update(shared, now),
            Cadence::Decision => {
                self.agents.decide(shared, now);
            }
            Cadence::Learning => {
                self.agents.learn(shared, now);
            }
            Cadence::Progression => {
                self.progression.advance(shared, now);
            }
            Cadence::Health => {
                self.health.check(shared, now);
            }
        }
    }

    /// Out-of-schedule refresh of one topic. Difficulty is republished as is
    /// so a refresh never adds a review to the cadence.
    fn refresh(&mut self, topic: Topic, shared: &Shared, now: SimTime) {
        match topic {
            Topic::Difficulty => self.director.republish(shared, now),
            _ => self.run(publisher(topic), shared, now),
        }
    }
}

/// Deterministic single-threaded driver.
pub struct Simulation {
    cfg: SessionConfig,
    shared: Shared,
    schedule: Schedule,
    parts: Partitions,
    now: SimTime,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.now)
            .field("next_due", &self.schedule.next_due())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Validate `cfg`, build every partition and run the cadences due at
    /// time zero so all topics hold a first snapshot.
    pub fn new(cfg: SessionConfig, parts: Collaborators) -> Result<Self, RuntimeError> {
        cfg.validate()?;
        let shared = Shared::new(cfg.session.event_capacity);
        let parts = Partitions::build(&cfg, &shared, parts)?;
        let mut sim = Self {
            schedule: Schedule::new(cfg.schedule.clone()),
            cfg,
            shared,
            parts,
            now: SimTime::ZERO,
        };
        sim.advance_to(SimTime::ZERO);
        info!(
            competitors = sim.parts.agents.competitors().len(),
            seed = sim.cfg.session.seed,
            "session started"
        );
        Ok(sim)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn bus(&self) -> &Arc<CoordinationBus> {
        &self.shared.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn competitors(&self) -> &[CompetitorState] {
        self.parts.agents.competitors()
    }

    /// Run every cadence that falls due up to and including `until`, in
    /// order of due time and then in fixed cadence order. Refreshes
    /// requested by health recovery run at the time they were requested.
    pub fn advance_to(&mut self, until: SimTime) {
        loop {
            let at = self.schedule.next_due();
            if at > until {
                break;
            }
            for c in self.schedule.due(at) {
                self.parts.run(c, &self.shared, at);
                self.schedule.mark_ran(c, at);
            }
            for topic in Topic::ALL {
                if self.shared.refresh.take(topic) {
                    debug!(%topic, at = %at, "out-of-schedule refresh");
                    self.parts.refresh(topic, &self.shared, at);
                }
            }
            self.now = self.now.max(at);
        }
        self.now = self.now.max(until);
    }

    pub fn advance(&mut self, by: Duration) {
        let until = self.now.saturating_add(by);
        self.advance_to(until);
    }

    /// Player signals are applied at the current simulated time.
    pub fn ingest(&mut self, signal: PlayerSignal) {
        self.parts.director.ingest(&self.shared, signal, self.now);
    }

    pub fn report_outcome(&mut self, report: OutcomeReport) -> bool {
        self.parts.agents.report_outcome(&self.shared, report)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::collect(&self.shared, self.competitors(), self.now)
    }
}

/// Maps tokio time onto simulated time.
#[derive(Clone, Copy, Debug)]
pub struct SimClock {
    origin: Instant,
    offset: SimTime,
    scale: f64,
}

impl SimClock {
    /// `scale` simulated seconds elapse per real second, starting from
    /// `offset`.
    pub fn new(offset: SimTime, scale: f64) -> Self {
        Self {
            origin: Instant::now(),
            offset,
            scale,
        }
    }

    pub fn now(&self) -> SimTime {
        self.offset
            .saturating_add(self.origin.elapsed().mul_f64(self.scale))
    }

    /// Real interval for a simulated period.
    pub fn real(&self, simulated: Duration) -> Duration {
        simulated.div_f64(self.scale)
    }
}

fn ticker(clock: &SimClock, cfg: &ScheduleConfig, c: Cadence) -> Interval {
    let period = clock.real(cfg.period(c)).max(Duration::from_millis(1));
    let mut iv = interval_at(Instant::now() + period, period);
    iv.set_missed_tick_behavior(MissedTickBehavior::Skip);
    iv
}

/// Queue depth for player signals and outcome reports.
const INBOX: usize = 256;

/// Running asynchronous session.
#[derive(Debug)]
pub struct SessionHandle {
    stop: watch::Sender<bool>,
    shared: Shared,
    clock: SimClock,
    player: mpsc::Sender<PlayerSignal>,
    outcomes: mpsc::Sender<OutcomeReport>,
    market: JoinHandle<MarketPartition>,
    director: JoinHandle<DirectorPartition>,
    agents: JoinHandle<AgentsPartition>,
    progression: JoinHandle<ProgressionPartition>,
    health: JoinHandle<HealthPartition>,
}

/// Move a bootstrapped simulation onto the tokio runtime. Simulated time
/// continues from `sim.now()` at `time_scale` simulated seconds per real
/// second.
pub fn spawn_session(sim: Simulation) -> SessionHandle {
    let Simulation {
        cfg, shared, parts, now, ..
    } = sim;
    let clock = SimClock::new(now, cfg.session.time_scale);
    let (stop, stop_rx) = watch::channel(false);
    let (player, player_rx) = mpsc::channel(INBOX);
    let (outcomes, outcome_rx) = mpsc::channel(INBOX);
    let Partitions {
        market,
        director,
        agents,
        progression,
        health,
    } = parts;
    let sched = &cfg.schedule;
    info!(at = %now, scale = cfg.session.time_scale, "session running");
    SessionHandle {
        market: tokio::spawn(run_market(market, ctx(&shared, &stop_rx, clock, sched))),
        director: tokio::spawn(run_director(
            director,
            ctx(&shared, &stop_rx, clock, sched),
            player_rx,
        )),
        agents: tokio::spawn(run_agents(
            agents,
            ctx(&shared, &stop_rx, clock, sched),
            outcome_rx,
        )),
        progression: tokio::spawn(run_progression(
            progression,
            ctx(&shared, &stop_rx, clock, sched),
        )),
        health: tokio::spawn(run_health(health, ctx(&shared, &stop_rx, clock, sched))),
        stop,
        shared,
        clock,
        player,
        outcomes,
    }
}

struct TaskCtx {
    shared: Shared,
    stop: watch::Receiver<bool>,
    clock: SimClock,
    schedule: ScheduleConfig,
}

fn ctx(
    shared: &Shared,
    stop: &watch::Receiver<bool>,
    clock: SimClock,
    schedule: &ScheduleConfig,
) -> TaskCtx {
    TaskCtx {
        shared: shared.clone(),
        stop: stop.clone(),
        clock,
        schedule: schedule.clone(),
    }
}

impl TaskCtx {
    fn ticker(&self, c: Cadence) -> Interval {
        ticker(&self.clock, &self.schedule, c)
    }
}

async fn run_market(mut p: MarketPartition, mut t: TaskCtx) -> MarketPartition {
    let mut forecast = t.ticker(Cadence::MarketForecast);
    let refresh = Arc::clone(&t.shared.refresh);
    loop {
        tokio::select! {
            _ = t.stop.changed() => break,
            _ = forecast.tick() => {
                p.forecast(&t.shared, t.clock.now());
            }
            _ = refresh.requested(Topic::Forecast) => {
                if refresh.take(Topic::Forecast) {
                    p.forecast(&t.shared, t.clock.now());
                }
            }
        }
    }
    p
}

async fn run_director(
    mut p: DirectorPartition,
    mut t: TaskCtx,
    mut signals: mpsc::Receiver<PlayerSignal>,
) -> DirectorPartition {
    let mut analysis = t.ticker(Cadence::PerformanceAnalysis);
    let mut review = t.ticker(Cadence::DifficultyReview);
    let mut assessment = t.ticker(Cadence::MajorAssessment);
    let refresh = Arc::clone(&t.shared.refresh);
    loop {
        tokio::select! {
            _ = t.stop.changed() => break,
            Some(signal) = signals.recv() => {
                p.ingest(&t.shared, signal, t.clock.now());
            }
            _ = analysis.tick() => {
                p.analyze(t.clock.now());
            }
            _ = review.tick() => {
                p.review(&t.shared, t.clock.now());
            }
            _ = assessment.tick() => {
                p.assess(&t.shared, t.clock.now());
            }
            _ = refresh.requested(Topic::Difficulty) => {
                if refresh.take(Topic::Difficulty) {
                    p.republish(&t.shared, t.clock.now());
                }
            }
        }
    }
    p
}

async fn run_agents(
    mut p: AgentsPartition,
    mut t: TaskCtx,
    mut outcomes: mpsc::Receiver<OutcomeReport>,
) -> AgentsPartition {
    let mut update = t.ticker(Cadence::CompetitorUpdate);
    let mut decide = t.ticker(Cadence::Decision);
    let mut learn = t.ticker(Cadence::Learning);
    let refresh = Arc::clone(&t.shared.refresh);
    loop {
        tokio::select! {
            _ = t.stop.changed() => break,
            Some(report) = outcomes.recv() => {
                p.report_outcome(&t.shared, report);
            }
            _ = update.tick() => p.update(&t.shared, t.clock.now()),
            _ = decide.tick() => {
                p.decide(&t.shared, t.clock.now());
            }
            _ = learn.tick() => {
                p.learn(&t.shared, t.clock.now());
            }
            _ = refresh.requested(Topic::Agents) => {
                if refresh.take(Topic::Agents) {
                    p.update(&t.shared, t.clock.now());
                }
            }
            _ = refresh.requested(Topic::BehaviorInsight) => {
                if refresh.take(Topic::BehaviorInsight) {
                    p.learn(&t.shared, t.clock.now());
                }
            }
        }
    }
    p
}

async fn run_progression(mut p: ProgressionPartition, mut t: TaskCtx) -> ProgressionPartition {
    let mut step = t.ticker(Cadence::Progression);
    let refresh = Arc::clone(&t.shared.refresh);
    loop {
        tokio::select! {
            _ = t.stop.changed() => break,
            _ = step.tick() => {
                p.advance(&t.shared, t.clock.now());
            }
            _ = refresh.requested(Topic::Progression) => {
                if refresh.take(Topic::Progression) {
                    p.advance(&t.shared, t.clock.now());
                }
            }
        }
    }
    p
}

async fn run_health(mut p: HealthPartition, mut t: TaskCtx) -> HealthPartition {
    let mut check = t.ticker(Cadence::Health);
    loop {
        tokio::select! {
            _ = t.stop.changed() => break,
            _ = check.tick() => {
                p.check(&t.shared, t.clock.now());
            }
        }
    }
    p
}

impl SessionHandle {
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn bus(&self) -> &Arc<CoordinationBus> {
        &self.shared.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub async fn signal(&self, signal: PlayerSignal) -> Result<(), RuntimeError> {
        self.player
            .send(signal)
            .await
            .map_err(|_| RuntimeError::Closed)
    }

    pub async fn report_outcome(&self, report: OutcomeReport) -> Result<(), RuntimeError> {
        self.outcomes
            .send(report)
            .await
            .map_err(|_| RuntimeError::Closed)
    }

    /// Stop every task, wait for them and summarize the final state.
    pub async fn shutdown(self) -> Result<SessionSummary, RuntimeError> {
        let now = self.clock.now();
        // Receivers only go away if a task already ended.
        let _ = self.stop.send(true);
        let join = |e: tokio::task::JoinError| RuntimeError::Task(e.to_string());
        self.market.await.map_err(join)?;
        self.director.await.map_err(join)?;
        let agents = self.agents.await.map_err(join)?;
        self.progression.await.map_err(join)?;
        self.health.await.map_err(join)?;
        info!(at = %now, "session stopped");
        Ok(SessionSummary::collect(&self.shared, agents.competitors(), now))
    }
}
