#![deny(warnings)]

//! Headless CLI that runs a Port Tycoon session with a synthetic player and
//! synthetic action outcomes, then prints the session summary.

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sim_ai::LinearModel;
use sim_core::{PlayerAction, PlayerActionKind, SimTime};
use sim_runtime::{
    spawn_session, Collaborators, OutcomeReport, PlayerSignal, SessionConfig, SessionEvent,
    SessionSummary, Simulation,
};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    model: Option<String>,
    seconds: Option<u64>,
    seed: Option<u64>,
    run_async: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next(),
            "--model" => args.model = it.next(),
            "--seconds" => args.seconds = it.next().and_then(|s| s.parse().ok()),
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--async" => args.run_async = true,
            _ => {}
        }
    }
    args
}

const PLAYER_KINDS: [PlayerActionKind; 6] = [
    PlayerActionKind::BuyAsset,
    PlayerActionKind::SellAsset,
    PlayerActionKind::CreateRoute,
    PlayerActionKind::SetPrice,
    PlayerActionKind::Research,
    PlayerActionKind::Negotiate,
];

/// Stand-in for the gameplay layer: a player of middling skill and an
/// execution layer whose realized returns scatter around expectations.
struct SyntheticGame {
    rng: ChaCha8Rng,
    success_rate: f64,
}

impl SyntheticGame {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed ^ 0x5eed),
            success_rate: 0.6,
        }
    }

    fn player_action(&mut self, at: SimTime) -> PlayerSignal {
        let kind = PLAYER_KINDS[self.rng.gen_range(0..PLAYER_KINDS.len())];
        let success = self.rng.gen_bool(self.success_rate);
        let secs = self.rng.gen_range(2..40);
        PlayerSignal::Action(PlayerAction::new(kind, at, success, Duration::from_secs(secs)))
    }

    fn outcome(&mut self, ev: &SessionEvent) -> Option<OutcomeReport> {
        let SessionEvent::Decision { seq, record } = ev else {
            return None;
        };
        let noise = self.rng.gen_range(-1.0..=1.0) * record.risk_level * 0.2;
        Some(OutcomeReport {
            competitor: record.competitor,
            seq: *seq,
            realized_return: record.expected_return + noise,
        })
    }
}

async fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {path}"))?;
            SessionConfig::from_yaml_str(&text).with_context(|| format!("parsing {path}"))?
        }
        None => SessionConfig::default(),
    };
    if let Some(seed) = args.seed {
        cfg.session.seed = seed;
    }
    Ok(cfg)
}

fn collaborators(args: &Args) -> Result<Collaborators> {
    let mut parts = Collaborators::default();
    if let Some(path) = &args.model {
        let model = LinearModel::from_path(path).with_context(|| format!("loading {path}"))?;
        info!(path = %path, version = %model.version, "action model loaded");
        parts.action_model = Some(Box::new(model));
    }
    Ok(parts)
}

fn run_stepped(sim: &mut Simulation, game: &mut SyntheticGame, seconds: u64) -> SessionSummary {
    let mut rx = sim.subscribe();
    let step = Duration::from_secs(sim.config().schedule.decision_secs);
    let until = SimTime::from_secs(seconds);
    while sim.now() < until {
        let signal = game.player_action(sim.now());
        sim.ingest(signal);
        sim.advance(step);
        loop {
            match rx.try_recv() {
                Ok(ev) => {
                    if let Some(report) = game.outcome(&ev) {
                        sim.report_outcome(report);
                    }
                }
                Err(tokio::sync::broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, "event consumer lagged");
                }
                Err(_) => break,
            }
        }
    }
    sim.summary()
}

async fn run_async(
    sim: Simulation,
    mut game: SyntheticGame,
    seconds: u64,
) -> Result<SessionSummary> {
    let scale = sim.config().session.time_scale;
    let player_every = Duration::from_secs(sim.config().schedule.decision_secs).div_f64(scale);
    let handle = spawn_session(sim);
    let mut rx = handle.subscribe();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds).div_f64(scale));
    tokio::pin!(deadline);
    let mut player = tokio::time::interval(player_every.max(Duration::from_millis(1)));
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = player.tick() => {
                let signal = game.player_action(handle.now());
                handle.signal(signal).await?;
            }
            ev = rx.recv() => match ev {
                Ok(ev) => {
                    if let Some(report) = game.outcome(&ev) {
                        handle.report_outcome(report).await?;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event consumer lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(handle.shutdown().await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args();
    info!(?args, "starting CLI");
    let cfg = load_config(&args).await?;
    let seconds = args.seconds.unwrap_or(3_600);
    let mut game = SyntheticGame::new(cfg.session.seed);
    let mut sim = Simulation::new(cfg, collaborators(&args)?)?;

    let summary = if args.run_async {
        run_async(sim, game, seconds).await?
    } else {
        run_stepped(&mut sim, &mut game, seconds)
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    let m = summary.metrics;
    println!(
        "Session | t: {} | decisions: {} (fallback {}) | outcomes: {} | forecasts: {} | difficulty changes: {} | milestones: {} | insights: {}",
        summary.now,
        m.decisions,
        m.fallbacks,
        m.outcomes,
        m.forecast_cycles,
        m.adjustments,
        m.unlocks,
        m.insights
    );
    Ok(())
}
