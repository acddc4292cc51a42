#![deny(warnings)]

//! Session runtime for Port Tycoon.
//!
//! Five partitions own the session state: market, director, agents,
//! progression and health. Each partition is the single writer of its own
//! slice and publishes complete snapshots to a last-value-wins
//! [`CoordinationBus`]. Consumers read whatever snapshot is current and never
//! wait on a publisher. Outward-facing events go to a broadcast
//! [`EventHub`]. Cadences run either deterministically through
//! [`Simulation`] or as concurrent tokio tasks through [`spawn_session`].

pub mod bus;
pub mod config;
pub mod event;
pub mod feed;
pub mod health;
pub mod metrics;
pub mod partition;
pub mod schedule;
pub mod session;

pub use bus::{AgentDigest, CoordinationBus, ForecastSnapshot, Published, Slot, Topic};
pub use config::{ConfigError, HealthConfig, MarketSection, SessionConfig, SessionSection};
pub use event::{EventHub, SessionEvent};
pub use feed::{MarketFeed, RandomWalkFeed};
pub use health::{HealthAggregator, HealthReport, RecoveryAction, RefreshRequests, RefreshStale};
pub use metrics::{MetricsSnapshot, RuntimeMetrics};
pub use partition::{OutcomeReport, PlayerSignal};
pub use schedule::{Cadence, Schedule, ScheduleConfig};
pub use session::{
    spawn_session, Collaborators, CompetitorReport, SessionHandle, SessionSummary, SimClock,
    Simulation,
};

use sim_ai::AiError;
use sim_director::DirectorError;
use sim_econ::EnsembleError;
use sim_progress::ProgressionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Ensemble(#[from] EnsembleError),
    #[error(transparent)]
    Director(#[from] DirectorError),
    #[error(transparent)]
    Progression(#[from] ProgressionError),
    #[error("session task failed: {0}")]
    Task(String),
    #[error("session is shut down")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected_before_start() {
        let mut cfg = SessionConfig::default();
        cfg.session.competitors = 0;
        let err = Simulation::new(cfg, Collaborators::default()).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn yaml_overrides_reach_the_session() {
        let cfg = SessionConfig::from_yaml_str("session:\n  competitors: 3\n  seed: 7\n").unwrap();
        let sim = Simulation::new(cfg, Collaborators::default()).unwrap();
        assert_eq!(sim.competitors().len(), 3);
        assert_eq!(sim.config().session.seed, 7);
    }
}
