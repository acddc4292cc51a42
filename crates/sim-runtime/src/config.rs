//! Session configuration, loaded from YAML. Every section and field has a
//! default so a partial or empty file is valid.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sim_ai::{AiError, DecisionConfig, LearningConfig};
use sim_director::{DifficultyConfig, DirectorError};
use sim_econ::{EnsembleConfig, EnsembleError};
use sim_progress::{ProgressionConfig, ProgressionError};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::schedule::ScheduleConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid session config field: {0}")]
    Invalid(&'static str),
    #[error(transparent)]
    Decision(#[from] AiError),
    #[error(transparent)]
    Ensemble(#[from] EnsembleError),
    #[error(transparent)]
    Difficulty(#[from] DirectorError),
    #[error(transparent)]
    Progression(#[from] ProgressionError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub seed: u64,
    pub competitors: u32,
    /// In-game calendar date at simulated time zero.
    pub start_date: NaiveDate,
    /// Simulated seconds per in-game day.
    pub secs_per_day: u32,
    /// Simulated seconds per wall-clock second in the async driver.
    pub time_scale: f64,
    /// Starting cash per competitor, in whole USD.
    pub starting_cash: i64,
    /// Player net worth reported to competitors, in whole USD.
    pub player_net_worth: i64,
    /// Trait jitter applied to archetype templates.
    pub profile_jitter: f64,
    /// Capacity of the session event channel.
    pub event_capacity: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            seed: 42,
            competitors: 6,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            secs_per_day: 60,
            time_scale: 60.0,
            starting_cash: 25_000_000,
            player_net_worth: 30_000_000,
            profile_jitter: 0.1,
            event_capacity: 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSection {
    pub ensemble: EnsembleConfig,
    pub horizon_days: f64,
    /// Number of synthetic commodities when no feed is supplied.
    pub commodities: usize,
    /// Observations generated before the first forecast.
    pub warmup: usize,
    /// Points kept per historical series.
    pub history_cap: usize,
    /// Daily traded volume that counts as a full market.
    pub reference_volume: f64,
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            ensemble: EnsembleConfig::default(),
            horizon_days: 30.0,
            commodities: 6,
            warmup: 30,
            history_cap: 120,
            reference_volume: 50_000.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Composite score below which recovery runs.
    pub threshold: f64,
    /// A topic is fully stale once its age exceeds this many cadences.
    pub stale_after: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            stale_after: 3.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub session: SessionSection,
    pub schedule: ScheduleConfig,
    pub decision: DecisionConfig,
    pub learning: LearningConfig,
    pub market: MarketSection,
    pub difficulty: DifficultyConfig,
    pub progression: ProgressionConfig,
    pub health: HealthConfig,
}

impl SessionConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not a mapping.
        let cfg: SessionConfig = if text.trim().is_empty() {
            SessionConfig::default()
        } else {
            serde_yaml::from_str(text)?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.session;
        if s.competitors == 0 {
            return Err(ConfigError::Invalid("session.competitors"));
        }
        if s.secs_per_day == 0 {
            return Err(ConfigError::Invalid("session.secs_per_day"));
        }
        if !(s.time_scale.is_finite() && s.time_scale > 0.0) {
            return Err(ConfigError::Invalid("session.time_scale"));
        }
        if s.starting_cash < 0 || s.player_net_worth < 0 {
            return Err(ConfigError::Invalid("session.starting_cash"));
        }
        if !(0.0..=1.0).contains(&s.profile_jitter) {
            return Err(ConfigError::Invalid("session.profile_jitter"));
        }
        if s.event_capacity == 0 {
            return Err(ConfigError::Invalid("session.event_capacity"));
        }
        self.schedule.validate()?;
        self.decision.validate()?;
        self.learning.validate()?;
        self.market.ensemble.validate()?;
        let m = &self.market;
        if m.commodities == 0 || m.history_cap < 2 || m.warmup > m.history_cap {
            return Err(ConfigError::Invalid("market"));
        }
        if !(m.horizon_days.is_finite() && m.horizon_days > 0.0) {
            return Err(ConfigError::Invalid("market.horizon_days"));
        }
        if !(m.reference_volume.is_finite() && m.reference_volume > 0.0) {
            return Err(ConfigError::Invalid("market.reference_volume"));
        }
        self.difficulty.validate()?;
        self.progression.validate()?;
        let h = &self.health;
        if !(0.0..=1.0).contains(&h.threshold) {
            return Err(ConfigError::Invalid("health.threshold"));
        }
        if !(h.stale_after.is_finite() && h.stale_after > 1.0) {
            return Err(ConfigError::Invalid("health.stale_after"));
        }
        Ok(())
    }

    /// Agent cooldown at decision speed 1.
    pub fn base_cooldown(&self) -> Duration {
        Duration::from_secs(self.decision.cooldown_secs)
    }
}
