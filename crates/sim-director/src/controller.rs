//! Closed-loop difficulty controller.
//!
//! The controller keeps a trailing window of player actions, derives
//! [`PerformanceMetrics`] from it on the analysis cadence, and on the review
//! cadence nudges the difficulty scalar towards whatever keeps the player
//! inside the flow band. Acute events skip the cadence entirely.

use crate::level::{DifficultyLevel, DifficultyPhase};
use crate::metrics::PerformanceMetrics;
use crate::settings::DifficultySettings;
use crate::skill::{SkillEstimate, SkillModel};
use crate::DirectorError;
use serde::{Deserialize, Serialize};
use sim_core::{PlayerAction, SimTime};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Tuning for [`DifficultyController`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    pub initial_level: f64,
    /// Number of trailing player actions the metrics are computed over.
    pub window: usize,
    /// Flow band on the performance score.
    pub target_low: f64,
    pub target_high: f64,
    /// Score the magnitude rule measures distance from.
    pub target_midpoint: f64,
    pub max_delta_per_cycle: f64,
    pub sensitivity: f64,
    /// Periodic changes smaller than this are dropped.
    pub min_change: f64,
    /// Fixed increase applied when the player is bored.
    pub bored_step: f64,
    pub frustration_trigger: f64,
    pub boredom_trigger: f64,
    pub mastery_consistency: f64,
    pub mastery_score: f64,
    pub acute_frustration_delta: f64,
    pub acute_boredom_delta: f64,
    pub acute_loss_delta: f64,
    pub acute_win_delta: f64,
    /// EWMA factor for the stability index.
    pub stability_alpha: f64,
    /// EWMA factor for the skill model.
    pub skill_alpha: f64,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            initial_level: 0.5,
            window: 20,
            target_low: 0.4,
            target_high: 0.7,
            target_midpoint: 0.55,
            max_delta_per_cycle: 0.1,
            sensitivity: 1.0,
            min_change: 0.05,
            bored_step: 0.05,
            frustration_trigger: 0.7,
            boredom_trigger: 0.6,
            mastery_consistency: 0.8,
            mastery_score: 0.7,
            acute_frustration_delta: 0.15,
            acute_boredom_delta: 0.1,
            acute_loss_delta: 0.1,
            acute_win_delta: 0.1,
            stability_alpha: 0.2,
            skill_alpha: 0.3,
        }
    }
}

fn unit(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

impl DifficultyConfig {
    pub fn validate(&self) -> Result<(), DirectorError> {
        if !unit(self.initial_level) {
            return Err(DirectorError::InvalidConfig("initial_level"));
        }
        if self.window == 0 {
            return Err(DirectorError::InvalidConfig("window"));
        }
        if !unit(self.target_low) || !unit(self.target_high) || self.target_low >= self.target_high
        {
            return Err(DirectorError::InvalidConfig("target band"));
        }
        if !(self.target_low..=self.target_high).contains(&self.target_midpoint) {
            return Err(DirectorError::InvalidConfig("target_midpoint"));
        }
        if !unit(self.max_delta_per_cycle) || self.max_delta_per_cycle == 0.0 {
            return Err(DirectorError::InvalidConfig("max_delta_per_cycle"));
        }
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(DirectorError::InvalidConfig("sensitivity"));
        }
        if !unit(self.min_change) || self.min_change > self.max_delta_per_cycle {
            return Err(DirectorError::InvalidConfig("min_change"));
        }
        if !unit(self.bored_step) || self.bored_step > self.max_delta_per_cycle {
            return Err(DirectorError::InvalidConfig("bored_step"));
        }
        for (v, name) in [
            (self.frustration_trigger, "frustration_trigger"),
            (self.boredom_trigger, "boredom_trigger"),
            (self.mastery_consistency, "mastery_consistency"),
            (self.mastery_score, "mastery_score"),
            (self.acute_frustration_delta, "acute_frustration_delta"),
            (self.acute_boredom_delta, "acute_boredom_delta"),
            (self.acute_loss_delta, "acute_loss_delta"),
            (self.acute_win_delta, "acute_win_delta"),
        ] {
            if !unit(v) {
                return Err(DirectorError::InvalidConfig(name));
            }
        }
        if !unit(self.stability_alpha) || self.stability_alpha == 0.0 {
            return Err(DirectorError::InvalidConfig("stability_alpha"));
        }
        if !unit(self.skill_alpha) || self.skill_alpha == 0.0 {
            return Err(DirectorError::InvalidConfig("skill_alpha"));
        }
        Ok(())
    }
}

/// Why a periodic review wanted to move the level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentTrigger {
    /// Score under the flow band.
    Struggling,
    /// Frustration over its trigger.
    Frustrated,
    /// Consistent high score.
    Mastering,
    /// Boredom over its trigger.
    Bored,
    /// Score over the flow band.
    Excelling,
}

impl AdjustmentTrigger {
    fn raises(self) -> bool {
        !matches!(self, AdjustmentTrigger::Struggling | AdjustmentTrigger::Frustrated)
    }
}

/// A single significant occurrence that bypasses the periodic review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcuteEvent {
    MajorLoss,
    ExceptionalWin,
    FrustrationSignal,
    BoredomSignal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentCause {
    Periodic(AdjustmentTrigger),
    Acute(AcuteEvent),
}

/// A level crossing from one band into another.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub from: DifficultyPhase,
    pub to: DifficultyPhase,
    pub level: f64,
    pub at: SimTime,
}

/// One applied change to the level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub from: f64,
    pub to: f64,
    pub cause: AdjustmentCause,
    pub phase_change: Option<PhaseChange>,
    pub at: SimTime,
}

impl Adjustment {
    pub fn delta(&self) -> f64 {
        self.to - self.from
    }
}

/// Result of a periodic review.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub metrics: PerformanceMetrics,
    pub trigger: Option<AdjustmentTrigger>,
    /// `None` when nothing triggered or the change was under `min_change`.
    pub adjustment: Option<Adjustment>,
}

/// Read-only copy of the controller's state for publication.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectorSnapshot {
    pub level: f64,
    pub phase: DifficultyPhase,
    pub settings: DifficultySettings,
    pub metrics: PerformanceMetrics,
    pub stability_index: f64,
    pub skill: SkillEstimate,
    pub adjustments: u64,
    pub updated_at: SimTime,
}

/// Owns the difficulty level and the player-action window. Single writer.
#[derive(Debug)]
pub struct DifficultyController {
    cfg: DifficultyConfig,
    level: DifficultyLevel,
    window: VecDeque<PlayerAction>,
    metrics: PerformanceMetrics,
    skill: SkillModel,
    mean_abs_delta: f64,
    adjustments: u64,
    updated_at: SimTime,
}

impl DifficultyController {
    pub fn new(cfg: DifficultyConfig) -> Result<Self, DirectorError> {
        cfg.validate()?;
        Ok(Self {
            level: DifficultyLevel::new(cfg.initial_level),
            window: VecDeque::with_capacity(cfg.window),
            metrics: PerformanceMetrics::default(),
            skill: SkillModel::new(cfg.skill_alpha),
            mean_abs_delta: 0.0,
            adjustments: 0,
            updated_at: SimTime::ZERO,
            cfg,
        })
    }

    pub fn config(&self) -> &DifficultyConfig {
        &self.cfg
    }

    pub fn level(&self) -> DifficultyLevel {
        self.level
    }

    pub fn phase(&self) -> DifficultyPhase {
        self.level.phase()
    }

    pub fn settings(&self) -> DifficultySettings {
        DifficultySettings::for_level(self.level)
    }

    /// Metrics from the last analysis pass.
    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics
    }

    /// 1 when recent deltas are zero, 0 when every review moves by the
    /// maximum. Observability only.
    pub fn stability_index(&self) -> f64 {
        1.0 - (self.mean_abs_delta / self.cfg.max_delta_per_cycle).clamp(0.0, 1.0)
    }

    pub fn skill(&self) -> SkillEstimate {
        self.skill.current()
    }

    /// Append a player action, evicting the oldest beyond the window.
    pub fn record_action(&mut self, action: PlayerAction) {
        if self.window.len() == self.cfg.window {
            self.window.pop_front();
        }
        self.window.push_back(action);
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Recompute metrics over the current window.
    pub fn analyze(&mut self, now: SimTime) -> PerformanceMetrics {
        let window = self.window.make_contiguous();
        self.metrics = PerformanceMetrics::from_window(window);
        self.updated_at = now;
        debug!(
            score = self.metrics.score,
            frustration = self.metrics.frustration,
            boredom = self.metrics.boredom,
            samples = self.metrics.samples,
            "performance analyzed"
        );
        self.metrics
    }

    fn trigger_for(&self, m: &PerformanceMetrics) -> Option<AdjustmentTrigger> {
        let c = &self.cfg;
        if m.score < c.target_low {
            Some(AdjustmentTrigger::Struggling)
        } else if m.frustration > c.frustration_trigger {
            Some(AdjustmentTrigger::Frustrated)
        } else if m.consistency > c.mastery_consistency && m.score > c.mastery_score {
            Some(AdjustmentTrigger::Mastering)
        } else if m.boredom > c.boredom_trigger {
            Some(AdjustmentTrigger::Bored)
        } else if m.score > c.target_high {
            Some(AdjustmentTrigger::Excelling)
        } else {
            None
        }
    }

    /// Periodic review: refresh metrics, decide whether and how far to move.
    /// The applied change never exceeds `max_delta_per_cycle`.
    pub fn evaluate(&mut self, now: SimTime) -> Evaluation {
        let metrics = self.analyze(now);
        if metrics.samples == 0 {
            self.track_stability(0.0);
            return Evaluation {
                metrics,
                trigger: None,
                adjustment: None,
            };
        }
        let trigger = self.trigger_for(&metrics);
        let adjustment = trigger.and_then(|t| {
            let magnitude = match t {
                AdjustmentTrigger::Bored => self.cfg.bored_step,
                _ => ((metrics.score - self.cfg.target_midpoint).abs() * self.cfg.sensitivity)
                    .min(self.cfg.max_delta_per_cycle),
            };
            if magnitude < self.cfg.min_change {
                debug!(trigger = ?t, magnitude, "adjustment under minimum change, skipped");
                return None;
            }
            let delta = if t.raises() { magnitude } else { -magnitude };
            self.apply(delta, AdjustmentCause::Periodic(t), now)
        });
        if adjustment.is_none() {
            self.track_stability(0.0);
        }
        Evaluation {
            metrics,
            trigger,
            adjustment,
        }
    }

    /// Apply an acute event immediately, independent of the review cadence.
    /// Returns `None` only when the level is already pinned at the bound the
    /// event pushes towards.
    pub fn apply_acute(&mut self, event: AcuteEvent, now: SimTime) -> Option<Adjustment> {
        let c = &self.cfg;
        let delta = match event {
            AcuteEvent::MajorLoss => -c.acute_loss_delta,
            AcuteEvent::ExceptionalWin => c.acute_win_delta,
            AcuteEvent::FrustrationSignal => -c.acute_frustration_delta,
            AcuteEvent::BoredomSignal => c.acute_boredom_delta,
        };
        let out = self.apply(delta, AdjustmentCause::Acute(event), now);
        if out.is_none() {
            self.track_stability(0.0);
        }
        out
    }

    /// Major assessment: fold the latest metrics into the skill model.
    pub fn assess_skill(&mut self, now: SimTime) -> SkillEstimate {
        let metrics = self.analyze(now);
        let estimate = self.skill.observe(&metrics, now);
        info!(
            skill = estimate.skill,
            trend = ?estimate.trend,
            "player skill assessed"
        );
        estimate
    }

    fn apply(&mut self, delta: f64, cause: AdjustmentCause, now: SimTime) -> Option<Adjustment> {
        let from = self.level;
        let to = from.shifted(delta);
        if to == from {
            return None;
        }
        self.level = to;
        self.adjustments += 1;
        self.updated_at = now;
        self.track_stability((to.value() - from.value()).abs());
        let phase_change = (from.phase() != to.phase()).then(|| PhaseChange {
            from: from.phase(),
            to: to.phase(),
            level: to.value(),
            at: now,
        });
        if let Some(pc) = phase_change {
            info!(from = %pc.from, to = %pc.to, level = pc.level, "difficulty phase changed");
        }
        debug!(from = from.value(), to = to.value(), ?cause, "difficulty adjusted");
        Some(Adjustment {
            from: from.value(),
            to: to.value(),
            cause,
            phase_change,
            at: now,
        })
    }

    fn track_stability(&mut self, abs_delta: f64) {
        let a = self.cfg.stability_alpha;
        self.mean_abs_delta += a * (abs_delta - self.mean_abs_delta);
    }

    pub fn snapshot(&self) -> DirectorSnapshot {
        DirectorSnapshot {
            level: self.level.value(),
            phase: self.phase(),
            settings: self.settings(),
            metrics: self.metrics,
            stability_index: self.stability_index(),
            skill: self.skill.current(),
            adjustments: self.adjustments,
            updated_at: self.updated_at,
        }
    }
}
