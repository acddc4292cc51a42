//! Pluggable action scoring: a trained model, the rule-based fallback, and the
//! guard that decides which one a cycle uses.

use crate::features::{Feature, FeatureVector, FEATURE_COUNT};
use crate::PredictorError;
use serde::{Deserialize, Serialize};
use sim_core::{
    clamp_unit, ActionKind, CallError, DeadlineWorker, ScoreSource, SimTime, ACTION_KIND_COUNT,
};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// One base score per [`ActionKind`], each in [0,1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionScores([f64; ACTION_KIND_COUNT]);

impl ActionScores {
    pub fn new(scores: [f64; ACTION_KIND_COUNT]) -> Self {
        Self(scores)
    }

    pub fn get(&self, kind: ActionKind) -> f64 {
        self.0[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, f64)> + '_ {
        ActionKind::ALL.iter().map(move |&k| (k, self.get(k)))
    }

    fn is_valid(&self) -> bool {
        self.0.iter().all(|s| s.is_finite() && (0.0..=1.0).contains(s))
    }
}

/// Something that scores every action kind from a feature vector.
pub trait ActionPredictor: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, features: &FeatureVector) -> Result<ActionScores, PredictorError>;
}

/// Deterministic hand-tuned scoring. Always available.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RuleBasedPredictor;

impl RuleBasedPredictor {
    pub fn scores(&self, x: &FeatureVector) -> ActionScores {
        use Feature::*;
        let f = |feat: Feature| x.get(feat);
        let mut s = [0.0; ACTION_KIND_COUNT];
        s[ActionKind::AcquireAsset.index()] = 0.3 * f(DemandIndex)
            + 0.2 * f(Utilization)
            + 0.2 * f(CashCoverage)
            + 0.15 * f(Aggressiveness)
            + 0.15 * f(Favorability);
        s[ActionKind::DisposeAsset.index()] = 0.35 * (1.0 - f(Utilization))
            + 0.25 * (1.0 - f(Liquidity))
            + 0.2 * (1.0 - f(DemandIndex))
            + 0.2 * f(FleetScale);
        s[ActionKind::InvestResearch.index()] = 0.35 * f(InnovationFocus)
            + 0.25 * (1.0 - f(ResearchLevel))
            + 0.2 * f(CashCoverage)
            + 0.2 * (1.0 - f(Progress));
        s[ActionKind::OpenTradeRoute.index()] = 0.3 * f(DemandIndex)
            + 0.25 * f(Growth)
            + 0.2 * (1.0 - f(Competition))
            + 0.25 * f(Utilization);
        s[ActionKind::AdjustPricing.index()] = 0.4 * f(MarketVolatility)
            + 0.3 * f(Competition)
            + 0.3 * (2.0 * (f(PriceIndex) - 0.5)).abs();
        s[ActionKind::ExpandRegion.index()] = 0.3 * f(ExpansionDrive)
            + 0.25 * f(Growth)
            + 0.25 * f(CashCoverage)
            + 0.2 * (1.0 - f(RegionScale));
        s[ActionKind::Wait.index()] = 0.15
            + 0.25 * f(MarketVolatility) * (1.0 - f(RiskTolerance))
            + 0.1 * (1.0 - f(TimeSinceDecision));
        ActionScores(s.map(clamp_unit))
    }
}

impl ActionPredictor for RuleBasedPredictor {
    fn name(&self) -> &str {
        "rule-based"
    }

    fn predict(&self, features: &FeatureVector) -> Result<ActionScores, PredictorError> {
        Ok(self.scores(features))
    }
}

/// Logistic-linear model: `score_k = sigmoid(bias_k + w_k · x)`.
///
/// Loaded from YAML:
///
/// ```yaml
/// version: "2024-03"
/// bias: [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
/// weights:
///   - [ ... 24 values ... ]   # one row per action kind
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub version: String,
    pub bias: Vec<f64>,
    pub weights: Vec<Vec<f64>>,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl LinearModel {
    pub fn from_yaml_str(s: &str) -> Result<Self, PredictorError> {
        let model: LinearModel = serde_yaml::from_str(s)?;
        model.check_shape()?;
        Ok(model)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PredictorError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    fn check_shape(&self) -> Result<(), PredictorError> {
        if self.bias.len() != ACTION_KIND_COUNT || self.weights.len() != ACTION_KIND_COUNT {
            return Err(PredictorError::Shape {
                expected: ACTION_KIND_COUNT,
                got: self.bias.len().min(self.weights.len()),
            });
        }
        if let Some(row) = self.weights.iter().find(|r| r.len() != FEATURE_COUNT) {
            return Err(PredictorError::Shape {
                expected: FEATURE_COUNT,
                got: row.len(),
            });
        }
        Ok(())
    }
}

impl ActionPredictor for LinearModel {
    fn name(&self) -> &str {
        &self.version
    }

    fn predict(&self, features: &FeatureVector) -> Result<ActionScores, PredictorError> {
        self.check_shape()?;
        let mut s = [0.0; ACTION_KIND_COUNT];
        for (k, out) in s.iter_mut().enumerate() {
            let z = self.bias[k]
                + self.weights[k]
                    .iter()
                    .zip(features.as_slice())
                    .map(|(w, x)| w * x)
                    .sum::<f64>();
            if !z.is_finite() {
                return Err(PredictorError::NonFinite);
            }
            *out = sigmoid(z);
        }
        Ok(ActionScores(s))
    }
}

/// Why a cycle used the fallback instead of the configured model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FallbackReason {
    NoModel,
    CircuitOpen,
    Failed(String),
    OverBudget(Duration),
    /// A previous overrunning call is still running.
    Busy,
    InvalidOutput,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoModel => f.write_str("no model loaded"),
            FallbackReason::CircuitOpen => f.write_str("model circuit open"),
            FallbackReason::Failed(e) => write!(f, "model failed: {e}"),
            FallbackReason::OverBudget(d) => write!(f, "model gave no answer within {d:?}"),
            FallbackReason::Busy => f.write_str("model still busy with an earlier call"),
            FallbackReason::InvalidOutput => f.write_str("model returned out-of-range scores"),
        }
    }
}

/// Scores plus where they came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Scored {
    pub scores: ActionScores,
    pub source: ScoreSource,
    pub fallback: Option<FallbackReason>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Model calls slower than this are discarded.
    pub latency_budget_ms: u64,
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit skips the model, in simulated seconds.
    pub cooldown_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: 20,
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

type ModelWorker = DeadlineWorker<FeatureVector, Result<ActionScores, PredictorError>>;

/// Wraps an optional model so that absence, errors, bad output or latency
/// overruns fall back to [`RuleBasedPredictor`] within the same call.
///
/// The model runs on its own thread and the caller waits at most the latency
/// budget, so a stalled model never holds up a decision cycle.
#[derive(Debug)]
pub struct GuardedPredictor {
    primary: Option<ModelWorker>,
    fallback: RuleBasedPredictor,
    cfg: GuardConfig,
    consecutive_failures: u32,
    open_until: Option<SimTime>,
}

impl GuardedPredictor {
    pub fn new(primary: Option<Box<dyn ActionPredictor>>, cfg: GuardConfig) -> Self {
        let primary = primary.and_then(|model| {
            let name = model.name().to_string();
            match DeadlineWorker::spawn("action-model", move |x: FeatureVector| model.predict(&x)) {
                Ok(worker) => Some(worker),
                Err(e) => {
                    warn!(model = %name, error = %e, "could not start model worker, using rules");
                    None
                }
            }
        });
        Self {
            primary,
            fallback: RuleBasedPredictor,
            cfg,
            consecutive_failures: 0,
            open_until: None,
        }
    }

    pub fn has_model(&self) -> bool {
        self.primary.is_some()
    }

    pub fn circuit_open(&self, now: SimTime) -> bool {
        self.open_until.map_or(false, |t| now < t)
    }

    fn fall_back(&self, features: &FeatureVector, reason: FallbackReason) -> Scored {
        Scored {
            scores: self.fallback.scores(features),
            source: ScoreSource::RuleBased,
            fallback: Some(reason),
        }
    }

    fn record_failure(&mut self, now: SimTime) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.cfg.failure_threshold {
            let until = now.saturating_add(Duration::from_secs(self.cfg.cooldown_secs));
            warn!(failures = self.consecutive_failures, until = %until, "predictor circuit opened");
            self.open_until = Some(until);
            self.consecutive_failures = 0;
        }
    }

    /// Score every action kind. Never fails and never waits longer than the
    /// latency budget for the model.
    pub fn score(&mut self, features: &FeatureVector, now: SimTime) -> Scored {
        if self.circuit_open(now) {
            return self.fall_back(features, FallbackReason::CircuitOpen);
        }
        let budget = Duration::from_millis(self.cfg.latency_budget_ms);
        let Some(worker) = self.primary.as_mut() else {
            return self.fall_back(features, FallbackReason::NoModel);
        };
        let reason = match worker.call(*features, budget) {
            Ok(Ok(scores)) if scores.is_valid() => {
                self.consecutive_failures = 0;
                return Scored {
                    scores,
                    source: ScoreSource::Model,
                    fallback: None,
                };
            }
            Ok(Ok(_)) => FallbackReason::InvalidOutput,
            Ok(Err(e)) => FallbackReason::Failed(e.to_string()),
            Err(CallError::Timeout(waited)) => {
                debug!(?waited, "model over latency budget");
                FallbackReason::OverBudget(waited)
            }
            Err(CallError::Busy) => FallbackReason::Busy,
            Err(e @ CallError::Stopped) => FallbackReason::Failed(e.to_string()),
        };
        self.record_failure(now);
        self.fall_back(features, reason)
    }
}
