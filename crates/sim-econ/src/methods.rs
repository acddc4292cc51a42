//! Independent forecasting methods combined by the ensemble.

use crate::pricing::{clearing_price, demand_at};
use crate::ForecastError;
use serde::{Deserialize, Serialize};
use sim_core::{clamp_unit, CommodityData, DeadlineWorker, HistoricalSeries};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Read-only context a forecast cycle runs against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastContext {
    pub horizon_days: f64,
    /// Market volatility knob from the current difficulty settings.
    pub market_volatility: f64,
    /// Whether progression has unlocked the compute the model method needs.
    pub advanced_compute: bool,
}

impl Default for ForecastContext {
    fn default() -> Self {
        Self {
            horizon_days: 30.0,
            market_volatility: 0.3,
            advanced_compute: false,
        }
    }
}

/// What one method predicts for the horizon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MethodOutput {
    pub price: f64,
    pub demand: f64,
    pub supply: f64,
    pub volatility: f64,
    /// Label recorded in the prediction's contributing methods.
    pub source: &'static str,
}

impl MethodOutput {
    /// Tomorrow looks like today.
    pub fn persistence(c: &CommodityData) -> Self {
        Self {
            price: c.current_price,
            demand: c.demand,
            supply: c.supply,
            volatility: clamp_unit(c.volatility),
            source: "persistence",
        }
    }

    pub fn is_valid(&self) -> bool {
        self.price.is_finite()
            && self.price > 0.0
            && self.demand.is_finite()
            && self.demand >= 0.0
            && self.supply.is_finite()
            && self.supply >= 0.0
            && (0.0..=1.0).contains(&self.volatility)
    }
}

/// A single forecaster. Implementations must be deterministic in their
/// inputs.
pub trait ForecastMethod: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn forecast(
        &self,
        commodity: &CommodityData,
        history: &HistoricalSeries,
        ctx: &ForecastContext,
    ) -> Result<MethodOutput, ForecastError>;
}

fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn std_dev(values: &[f64]) -> f64 {
    match mean(values) {
        Some(m) => {
            let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
            var.sqrt()
        }
        None => 0.0,
    }
}

fn returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

fn insufficient(method: &'static str, needed: usize, have: usize) -> ForecastError {
    ForecastError::InsufficientHistory {
        method,
        needed,
        have,
    }
}

/// Moving-average momentum: short mean against long mean, projected over
/// the horizon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendMethod {
    pub short_window: usize,
    pub long_window: usize,
}

impl Default for TrendMethod {
    fn default() -> Self {
        Self {
            short_window: 5,
            long_window: 20,
        }
    }
}

impl ForecastMethod for TrendMethod {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn forecast(
        &self,
        c: &CommodityData,
        h: &HistoricalSeries,
        ctx: &ForecastContext,
    ) -> Result<MethodOutput, ForecastError> {
        if h.prices.len() < 2 {
            return Err(insufficient(self.name(), 2, h.prices.len()));
        }
        let short =
            mean(tail(&h.prices, self.short_window.max(1))).ok_or(ForecastError::NonFinite)?;
        let long =
            mean(tail(&h.prices, self.long_window.max(1))).ok_or(ForecastError::NonFinite)?;
        if long <= 0.0 {
            return Err(ForecastError::InvalidPrice);
        }
        let momentum = (short - long) / long;
        let horizon = (ctx.horizon_days / 30.0).clamp(0.0, 4.0);
        let realized = std_dev(&returns(tail(&h.prices, self.long_window.max(2))));
        Ok(MethodOutput {
            price: c.current_price * (1.0 + momentum * horizon),
            demand: mean(tail(&h.demand, self.short_window)).unwrap_or(c.demand),
            supply: mean(tail(&h.supply, self.short_window)).unwrap_or(c.supply),
            volatility: clamp_unit(
                0.5 * c.volatility + 0.5 * realized * ctx.horizon_days.max(0.0).sqrt(),
            ),
            source: self.name(),
        })
    }
}

/// Policy rate treated as neutral by the structural model.
const NEUTRAL_RATE: f64 = 0.03;

/// Econometric drift from macro factors, blended with the price that would
/// clear the current supply/demand imbalance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralMethod;

impl ForecastMethod for StructuralMethod {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn forecast(
        &self,
        c: &CommodityData,
        _h: &HistoricalSeries,
        ctx: &ForecastContext,
    ) -> Result<MethodOutput, ForecastError> {
        let f = &c.factors;
        let years = ctx.horizon_days.max(0.0) / 365.0;
        let drift = f.inflation + 0.5 * f.gdp_growth - 0.3 * (f.interest_rate - NEUTRAL_RATE)
            + 0.1 * f.geopolitical_tension
            + 0.05 * (f.fuel_price_index - 1.0)
            + 0.02 * f.sentiment;
        let macro_price = c.current_price * (1.0 + drift * years);
        let equilibrium = clearing_price(c.current_price, c.demand, c.supply, c.price_elasticity)?;
        let price = 0.5 * macro_price + 0.5 * equilibrium;
        let demand = demand_at(
            c.demand * (1.0 + f.gdp_growth * years),
            price.max(f64::MIN_POSITIVE),
            c.current_price,
            c.price_elasticity,
        )?;
        let supply = c.supply * (1.0 - 0.3 * f.storm_frequency * years.min(1.0));
        Ok(MethodOutput {
            price,
            demand,
            supply,
            volatility: clamp_unit(
                0.7 * c.volatility
                    + 0.3 * ctx.market_volatility
                    + 0.15 * f.geopolitical_tension
                    + 0.1 * f.storm_frequency,
            ),
            source: self.name(),
        })
    }
}

/// Nearest-neighbour over past return windows: find the historical window
/// most like the latest one and assume what followed it repeats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternMethod {
    pub window: usize,
}

impl Default for PatternMethod {
    fn default() -> Self {
        Self { window: 5 }
    }
}

impl ForecastMethod for PatternMethod {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn forecast(
        &self,
        c: &CommodityData,
        h: &HistoricalSeries,
        ctx: &ForecastContext,
    ) -> Result<MethodOutput, ForecastError> {
        let w = self.window.max(1);
        let r = returns(&h.prices);
        if r.len() < w + 1 {
            return Err(insufficient(self.name(), w + 2, h.prices.len()));
        }
        let recent = &r[r.len() - w..];
        let mut best: Option<(usize, f64)> = None;
        for j in 0..=(r.len() - w - 1) {
            let d: f64 = r[j..j + w]
                .iter()
                .zip(recent)
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            // Ties go to the most recent match.
            if best.map_or(true, |(_, bd)| d <= bd) {
                best = Some((j, d));
            }
        }
        let (j, _) = best.ok_or_else(|| insufficient(self.name(), w + 2, h.prices.len()))?;
        let next = r[j + w];
        let matched = &r[j..j + w];
        Ok(MethodOutput {
            price: c.current_price * (1.0 + next),
            demand: c.demand,
            supply: c.supply,
            volatility: clamp_unit(
                0.5 * c.volatility + 0.5 * std_dev(matched) * ctx.horizon_days.max(0.0).sqrt(),
            ),
            source: self.name(),
        })
    }
}

/// Number of inputs a [`PriceModel`] receives.
pub const PRICE_FEATURE_COUNT: usize = 6;

/// Features handed to a price model: momentum, imbalance, volatility,
/// inflation, sentiment, geopolitical tension.
pub fn price_features(c: &CommodityData, h: &HistoricalSeries) -> [f64; PRICE_FEATURE_COUNT] {
    let momentum = h
        .mean_price(5)
        .filter(|m| *m > 0.0)
        .map(|m| c.current_price / m - 1.0)
        .unwrap_or(0.0);
    let total = c.demand + c.supply;
    let imbalance = if total > 0.0 {
        (c.demand - c.supply) / total
    } else {
        0.0
    };
    [
        momentum,
        imbalance,
        c.volatility,
        c.factors.inflation,
        c.factors.sentiment,
        c.factors.geopolitical_tension,
    ]
}

/// A trained price model returning the expected fractional price change.
pub trait PriceModel: fmt::Debug + Send + Sync {
    fn predict(&self, features: &[f64; PRICE_FEATURE_COUNT]) -> Result<f64, ForecastError>;
}

/// Linear model over [`price_features`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearPriceModel {
    pub intercept: f64,
    pub weights: [f64; PRICE_FEATURE_COUNT],
}

impl PriceModel for LinearPriceModel {
    fn predict(&self, features: &[f64; PRICE_FEATURE_COUNT]) -> Result<f64, ForecastError> {
        let y = self.intercept
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        if y.is_finite() {
            Ok(y)
        } else {
            Err(ForecastError::NonFinite)
        }
    }
}

/// Largest fractional move accepted from a model.
const MAX_MODEL_MOVE: f64 = 0.5;

type PriceWorker = DeadlineWorker<[f64; PRICE_FEATURE_COUNT], Result<f64, ForecastError>>;

/// Model-backed forecaster. Falls back to exponential smoothing when no
/// model is loaded, progression has not unlocked advanced compute, or the
/// model errors or overruns its latency budget.
///
/// The model runs on its own thread; a forecast waits at most the budget.
#[derive(Debug)]
pub struct ModelMethod {
    model: Option<Mutex<PriceWorker>>,
    smoothing_alpha: f64,
    latency_budget: Duration,
}

impl ModelMethod {
    pub fn new(
        model: Option<Box<dyn PriceModel>>,
        smoothing_alpha: f64,
        latency_budget: Duration,
    ) -> Self {
        let model = model.and_then(|m| {
            match DeadlineWorker::spawn("price-model", move |x: [f64; PRICE_FEATURE_COUNT]| {
                m.predict(&x)
            }) {
                Ok(worker) => Some(Mutex::new(worker)),
                Err(e) => {
                    warn!(error = %e, "could not start price model worker, smoothing only");
                    None
                }
            }
        });
        Self {
            model,
            smoothing_alpha: smoothing_alpha.clamp(0.01, 1.0),
            latency_budget,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    fn smoothed(&self, c: &CommodityData, h: &HistoricalSeries) -> MethodOutput {
        let mut prices = h.prices.iter().copied().chain(std::iter::once(c.current_price));
        let first = prices.next().unwrap_or(c.current_price);
        let level = prices.fold(first, |level, p| level + self.smoothing_alpha * (p - level));
        MethodOutput {
            price: level,
            source: "smoothing",
            ..MethodOutput::persistence(c)
        }
    }

    fn run_model(
        &self,
        worker: &Mutex<PriceWorker>,
        features: [f64; PRICE_FEATURE_COUNT],
    ) -> Result<f64, ForecastError> {
        let mut worker = worker
            .lock()
            .map_err(|_| ForecastError::Model("price model worker poisoned".into()))?;
        match worker.call(features, self.latency_budget) {
            Ok(result) => result,
            Err(e) => Err(ForecastError::Model(e.to_string())),
        }
    }
}

impl ForecastMethod for ModelMethod {
    fn name(&self) -> &'static str {
        "model"
    }

    fn forecast(
        &self,
        c: &CommodityData,
        h: &HistoricalSeries,
        ctx: &ForecastContext,
    ) -> Result<MethodOutput, ForecastError> {
        let worker = match &self.model {
            Some(w) if ctx.advanced_compute => w,
            _ => return Ok(self.smoothed(c, h)),
        };
        match self.run_model(worker, price_features(c, h)) {
            Ok(change) => Ok(MethodOutput {
                price: c.current_price * (1.0 + change.clamp(-MAX_MODEL_MOVE, MAX_MODEL_MOVE)),
                source: self.name(),
                ..MethodOutput::persistence(c)
            }),
            Err(e) => {
                debug!(commodity = %c.id, error = %e, "price model unusable, smoothing instead");
                Ok(self.smoothed(c, h))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{CommodityId, EconomicFactors};

    fn commodity(price: f64) -> CommodityData {
        CommodityData {
            id: CommodityId("grain".into()),
            current_price: price,
            demand: 1_000.0,
            supply: 1_000.0,
            volatility: 0.2,
            price_elasticity: -1.2,
            factors: EconomicFactors::default(),
        }
    }

    fn series(prices: &[f64]) -> HistoricalSeries {
        HistoricalSeries {
            prices: prices.to_vec(),
            demand: vec![1_000.0; prices.len()],
            supply: vec![1_000.0; prices.len()],
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl PriceModel for Broken {
        fn predict(&self, _: &[f64; PRICE_FEATURE_COUNT]) -> Result<f64, ForecastError> {
            Err(ForecastError::Model("weights missing".into()))
        }
    }

    #[test]
    fn trend_follows_momentum() {
        let h = series(&[90.0, 92.0, 94.0, 96.0, 98.0, 100.0, 102.0, 104.0]);
        let out = TrendMethod::default()
            .forecast(&commodity(104.0), &h, &ForecastContext::default())
            .unwrap();
        assert!(out.price > 104.0);
        assert!(out.is_valid());
    }

    #[test]
    fn trend_needs_history() {
        let err = TrendMethod::default()
            .forecast(&commodity(10.0), &series(&[10.0]), &ForecastContext::default())
            .unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientHistory { method: "trend", .. }));
    }

    #[test]
    fn structural_prices_in_shortage() {
        let mut c = commodity(100.0);
        c.demand = 1_300.0;
        let out = StructuralMethod
            .forecast(&c, &HistoricalSeries::default(), &ForecastContext::default())
            .unwrap();
        assert!(out.price > 100.0);
        assert!(out.is_valid());
    }

    #[test]
    fn pattern_repeats_what_followed_the_match() {
        // Alternating +10% / -10% cycle: after an up-move comes a down-move.
        let mut prices = vec![100.0];
        for i in 0..12 {
            let last = prices[prices.len() - 1];
            prices.push(if i % 2 == 0 { last * 1.1 } else { last / 1.1 });
        }
        let current = prices[prices.len() - 1];
        let out = PatternMethod { window: 3 }
            .forecast(&commodity(current), &series(&prices), &ForecastContext::default())
            .unwrap();
        assert!(out.price > current, "last move was down, so up comes next");
    }

    #[test]
    fn model_without_compute_smooths() {
        let m = ModelMethod::new(
            Some(Box::new(LinearPriceModel {
                intercept: 0.2,
                weights: [0.0; PRICE_FEATURE_COUNT],
            })),
            0.5,
            Duration::from_secs(1),
        );
        let c = commodity(100.0);
        let h = series(&[80.0]);
        let out = m.forecast(&c, &h, &ForecastContext::default()).unwrap();
        assert_eq!(out.source, "smoothing");
        assert_eq!(out.price, 90.0);

        let ctx = ForecastContext {
            advanced_compute: true,
            ..ForecastContext::default()
        };
        let out = m.forecast(&c, &h, &ctx).unwrap();
        assert_eq!(out.source, "model");
        assert!((out.price - 120.0).abs() < 1e-9);
    }

    #[test]
    fn failing_model_falls_back() {
        let m = ModelMethod::new(Some(Box::new(Broken)), 0.3, Duration::from_secs(1));
        let ctx = ForecastContext {
            advanced_compute: true,
            ..ForecastContext::default()
        };
        let out = m
            .forecast(&commodity(50.0), &HistoricalSeries::default(), &ctx)
            .unwrap();
        assert_eq!(out.source, "smoothing");
        assert_eq!(out.price, 50.0);
    }

    #[derive(Debug)]
    struct Stalled;

    impl PriceModel for Stalled {
        fn predict(&self, _: &[f64; PRICE_FEATURE_COUNT]) -> Result<f64, ForecastError> {
            std::thread::sleep(Duration::from_secs(2));
            Ok(0.3)
        }
    }

    #[test]
    fn stalled_model_smooths_within_budget() {
        let m = ModelMethod::new(Some(Box::new(Stalled)), 0.5, Duration::from_millis(20));
        let ctx = ForecastContext {
            advanced_compute: true,
            ..ForecastContext::default()
        };
        let c = commodity(100.0);
        let h = series(&[80.0]);
        for _ in 0..3 {
            let started = std::time::Instant::now();
            let out = m.forecast(&c, &h, &ctx).unwrap();
            assert!(started.elapsed() < std::time::Duration::from_millis(500));
            assert_eq!(out.source, "smoothing");
            assert_eq!(out.price, 90.0);
        }
    }
}
