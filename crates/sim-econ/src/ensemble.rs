//! Weighted combination of independent forecasters.

use crate::methods::{
    ForecastContext, ForecastMethod, MethodOutput, ModelMethod, PatternMethod, PriceModel,
    StructuralMethod, TrendMethod,
};
use crate::risk::{assess, RiskFactor};
use crate::EnsembleError;
use serde::{Deserialize, Serialize};
use sim_core::{
    validate_commodity, validate_history, CommodityData, CommodityId, HistoricalSeries, SimTime,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lowest confidence ever reported.
pub const MIN_CONFIDENCE: f64 = 0.1;
/// Highest confidence ever reported.
pub const MAX_CONFIDENCE: f64 = 0.95;
/// Tolerance on the weight sum.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
    Stable,
}

/// One commodity's combined forecast. Regenerated whole every cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommodityPrediction {
    pub commodity: CommodityId,
    pub current_price: f64,
    pub predicted_price: f64,
    pub direction: Direction,
    pub demand_forecast: f64,
    pub supply_forecast: f64,
    pub volatility_forecast: f64,
    /// Agreement between methods, in [0.1, 0.95].
    pub confidence: f64,
    pub risk_factors: Vec<RiskFactor>,
    /// Labels of the methods whose output was used.
    pub methods: Vec<String>,
    /// Methods that errored and were replaced by a persistence forecast.
    pub failed_methods: Vec<String>,
    pub generated_at: SimTime,
}

impl CommodityPrediction {
    /// Predicted move relative to the current price.
    pub fn expected_change(&self) -> f64 {
        if self.current_price > 0.0 {
            self.predicted_price / self.current_price - 1.0
        } else {
            0.0
        }
    }
}

/// Fixed method weights. Must sum to 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleWeights {
    pub trend: f64,
    pub structural: f64,
    pub pattern: f64,
    pub model: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            trend: 0.3,
            structural: 0.25,
            pattern: 0.2,
            model: 0.25,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub weights: EnsembleWeights,
    /// Relative move inside which the direction reads as stable.
    pub dead_zone: f64,
    /// Window of the simple moving average direction is measured against.
    pub average_window: usize,
    pub trend: TrendMethod,
    pub pattern: PatternMethod,
    pub smoothing_alpha: f64,
    pub model_latency_budget_ms: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            weights: EnsembleWeights::default(),
            dead_zone: 0.02,
            average_window: 20,
            trend: TrendMethod::default(),
            pattern: PatternMethod::default(),
            smoothing_alpha: 0.3,
            model_latency_budget_ms: 50,
        }
    }
}

fn check_weights(weights: &[f64]) -> Result<(), EnsembleError> {
    if weights.is_empty() {
        return Err(EnsembleError::NoMethods);
    }
    if let Some(&w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(EnsembleError::InvalidWeight(w));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(EnsembleError::WeightsDoNotSumToOne(sum));
    }
    Ok(())
}

impl EnsembleConfig {
    pub fn validate(&self) -> Result<(), EnsembleError> {
        let w = &self.weights;
        check_weights(&[w.trend, w.structural, w.pattern, w.model])?;
        if !self.dead_zone.is_finite() || !(0.0..1.0).contains(&self.dead_zone) {
            return Err(EnsembleError::InvalidConfig("dead_zone"));
        }
        if self.average_window == 0 {
            return Err(EnsembleError::InvalidConfig("average_window"));
        }
        if self.trend.short_window == 0 || self.trend.long_window < self.trend.short_window {
            return Err(EnsembleError::InvalidConfig("trend windows"));
        }
        if self.pattern.window == 0 {
            return Err(EnsembleError::InvalidConfig("pattern.window"));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(EnsembleError::InvalidConfig("smoothing_alpha"));
        }
        Ok(())
    }
}

/// Population coefficient of variation; 0 for fewer than two values or a
/// non-positive mean.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt() / mean
}

/// Confidence from method disagreement, clamped to
/// [`MIN_CONFIDENCE`, `MAX_CONFIDENCE`].
pub fn confidence_from_prices(prices: &[f64]) -> f64 {
    let c = 1.0 - coefficient_of_variation(prices);
    if c.is_nan() {
        MIN_CONFIDENCE
    } else {
        c.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
    }
}

/// Runs every method over the same input and combines them with fixed
/// weights.
#[derive(Debug)]
pub struct MarketForecastEnsemble {
    methods: Vec<(Box<dyn ForecastMethod>, f64)>,
    dead_zone: f64,
    average_window: usize,
}

impl MarketForecastEnsemble {
    /// The standard four-method ensemble. `model` is the optional trained
    /// price model behind the model method.
    pub fn new(
        cfg: &EnsembleConfig,
        model: Option<Box<dyn PriceModel>>,
    ) -> Result<Self, EnsembleError> {
        cfg.validate()?;
        let w = &cfg.weights;
        let methods: Vec<(Box<dyn ForecastMethod>, f64)> = vec![
            (Box::new(cfg.trend.clone()), w.trend),
            (Box::new(StructuralMethod), w.structural),
            (Box::new(cfg.pattern.clone()), w.pattern),
            (
                Box::new(ModelMethod::new(
                    model,
                    cfg.smoothing_alpha,
                    Duration::from_millis(cfg.model_latency_budget_ms),
                )),
                w.model,
            ),
        ];
        Ok(Self {
            methods,
            dead_zone: cfg.dead_zone,
            average_window: cfg.average_window,
        })
    }

    /// An ensemble over arbitrary methods. Weights must be non-negative and
    /// sum to 1.
    pub fn with_methods(
        methods: Vec<(Box<dyn ForecastMethod>, f64)>,
        dead_zone: f64,
        average_window: usize,
    ) -> Result<Self, EnsembleError> {
        let weights: Vec<f64> = methods.iter().map(|(_, w)| *w).collect();
        check_weights(&weights)?;
        if !dead_zone.is_finite() || !(0.0..1.0).contains(&dead_zone) {
            return Err(EnsembleError::InvalidConfig("dead_zone"));
        }
        Ok(Self {
            methods,
            dead_zone,
            average_window: average_window.max(1),
        })
    }

    pub fn method_names(&self) -> Vec<&'static str> {
        self.methods.iter().map(|(m, _)| m.name()).collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.methods.iter().map(|(_, w)| *w).collect()
    }

    fn direction(&self, weighted_price: f64, average: f64) -> Direction {
        let rel = (weighted_price - average) / average;
        if rel > self.dead_zone {
            Direction::Bullish
        } else if rel < -self.dead_zone {
            Direction::Bearish
        } else {
            Direction::Stable
        }
    }

    /// Forecast one commodity. Never fails: a method that errors or returns
    /// garbage is replaced by a persistence forecast at its weight and left
    /// out of the contributing methods.
    pub fn forecast(
        &self,
        commodity: &CommodityData,
        history: &HistoricalSeries,
        ctx: &ForecastContext,
        now: SimTime,
    ) -> CommodityPrediction {
        let mut outputs = Vec::with_capacity(self.methods.len());
        let mut methods = Vec::new();
        let mut failed_methods = Vec::new();
        for (method, weight) in &self.methods {
            let out = match method.forecast(commodity, history, ctx) {
                Ok(out) if out.is_valid() => {
                    methods.push(out.source.to_string());
                    out
                }
                Ok(out) => {
                    warn!(
                        commodity = %commodity.id,
                        method = method.name(),
                        ?out,
                        "method produced invalid output"
                    );
                    failed_methods.push(method.name().to_string());
                    MethodOutput::persistence(commodity)
                }
                Err(e) => {
                    debug!(
                        commodity = %commodity.id,
                        method = method.name(),
                        error = %e,
                        "method unavailable"
                    );
                    failed_methods.push(method.name().to_string());
                    MethodOutput::persistence(commodity)
                }
            };
            outputs.push((out, *weight));
        }

        let weighted = |f: fn(&MethodOutput) -> f64| -> f64 {
            outputs.iter().map(|(o, w)| f(o) * w).sum()
        };
        let predicted_price = weighted(|o| o.price);
        let demand_forecast = weighted(|o| o.demand);
        let supply_forecast = weighted(|o| o.supply);
        let volatility_forecast = weighted(|o| o.volatility).clamp(0.0, 1.0);

        let prices: Vec<f64> = outputs.iter().map(|(o, _)| o.price).collect();
        let confidence = if methods.is_empty() {
            MIN_CONFIDENCE
        } else {
            confidence_from_prices(&prices)
        };
        let average = history
            .mean_price(self.average_window)
            .filter(|p| *p > 0.0)
            .unwrap_or(commodity.current_price);

        CommodityPrediction {
            commodity: commodity.id.clone(),
            current_price: commodity.current_price,
            predicted_price,
            direction: self.direction(predicted_price, average),
            demand_forecast,
            supply_forecast,
            volatility_forecast,
            confidence,
            risk_factors: assess(commodity.volatility, &commodity.factors),
            methods,
            failed_methods,
            generated_at: now,
        }
    }

    /// Forecast every valid commodity; invalid inputs are logged and skipped.
    pub fn forecast_all<'a, I>(
        &self,
        inputs: I,
        ctx: &ForecastContext,
        now: SimTime,
    ) -> Vec<CommodityPrediction>
    where
        I: IntoIterator<Item = (&'a CommodityData, &'a HistoricalSeries)>,
    {
        let mut out = Vec::new();
        for (c, h) in inputs {
            if let Err(e) = validate_commodity(c).and_then(|_| validate_history(h)) {
                warn!(commodity = %c.id, error = %e, "skipping invalid commodity input");
                continue;
            }
            out.push(self.forecast(c, h, ctx, now));
        }
        info!(count = out.len(), at = %now, "market forecast cycle complete");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ForecastError;
    use proptest::prelude::*;
    use sim_core::EconomicFactors;

    #[derive(Debug)]
    struct Fixed(&'static str, f64);

    impl ForecastMethod for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn forecast(
            &self,
            c: &CommodityData,
            _: &HistoricalSeries,
            _: &ForecastContext,
        ) -> Result<MethodOutput, ForecastError> {
            Ok(MethodOutput {
                price: self.1,
                source: self.0,
                ..MethodOutput::persistence(c)
            })
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl ForecastMethod for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn forecast(
            &self,
            _: &CommodityData,
            _: &HistoricalSeries,
            _: &ForecastContext,
        ) -> Result<MethodOutput, ForecastError> {
            Err(ForecastError::Model("offline".into()))
        }
    }

    fn commodity(price: f64) -> CommodityData {
        CommodityData {
            id: CommodityId("steel".into()),
            current_price: price,
            demand: 1_000.0,
            supply: 1_000.0,
            volatility: 0.3,
            price_elasticity: -1.1,
            factors: EconomicFactors::default(),
        }
    }

    fn fixed(prices: &[f64]) -> MarketForecastEnsemble {
        let w = 1.0 / prices.len() as f64;
        let methods = prices
            .iter()
            .map(|&p| (Box::new(Fixed("fixed", p)) as Box<dyn ForecastMethod>, w))
            .collect();
        MarketForecastEnsemble::with_methods(methods, 0.02, 20).unwrap()
    }

    #[test]
    fn agreeing_methods_are_confident() {
        let p = fixed(&[100.0, 102.0, 98.0]).forecast(
            &commodity(100.0),
            &HistoricalSeries::default(),
            &ForecastContext::default(),
            SimTime::ZERO,
        );
        assert!((p.predicted_price - 100.0).abs() < 1e-9);
        assert_eq!(p.confidence, MAX_CONFIDENCE);
        assert_eq!(p.direction, Direction::Stable);
        assert_eq!(p.methods.len(), 3);
    }

    #[test]
    fn disagreeing_methods_lose_confidence_at_same_price() {
        let calm = fixed(&[100.0, 102.0, 98.0]);
        let wild = fixed(&[60.0, 140.0, 100.0]);
        let c = commodity(100.0);
        let h = HistoricalSeries::default();
        let ctx = ForecastContext::default();
        let a = calm.forecast(&c, &h, &ctx, SimTime::ZERO);
        let b = wild.forecast(&c, &h, &ctx, SimTime::ZERO);
        assert!((b.predicted_price - 100.0).abs() < 1e-9);
        assert!(b.confidence < a.confidence - 0.2, "{} vs {}", b.confidence, a.confidence);
    }

    #[test]
    fn direction_is_measured_against_moving_average() {
        let e = fixed(&[110.0, 110.0]);
        let h = HistoricalSeries {
            prices: vec![100.0; 10],
            ..HistoricalSeries::default()
        };
        let p = e.forecast(&commodity(105.0), &h, &ForecastContext::default(), SimTime::ZERO);
        assert_eq!(p.direction, Direction::Bullish);
        let e = fixed(&[90.0, 90.0]);
        let p = e.forecast(&commodity(105.0), &h, &ForecastContext::default(), SimTime::ZERO);
        assert_eq!(p.direction, Direction::Bearish);
    }

    #[test]
    fn failed_method_is_replaced_by_persistence() {
        let methods: Vec<(Box<dyn ForecastMethod>, f64)> = vec![
            (Box::new(Fixed("up", 120.0)), 0.5),
            (Box::new(Failing), 0.5),
        ];
        let e = MarketForecastEnsemble::with_methods(methods, 0.02, 20).unwrap();
        let p = e.forecast(
            &commodity(100.0),
            &HistoricalSeries::default(),
            &ForecastContext::default(),
            SimTime::ZERO,
        );
        assert!((p.predicted_price - 110.0).abs() < 1e-9);
        assert_eq!(p.methods, vec!["up".to_string()]);
        assert_eq!(p.failed_methods, vec!["failing".to_string()]);
    }

    #[test]
    fn all_methods_failing_reports_floor_confidence() {
        let methods: Vec<(Box<dyn ForecastMethod>, f64)> = vec![(Box::new(Failing), 1.0)];
        let e = MarketForecastEnsemble::with_methods(methods, 0.02, 20).unwrap();
        let p = e.forecast(
            &commodity(100.0),
            &HistoricalSeries::default(),
            &ForecastContext::default(),
            SimTime::ZERO,
        );
        assert_eq!(p.confidence, MIN_CONFIDENCE);
        assert_eq!(p.predicted_price, 100.0);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let cfg = EnsembleConfig {
            weights: EnsembleWeights {
                trend: 0.5,
                ..EnsembleWeights::default()
            },
            ..EnsembleConfig::default()
        };
        assert!(matches!(
            MarketForecastEnsemble::new(&cfg, None),
            Err(EnsembleError::WeightsDoNotSumToOne(_))
        ));
        let e = MarketForecastEnsemble::new(&EnsembleConfig::default(), None).unwrap();
        let sum: f64 = e.weights().iter().sum();
        assert!((sum - 1.0).abs() <= WEIGHT_TOLERANCE);
        assert_eq!(e.method_names(), vec!["trend", "structural", "pattern", "model"]);
    }

    #[test]
    fn standard_ensemble_handles_short_history() {
        let e = MarketForecastEnsemble::new(&EnsembleConfig::default(), None).unwrap();
        let p = e.forecast(
            &commodity(100.0),
            &HistoricalSeries::default(),
            &ForecastContext::default(),
            SimTime::from_secs(300),
        );
        assert_eq!(p.failed_methods, vec!["trend".to_string(), "pattern".to_string()]);
        assert_eq!(p.methods, vec!["structural".to_string(), "smoothing".to_string()]);
        assert!(p.predicted_price > 0.0);
    }

    #[test]
    fn forecast_all_skips_invalid_inputs() {
        let e = MarketForecastEnsemble::new(&EnsembleConfig::default(), None).unwrap();
        let good = commodity(50.0);
        let mut bad = commodity(50.0);
        bad.price_elasticity = 0.5;
        let h = HistoricalSeries::default();
        let ctx = ForecastContext::default();
        let out = e.forecast_all([(&good, &h), (&bad, &h)], &ctx, SimTime::ZERO);
        assert_eq!(out.len(), 1);
    }

    proptest! {
        #[test]
        fn confidence_is_clamped(prices in proptest::collection::vec(0.01f64..1e6, 1..8)) {
            let c = confidence_from_prices(&prices);
            prop_assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&c));
        }

        #[test]
        fn standard_forecast_confidence_is_clamped(
            price in 1.0f64..1e4,
            history in proptest::collection::vec(1.0f64..1e4, 0..40),
            vol in 0.0f64..=1.0,
        ) {
            let e = MarketForecastEnsemble::new(&EnsembleConfig::default(), None).unwrap();
            let mut c = commodity(price);
            c.volatility = vol;
            let h = HistoricalSeries { prices: history, ..HistoricalSeries::default() };
            let p = e.forecast(&c, &h, &ForecastContext::default(), SimTime::ZERO);
            prop_assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&p.confidence));
            prop_assert!(p.predicted_price.is_finite());
        }
    }
}
