#![deny(warnings)]

//! Market forecasting for Port Tycoon.
//!
//! Several independent forecasters (trend, structural, pattern matching and
//! an optional trained model with a smoothing fallback) run over the same
//! commodity input and are combined with fixed weights. Confidence comes from
//! how much the methods disagree; risk factors come from fixed thresholds on
//! the macro drivers.

pub mod ensemble;
pub mod methods;
pub mod outlook;
pub mod pricing;
pub mod risk;

pub use ensemble::{
    coefficient_of_variation, confidence_from_prices, CommodityPrediction, Direction,
    EnsembleConfig, EnsembleWeights, MarketForecastEnsemble, MAX_CONFIDENCE, MIN_CONFIDENCE,
};
pub use methods::{
    price_features, ForecastContext, ForecastMethod, LinearPriceModel, MethodOutput, ModelMethod,
    PatternMethod, PriceModel, StructuralMethod, TrendMethod, PRICE_FEATURE_COUNT,
};
pub use outlook::MarketOutlook;
pub use risk::{RiskFactor, RiskKind, RiskSeverity};

use thiserror::Error;

/// Errors produced by individual forecasting methods and pricing helpers.
#[derive(Debug, Error, PartialEq)]
pub enum ForecastError {
    /// Elasticity must be strictly negative.
    #[error("invalid elasticity: {0}")]
    InvalidElasticity(f64),
    /// Prices must be strictly positive.
    #[error("invalid price value")]
    InvalidPrice,
    #[error("non-finite numeric value")]
    NonFinite,
    #[error("{method} needs {needed} observations, have {have}")]
    InsufficientHistory {
        method: &'static str,
        needed: usize,
        have: usize,
    },
    /// A trained model failed to produce a prediction.
    #[error("price model failed: {0}")]
    Model(String),
}

/// Errors raised while building an ensemble.
#[derive(Debug, Error, PartialEq)]
pub enum EnsembleError {
    #[error("ensemble has no methods")]
    NoMethods,
    #[error("method weight {0} is negative or non-finite")]
    InvalidWeight(f64),
    #[error("method weights sum to {0}, expected 1")]
    WeightsDoNotSumToOne(f64),
    #[error("invalid ensemble config field: {0}")]
    InvalidConfig(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{CommodityData, CommodityId, EconomicFactors, HistoricalSeries, SimTime};

    #[test]
    fn prediction_serializes() {
        let e = MarketForecastEnsemble::new(&EnsembleConfig::default(), None).unwrap();
        let c = CommodityData {
            id: CommodityId("containers".into()),
            current_price: 1_850.0,
            demand: 1_000.0,
            supply: 900.0,
            volatility: 0.75,
            price_elasticity: -1.3,
            factors: EconomicFactors {
                inflation: 0.06,
                ..EconomicFactors::default()
            },
        };
        let p = e.forecast(
            &c,
            &HistoricalSeries::default(),
            &ForecastContext::default(),
            SimTime::from_secs(300),
        );
        assert_eq!(p.risk_factors.len(), 2);
        let s = serde_json::to_string(&p).unwrap();
        let back: CommodityPrediction = serde_json::from_str(&s).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn config_parses_with_defaults() {
        let cfg: EnsembleConfig = serde_json::from_str(r#"{"dead_zone":0.05}"#).unwrap();
        assert_eq!(cfg.dead_zone, 0.05);
        assert_eq!(cfg.weights, EnsembleWeights::default());
        assert!(cfg.validate().is_ok());
    }
}
