//! Cross-commodity summary the decision engine reads as market context.

use crate::ensemble::{CommodityPrediction, Direction};
use crate::risk::RiskSeverity;
use serde::{Deserialize, Serialize};
use sim_core::{clamp_unit, SimTime};

/// Sensitivity of favorability to the confidence-weighted expected move.
const FAVORABILITY_GAIN: f64 = 5.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketOutlook {
    /// 0.5 is neutral; above means forecasts expect rising prices.
    pub favorability: f64,
    pub bullish_share: f64,
    pub bearish_share: f64,
    pub mean_confidence: f64,
    pub mean_volatility: f64,
    pub high_risk_count: usize,
    pub commodities: usize,
    pub generated_at: SimTime,
}

impl Default for MarketOutlook {
    fn default() -> Self {
        Self {
            favorability: 0.5,
            bullish_share: 0.0,
            bearish_share: 0.0,
            mean_confidence: 0.0,
            mean_volatility: 0.0,
            high_risk_count: 0,
            commodities: 0,
            generated_at: SimTime::ZERO,
        }
    }
}

impl MarketOutlook {
    pub fn from_predictions(predictions: &[CommodityPrediction], at: SimTime) -> Self {
        if predictions.is_empty() {
            return Self {
                generated_at: at,
                ..Self::default()
            };
        }
        let n = predictions.len() as f64;
        let conf_sum: f64 = predictions.iter().map(|p| p.confidence).sum();
        let weighted_move = if conf_sum > 0.0 {
            predictions
                .iter()
                .map(|p| p.confidence * p.expected_change())
                .sum::<f64>()
                / conf_sum
        } else {
            0.0
        };
        let share =
            |d: Direction| predictions.iter().filter(|p| p.direction == d).count() as f64 / n;
        Self {
            favorability: clamp_unit(0.5 + FAVORABILITY_GAIN * weighted_move),
            bullish_share: share(Direction::Bullish),
            bearish_share: share(Direction::Bearish),
            mean_confidence: conf_sum / n,
            mean_volatility: predictions.iter().map(|p| p.volatility_forecast).sum::<f64>() / n,
            high_risk_count: predictions
                .iter()
                .flat_map(|p| &p.risk_factors)
                .filter(|r| r.severity == RiskSeverity::High)
                .count(),
            commodities: predictions.len(),
            generated_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::CommodityId;

    fn prediction(current: f64, predicted: f64, direction: Direction) -> CommodityPrediction {
        CommodityPrediction {
            commodity: CommodityId("ore".into()),
            current_price: current,
            predicted_price: predicted,
            direction,
            demand_forecast: 1.0,
            supply_forecast: 1.0,
            volatility_forecast: 0.4,
            confidence: 0.8,
            risk_factors: Vec::new(),
            methods: vec!["trend".into()],
            failed_methods: Vec::new(),
            generated_at: SimTime::ZERO,
        }
    }

    #[test]
    fn empty_outlook_is_neutral() {
        let o = MarketOutlook::from_predictions(&[], SimTime::from_secs(5));
        assert_eq!(o.favorability, 0.5);
        assert_eq!(o.generated_at, SimTime::from_secs(5));
    }

    #[test]
    fn rising_forecasts_are_favorable() {
        let o = MarketOutlook::from_predictions(
            &[
                prediction(100.0, 110.0, Direction::Bullish),
                prediction(50.0, 52.0, Direction::Bullish),
            ],
            SimTime::ZERO,
        );
        assert!(o.favorability > 0.5);
        assert_eq!(o.bullish_share, 1.0);
        assert!((o.mean_volatility - 0.4).abs() < 1e-12);
    }
}
