//! Threshold-driven risk factors attached to every prediction.

use serde::{Deserialize, Serialize};
use sim_core::EconomicFactors;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskKind {
    HighVolatility,
    Inflation,
    GeopoliticalTension,
    NegativeSentiment,
    StormActivity,
}

impl fmt::Display for RiskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskKind::HighVolatility => "high volatility",
            RiskKind::Inflation => "inflation",
            RiskKind::GeopoliticalTension => "geopolitical tension",
            RiskKind::NegativeSentiment => "negative sentiment",
            RiskKind::StormActivity => "storm activity",
        };
        f.write_str(s)
    }
}

/// One crossed threshold. Severity and impact are fixed per kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub kind: RiskKind,
    pub severity: RiskSeverity,
    /// Expected fractional price impact if the risk materializes.
    pub impact: f64,
    /// The observed value that crossed the threshold.
    pub observed: f64,
}

pub const VOLATILITY_THRESHOLD: f64 = 0.7;
pub const INFLATION_THRESHOLD: f64 = 0.05;
pub const TENSION_THRESHOLD: f64 = 0.6;
pub const SENTIMENT_THRESHOLD: f64 = 0.0;
pub const STORM_THRESHOLD: f64 = 0.3;

impl RiskKind {
    pub const fn severity(self) -> RiskSeverity {
        match self {
            RiskKind::HighVolatility | RiskKind::GeopoliticalTension => RiskSeverity::High,
            RiskKind::Inflation | RiskKind::StormActivity => RiskSeverity::Medium,
            RiskKind::NegativeSentiment => RiskSeverity::Low,
        }
    }

    pub const fn impact(self) -> f64 {
        match self {
            RiskKind::HighVolatility => 0.3,
            RiskKind::Inflation => 0.2,
            RiskKind::GeopoliticalTension => 0.35,
            RiskKind::NegativeSentiment => 0.15,
            RiskKind::StormActivity => 0.25,
        }
    }

    fn factor(self, observed: f64) -> RiskFactor {
        RiskFactor {
            kind: self,
            severity: self.severity(),
            impact: self.impact(),
            observed,
        }
    }
}

/// Risk factors for a commodity, in a fixed order, one per crossed threshold.
pub fn assess(volatility: f64, factors: &EconomicFactors) -> Vec<RiskFactor> {
    let checks = [
        (RiskKind::HighVolatility, volatility, volatility > VOLATILITY_THRESHOLD),
        (RiskKind::Inflation, factors.inflation, factors.inflation > INFLATION_THRESHOLD),
        (
            RiskKind::GeopoliticalTension,
            factors.geopolitical_tension,
            factors.geopolitical_tension > TENSION_THRESHOLD,
        ),
        (
            RiskKind::NegativeSentiment,
            factors.sentiment,
            factors.sentiment < SENTIMENT_THRESHOLD,
        ),
        (
            RiskKind::StormActivity,
            factors.storm_frequency,
            factors.storm_frequency > STORM_THRESHOLD,
        ),
    ];
    checks
        .into_iter()
        .filter(|&(_, _, crossed)| crossed)
        .map(|(kind, observed, _)| kind.factor(observed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calm_market_has_no_risks() {
        assert!(assess(0.2, &EconomicFactors::default()).is_empty());
    }

    #[test]
    fn every_threshold_contributes_once() {
        let f = EconomicFactors {
            inflation: 0.08,
            geopolitical_tension: 0.75,
            sentiment: -0.4,
            storm_frequency: 0.45,
            ..EconomicFactors::default()
        };
        let risks = assess(0.9, &f);
        let kinds: Vec<_> = risks.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RiskKind::HighVolatility,
                RiskKind::Inflation,
                RiskKind::GeopoliticalTension,
                RiskKind::NegativeSentiment,
                RiskKind::StormActivity,
            ]
        );
        assert_eq!(risks[0].severity, RiskSeverity::High);
        assert_eq!(risks[3].impact, 0.15);
    }

    #[test]
    fn thresholds_are_strict() {
        let f = EconomicFactors {
            inflation: INFLATION_THRESHOLD,
            geopolitical_tension: TENSION_THRESHOLD,
            sentiment: 0.0,
            storm_frequency: STORM_THRESHOLD,
            ..EconomicFactors::default()
        };
        assert!(assess(VOLATILITY_THRESHOLD, &f).is_empty());
    }
}
