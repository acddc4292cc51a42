//! Fixed-size numeric view of a competitor in its market.

use crate::engine::DecisionContext;
use chrono::Datelike;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{clamp_unit, CompetitorState};
use std::f64::consts::TAU;

/// Length of every [`FeatureVector`].
pub const FEATURE_COUNT: usize = 24;

/// Named positions in a [`FeatureVector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    // Financial ratios.
    Liquidity,
    CashCoverage,
    NetWorthScale,
    Reputation,
    // Market conditions.
    DemandIndex,
    PriceIndex,
    MarketVolatility,
    Competition,
    Growth,
    FuelPressure,
    // Operations.
    Utilization,
    FleetScale,
    RouteScale,
    RegionScale,
    ResearchLevel,
    // Strategic posture.
    RelativeStanding,
    // Behavioral traits.
    Aggressiveness,
    RiskTolerance,
    InnovationFocus,
    ExpansionDrive,
    // Timing and context.
    TimeSinceDecision,
    Seasonality,
    Progress,
    Favorability,
}

impl Feature {
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Every value in [0,1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn get(&self, f: Feature) -> f64 {
        self.0[f.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Build directly from raw values, clamping each into [0,1].
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values.map(clamp_unit))
    }
}

/// Reference scales that turn counts and amounts into unit features.
const NET_WORTH_SCALE: f64 = 1e6;
const NET_WORTH_CEILING: f64 = 1_000.0;
const FLEET_SATURATION: f64 = 50.0;
const ROUTE_SATURATION: f64 = 20.0;
const REGION_SATURATION: f64 = 10.0;
const DECISION_GAP_SATURATION_SECS: f64 = 300.0;
/// Number of asset purchases that counts as full cash coverage.
const COVERAGE_ASSETS: f64 = 4.0;

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Pure mapping from a competitor and its decision context to features.
#[derive(Clone, Copy, Debug, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn extract(state: &CompetitorState, ctx: &DecisionContext<'_>) -> FeatureVector {
        let fin = &state.finances;
        let market = &ctx.game.market;
        let cash = fin.cash_f64();
        let asset_price = to_f64(market.asset_price);
        let cash_coverage = if asset_price > 0.0 {
            cash / (asset_price * COVERAGE_ASSETS)
        } else {
            1.0
        };
        let net_worth = to_f64(fin.net_worth()).max(0.0);
        let best_rival = ctx
            .game
            .competitors
            .iter()
            .filter(|c| c.id != state.id)
            .map(|c| to_f64(c.net_worth))
            .fold(0.0, f64::max);
        let standing = if net_worth + best_rival > 0.0 {
            net_worth / (net_worth + best_rival)
        } else {
            0.5
        };
        let since = state
            .time_since_last_decision(ctx.game.time.now)
            .map(|d| d.as_secs_f64() / DECISION_GAP_SATURATION_SECS)
            .unwrap_or(1.0);
        let day = f64::from(ctx.game.time.date.ordinal0());
        let seasonality = 0.5 + 0.5 * (TAU * day / 365.0).sin();
        let p = &state.profile;

        let mut v = [0.0; FEATURE_COUNT];
        let mut set = |f: Feature, x: f64| v[f.index()] = clamp_unit(x);
        set(Feature::Liquidity, fin.liquidity_ratio());
        set(Feature::CashCoverage, cash_coverage);
        set(
            Feature::NetWorthScale,
            (net_worth / NET_WORTH_SCALE).ln_1p() / NET_WORTH_CEILING.ln_1p(),
        );
        set(Feature::Reputation, fin.reputation() / 100.0);
        set(Feature::DemandIndex, market.demand_index);
        set(Feature::PriceIndex, market.price_index);
        set(Feature::MarketVolatility, market.volatility);
        set(Feature::Competition, market.competition_intensity);
        set(Feature::Growth, 0.5 + 5.0 * market.growth_rate);
        set(Feature::FuelPressure, market.fuel_price_index / 2.0);
        set(Feature::Utilization, fin.utilization);
        set(Feature::FleetScale, f64::from(fin.assets_owned) / FLEET_SATURATION);
        set(Feature::RouteScale, f64::from(fin.trade_routes) / ROUTE_SATURATION);
        set(Feature::RegionScale, f64::from(fin.regions) / REGION_SATURATION);
        set(Feature::ResearchLevel, fin.research_level);
        set(Feature::RelativeStanding, standing);
        set(Feature::Aggressiveness, p.aggressiveness());
        set(Feature::RiskTolerance, p.risk_tolerance());
        set(Feature::InnovationFocus, p.innovation_focus());
        set(Feature::ExpansionDrive, p.get(sim_core::Trait::ExpansionDrive));
        set(Feature::TimeSinceDecision, since);
        set(Feature::Seasonality, seasonality);
        set(Feature::Progress, ctx.progression.progress);
        set(Feature::Favorability, ctx.outlook.favorability);
        FeatureVector(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::Fixture;
    use proptest::prelude::*;
    use sim_core::SimTime;

    #[test]
    fn names_cover_the_vector() {
        assert_eq!(Feature::Favorability.index(), FEATURE_COUNT - 1);
    }

    #[test]
    fn first_decision_reads_as_long_gap() {
        let fx = Fixture::new();
        let state = fx.competitor(0.5, 10_000_000);
        let v = FeatureExtractor::extract(&state, &fx.ctx());
        assert_eq!(v.get(Feature::TimeSinceDecision), 1.0);
        assert_eq!(v.get(Feature::RelativeStanding), 1.0);
    }

    #[test]
    fn extraction_is_pure() {
        let fx = Fixture::new();
        let state = fx.competitor(0.3, 4_000_000);
        let a = FeatureExtractor::extract(&state, &fx.ctx());
        let b = FeatureExtractor::extract(&state, &fx.ctx());
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn features_are_unit(cash in 0i64..1_000_000_000, rt in 0.0f64..=1.0, secs in 0u64..100_000) {
            let mut fx = Fixture::new();
            fx.game.time.now = SimTime::from_secs(secs);
            let mut state = fx.competitor(rt, cash);
            state.last_decision_at = Some(SimTime::ZERO);
            let v = FeatureExtractor::extract(&state, &fx.ctx());
            for x in v.as_slice() {
                prop_assert!((0.0..=1.0).contains(x));
            }
        }
    }
}
