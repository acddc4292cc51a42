//! Raw economic inputs supplied by the economy layer.

use crate::competitor::{CompetitorId, CompetitorState};
use crate::time::TimeContext;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Commodity identifier, e.g. "crude-oil" or "containers".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommodityId(pub String);

impl fmt::Display for CommodityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External macro drivers for a commodity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EconomicFactors {
    /// Annual inflation (0.02 = 2%).
    pub inflation: f64,
    /// Short-term interest rate.
    pub interest_rate: f64,
    /// Annual GDP growth.
    pub gdp_growth: f64,
    /// Geopolitical tension in [0,1].
    pub geopolitical_tension: f64,
    /// News sentiment in [-1,1].
    pub sentiment: f64,
    /// Share of shipping days disrupted by storms, in [0,1].
    pub storm_frequency: f64,
    /// Bunker fuel price relative to baseline (1.0 = baseline).
    pub fuel_price_index: f64,
}

impl Default for EconomicFactors {
    fn default() -> Self {
        Self {
            inflation: 0.02,
            interest_rate: 0.03,
            gdp_growth: 0.025,
            geopolitical_tension: 0.2,
            sentiment: 0.0,
            storm_frequency: 0.1,
            fuel_price_index: 1.0,
        }
    }
}

/// Current state of one commodity market.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommodityData {
    pub id: CommodityId,
    pub current_price: f64,
    /// Demand in units per day.
    pub demand: f64,
    /// Supply in units per day.
    pub supply: f64,
    /// Realized volatility in [0,1].
    pub volatility: f64,
    /// Constant price elasticity of demand (< 0).
    pub price_elasticity: f64,
    pub factors: EconomicFactors,
}

/// Past observations for a commodity, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub prices: Vec<f64>,
    pub demand: Vec<f64>,
    pub supply: Vec<f64>,
}

impl HistoricalSeries {
    /// Simple mean of the last `window` prices, `None` if empty.
    pub fn mean_price(&self, window: usize) -> Option<f64> {
        let n = self.prices.len().min(window.max(1));
        if n == 0 {
            return None;
        }
        let tail = &self.prices[self.prices.len() - n..];
        Some(tail.iter().sum::<f64>() / n as f64)
    }

    /// Append an observation, keeping at most `cap` points per series.
    pub fn push(&mut self, price: f64, demand: f64, supply: f64, cap: usize) {
        for (series, v) in [
            (&mut self.prices, price),
            (&mut self.demand, demand),
            (&mut self.supply, supply),
        ] {
            series.push(v);
            if series.len() > cap {
                let excess = series.len() - cap;
                series.drain(..excess);
            }
        }
    }
}

/// Aggregate market conditions seen by competitors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Freight demand relative to baseline, in [0,1] (0.5 = baseline).
    pub demand_index: f64,
    /// Freight rates relative to baseline, in [0,1].
    pub price_index: f64,
    pub volatility: f64,
    /// How contested the market is, in [0,1].
    pub competition_intensity: f64,
    /// Annualized market growth.
    pub growth_rate: f64,
    pub fuel_price_index: f64,
    /// Typical price of one new asset in USD.
    pub asset_price: Decimal,
    /// Typical cost of opening a route in USD.
    pub route_cost: Decimal,
    /// Typical cost of entering a region in USD.
    pub region_entry_cost: Decimal,
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self {
            demand_index: 0.5,
            price_index: 0.5,
            volatility: 0.3,
            competition_intensity: 0.5,
            growth_rate: 0.03,
            fuel_price_index: 1.0,
            asset_price: Decimal::new(2_000_000, 0),
            route_cost: Decimal::new(500_000, 0),
            region_entry_cost: Decimal::new(5_000_000, 0),
        }
    }
}

/// Minimal public view of a rival, as shared with other agents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompetitorSummary {
    pub id: CompetitorId,
    pub net_worth: Decimal,
    pub assets_owned: u32,
    pub regions: u32,
    pub reputation: f64,
}

impl From<&CompetitorState> for CompetitorSummary {
    fn from(c: &CompetitorState) -> Self {
        Self {
            id: c.id,
            net_worth: c.finances.net_worth(),
            assets_owned: c.finances.assets_owned,
            regions: c.finances.regions,
            reputation: c.finances.reputation(),
        }
    }
}

/// Everything the surrounding game hands the core about the wider world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameContext {
    /// Player's net worth in USD.
    pub player_assets: Decimal,
    pub market: MarketSnapshot,
    pub competitors: Vec<CompetitorSummary>,
    pub time: TimeContext,
}

impl GameContext {
    /// Player share of `player + strongest rival` net worth, in [0,1].
    pub fn player_standing(&self) -> f64 {
        let best = self
            .competitors
            .iter()
            .map(|c| c.net_worth)
            .max()
            .unwrap_or(Decimal::ZERO);
        let total = best + self.player_assets;
        if total <= Decimal::ZERO {
            return 0.5;
        }
        (self.player_assets / total).to_f64().unwrap_or(0.5).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SimTime;
    use chrono::NaiveDate;

    #[test]
    fn mean_price_uses_tail() {
        let h = HistoricalSeries {
            prices: vec![1.0, 2.0, 3.0, 4.0],
            ..Default::default()
        };
        assert_eq!(h.mean_price(2), Some(3.5));
        assert_eq!(h.mean_price(100), Some(2.5));
        assert_eq!(HistoricalSeries::default().mean_price(5), None);
    }

    #[test]
    fn push_caps_series() {
        let mut h = HistoricalSeries::default();
        for i in 0..10 {
            h.push(i as f64, 1.0, 1.0, 4);
        }
        assert_eq!(h.prices, vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(h.demand.len(), 4);
    }

    #[test]
    fn standing_without_rivals_is_full() {
        let ctx = GameContext {
            player_assets: Decimal::new(100, 0),
            market: MarketSnapshot::default(),
            competitors: vec![],
            time: TimeContext::at(
                NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
                SimTime::ZERO,
                60,
            ),
        };
        assert!((ctx.player_standing() - 1.0).abs() < 1e-9);
    }
}
