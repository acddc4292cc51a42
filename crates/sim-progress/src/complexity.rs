//! Market-complexity term derived from raw commodity snapshots.

use serde::{Deserialize, Serialize};
use sim_core::{clamp_unit, CommodityData};

/// Commodity count at which breadth saturates.
const BREADTH_SATURATION: f64 = 12.0;

/// Inputs to the market source of progression, both in [0,1].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketComplexity {
    /// Breadth and turbulence of traded commodities.
    pub complexity: f64,
    /// Traded volume relative to `reference_volume`.
    pub trade_volume: f64,
}

impl MarketComplexity {
    /// Blend commodity breadth, mean volatility and supply/demand imbalance.
    /// `reference_volume` is the daily volume that counts as a full market.
    pub fn from_commodities(commodities: &[CommodityData], reference_volume: f64) -> Self {
        if commodities.is_empty() {
            return Self::default();
        }
        let n = commodities.len() as f64;
        let breadth = clamp_unit(n / BREADTH_SATURATION);
        let volatility = commodities.iter().map(|c| clamp_unit(c.volatility)).sum::<f64>() / n;
        let imbalance = commodities
            .iter()
            .map(|c| {
                let total = c.demand + c.supply;
                if total > 0.0 {
                    ((c.demand - c.supply) / total).abs()
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            / n;
        let volume: f64 = commodities.iter().map(|c| c.demand.min(c.supply).max(0.0)).sum();
        let trade_volume = if reference_volume > 0.0 {
            clamp_unit(volume / reference_volume)
        } else {
            0.0
        };
        Self {
            complexity: clamp_unit(0.4 * breadth + 0.4 * volatility + 0.2 * clamp_unit(imbalance)),
            trade_volume,
        }
    }
}
