//! Sources of raw commodity snapshots.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sim_core::{clamp_unit, CommodityData, CommodityId, EconomicFactors, SimTime};
use sim_econ::pricing::noisy_demand;
use std::fmt;
use tracing::debug;

/// Supplies the market partition with current commodity data.
pub trait MarketFeed: fmt::Debug + Send {
    fn name(&self) -> &str;

    /// Current snapshot of every commodity. May be empty.
    fn sample(&mut self, now: SimTime) -> Vec<CommodityData>;
}

/// (id, reference price, base daily demand, elasticity, volatility)
const CATALOG: [(&str, f64, f64, f64, f64); 12] = [
    ("containers", 2_400.0, 9_000.0, -0.8, 0.25),
    ("crude-oil", 82.0, 12_000.0, -0.3, 0.35),
    ("grain", 260.0, 7_500.0, -0.5, 0.2),
    ("iron-ore", 115.0, 8_000.0, -0.4, 0.3),
    ("lng", 11.5, 6_000.0, -0.6, 0.4),
    ("coal", 140.0, 5_500.0, -0.45, 0.28),
    ("electronics", 18_000.0, 1_500.0, -1.4, 0.22),
    ("automobiles", 26_000.0, 900.0, -1.2, 0.18),
    ("chemicals", 1_100.0, 3_200.0, -0.7, 0.26),
    ("timber", 480.0, 2_600.0, -0.9, 0.17),
    ("copper", 8_600.0, 2_000.0, -0.55, 0.33),
    ("textiles", 3_100.0, 2_400.0, -1.1, 0.15),
];

/// Per-step multiplicative price move at volatility 1.
const STEP_SCALE: f64 = 0.08;
/// Demand noise fraction.
const DEMAND_NOISE: f64 = 0.05;
/// Share of the demand gap supply closes each step.
const SUPPLY_ADJUST: f64 = 0.3;

#[derive(Clone, Debug)]
struct Walker {
    data: CommodityData,
    ref_price: f64,
    base_demand: f64,
}

/// Seeded random-walk market used when no real feed is attached.
///
/// Prices take bounded multiplicative steps scaled by each commodity's
/// volatility, demand follows the constant-elasticity curve with noise,
/// and supply chases demand.
#[derive(Clone, Debug)]
pub struct RandomWalkFeed {
    rng: ChaCha8Rng,
    walkers: Vec<Walker>,
}

impl RandomWalkFeed {
    /// `commodities` is capped at the catalog size.
    pub fn new(commodities: usize, seed: u64) -> Self {
        let walkers = CATALOG
            .iter()
            .take(commodities.max(1))
            .map(|&(id, price, demand, elasticity, volatility)| Walker {
                data: CommodityData {
                    id: CommodityId(id.to_string()),
                    current_price: price,
                    demand,
                    supply: demand,
                    volatility,
                    price_elasticity: elasticity,
                    factors: EconomicFactors::default(),
                },
                ref_price: price,
                base_demand: demand,
            })
            .collect();
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            walkers,
        }
    }

    fn step_factors(rng: &mut ChaCha8Rng, f: &mut EconomicFactors) {
        let mut nudge = |v: f64, scale: f64| v + rng.gen_range(-scale..=scale);
        f.geopolitical_tension = clamp_unit(nudge(f.geopolitical_tension, 0.02));
        f.sentiment = nudge(f.sentiment, 0.05).clamp(-1.0, 1.0);
        f.storm_frequency = clamp_unit(nudge(f.storm_frequency, 0.01));
        f.fuel_price_index = nudge(f.fuel_price_index, 0.02).clamp(0.5, 2.5);
        f.inflation = nudge(f.inflation, 0.001).clamp(-0.02, 0.15);
    }
}

impl MarketFeed for RandomWalkFeed {
    fn name(&self) -> &str {
        "random-walk"
    }

    fn sample(&mut self, now: SimTime) -> Vec<CommodityData> {
        let rng = &mut self.rng;
        for w in &mut self.walkers {
            let c = &mut w.data;
            let u: f64 = rng.gen_range(-1.0..=1.0);
            let ret = STEP_SCALE * c.volatility * u;
            // Mean reversion keeps the walk near its reference.
            let pull = 0.02 * (w.ref_price / c.current_price).ln();
            c.current_price = (c.current_price * (1.0 + ret + pull)).max(w.ref_price * 0.05);
            match noisy_demand(
                w.base_demand,
                c.current_price,
                w.ref_price,
                c.price_elasticity,
                DEMAND_NOISE,
                rng,
            ) {
                Ok(q) => c.demand = q,
                Err(e) => debug!(commodity = %c.id, error = %e, "keeping previous demand"),
            }
            let jitter: f64 = rng.gen_range(-0.02..=0.02);
            c.supply = (c.supply + SUPPLY_ADJUST * (c.demand - c.supply)) * (1.0 + jitter);
            c.volatility = (0.9 * c.volatility + 0.1 * (ret.abs() / STEP_SCALE)).clamp(0.05, 1.0);
            Self::step_factors(rng, &mut c.factors);
        }
        debug!(at = %now, commodities = self.walkers.len(), "market feed sampled");
        self.walkers.iter().map(|w| w.data.clone()).collect()
    }
}
