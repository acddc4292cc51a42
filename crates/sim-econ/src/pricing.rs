//! Constant-elasticity demand helpers shared by the structural forecaster and
//! the synthetic market feed.

use crate::ForecastError;
use rand::Rng;

fn check_curve(price: f64, ref_price: f64, elasticity: f64) -> Result<(), ForecastError> {
    if !elasticity.is_finite() || elasticity >= 0.0 {
        return Err(ForecastError::InvalidElasticity(elasticity));
    }
    if !(price.is_finite() && ref_price.is_finite()) {
        return Err(ForecastError::NonFinite);
    }
    if price <= 0.0 || ref_price <= 0.0 {
        return Err(ForecastError::InvalidPrice);
    }
    Ok(())
}

/// Demand under constant elasticity with respect to a reference price.
///
/// Q = base * (price / ref_price)^elasticity. Requires base >= 0, both prices
/// > 0 and elasticity < 0. Never negative.
pub fn demand_at(
    base: f64,
    price: f64,
    ref_price: f64,
    elasticity: f64,
) -> Result<f64, ForecastError> {
    check_curve(price, ref_price, elasticity)?;
    if !base.is_finite() || base < 0.0 {
        return Err(ForecastError::NonFinite);
    }
    let q = base * (price / ref_price).powf(elasticity);
    if !q.is_finite() {
        return Err(ForecastError::NonFinite);
    }
    Ok(q.max(0.0))
}

/// Price at which demand observed at `ref_price` falls (or rises) to meet
/// `supply`: P = P0 * (S / D)^(1/elasticity).
///
/// With no demand or no supply there is nothing to clear and the reference
/// price is returned unchanged.
pub fn clearing_price(
    ref_price: f64,
    demand: f64,
    supply: f64,
    elasticity: f64,
) -> Result<f64, ForecastError> {
    check_curve(ref_price, ref_price, elasticity)?;
    if !(demand.is_finite() && supply.is_finite()) {
        return Err(ForecastError::NonFinite);
    }
    if demand <= 0.0 || supply <= 0.0 {
        return Ok(ref_price);
    }
    let p = ref_price * (supply / demand).powf(1.0 / elasticity);
    if p.is_finite() && p > 0.0 {
        Ok(p)
    } else {
        Err(ForecastError::NonFinite)
    }
}

/// Demand with a multiplicative uniform noise factor in
/// [1 - noise_frac, 1 + noise_frac]. `noise_frac` must be in [0, 1).
pub fn noisy_demand<R: Rng + ?Sized>(
    base: f64,
    price: f64,
    ref_price: f64,
    elasticity: f64,
    noise_frac: f64,
    rng: &mut R,
) -> Result<f64, ForecastError> {
    if !noise_frac.is_finite() || !(0.0..1.0).contains(&noise_frac) {
        return Err(ForecastError::NonFinite);
    }
    let q = demand_at(base, price, ref_price, elasticity)?;
    if noise_frac == 0.0 {
        return Ok(q);
    }
    let u: f64 = rng.gen_range(-noise_frac..=noise_frac);
    Ok((q * (1.0 + u)).max(0.0))
}
