#![deny(warnings)]

//! Core domain models and invariants for Port Tycoon.
//!
//! This crate defines the serializable value types shared by the decision,
//! forecasting, difficulty and progression crates, with validation helpers
//! for data handed in by external collaborators. Bounded scalars are clamped
//! on every write so out-of-range values cannot be stored.

pub mod action;
pub mod competitor;
pub mod deadline;
pub mod market;
pub mod player;
pub mod profile;
pub mod time;

pub use action::{Action, ActionKind, AssetClass, DecisionRecord, ScoreSource, ACTION_KIND_COUNT};
pub use competitor::{
    CompetitorId, CompetitorState, Finances, HistoryEntry, HistoryStats, LearningState,
    PerformanceHistory,
};
pub use deadline::{CallError, DeadlineWorker};
pub use market::{
    CommodityData, CommodityId, CompetitorSummary, EconomicFactors, GameContext,
    HistoricalSeries, MarketSnapshot,
};
pub use player::{PlayerAction, PlayerActionKind};
pub use profile::{Archetype, BehaviorProfile, Trait, TRAIT_COUNT};
pub use time::{SimTime, TimeContext};

use rust_decimal::Decimal;
use thiserror::Error;

/// Clamp into [0,1]; NaN maps to 0.
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Validation errors for externally supplied data.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Numeric field must be finite.
    #[error("non-finite numeric value encountered in {0}")]
    NonFinite(&'static str),
    /// Price or cost must be non-negative.
    #[error("negative monetary value is invalid")]
    NegativeMoney,
    /// Price must be strictly positive.
    #[error("price must be > 0")]
    NonPositivePrice,
    /// Elasticity must be strictly negative.
    #[error("price elasticity must be < 0")]
    ElasticityNonNegative,
    /// A bounded scalar is outside [0,1].
    #[error("{0} must be within [0,1]")]
    OutOfUnitRange(&'static str),
    /// Identifiers and names must be non-empty.
    #[error("name must not be empty")]
    EmptyName,
}

fn check_finite(v: f64, what: &'static str) -> Result<(), ValidationError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite(what))
    }
}

fn check_unit(v: f64, what: &'static str) -> Result<(), ValidationError> {
    check_finite(v, what)?;
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(ValidationError::OutOfUnitRange(what))
    }
}

/// Validate macro drivers.
pub fn validate_factors(f: &EconomicFactors) -> Result<(), ValidationError> {
    check_finite(f.inflation, "inflation")?;
    check_finite(f.interest_rate, "interest_rate")?;
    check_finite(f.gdp_growth, "gdp_growth")?;
    check_unit(f.geopolitical_tension, "geopolitical_tension")?;
    check_finite(f.sentiment, "sentiment")?;
    if !(-1.0..=1.0).contains(&f.sentiment) {
        return Err(ValidationError::OutOfUnitRange("sentiment"));
    }
    check_unit(f.storm_frequency, "storm_frequency")?;
    check_finite(f.fuel_price_index, "fuel_price_index")?;
    Ok(())
}

/// Validate one commodity observation.
pub fn validate_commodity(c: &CommodityData) -> Result<(), ValidationError> {
    if c.id.0.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    check_finite(c.current_price, "current_price")?;
    if c.current_price <= 0.0 {
        return Err(ValidationError::NonPositivePrice);
    }
    check_finite(c.demand, "demand")?;
    check_finite(c.supply, "supply")?;
    if c.demand < 0.0 || c.supply < 0.0 {
        return Err(ValidationError::NegativeMoney);
    }
    check_unit(c.volatility, "volatility")?;
    check_finite(c.price_elasticity, "price_elasticity")?;
    if c.price_elasticity >= 0.0 {
        return Err(ValidationError::ElasticityNonNegative);
    }
    validate_factors(&c.factors)
}

/// Validate a historical series: finite values, positive prices.
pub fn validate_history(h: &HistoricalSeries) -> Result<(), ValidationError> {
    for &p in &h.prices {
        check_finite(p, "history.prices")?;
        if p <= 0.0 {
            return Err(ValidationError::NonPositivePrice);
        }
    }
    for &v in h.demand.iter().chain(h.supply.iter()) {
        check_finite(v, "history.volume")?;
    }
    Ok(())
}

/// Validate an aggregate market snapshot.
pub fn validate_market(m: &MarketSnapshot) -> Result<(), ValidationError> {
    check_unit(m.demand_index, "demand_index")?;
    check_unit(m.price_index, "price_index")?;
    check_unit(m.volatility, "volatility")?;
    check_unit(m.competition_intensity, "competition_intensity")?;
    check_finite(m.growth_rate, "growth_rate")?;
    check_finite(m.fuel_price_index, "fuel_price_index")?;
    if m.asset_price < Decimal::ZERO
        || m.route_cost < Decimal::ZERO
        || m.region_entry_cost < Decimal::ZERO
    {
        return Err(ValidationError::NegativeMoney);
    }
    Ok(())
}
