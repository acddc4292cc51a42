//! Competitor actions and the decision records that carry them.

use crate::competitor::CompetitorId;
use crate::time::SimTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter-less discriminant of an [`Action`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    AcquireAsset,
    DisposeAsset,
    InvestResearch,
    OpenTradeRoute,
    AdjustPricing,
    ExpandRegion,
    Wait,
}

/// Number of action kinds; predictors score exactly this many.
pub const ACTION_KIND_COUNT: usize = 7;

impl ActionKind {
    /// Every kind, in scoring order.
    pub const ALL: [ActionKind; ACTION_KIND_COUNT] = [
        ActionKind::AcquireAsset,
        ActionKind::DisposeAsset,
        ActionKind::InvestResearch,
        ActionKind::OpenTradeRoute,
        ActionKind::AdjustPricing,
        ActionKind::ExpandRegion,
        ActionKind::Wait,
    ];

    /// Position in [`ActionKind::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Fixed risk rate reported with every decision of this kind.
    pub const fn base_risk(self) -> f64 {
        match self {
            ActionKind::AcquireAsset => 0.45,
            ActionKind::DisposeAsset => 0.2,
            ActionKind::InvestResearch => 0.35,
            ActionKind::OpenTradeRoute => 0.5,
            ActionKind::AdjustPricing => 0.25,
            ActionKind::ExpandRegion => 0.7,
            ActionKind::Wait => 0.05,
        }
    }

    /// Nominal fractional return of a successful action of this kind.
    pub const fn base_return(self) -> f64 {
        match self {
            ActionKind::AcquireAsset => 0.12,
            ActionKind::DisposeAsset => 0.04,
            ActionKind::InvestResearch => 0.15,
            ActionKind::OpenTradeRoute => 0.18,
            ActionKind::AdjustPricing => 0.06,
            ActionKind::ExpandRegion => 0.25,
            ActionKind::Wait => 0.0,
        }
    }

    /// Stable snake-case label for logs and rationale strings.
    pub const fn as_str(self) -> &'static str {
        match self {
            ActionKind::AcquireAsset => "acquire_asset",
            ActionKind::DisposeAsset => "dispose_asset",
            ActionKind::InvestResearch => "invest_research",
            ActionKind::OpenTradeRoute => "open_trade_route",
            ActionKind::AdjustPricing => "adjust_pricing",
            ActionKind::ExpandRegion => "expand_region",
            ActionKind::Wait => "wait",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of physical asset a logistics company can own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Ship,
    Warehouse,
    Truck,
    Aircraft,
}

/// A fully parameterized action. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Buy a new asset within `budget`.
    AcquireAsset { class: AssetClass, budget: Decimal },
    /// Sell an owned asset.
    DisposeAsset {
        asset_index: u32,
        expected_proceeds: Decimal,
    },
    /// Spend on research.
    InvestResearch { budget: Decimal },
    /// Open a route between two ports.
    OpenTradeRoute {
        origin: String,
        destination: String,
        budget: Decimal,
    },
    /// Change price level by a signed fraction, e.g. -0.05 = 5% cut.
    AdjustPricing { magnitude: f64 },
    /// Enter a new region.
    ExpandRegion { region: String, budget: Decimal },
    /// Do nothing this cycle. Always affordable.
    Wait,
}

impl Action {
    /// Discriminant of this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::AcquireAsset { .. } => ActionKind::AcquireAsset,
            Action::DisposeAsset { .. } => ActionKind::DisposeAsset,
            Action::InvestResearch { .. } => ActionKind::InvestResearch,
            Action::OpenTradeRoute { .. } => ActionKind::OpenTradeRoute,
            Action::AdjustPricing { .. } => ActionKind::AdjustPricing,
            Action::ExpandRegion { .. } => ActionKind::ExpandRegion,
            Action::Wait => ActionKind::Wait,
        }
    }

    /// Cash that must be on hand to attempt this action.
    pub fn required_budget(&self) -> Decimal {
        match self {
            Action::AcquireAsset { budget, .. }
            | Action::InvestResearch { budget }
            | Action::OpenTradeRoute { budget, .. }
            | Action::ExpandRegion { budget, .. } => *budget,
            Action::DisposeAsset { .. } | Action::AdjustPricing { .. } | Action::Wait => {
                Decimal::ZERO
            }
        }
    }
}

/// Which scoring backend produced the base scores behind a decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreSource {
    /// The configured model predictor.
    Model,
    /// The deterministic rule-based fallback.
    RuleBased,
}

impl fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreSource::Model => f.write_str("model"),
            ScoreSource::RuleBased => f.write_str("rule-based fallback"),
        }
    }
}

/// An action together with the engine's assessment of it.
///
/// Produced once per decision and never mutated afterwards; it is the
/// append-only unit of a competitor's performance history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub competitor: CompetitorId,
    pub action: Action,
    /// Normalized adjusted score of the chosen action, in [0,1].
    pub confidence: f64,
    /// Expected fractional return.
    pub expected_return: f64,
    /// Fixed per-kind risk rate.
    pub risk_level: f64,
    pub rationale: String,
    pub source: ScoreSource,
    pub decided_at: SimTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_all_variants() {
        for (i, k) in ActionKind::ALL.iter().enumerate() {
            assert_eq!(k.index(), i);
        }
        assert_eq!(Action::Wait.kind(), ActionKind::Wait);
        assert_eq!(Action::Wait.required_budget(), Decimal::ZERO);
    }

    #[test]
    fn budgeted_actions_report_budget() {
        let a = Action::ExpandRegion {
            region: "Baltic".into(),
            budget: Decimal::new(250_000, 0),
        };
        assert_eq!(a.required_budget(), Decimal::new(250_000, 0));
        assert_eq!(a.kind(), ActionKind::ExpandRegion);
    }

    #[test]
    fn wait_is_the_safest_kind() {
        for k in ActionKind::ALL {
            assert!(ActionKind::Wait.base_risk() <= k.base_risk());
        }
    }
}
