//! Player activity as reported by the gameplay layer.

use crate::time::SimTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Broad category of a player action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlayerActionKind {
    BuyAsset,
    SellAsset,
    CreateRoute,
    SetPrice,
    Research,
    Negotiate,
    Other,
}

/// One completed player action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerAction {
    pub kind: PlayerActionKind,
    pub at: SimTime,
    pub success: bool,
    /// How long the player took to complete it.
    pub duration: Duration,
}

impl PlayerAction {
    pub fn new(kind: PlayerActionKind, at: SimTime, success: bool, duration: Duration) -> Self {
        Self {
            kind,
            at,
            success,
            duration,
        }
    }
}
