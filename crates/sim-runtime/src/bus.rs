//! Last-value-wins coordination between partitions.
//!
//! Each topic is a `watch` slot holding the latest complete snapshot behind
//! an `Arc`. Publishing replaces the snapshot atomically, so a reader always
//! sees either the previous or the latest value and never a partial one.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_ai::BehaviorInsight;
use sim_core::{CompetitorSummary, MarketSnapshot, SimTime};
use sim_director::DirectorSnapshot;
use sim_econ::{CommodityPrediction, MarketOutlook};
use sim_progress::{MarketComplexity, ProgressionState};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Topic {
    Forecast,
    Difficulty,
    Progression,
    BehaviorInsight,
    Agents,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::Forecast,
        Topic::Difficulty,
        Topic::Progression,
        Topic::BehaviorInsight,
        Topic::Agents,
    ];
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A published snapshot.
#[derive(Debug)]
pub struct Published<T> {
    pub value: Arc<T>,
    /// 1 for the first publish on a topic, then strictly increasing.
    pub seq: u64,
    pub published_at: SimTime,
}

impl<T> Clone for Published<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            seq: self.seq,
            published_at: self.published_at,
        }
    }
}

/// One topic.
#[derive(Debug)]
pub struct Slot<T> {
    tx: watch::Sender<Option<Published<T>>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            tx: watch::Sender::new(None),
        }
    }
}

impl<T> Slot<T> {
    /// Replace the snapshot. Returns the new sequence number.
    pub fn publish(&self, value: T, at: SimTime) -> u64 {
        let mut seq = 0;
        self.tx.send_modify(|slot| {
            seq = slot.as_ref().map_or(1, |p| p.seq + 1);
            *slot = Some(Published {
                value: Arc::new(value),
                seq,
                published_at: at,
            });
        });
        seq
    }

    pub fn latest(&self) -> Option<Published<T>> {
        self.tx.borrow().clone()
    }

    /// Latest value only.
    pub fn value(&self) -> Option<Arc<T>> {
        self.tx.borrow().as_ref().map(|p| Arc::clone(&p.value))
    }

    pub fn last_update(&self) -> Option<SimTime> {
        self.tx.borrow().as_ref().map(|p| p.published_at)
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Option<Published<T>>> {
        self.tx.subscribe()
    }
}

/// Output of one market forecast cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    pub predictions: Vec<CommodityPrediction>,
    pub outlook: MarketOutlook,
    /// Aggregate conditions competitors see.
    pub market: MarketSnapshot,
    pub complexity: MarketComplexity,
}

/// Public digest of the competitor field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDigest {
    pub summaries: Vec<CompetitorSummary>,
    /// Progression agent term: sum of experience times singularity weight.
    pub agent_learning: f64,
    /// Cumulative research budget committed by all competitors.
    pub research_investment: Decimal,
    pub decisions: u64,
}

#[derive(Debug, Default)]
pub struct CoordinationBus {
    pub forecast: Slot<ForecastSnapshot>,
    pub difficulty: Slot<DirectorSnapshot>,
    pub progression: Slot<ProgressionState>,
    /// Insights from the most recent learning cycle.
    pub insights: Slot<Vec<BehaviorInsight>>,
    pub agents: Slot<AgentDigest>,
}

impl CoordinationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_update(&self, topic: Topic) -> Option<SimTime> {
        match topic {
            Topic::Forecast => self.forecast.last_update(),
            Topic::Difficulty => self.difficulty.last_update(),
            Topic::Progression => self.progression.last_update(),
            Topic::BehaviorInsight => self.insights.last_update(),
            Topic::Agents => self.agents.last_update(),
        }
    }
}
