//! Outward-facing session events on a broadcast channel.

use serde::{Deserialize, Serialize};
use sim_ai::BehaviorInsight;
use sim_core::{DecisionRecord, SimTime};
use sim_director::{Adjustment, PhaseChange};
use sim_progress::{MilestoneUnlocked, ProgressionEra};
use tokio::sync::broadcast;

use crate::bus::Topic;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// `seq` is the entry in the competitor's history that an outcome
    /// report must reference.
    Decision { seq: u64, record: DecisionRecord },
    ForecastCycle {
        commodities: usize,
        favorability: f64,
        at: SimTime,
    },
    DifficultyAdjusted(Adjustment),
    PhaseChanged(PhaseChange),
    MilestoneUnlocked(MilestoneUnlocked),
    EraChanged {
        from: ProgressionEra,
        to: ProgressionEra,
        at: SimTime,
    },
    Insight(BehaviorInsight),
    HealthDegraded {
        composite: f64,
        stale: Vec<Topic>,
        at: SimTime,
    },
}

/// Cloneable sender side. Sending never fails; with no subscribers the
/// event is dropped.
#[derive(Clone, Debug)]
pub struct EventHub {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribers that fall more than `capacity` events behind receive
    /// `Lagged` and skip ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of subscribers that received the event.
    pub fn emit(&self, event: SessionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_fine() {
        let hub = EventHub::new(8);
        let ev = SessionEvent::ForecastCycle {
            commodities: 0,
            favorability: 0.5,
            at: SimTime::ZERO,
        };
        assert_eq!(hub.emit(ev.clone()), 0);
        let mut rx = hub.subscribe();
        assert_eq!(hub.emit(ev.clone()), 1);
        assert_eq!(rx.try_recv().unwrap(), ev);
    }
}
