//! Composite health over the coordination bus, with pluggable recovery.

use serde::{Deserialize, Serialize};
use sim_core::{clamp_unit, SimTime};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::bus::{CoordinationBus, Topic};
use crate::config::HealthConfig;
use crate::schedule::{Cadence, ScheduleConfig};

/// Fixed reliability weight of each topic. Sums to 1.
pub fn reliability(topic: Topic) -> f64 {
    match topic {
        Topic::Forecast => 0.25,
        Topic::Difficulty => 0.2,
        Topic::Progression => 0.2,
        Topic::BehaviorInsight => 0.15,
        Topic::Agents => 0.2,
    }
}

/// Cadence whose runs keep `topic` fresh.
pub fn publisher(topic: Topic) -> Cadence {
    match topic {
        Topic::Forecast => Cadence::MarketForecast,
        Topic::Difficulty => Cadence::DifficultyReview,
        Topic::Progression => Cadence::Progression,
        Topic::BehaviorInsight => Cadence::Learning,
        Topic::Agents => Cadence::CompetitorUpdate,
    }
}

/// 1 while the age is within one period, falling linearly to 0 at
/// `stale_after` periods. Never-published topics are 0.
pub fn freshness(age_secs: Option<f64>, period_secs: f64, stale_after: f64) -> f64 {
    let Some(age) = age_secs else {
        return 0.0;
    };
    if age <= period_secs {
        return 1.0;
    }
    let span = (stale_after - 1.0) * period_secs;
    if span <= 0.0 {
        return 0.0;
    }
    clamp_unit(1.0 - (age - period_secs) / span)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicHealth {
    pub topic: Topic,
    pub freshness: f64,
    pub weight: f64,
    pub last_update: Option<SimTime>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub topics: Vec<TopicHealth>,
    /// Reliability-weighted mean freshness, in [0,1].
    pub composite: f64,
    pub healthy: bool,
    pub at: SimTime,
}

impl HealthReport {
    /// Topics that are not fully fresh.
    pub fn stale(&self) -> Vec<Topic> {
        self.topics
            .iter()
            .filter(|t| t.freshness < 1.0)
            .map(|t| t.topic)
            .collect()
    }
}

/// Invoked with a degraded report.
pub trait RecoveryAction: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Attempt recovery. Returns the topics it acted on.
    fn recover(&self, report: &HealthReport) -> Vec<Topic>;
}

/// Pending out-of-schedule refreshes, one flag per topic.
#[derive(Debug, Default)]
pub struct RefreshRequests {
    flags: [AtomicBool; 5],
    notify: [Notify; 5],
}

fn slot(topic: Topic) -> usize {
    match topic {
        Topic::Forecast => 0,
        Topic::Difficulty => 1,
        Topic::Progression => 2,
        Topic::BehaviorInsight => 3,
        Topic::Agents => 4,
    }
}

impl RefreshRequests {
    pub fn request(&self, topic: Topic) {
        self.flags[slot(topic)].store(true, Ordering::Release);
        self.notify[slot(topic)].notify_one();
    }

    /// Consume a pending request.
    pub fn take(&self, topic: Topic) -> bool {
        self.flags[slot(topic)].swap(false, Ordering::AcqRel)
    }

    /// Resolves once `topic` is requested. The request still has to be
    /// consumed with [`RefreshRequests::take`].
    pub async fn requested(&self, topic: Topic) {
        self.notify[slot(topic)].notified().await;
    }
}

/// Asks the publishers of every stale topic to run immediately.
#[derive(Debug, Clone)]
pub struct RefreshStale {
    requests: Arc<RefreshRequests>,
}

impl RefreshStale {
    pub fn new(requests: Arc<RefreshRequests>) -> Self {
        Self { requests }
    }
}

impl RecoveryAction for RefreshStale {
    fn name(&self) -> &str {
        "refresh-stale"
    }

    fn recover(&self, report: &HealthReport) -> Vec<Topic> {
        let stale = report.stale();
        for &t in &stale {
            self.requests.request(t);
        }
        stale
    }
}

#[derive(Debug)]
pub struct HealthAggregator {
    cfg: HealthConfig,
    periods: ScheduleConfig,
    recovery: Box<dyn RecoveryAction>,
    last: Option<HealthReport>,
}

impl HealthAggregator {
    pub fn new(
        cfg: HealthConfig,
        periods: ScheduleConfig,
        recovery: Box<dyn RecoveryAction>,
    ) -> Self {
        Self {
            cfg,
            periods,
            recovery,
            last: None,
        }
    }

    pub fn last(&self) -> Option<&HealthReport> {
        self.last.as_ref()
    }

    pub fn assess(&self, bus: &CoordinationBus, now: SimTime) -> HealthReport {
        let topics: Vec<TopicHealth> = Topic::ALL
            .iter()
            .map(|&topic| {
                let last_update = bus.last_update(topic);
                let age = last_update.map(|t| now.since(t).as_secs_f64());
                let period = self.periods.period_secs(publisher(topic)) as f64;
                TopicHealth {
                    topic,
                    freshness: freshness(age, period, self.cfg.stale_after),
                    weight: reliability(topic),
                    last_update,
                }
            })
            .collect();
        let total: f64 = topics.iter().map(|t| t.weight).sum();
        let composite = if total > 0.0 {
            clamp_unit(topics.iter().map(|t| t.weight * t.freshness).sum::<f64>() / total)
        } else {
            0.0
        };
        HealthReport {
            healthy: composite >= self.cfg.threshold,
            topics,
            composite,
            at: now,
        }
    }

    /// Assess and, when degraded, run recovery. Returns the report and the
    /// topics recovery acted on.
    pub fn check(&mut self, bus: &CoordinationBus, now: SimTime) -> (HealthReport, Vec<Topic>) {
        let report = self.assess(bus, now);
        let acted = if report.healthy {
            debug!(composite = report.composite, "coordination healthy");
            Vec::new()
        } else {
            warn!(
                composite = report.composite,
                threshold = self.cfg.threshold,
                recovery = self.recovery.name(),
                "coordination degraded"
            );
            self.recovery.recover(&report)
        };
        self.last = Some(report.clone());
        (report, acted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn weights_sum_to_one() {
        let s: f64 = Topic::ALL.iter().map(|&t| reliability(t)).sum();
        assert!((s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn freshness_decays_after_one_period() {
        assert_eq!(freshness(None, 60.0, 3.0), 0.0);
        assert_eq!(freshness(Some(60.0), 60.0, 3.0), 1.0);
        assert!((freshness(Some(120.0), 60.0, 3.0) - 0.5).abs() < 1e-12);
        assert_eq!(freshness(Some(500.0), 60.0, 3.0), 0.0);
    }

    #[test]
    fn fresh_bus_is_healthy() {
        let bus = CoordinationBus::new();
        let now = SimTime::from_secs(10);
        bus.forecast.publish(Default::default(), now);
        bus.difficulty.publish(
            sim_director::DifficultyController::new(Default::default())
                .unwrap()
                .snapshot(),
            now,
        );
        bus.progression.publish(
            sim_progress::ProgressionAccumulator::new(
                Default::default(),
                sim_progress::default_milestones(),
            )
            .unwrap()
            .snapshot(),
            now,
        );
        bus.insights.publish(Vec::new(), now);
        bus.agents.publish(Default::default(), now);
        let requests = Arc::new(RefreshRequests::default());
        let mut h = HealthAggregator::new(
            HealthConfig::default(),
            ScheduleConfig::default(),
            Box::new(RefreshStale::new(Arc::clone(&requests))),
        );
        let (report, acted) = h.check(&bus, now);
        assert!(report.healthy);
        assert_eq!(report.composite, 1.0);
        assert!(acted.is_empty());
    }

    #[test]
    fn stale_bus_triggers_recovery() {
        let bus = CoordinationBus::new();
        bus.agents.publish(Default::default(), SimTime::ZERO);
        let requests = Arc::new(RefreshRequests::default());
        let mut h = HealthAggregator::new(
            HealthConfig::default(),
            ScheduleConfig::default(),
            Box::new(RefreshStale::new(Arc::clone(&requests))),
        );
        let (report, acted) = h.check(&bus, SimTime::from_secs(15));
        assert!(!report.healthy);
        assert_eq!(acted.len(), 5);
        assert!(requests.take(Topic::Forecast));
        assert!(!requests.take(Topic::Forecast));
        assert_eq!(h.last(), Some(&report));
    }

    proptest! {
        #[test]
        fn freshness_is_unit(age in proptest::option::of(0.0f64..1e6), period in 1.0f64..1e4) {
            let f = freshness(age, period, 3.0);
            prop_assert!((0.0..=1.0).contains(&f));
        }
    }
}
