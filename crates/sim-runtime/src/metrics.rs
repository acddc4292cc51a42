//! Lock-free runtime counters shared by every partition.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    decisions: AtomicU64,
    fallbacks: AtomicU64,
    outcomes: AtomicU64,
    forecasts: AtomicU64,
    forecast_cycles: AtomicU64,
    adjustments: AtomicU64,
    unlocks: AtomicU64,
    insights: AtomicU64,
    health_checks: AtomicU64,
    recoveries: AtomicU64,
}

/// Point-in-time copy of [`RuntimeMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub decisions: u64,
    /// Decisions scored by the rule-based fallback.
    pub fallbacks: u64,
    pub outcomes: u64,
    /// Commodity predictions produced.
    pub forecasts: u64,
    pub forecast_cycles: u64,
    /// Applied difficulty changes, periodic and acute.
    pub adjustments: u64,
    pub unlocks: u64,
    pub insights: u64,
    pub health_checks: u64,
    pub recoveries: u64,
}

fn add(c: &AtomicU64, n: u64) {
    c.fetch_add(n, Ordering::Relaxed);
}

impl RuntimeMetrics {
    pub fn record_decision(&self, fallback: bool) {
        add(&self.decisions, 1);
        if fallback {
            add(&self.fallbacks, 1);
        }
    }

    pub fn record_outcome(&self) {
        add(&self.outcomes, 1);
    }

    pub fn record_forecast_cycle(&self, predictions: usize) {
        add(&self.forecast_cycles, 1);
        add(&self.forecasts, predictions as u64);
    }

    pub fn record_adjustment(&self) {
        add(&self.adjustments, 1);
    }

    pub fn record_unlocks(&self, n: usize) {
        add(&self.unlocks, n as u64);
    }

    pub fn record_insights(&self, n: usize) {
        add(&self.insights, n as u64);
    }

    pub fn record_health_check(&self, recovered: bool) {
        add(&self.health_checks, 1);
        if recovered {
            add(&self.recoveries, 1);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            decisions: get(&self.decisions),
            fallbacks: get(&self.fallbacks),
            outcomes: get(&self.outcomes),
            forecasts: get(&self.forecasts),
            forecast_cycles: get(&self.forecast_cycles),
            adjustments: get(&self.adjustments),
            unlocks: get(&self.unlocks),
            insights: get(&self.insights),
            health_checks: get(&self.health_checks),
            recoveries: get(&self.recoveries),
        }
    }
}
