//! Simulated time.
//!
//! Every cadence, cooldown and freshness check in the core is expressed in
//! simulated time so the deterministic driver and the tokio driver agree.

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A point in simulated time, in milliseconds since session start.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTime(pub u64);

impl SimTime {
    /// Session start.
    pub const ZERO: SimTime = SimTime(0);

    /// Build from whole simulated seconds.
    pub const fn from_secs(secs: u64) -> Self {
        SimTime(secs.saturating_mul(1000))
    }

    /// Build from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        SimTime(ms)
    }

    /// Milliseconds since session start.
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Seconds since session start as a float.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Advance by a duration, saturating at the far future.
    pub fn saturating_add(self, d: Duration) -> Self {
        let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        SimTime(self.0.saturating_add(ms))
    }

    /// Time elapsed since `earlier`; zero if `earlier` is in the future.
    pub fn since(self, earlier: SimTime) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{:.1}s", self.as_secs_f64())
    }
}

/// Maps simulated time onto the in-game calendar.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeContext {
    /// Current simulated time.
    pub now: SimTime,
    /// In-game calendar date corresponding to `now`.
    pub date: NaiveDate,
}

impl TimeContext {
    /// Derive the calendar date given the session start date and how many
    /// simulated seconds make up one in-game day.
    pub fn at(start: NaiveDate, now: SimTime, secs_per_day: u32) -> Self {
        let per_day = u64::from(secs_per_day.max(1)) * 1000;
        let days = i64::try_from(now.as_millis() / per_day).unwrap_or(i64::MAX);
        let date = start
            .checked_add_signed(ChronoDuration::days(days))
            .unwrap_or(start);
        Self { now, date }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_saturates() {
        let a = SimTime::from_secs(10);
        let b = SimTime::from_secs(4);
        assert_eq!(a.since(b), Duration::from_secs(6));
        assert_eq!(b.since(a), Duration::ZERO);
    }

    #[test]
    fn calendar_advances_by_day() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap();
        let ctx = TimeContext::at(start, SimTime::from_secs(250), 60);
        assert_eq!(ctx.date, NaiveDate::from_ymd_opt(2024, 2, 3).unwrap());
    }
}
