//! Timestamps and calendar days.
//!
//! Timestamps are Unix epoch seconds (UTC). The daily check-in guard compares
//! calendar days, which are derived from a timestamp plus a fixed UTC offset
//! so that "today" can follow the operator's local midnight.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SECS_PER_DAY: u64 = 86_400;

/// A Unix timestamp in seconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the current system time as a `Timestamp`.
    ///
    /// A system clock set before the epoch reads as [`Timestamp::EPOCH`].
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// This timestamp shifted forward by whole days, saturating at `u64::MAX`.
    pub fn plus_days(&self, days: u32) -> Self {
        Self(self.0.saturating_add(u64::from(days) * SECS_PER_DAY))
    }

    /// The calendar day this timestamp falls on, for a zone `utc_offset_secs`
    /// east of UTC.
    pub fn calendar_day(&self, utc_offset_secs: i32) -> CalendarDay {
        let local = i128::from(self.0) + i128::from(utc_offset_secs);
        CalendarDay(local.div_euclid(i128::from(SECS_PER_DAY)) as i64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Whole days since 1970-01-01 in some fixed zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarDay(i64);

impl CalendarDay {
    pub fn index(&self) -> i64 {
        self.0
    }
}

/// Source of the current time.
///
/// Production code uses [`SystemClock`]; tests substitute a controllable
/// clock so that day boundaries and code expiry are deterministic.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
