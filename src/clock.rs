use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use time::{Date, OffsetDateTime};

use crate::error::{Error, Result};

/// A source of timestamps for record identifiers and container dates.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current timestamp in nanoseconds since the UNIX epoch.
    fn now(&self) -> u64;
}

/// Wall-clock time via `std::time::SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to. Used to pin "today" in tests and
/// when replaying an archive pass for a given date.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_ns: AtomicU64,
}

impl FixedClock {
    pub fn new(now_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(now_ns),
        }
    }

    /// Midnight UTC of `date`.
    pub fn at_date(date: Date) -> Self {
        let ns = date.midnight().assume_utc().unix_timestamp_nanos();
        Self::new(u64::try_from(ns).unwrap_or(0))
    }

    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::Relaxed);
    }

    pub fn advance(&self, delta_ns: u64) {
        self.now_ns.fetch_add(delta_ns, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::Relaxed)
    }
}

pub(crate) fn datetime_from_ns(timestamp_ns: u64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(timestamp_ns as i128)
        .map_err(|_| Error::InvalidTimestamp(timestamp_ns))
}

/// UTC calendar date of the clock's current instant.
///
/// The local time zone is not consulted, so a pass shortly before or after
/// local midnight can land in the neighbouring day's container.
pub fn today(clock: &dyn Clock) -> Result<Date> {
    Ok(datetime_from_ns(clock.now())?.date())
}
