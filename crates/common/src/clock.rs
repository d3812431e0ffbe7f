//! Wall-clock helpers
//!
//! Persisted timestamps (token refresh time) are unix epoch milliseconds so the
//! on-disk record stays readable by other tooling.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Current unix time in milliseconds. Returns 0 if the clock is before the epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
