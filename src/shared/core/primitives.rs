// Small shared value helpers.
//
// Timestamps
// - All i64 time values are epoch milliseconds, produced by `now_millis`.

use chrono::Utc;

pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Elapsed time between two epoch-millisecond instants, in fractional days.
pub fn days_between(from_ms: i64, to_ms: i64) -> f64 {
    (to_ms - from_ms) as f64 / MILLIS_PER_DAY as f64
}

pub fn days_ago(now_ms: i64, days: u32) -> i64 {
    now_ms - i64::from(days) * MILLIS_PER_DAY
}
