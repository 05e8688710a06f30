//! Fixed-window boundary arithmetic for rate limits and statistics dates.
//!
//! The minute window starts at `floor(now / 60) * 60`; the day window starts
//! at midnight in the configured local zone. Both are fixed windows, not
//! sliding ones — the count query is `created_at >= window_start`. Changing
//! either definition changes effective quotas.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Epoch second at which the current minute window starts.
#[must_use]
pub fn minute_start(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(60) * 60
}

/// Epoch second of the most recent midnight in `zone`.
///
/// When midnight falls into a DST gap the day start degrades to "now minus
/// seconds since local midnight", which bounds the window at the same wall
/// clock point.
#[must_use]
pub fn day_start(now: DateTime<Utc>, zone: Tz) -> i64 {
    let local = now.with_timezone(&zone);
    local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(zone).earliest())
        .map_or_else(
            || now.timestamp() - i64::from(local.num_seconds_from_midnight()),
            |t| t.timestamp(),
        )
}

/// Today's date in `zone`, formatted `YYYY-MM-DD`.
#[must_use]
pub fn today(now: DateTime<Utc>, zone: Tz) -> String {
    now.with_timezone(&zone).format("%Y-%m-%d").to_string()
}
