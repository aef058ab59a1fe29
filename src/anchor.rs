//! Run anchors: the local wall-clock time a scheduled report forecasts for.
//!
//! The anchor is derived by calendar arithmetic on local time, so on DST
//! transition days it can land on an hour that occurs twice or not at
//! all. Both cases are rejected here, before any generation starts.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::ConfigError;

/// Resolve a local wall-clock time in `time_zone`.
pub fn resolve(time_zone: Tz, time: NaiveDateTime) -> Result<DateTime<Tz>, ConfigError> {
    match time_zone.from_local_datetime(&time) {
        LocalResult::Single(anchor) => Ok(anchor),
        LocalResult::Ambiguous(..) => Err(ConfigError::AmbiguousAnchor {
            time,
            zone: time_zone,
        }),
        LocalResult::None => Err(ConfigError::NonexistentAnchor {
            time,
            zone: time_zone,
        }),
    }
}

/// The same local time one calendar day after `now`.
pub fn next_day(now: DateTime<Utc>, time_zone: Tz) -> Result<DateTime<Tz>, ConfigError> {
    let today = now.with_timezone(&time_zone).naive_local();
    resolve(time_zone, today + Duration::days(1))
}
