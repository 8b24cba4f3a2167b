//! Real-world time to world clock conversion.
//!
//! A world day is [`DAY_LENGTH`] clock ticks long and starts at dawn, so
//! the local hour and minute map onto the clock as
//! `1000 * hour + 16 * minute - 6000`: 06:00 is clock 0 (dawn), 12:00 is
//! 6000 (noon), and 00:00 is 18000 (midnight) after normalization.
//!
//! The raw formula goes negative before 06:00. The value handed to the
//! world is wrapped into `[0, DAY_LENGTH)` with [`normalize_clock_value`].

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::environment::Environment;
use crate::settings::SyncSettings;

/// Clock ticks in one world day.
pub const DAY_LENGTH: i64 = 24_000;

/// Clock ticks per real hour.
const TICKS_PER_HOUR: i64 = 1000;

/// Clock ticks per real minute (16 * 60 = 960, slightly short of an hour).
const TICKS_PER_MINUTE: i64 = 16;

/// Clock value of local midnight before normalization shifts it to 18000.
const DAWN_OFFSET: i64 = 6000;

/// Parse an IANA timezone identifier.
pub fn resolve_timezone(timezone_id: &str) -> Option<Tz> {
    timezone_id.parse::<Tz>().ok()
}

/// Parse an IANA timezone identifier, falling back to UTC when unknown.
pub fn timezone_or_utc(timezone_id: &str) -> Tz {
    resolve_timezone(timezone_id).unwrap_or_else(|| {
        warn!(timezone = timezone_id, "unknown timezone, falling back to UTC");
        Tz::UTC
    })
}

/// Raw clock value for a local wall-clock hour and minute.
pub fn clock_value_for(hour: u32, minute: u32) -> i64 {
    i64::from(hour)
        .saturating_mul(TICKS_PER_HOUR)
        .saturating_add(i64::from(minute).saturating_mul(TICKS_PER_MINUTE))
        .saturating_sub(DAWN_OFFSET)
}

/// Raw clock value for `now` as seen from `timezone_id`.
///
/// Deterministic in its inputs. Unknown identifiers are treated as UTC.
pub fn compute_clock_value(timezone_id: &str, now: DateTime<Utc>) -> i64 {
    clock_value_in(timezone_or_utc(timezone_id), now)
}

/// Raw clock value for `now` in an already-resolved timezone.
pub fn clock_value_in(timezone: Tz, now: DateTime<Utc>) -> i64 {
    let local = now.with_timezone(&timezone);
    clock_value_for(local.hour(), local.minute())
}

/// Wrap a raw clock value into `[0, DAY_LENGTH)`.
pub const fn normalize_clock_value(value: i64) -> i64 {
    value.rem_euclid(DAY_LENGTH)
}

/// Compute the clock value for `now` and apply it to the world.
///
/// Returns the normalized value that was applied.
pub fn sync_time(settings: &SyncSettings, environment: &dyn Environment, now: DateTime<Utc>) -> i64 {
    let raw = compute_clock_value(&settings.timezone_id, now);
    let value = normalize_clock_value(raw);
    environment.set_clock(value);
    info!(
        world = environment.name(),
        timezone = settings.timezone_id,
        raw,
        clock = value,
        "Time Updated!"
    );
    value
}
