//! Display formatting for timestamps.
//!
//! Relative labels for recent items, calendar labels for older ones. Both
//! instants are converted to the viewer's offset before comparing dates.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, Utc};

/// Format `at` relative to `now` in the viewer's timezone.
///
/// - under a minute old (or in the future): `just now`
/// - same calendar day, under an hour: `12m ago`
/// - same calendar day: `14:05`
/// - previous calendar day: `Yesterday 14:05`
/// - within the last week: weekday name, e.g. `Monday`
/// - anything older: `10/5/2026`
pub fn format_timestamp(at: DateTime<Utc>, now: DateTime<Utc>, offset: FixedOffset) -> String {
    let age = now.signed_duration_since(at);
    if age < Duration::minutes(1) {
        return "just now".to_string();
    }

    let local = at.with_timezone(&offset);
    let today = now.with_timezone(&offset).date_naive();
    let day = local.date_naive();

    if day == today {
        if age < Duration::hours(1) {
            return format!("{}m ago", age.num_minutes());
        }
        return local.format("%H:%M").to_string();
    }

    if today.pred_opt() == Some(day) {
        return format!("Yesterday {}", local.format("%H:%M"));
    }

    if age < Duration::days(7) {
        return local.format("%A").to_string();
    }

    format!("{}/{}/{}", local.month(), local.day(), local.year())
}

/// The zero offset.
pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}
