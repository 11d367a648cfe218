//! Calendar-day helpers for timezone-aware reset boundaries.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Renders the calendar day that `instant` falls on in `tz`, as `YYYY-MM-DD`.
///
/// Used by the count limiter to detect a day rollover without storing a
/// separate "next reset" timestamp per key.
pub fn calendar_day_key(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn same_utc_instant_can_fall_on_different_calendar_days() {
        let instant = Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap();
        let utc_key = calendar_day_key(instant, chrono_tz::UTC);
        let la_key = calendar_day_key(instant, chrono_tz::America::Los_Angeles);
        assert_eq!(utc_key, "2026-01-01");
        assert_eq!(la_key, "2025-12-31");
    }

    #[test]
    fn rollover_detected_across_midnight() {
        let before = Utc.with_ymd_and_hms(2026, 3, 4, 23, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 5, 0, 1, 0).unwrap();
        assert_ne!(
            calendar_day_key(before, chrono_tz::UTC),
            calendar_day_key(after, chrono_tz::UTC)
        );
    }
}
