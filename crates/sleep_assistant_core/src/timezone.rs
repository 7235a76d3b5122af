//! crates/sleep_assistant_core/src/timezone.rs
//!
//! Conversion between a user's local wall-clock time and UTC.
//!
//! Users carry their timezone as an IANA name. An unknown name must never
//! abort the operation that needed the conversion: the fallback is to treat
//! the value as already being UTC, with a logged warning.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

pub fn parse(tz_name: &str) -> Option<Tz> {
    tz_name.parse::<Tz>().ok()
}

/// Whether `tz_name` is a known IANA timezone identifier.
pub fn is_valid(tz_name: &str) -> bool {
    parse(tz_name).is_some()
}

/// Convert a wall-clock time in the given zone to UTC.
pub fn to_utc(local: NaiveDateTime, tz_name: &str) -> DateTime<Utc> {
    match parse(tz_name) {
        Some(tz) => match tz.from_local_datetime(&local).earliest() {
            Some(dt) => dt.with_timezone(&Utc),
            // Wall-clock times skipped by a DST transition.
            None => {
                warn!(timezone = tz_name, "nonexistent_local_time");
                Utc.from_utc_datetime(&local)
            }
        },
        None => {
            warn!(timezone = tz_name, "timezone_conversion_failed");
            Utc.from_utc_datetime(&local)
        }
    }
}

/// Convert a UTC instant to wall-clock time in the given zone.
pub fn to_local(utc: DateTime<Utc>, tz_name: &str) -> NaiveDateTime {
    match parse(tz_name) {
        Some(tz) => utc.with_timezone(&tz).naive_local(),
        None => {
            warn!(timezone = tz_name, "timezone_conversion_failed");
            utc.naive_utc()
        }
    }
}

/// Format a UTC instant as "HH:MM" in the given zone, for presentation.
pub fn format_local_time(utc: DateTime<Utc>, tz_name: &str) -> String {
    to_local(utc, tz_name).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn converts_local_to_utc() {
        // Tallinn is UTC+2 in winter.
        let utc = to_utc(local(2026, 1, 15, 12, 0), "Europe/Tallinn");
        assert_eq!(utc, Utc.from_utc_datetime(&local(2026, 1, 15, 10, 0)));
    }

    #[test]
    fn converts_utc_to_local() {
        let utc = Utc.from_utc_datetime(&local(2026, 1, 15, 10, 0));
        assert_eq!(to_local(utc, "Europe/Tallinn"), local(2026, 1, 15, 12, 0));
    }

    #[test]
    fn unknown_zone_falls_back_to_utc() {
        let wall = local(2026, 1, 15, 12, 0);
        assert_eq!(to_utc(wall, "Not/AZone"), Utc.from_utc_datetime(&wall));

        let utc = Utc.from_utc_datetime(&wall);
        assert_eq!(to_local(utc, "Not/AZone"), wall);
    }

    #[test]
    fn formats_display_time() {
        let utc = Utc.from_utc_datetime(&local(2026, 1, 15, 4, 5));
        assert_eq!(format_local_time(utc, "UTC"), "04:05");
        assert_eq!(format_local_time(utc, "Europe/Tallinn"), "06:05");
    }

    #[test]
    fn validates_zone_names() {
        assert!(is_valid("UTC"));
        assert!(is_valid("Europe/Tallinn"));
        assert!(!is_valid("Europe/Atlantis"));
        assert!(!is_valid(""));
    }
}
