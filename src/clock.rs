//! Wall clock and calendar day keys.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeZone};

/// Source of the current local time.
pub trait Clock: Send + Sync {
    /// The current instant, carrying the local UTC offset.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// The system wall clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Formats the `YYYY-MM-DD` key of the calendar day containing `at`.
pub fn day_key(at: &DateTime<FixedOffset>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Day key of an epoch-millisecond timestamp, evaluated in the offset of
/// `reference`. Returns `None` for unset (non-positive) timestamps.
pub fn day_key_of_millis(ms: i64, reference: &DateTime<FixedOffset>) -> Option<String> {
    if ms <= 0 {
        return None;
    }
    reference.offset().timestamp_millis_opt(ms).single().map(|at| day_key(&at))
}

/// Parses a `YYYY-MM-DD` day key.
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Converts epoch milliseconds into a local-offset timestamp for display.
pub fn millis_to_local(ms: i64, reference: &DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    if ms <= 0 {
        return None;
    }
    reference.offset().timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_day_key_uses_local_offset() {
        // 23:30 local on Jan 1st is already Jan 2nd in UTC.
        let local = at("2024-01-01T23:30:00-02:00");
        assert_eq!(day_key(&local), "2024-01-01");
    }

    #[test]
    fn test_day_key_of_millis() {
        let reference = at("2024-03-10T12:00:00+08:00");
        let ms = at("2024-03-09T23:59:59+08:00").timestamp_millis();
        assert_eq!(day_key_of_millis(ms, &reference).as_deref(), Some("2024-03-09"));
        assert_eq!(day_key_of_millis(0, &reference), None);
    }

    #[test]
    fn test_parse_day_key() {
        assert_eq!(parse_day_key("2024-02-29"), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(parse_day_key("2023-02-29"), None);
        assert_eq!(parse_day_key("garbage"), None);
    }
}
