//! Trading session window.

use chrono::{Datelike, FixedOffset, Local, NaiveDateTime, NaiveTime, Utc, Weekday};
use guard_core::config::MarketConfig;
use guard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Daily window during which checks are allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSession {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Only Monday through Friday.
    pub weekdays_only: bool,
}

impl MarketSession {
    pub fn new(start: NaiveTime, end: NaiveTime, weekdays_only: bool) -> Self {
        Self {
            start,
            end,
            weekdays_only,
        }
    }

    /// Parse `HH:MM` (or `HH:MM:SS`) bounds. Weekday filtering is on.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self::new(parse_time(start)?, parse_time(end)?, true))
    }

    pub fn from_config(config: &MarketConfig) -> Self {
        Self::new(config.start, config.end, config.weekdays_only)
    }

    /// Whether `at` falls inside the window. Both bounds are inclusive.
    pub fn is_open(&self, at: NaiveDateTime) -> bool {
        if self.weekdays_only && matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = at.time();
        self.start <= time && time <= self.end
    }
}

impl fmt::Display for MarketSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| Error::Config {
            message: format!("invalid market time '{}', expected HH:MM", value),
        })
}

/// Wall-clock time at the given exchange offset, or host-local time.
pub fn now_at(offset: Option<FixedOffset>) -> NaiveDateTime {
    match offset {
        Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
        None => Local::now().naive_local(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(date: (i32, u32, u32), h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    // 2024-06-03 is a Monday
    const MONDAY: (i32, u32, u32) = (2024, 6, 3);
    const SATURDAY: (i32, u32, u32) = (2024, 6, 8);

    #[test]
    fn test_window_bounds_are_inclusive() {
        let session = MarketSession::parse("09:15", "15:30").unwrap();

        assert!(!session.is_open(at(MONDAY, 9, 14, 59)));
        assert!(session.is_open(at(MONDAY, 9, 15, 0)));
        assert!(session.is_open(at(MONDAY, 12, 0, 0)));
        assert!(session.is_open(at(MONDAY, 15, 30, 0)));
        assert!(!session.is_open(at(MONDAY, 15, 30, 1)));
    }

    #[test]
    fn test_weekend_filter() {
        let session = MarketSession::parse("09:15", "15:30").unwrap();
        assert!(!session.is_open(at(SATURDAY, 10, 0, 0)));

        let all_days = MarketSession {
            weekdays_only: false,
            ..session
        };
        assert!(all_days.is_open(at(SATURDAY, 10, 0, 0)));
    }

    #[test]
    fn test_parse_formats() {
        let session = MarketSession::parse("09:15:30", " 15:30 ").unwrap();
        assert_eq!(session.start, NaiveTime::from_hms_opt(9, 15, 30).unwrap());
        assert_eq!(session.to_string(), "09:15 - 15:30");

        assert!(MarketSession::parse("9am", "15:30").is_err());
        assert!(MarketSession::parse("09:15", "25:00").is_err());
    }

    #[test]
    fn test_now_at_offset() {
        let ist = FixedOffset::east_opt(330 * 60).unwrap();
        let expected = Utc::now().with_timezone(&ist).naive_local();
        let actual = now_at(Some(ist));
        assert!((actual - expected).num_seconds().abs() < 5);
    }
}
