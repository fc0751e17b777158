//! Minute-of-day arithmetic and calendar parsing shared by every
//! scheduling path.
//!
//! Times are compared as integers, never as strings, so an end time is
//! never synthesized as something like `09:60`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use regex_lite::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::errors::{AppError, Result};

const MINUTES_PER_DAY: u32 = 24 * 60;

fn clock_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{2}):(\d{2})$").expect("static regex"))
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"))
}

/// A wall-clock time within one day, in minutes since midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinuteOfDay(u32);

impl MinuteOfDay {
    pub const MIDNIGHT: MinuteOfDay = MinuteOfDay(0);

    /// Build from an hour and minute, rejecting out-of-range parts
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(MinuteOfDay(hour * 60 + minute))
    }

    /// Parse a strict `HH:MM` string
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || AppError::Validation {
            message: format!("Invalid time '{}', expected HH:MM", raw),
            field: Some("time".to_string()),
        };

        let caps = clock_pattern().captures(raw).ok_or_else(invalid)?;
        let hour: u32 = caps[1].parse().map_err(|_| invalid())?;
        let minute: u32 = caps[2].parse().map_err(|_| invalid())?;

        Self::new(hour, minute).ok_or_else(invalid)
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    /// Minutes since midnight after adding `duration`; may pass 24:00
    pub fn end_after(&self, duration_minutes: u32) -> u32 {
        self.0 + duration_minutes
    }

    /// Advance by `minutes`, or `None` when the result leaves the day
    pub fn checked_add(&self, minutes: u32) -> Option<Self> {
        let total = self.0.checked_add(minutes)?;
        (total < MINUTES_PER_DAY).then_some(MinuteOfDay(total))
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.0 / 60, self.0 % 60, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Parse a strict `YYYY-MM-DD` calendar date
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let invalid = || AppError::Validation {
        message: format!("Invalid date '{}', expected YYYY-MM-DD", raw),
        field: Some("date".to_string()),
    };

    if !date_pattern().is_match(raw) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())
}

/// Absolute start of a slot: `date` at `time`, UTC
pub fn scheduled_start(date: NaiveDate, time: MinuteOfDay) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time.as_naive_time()))
}

/// Short weekday label used by recurring rules
pub fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

pub fn weekday_from_label(label: &str) -> Option<Weekday> {
    match label {
        "Mon" => Some(Weekday::Mon),
        "Tue" => Some(Weekday::Tue),
        "Wed" => Some(Weekday::Wed),
        "Thu" => Some(Weekday::Thu),
        "Fri" => Some(Weekday::Fri),
        "Sat" => Some(Weekday::Sat),
        "Sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Weekday of a calendar date
pub fn weekday_of(date: NaiveDate) -> Weekday {
    date.weekday()
}
