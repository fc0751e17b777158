//! Expansion of recurring weekly rules into concrete upcoming slots

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

use super::time_of_day::{parse_date, scheduled_start, weekday_of, MinuteOfDay};
use crate::db::models::{Availability, Session, SessionStage, SessionStatus};

/// A bookable start time produced by a recurring rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingSlot {
    pub date: NaiveDate,
    /// `HH:MM`
    pub time: String,
    pub duration_minutes: u32,
    pub starts_at: DateTime<Utc>,
    /// e.g. `Mon, Oct 19, 9:00 AM`
    pub label: String,
    pub is_booked: bool,
}

impl UpcomingSlot {
    fn key(&self) -> (NaiveDate, &str) {
        (self.date, self.time.as_str())
    }
}

/// Start times of one rule on one day.
///
/// Emits while `cursor + duration <= end`; a trailing gap shorter than the
/// duration is left unused and `start >= end` yields nothing.
pub fn rule_start_times(rule: &Availability) -> Vec<MinuteOfDay> {
    let (Some((start, end)), Some(step)) = (rule.window(), rule.step_minutes()) else {
        warn!(rule_id = %rule.id, "Skipping availability rule with unusable times");
        return Vec::new();
    };

    if start >= end {
        warn!(
            rule_id = %rule.id,
            start = %start,
            end = %end,
            "Availability rule has an empty window"
        );
        return Vec::new();
    }

    let mut starts = Vec::new();
    let mut cursor = start;
    while cursor.end_after(step) <= end.minutes() {
        starts.push(cursor);
        match cursor.checked_add(step) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    starts
}

/// Whether a session makes its slot show as booked in the projection.
///
/// Only payment-settled sessions count; pending ones still hold the slot
/// against double booking but are not displayed as taken.
pub fn marks_slot_booked(session: &Session) -> bool {
    session.stage() == SessionStage::Confirmed
        && session.payment_status().is_settled()
        && matches!(
            session.session_status(),
            SessionStatus::Confirmed | SessionStatus::Approved
        )
}

/// `(date, time)` pairs occupied by settled sessions
pub fn booked_keys(sessions: &[Session]) -> HashSet<(NaiveDate, String)> {
    sessions
        .iter()
        .filter(|s| marks_slot_booked(s))
        .filter_map(|s| parse_date(&s.date).ok().map(|d| (d, s.time.clone())))
        .collect()
}

fn slot_label(starts_at: DateTime<Utc>) -> String {
    starts_at.format("%a, %b %-d, %-I:%M %p").to_string()
}

/// Expand rules over `days` consecutive days starting at `from`.
///
/// Output order is date, then rule order, then time. Overlapping rules can
/// produce duplicate entries; they are kept.
pub fn expand(
    rules: &[Availability],
    blocked: &HashSet<NaiveDate>,
    booked: &HashSet<(NaiveDate, String)>,
    from: NaiveDate,
    days: u32,
) -> Vec<UpcomingSlot> {
    let mut slots = Vec::new();

    for offset in 0..i64::from(days) {
        let date = from + Duration::days(offset);
        if blocked.contains(&date) {
            continue;
        }

        let weekday = weekday_of(date);
        for rule in rules.iter().filter(|r| r.weekday() == Some(weekday)) {
            let duration = rule.step_minutes().unwrap_or_default();
            for time in rule_start_times(rule) {
                let starts_at = scheduled_start(date, time);
                let time = time.to_string();
                let is_booked = booked.contains(&(date, time.clone()));
                slots.push(UpcomingSlot {
                    date,
                    time,
                    duration_minutes: duration,
                    starts_at,
                    label: slot_label(starts_at),
                    is_booked,
                });
            }
        }
    }

    slots
}

/// Distinct free `(date, time)` pairs
pub fn free_slot_count(slots: &[UpcomingSlot]) -> usize {
    slots
        .iter()
        .filter(|s| !s.is_booked)
        .map(UpcomingSlot::key)
        .collect::<HashSet<_>>()
        .len()
}
