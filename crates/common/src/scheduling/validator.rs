//! Checks that a requested slot lies inside a mentor's published availability

use chrono::{NaiveDate, Weekday};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::time_of_day::{weekday_of, MinuteOfDay};
use crate::db::models::Availability;
use crate::errors::{AppError, Result};
use crate::store::AvailabilityStore;

/// Whether some rule for `weekday` contains `[time, time + duration)`
pub fn fits_rules(
    rules: &[Availability],
    weekday: Weekday,
    time: MinuteOfDay,
    duration_minutes: u32,
) -> bool {
    rules
        .iter()
        .filter(|rule| rule.weekday() == Some(weekday))
        .filter_map(Availability::window)
        .any(|(start, end)| start <= time && time.end_after(duration_minutes) <= end.minutes())
}

#[derive(Clone)]
pub struct SlotValidator {
    availability: Arc<dyn AvailabilityStore>,
}

impl SlotValidator {
    pub fn new(availability: Arc<dyn AvailabilityStore>) -> Self {
        Self { availability }
    }

    /// Read-only: `SlotBlocked` wins over `SlotOutsideAvailability`
    pub async fn validate(
        &self,
        mentor_id: Uuid,
        date: NaiveDate,
        time: MinuteOfDay,
        duration_minutes: u32,
    ) -> Result<()> {
        if self.availability.is_blocked(mentor_id, date).await? {
            return Err(AppError::SlotBlocked {
                date: date.to_string(),
            });
        }

        let rules = self.availability.rules_for(mentor_id).await?;
        if !fits_rules(&rules, weekday_of(date), time, duration_minutes) {
            debug!(
                mentor_id = %mentor_id,
                date = %date,
                time = %time,
                duration_minutes,
                "Requested slot outside availability"
            );
            return Err(AppError::SlotOutsideAvailability);
        }

        Ok(())
    }
}
