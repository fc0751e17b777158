//! Availability entity: recurring weekly rules and blocked dates
//!
//! Both kinds share one table; `is_blocked_date` tells them apart.

use chrono::{NaiveDate, Weekday};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::scheduling::time_of_day::{weekday_from_label, MinuteOfDay};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "availability")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub mentor_id: Uuid,

    /// Weekday label (`Mon`..`Sun`) for recurring rules
    #[sea_orm(column_type = "Text", nullable)]
    pub day: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub start_time: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub end_time: Option<String>,

    pub session_duration_minutes: i32,

    pub blocked_date: Option<Date>,

    pub is_blocked_date: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Weekday of a recurring rule
    pub fn weekday(&self) -> Option<Weekday> {
        if self.is_blocked_date {
            return None;
        }
        self.day.as_deref().and_then(weekday_from_label)
    }

    /// `[start, end)` of a recurring rule in minutes of day.
    ///
    /// Rules with unparseable times yield `None` and never produce slots.
    pub fn window(&self) -> Option<(MinuteOfDay, MinuteOfDay)> {
        let start = MinuteOfDay::parse(self.start_time.as_deref()?).ok()?;
        let end = MinuteOfDay::parse(self.end_time.as_deref()?).ok()?;
        Some((start, end))
    }

    /// Slot length; non-positive values never produce slots
    pub fn step_minutes(&self) -> Option<u32> {
        u32::try_from(self.session_duration_minutes).ok().filter(|m| *m > 0)
    }

    /// Blocked calendar date, for blocked-date entries
    pub fn blocked_on(&self) -> Option<NaiveDate> {
        if self.is_blocked_date {
            self.blocked_date
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
