//! Mentor availability: recurring rules, blocked dates and the public
//! upcoming-slot projection

pub mod slots;
pub mod time_of_day;
pub mod validator;

pub use slots::UpcomingSlot;
pub use time_of_day::MinuteOfDay;
pub use self::validator::SlotValidator;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use ::validator::Validate;

use crate::auth::{Principal, Role};
use crate::clock::Clock;
use crate::config::SchedulingConfig;
use crate::db::models::Availability;
use crate::errors::{parse_reference, AppError, Result};
use crate::store::{AvailabilityStore, MentorDirectory, MentorListing, SessionStore};
use time_of_day::{parse_date, scheduled_start, weekday_from_label, weekday_label};

const DEFAULT_RULE_DURATION: u32 = 60;

/// New recurring rule
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RuleRequest {
    /// `Mon`..`Sun`
    #[validate(length(equal = 3))]
    pub day: String,

    #[validate(length(equal = 5))]
    pub start_time: String,

    #[validate(length(equal = 5))]
    pub end_time: String,

    pub session_duration_minutes: Option<u32>,
}

/// Partial update of a recurring rule; at least one field must be set
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleUpdate {
    pub day: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub session_duration_minutes: Option<u32>,
}

impl RuleUpdate {
    fn is_empty(&self) -> bool {
        self.day.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.session_duration_minutes.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockDateRequest {
    /// `YYYY-MM-DD`
    pub blocked_date: String,
}

/// Public view of a mentor's calendar
#[derive(Debug, Clone, Serialize)]
pub struct MentorAvailability {
    pub mentor: MentorListing,
    pub weekly_availability: Vec<Availability>,
    pub blocked_dates: Vec<NaiveDate>,
    pub upcoming_slots: Vec<UpcomingSlot>,
    pub free_slot_count: usize,
}

/// Availability management and slot projection
#[derive(Clone)]
pub struct AvailabilityService {
    availability: Arc<dyn AvailabilityStore>,
    sessions: Arc<dyn SessionStore>,
    mentors: Arc<dyn MentorDirectory>,
    clock: Arc<dyn Clock>,
    config: SchedulingConfig,
}

impl AvailabilityService {
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        sessions: Arc<dyn SessionStore>,
        mentors: Arc<dyn MentorDirectory>,
        clock: Arc<dyn Clock>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            availability,
            sessions,
            mentors,
            clock,
            config,
        }
    }

    fn check_duration(&self, minutes: u32) -> Result<()> {
        if self.config.allows_duration(minutes) {
            Ok(())
        } else {
            Err(AppError::Validation {
                message: format!(
                    "Session duration must be one of {:?} minutes",
                    self.config.allowed_durations
                ),
                field: Some("session_duration_minutes".to_string()),
            })
        }
    }

    /// Create a recurring weekly rule for the calling mentor
    pub async fn create_rule(&self, principal: &Principal, request: RuleRequest) -> Result<Availability> {
        principal.require_role(Role::Mentor)?;
        request.validate()?;

        let day = parse_weekday(&request.day)?;
        let start = MinuteOfDay::parse(&request.start_time)?;
        let end = MinuteOfDay::parse(&request.end_time)?;
        let duration = request.session_duration_minutes.unwrap_or(DEFAULT_RULE_DURATION);
        self.check_duration(duration)?;

        if start >= end {
            warn!(
                mentor_id = %principal.user_id,
                start = %start,
                end = %end,
                "Accepted availability rule with an empty window"
            );
        }

        let now = self.clock.now();
        let rule = Availability {
            id: Uuid::new_v4(),
            mentor_id: principal.user_id,
            day: Some(weekday_label(day).to_string()),
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
            session_duration_minutes: duration as i32,
            blocked_date: None,
            is_blocked_date: false,
            created_at: now.into(),
            updated_at: now.into(),
        };

        let rule = self.availability.insert_entry(rule).await?;
        info!(
            rule_id = %rule.id,
            mentor_id = %rule.mentor_id,
            day = %weekday_label(day),
            "Availability rule created"
        );
        Ok(rule)
    }

    /// Update one of the calling mentor's recurring rules
    pub async fn update_rule(
        &self,
        principal: &Principal,
        rule_id: &str,
        update: RuleUpdate,
    ) -> Result<Availability> {
        principal.require_role(Role::Mentor)?;
        let rule_id = parse_reference("availability", rule_id)?;

        if update.is_empty() {
            return Err(AppError::validation("At least one field must be updated"));
        }

        let mut rule = self
            .availability
            .find_rule(principal.user_id, rule_id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "availability",
                id: rule_id.to_string(),
            })?;

        if let Some(ref day) = update.day {
            rule.day = Some(weekday_label(parse_weekday(day)?).to_string());
        }
        if let Some(ref start) = update.start_time {
            rule.start_time = Some(MinuteOfDay::parse(start)?.to_string());
        }
        if let Some(ref end) = update.end_time {
            rule.end_time = Some(MinuteOfDay::parse(end)?.to_string());
        }
        if let Some(duration) = update.session_duration_minutes {
            self.check_duration(duration)?;
            rule.session_duration_minutes = duration as i32;
        }
        rule.updated_at = self.clock.now().into();

        let rule = self.availability.update_rule(rule).await?;
        info!(rule_id = %rule.id, mentor_id = %rule.mentor_id, "Availability rule updated");
        Ok(rule)
    }

    pub async fn delete_rule(&self, principal: &Principal, rule_id: &str) -> Result<()> {
        principal.require_role(Role::Mentor)?;
        let rule_id = parse_reference("availability", rule_id)?;

        if !self.availability.delete_rule(principal.user_id, rule_id).await? {
            return Err(AppError::NotFound {
                resource_type: "availability",
                id: rule_id.to_string(),
            });
        }

        info!(rule_id = %rule_id, mentor_id = %principal.user_id, "Availability rule deleted");
        Ok(())
    }

    /// Mark a whole calendar date unavailable
    pub async fn block_date(&self, principal: &Principal, request: BlockDateRequest) -> Result<Availability> {
        principal.require_role(Role::Mentor)?;
        let date = parse_date(&request.blocked_date)?;

        let now = self.clock.now();
        let entry = Availability {
            id: Uuid::new_v4(),
            mentor_id: principal.user_id,
            day: None,
            start_time: None,
            end_time: None,
            session_duration_minutes: DEFAULT_RULE_DURATION as i32,
            blocked_date: Some(date),
            is_blocked_date: true,
            created_at: now.into(),
            updated_at: now.into(),
        };

        let entry = self.availability.insert_entry(entry).await?;
        info!(mentor_id = %principal.user_id, date = %date, "Date blocked");
        Ok(entry)
    }

    pub async fn unblock_date(&self, principal: &Principal, date: &str) -> Result<()> {
        principal.require_role(Role::Mentor)?;
        let date = parse_date(date)?;

        if !self.availability.unblock_date(principal.user_id, date).await? {
            return Err(AppError::NotFound {
                resource_type: "blocked date",
                id: date.to_string(),
            });
        }

        info!(mentor_id = %principal.user_id, date = %date, "Date unblocked");
        Ok(())
    }

    /// Public calendar of an approved mentor.
    ///
    /// The projection starts at today's UTC midnight and spans the
    /// configured number of days.
    pub async fn mentor_availability(&self, mentor_id: &str) -> Result<MentorAvailability> {
        let mentor_id = parse_reference("mentor", mentor_id)?;
        let mentor = self
            .mentors
            .find_approved_mentor(mentor_id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "mentor",
                id: mentor_id.to_string(),
            })?;

        let today = self.clock.now().date_naive();
        let window_start = scheduled_start(today, MinuteOfDay::MIDNIGHT);
        let window_end = window_start + Duration::days(i64::from(self.config.window_days));

        let (mut rules, blocked_entries, sessions) = futures::try_join!(
            self.availability.rules_for(mentor_id),
            self.availability.blocked_dates(mentor_id),
            self.sessions.mentor_sessions_between(mentor_id, window_start, window_end),
        )?;

        rules.sort_by_key(|rule| {
            (
                rule.weekday().map(|d| d.num_days_from_monday()).unwrap_or(u32::MAX),
                rule.window().map(|(start, _)| start),
            )
        });

        let blocked_dates: Vec<NaiveDate> =
            blocked_entries.iter().filter_map(Availability::blocked_on).collect();
        let blocked: HashSet<NaiveDate> = blocked_dates.iter().copied().collect();
        let booked = slots::booked_keys(&sessions);

        let upcoming_slots = slots::expand(&rules, &blocked, &booked, today, self.config.window_days);
        let free_slot_count = slots::free_slot_count(&upcoming_slots);

        Ok(MentorAvailability {
            mentor,
            weekly_availability: rules,
            blocked_dates,
            upcoming_slots,
            free_slot_count,
        })
    }
}

fn parse_weekday(raw: &str) -> Result<chrono::Weekday> {
    weekday_from_label(raw).ok_or_else(|| AppError::Validation {
        message: format!("Invalid day '{}', expected one of Mon..Sun", raw),
        field: Some("day".to_string()),
    })
}
