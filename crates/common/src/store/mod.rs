//! Storage seams for the scheduling core
//!
//! Services depend on these traits; [`crate::db::Repository`] implements
//! them over Postgres and [`InMemoryStore`] over process memory.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::models::{Availability, Session, SessionStatus};
use crate::errors::Result;

/// Approved mentor as seen by booking and pricing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentorListing {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Price set on the mentor profile
    #[serde(skip)]
    pub profile_price: Option<f64>,
    /// Legacy price stored on the user record
    #[serde(skip)]
    pub legacy_price: Option<f64>,
}

#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn insert_entry(&self, entry: Availability) -> Result<Availability>;

    /// Overwrite a recurring rule owned by `entry.mentor_id`
    async fn update_rule(&self, entry: Availability) -> Result<Availability>;

    /// Returns whether a rule was removed
    async fn delete_rule(&self, mentor_id: Uuid, rule_id: Uuid) -> Result<bool>;

    async fn find_rule(&self, mentor_id: Uuid, rule_id: Uuid) -> Result<Option<Availability>>;

    /// Recurring rules of a mentor, any weekday
    async fn rules_for(&self, mentor_id: Uuid) -> Result<Vec<Availability>>;

    /// Blocked-date entries of a mentor, ascending by date
    async fn blocked_dates(&self, mentor_id: Uuid) -> Result<Vec<Availability>>;

    async fn is_blocked(&self, mentor_id: Uuid, date: NaiveDate) -> Result<bool>;

    /// Returns whether a blocked date was removed
    async fn unblock_date(&self, mentor_id: Uuid, date: NaiveDate) -> Result<bool>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_session(&self, id: Uuid) -> Result<Option<Session>>;

    /// Insert a new session.
    ///
    /// Fails with `SlotConflict` when another holding session of the same
    /// mentor already starts at the same instant.
    async fn insert_session(&self, session: Session) -> Result<Session>;

    /// Write `session` only if the stored row still has status `expected`.
    ///
    /// Returns `false` on a guard miss. Moving onto an instant held by
    /// another session fails with `SlotConflict`.
    async fn update_guarded(&self, session: &Session, expected: SessionStatus) -> Result<bool>;

    /// Sessions of a mentor starting within `[from, to)`, any status
    async fn mentor_sessions_between(
        &self,
        mentor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>>;

    /// Ascending by `scheduled_start`
    async fn sessions_for_student(&self, student_id: Uuid) -> Result<Vec<Session>>;

    /// Ascending by `scheduled_start`
    async fn sessions_for_mentor(&self, mentor_id: Uuid) -> Result<Vec<Session>>;

    /// Manual sessions awaiting admin review, most recently updated first
    async fn pending_manual_reviews(&self) -> Result<Vec<Session>>;

    /// Cancel every overdue manual-payment session in one set-based write.
    ///
    /// Returns the number of sessions cancelled.
    async fn expire_overdue_manual(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait MentorDirectory: Send + Sync {
    /// Mentor with the given id, only if the account is an approved mentor
    async fn find_approved_mentor(&self, id: Uuid) -> Result<Option<MentorListing>>;
}

/// Reason stamped on sessions cancelled by the expiry sweep
pub const EXPIRED_REASON: &str = "Payment window expired";
