//! Repository pattern for database operations
//!
//! Implements the storage traits over Postgres. Writes that must not race
//! rely on the schema: a partial unique index closes double booking and
//! status changes are guarded `UPDATE ... WHERE status = <expected>`.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::notify::{AuditEntry, AuditSink, NewNotification, NotificationSink};
use crate::store::{AvailabilityStore, MentorDirectory, MentorListing, SessionStore, EXPIRED_REASON};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Unique violations on session writes can only come from the
/// holding-slot index
fn session_write_error(err: DbErr) -> AppError {
    if is_unique_violation(&err) {
        AppError::SlotConflict
    } else {
        err.into()
    }
}

fn availability_active_model(entry: &Availability) -> AvailabilityActiveModel {
    AvailabilityActiveModel {
        id: Set(entry.id),
        mentor_id: Set(entry.mentor_id),
        day: Set(entry.day.clone()),
        start_time: Set(entry.start_time.clone()),
        end_time: Set(entry.end_time.clone()),
        session_duration_minutes: Set(entry.session_duration_minutes),
        blocked_date: Set(entry.blocked_date),
        is_blocked_date: Set(entry.is_blocked_date),
        created_at: Set(entry.created_at),
        updated_at: Set(entry.updated_at),
    }
}

fn session_active_model(session: &Session) -> SessionActiveModel {
    SessionActiveModel {
        id: Set(session.id),
        student_id: Set(session.student_id),
        mentor_id: Set(session.mentor_id),
        date: Set(session.date.clone()),
        time: Set(session.time.clone()),
        duration_minutes: Set(session.duration_minutes),
        scheduled_start: Set(session.scheduled_start),
        amount_minor: Set(session.amount_minor),
        currency: Set(session.currency.clone()),
        payment_mode: Set(session.payment_mode.clone()),
        payment_status: Set(session.payment_status.clone()),
        status: Set(session.status.clone()),
        session_status: Set(session.session_status.clone()),
        payment_due_at: Set(session.payment_due_at),
        order_id: Set(session.order_id.clone()),
        payment_id: Set(session.payment_id.clone()),
        payment_signature: Set(session.payment_signature.clone()),
        transaction_reference: Set(session.transaction_reference.clone()),
        payment_screenshot: Set(session.payment_screenshot.clone()),
        payment_reject_reason: Set(session.payment_reject_reason.clone()),
        verified_by_admin: Set(session.verified_by_admin),
        verified_at: Set(session.verified_at),
        meeting_link: Set(session.meeting_link.clone()),
        notes: Set(session.notes.clone()),
        feedback: Set(session.feedback.clone()),
        created_at: Set(session.created_at),
        updated_at: Set(session.updated_at),
    }
}

// ============================================================================
// Availability
// ============================================================================

#[async_trait]
impl AvailabilityStore for Repository {
    async fn insert_entry(&self, entry: Availability) -> Result<Availability> {
        availability_active_model(&entry)
            .insert(self.write_conn())
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Duplicate {
                        message: "Date already blocked".to_string(),
                    }
                } else {
                    e.into()
                }
            })
    }

    async fn update_rule(&self, entry: Availability) -> Result<Availability> {
        let result = AvailabilityEntity::update_many()
            .set(availability_active_model(&entry))
            .filter(AvailabilityColumn::Id.eq(entry.id))
            .filter(AvailabilityColumn::MentorId.eq(entry.mentor_id))
            .filter(AvailabilityColumn::IsBlockedDate.eq(false))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound {
                resource_type: "availability",
                id: entry.id.to_string(),
            });
        }
        Ok(entry)
    }

    async fn delete_rule(&self, mentor_id: Uuid, rule_id: Uuid) -> Result<bool> {
        let result = AvailabilityEntity::delete_many()
            .filter(AvailabilityColumn::Id.eq(rule_id))
            .filter(AvailabilityColumn::MentorId.eq(mentor_id))
            .filter(AvailabilityColumn::IsBlockedDate.eq(false))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn find_rule(&self, mentor_id: Uuid, rule_id: Uuid) -> Result<Option<Availability>> {
        AvailabilityEntity::find_by_id(rule_id)
            .filter(AvailabilityColumn::MentorId.eq(mentor_id))
            .filter(AvailabilityColumn::IsBlockedDate.eq(false))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn rules_for(&self, mentor_id: Uuid) -> Result<Vec<Availability>> {
        AvailabilityEntity::find()
            .filter(AvailabilityColumn::MentorId.eq(mentor_id))
            .filter(AvailabilityColumn::IsBlockedDate.eq(false))
            .order_by_asc(AvailabilityColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn blocked_dates(&self, mentor_id: Uuid) -> Result<Vec<Availability>> {
        AvailabilityEntity::find()
            .filter(AvailabilityColumn::MentorId.eq(mentor_id))
            .filter(AvailabilityColumn::IsBlockedDate.eq(true))
            .order_by_asc(AvailabilityColumn::BlockedDate)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn is_blocked(&self, mentor_id: Uuid, date: NaiveDate) -> Result<bool> {
        let count = AvailabilityEntity::find()
            .filter(AvailabilityColumn::MentorId.eq(mentor_id))
            .filter(AvailabilityColumn::IsBlockedDate.eq(true))
            .filter(AvailabilityColumn::BlockedDate.eq(date))
            .count(self.read_conn())
            .await?;

        Ok(count > 0)
    }

    async fn unblock_date(&self, mentor_id: Uuid, date: NaiveDate) -> Result<bool> {
        let result = AvailabilityEntity::delete_many()
            .filter(AvailabilityColumn::MentorId.eq(mentor_id))
            .filter(AvailabilityColumn::IsBlockedDate.eq(true))
            .filter(AvailabilityColumn::BlockedDate.eq(date))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[async_trait]
impl SessionStore for Repository {
    async fn find_session(&self, id: Uuid) -> Result<Option<Session>> {
        // Reads that precede a guarded write go to the primary
        SessionEntity::find_by_id(id)
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_session(&self, session: Session) -> Result<Session> {
        session_active_model(&session)
            .insert(self.write_conn())
            .await
            .map_err(session_write_error)
    }

    async fn update_guarded(&self, session: &Session, expected: SessionStatus) -> Result<bool> {
        let result = SessionEntity::update_many()
            .set(session_active_model(session))
            .filter(SessionColumn::Id.eq(session.id))
            .filter(SessionColumn::Status.eq(expected.as_str()))
            .exec(self.write_conn())
            .await
            .map_err(session_write_error)?;

        Ok(result.rows_affected == 1)
    }

    async fn mentor_sessions_between(
        &self,
        mentor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        SessionEntity::find()
            .filter(SessionColumn::MentorId.eq(mentor_id))
            .filter(SessionColumn::ScheduledStart.gte(from))
            .filter(SessionColumn::ScheduledStart.lt(to))
            .order_by_asc(SessionColumn::ScheduledStart)
            .all(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn sessions_for_student(&self, student_id: Uuid) -> Result<Vec<Session>> {
        SessionEntity::find()
            .filter(SessionColumn::StudentId.eq(student_id))
            .order_by_asc(SessionColumn::ScheduledStart)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn sessions_for_mentor(&self, mentor_id: Uuid) -> Result<Vec<Session>> {
        SessionEntity::find()
            .filter(SessionColumn::MentorId.eq(mentor_id))
            .order_by_asc(SessionColumn::ScheduledStart)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn pending_manual_reviews(&self) -> Result<Vec<Session>> {
        SessionEntity::find()
            .filter(SessionColumn::PaymentMode.eq(PaymentMode::Manual.as_str()))
            .filter(SessionColumn::PaymentStatus.eq(PaymentStatus::WaitingVerification.as_str()))
            .filter(SessionColumn::Status.is_in([
                SessionStatus::Pending.as_str(),
                SessionStatus::PaymentPending.as_str(),
            ]))
            .order_by_desc(SessionColumn::UpdatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn expire_overdue_manual(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = SessionEntity::update_many()
            .col_expr(SessionColumn::Status, Expr::value(SessionStatus::Cancelled.as_str()))
            .col_expr(
                SessionColumn::PaymentStatus,
                Expr::value(PaymentStatus::Rejected.as_str()),
            )
            .col_expr(SessionColumn::PaymentRejectReason, Expr::value(EXPIRED_REASON))
            .col_expr(SessionColumn::UpdatedAt, Expr::value(now))
            .filter(SessionColumn::PaymentMode.eq(PaymentMode::Manual.as_str()))
            .filter(SessionColumn::PaymentStatus.eq(PaymentStatus::Pending.as_str()))
            .filter(SessionColumn::Status.eq(SessionStatus::PaymentPending.as_str()))
            .filter(SessionColumn::PaymentDueAt.lt(now))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }
}

// ============================================================================
// Mentors
// ============================================================================

#[async_trait]
impl MentorDirectory for Repository {
    async fn find_approved_mentor(&self, id: Uuid) -> Result<Option<MentorListing>> {
        let found = UserEntity::find_by_id(id)
            .filter(UserColumn::Role.eq("mentor"))
            .filter(UserColumn::ApprovalStatus.eq("approved"))
            .find_also_related(MentorProfileEntity)
            .one(self.read_conn())
            .await?;

        Ok(found.map(|(user, profile)| MentorListing {
            id: user.id,
            name: user.name,
            email: user.email,
            profile_price: profile.and_then(|p| p.session_price),
            legacy_price: user.session_price,
        }))
    }
}

// ============================================================================
// Notifications & audit
// ============================================================================

#[async_trait]
impl NotificationSink for Repository {
    async fn notify(&self, notification: NewNotification) -> Result<()> {
        NotificationActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(notification.title),
            message: Set(notification.message),
            kind: Set("system".to_string()),
            sent_by: Set(notification.sent_by),
            target_role: Set(notification.target_role),
            recipient: Set(Some(notification.recipient)),
            read_by_recipient: Set(false),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.write_conn())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditSink for Repository {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        AuditLogActiveModel {
            id: Set(Uuid::new_v4()),
            actor_id: Set(entry.actor_id),
            action: Set(entry.action),
            entity_type: Set(entry.entity_type),
            entity_id: Set(entry.entity_id),
            metadata: Set(entry.metadata),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.write_conn())
        .await?;

        Ok(())
    }
}
