//! Session lifecycle: booking, approval, cancellation, rescheduling and
//! the mentor-side follow-ups
//!
//! State machine over `status`:
//!
//! ```text
//! pending         -> approved | rejected | cancelled
//! payment_pending -> pending (proof submitted) | cancelled
//! approved        -> completed | cancelled
//! confirmed       -> completed
//! ```
//!
//! Every write is a guarded update on the expected source status, so two
//! racing requests cannot both apply a transition.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{Principal, Role};
use crate::clock::Clock;
use crate::config::{ConflictMode, PaymentsConfig, SchedulingConfig};
use crate::db::models::{PaymentMode, PaymentStatus, Session, SessionStage, SessionStatus};
use crate::errors::{parse_reference, AppError, Result};
use crate::metrics;
use crate::notify::{audit_best_effort, AuditEntry, AuditSink};
use crate::payments::PaymentInstructions;
use crate::scheduling::time_of_day::{parse_date, scheduled_start, MinuteOfDay};
use crate::scheduling::SlotValidator;
use crate::store::{MentorDirectory, MentorListing, SessionStore};
use crate::sweeper::ExpirySweeper;

const DEFAULT_SESSION_DURATION: u32 = 60;

/// Student request to book a slot
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BookingRequest {
    pub mentor_id: String,

    /// `YYYY-MM-DD`
    pub date: String,

    /// `HH:MM`
    pub time: String,

    pub duration_minutes: Option<u32>,

    #[validate(length(max = 600))]
    pub notes: Option<String>,

    /// Overrides the configured payment mode
    pub payment_mode: Option<PaymentMode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub date: String,
    pub time: String,
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MeetingLinkRequest {
    #[validate(url)]
    pub meeting_link: String,
}

/// A validated, conflict-checked booking that has not been stored yet
#[derive(Debug, Clone)]
pub struct BookingPlan {
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub mentor: MentorListing,
    pub date: NaiveDate,
    pub time: MinuteOfDay,
    pub duration_minutes: u32,
    pub scheduled_start: DateTime<Utc>,
    pub notes: String,
}

/// Payment side of a new session
#[derive(Debug, Clone)]
pub struct PaymentTerms {
    pub mode: PaymentMode,
    pub amount_minor: i64,
    pub currency: String,
    pub due_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
}

/// Session as returned by listings
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_instructions: Option<PaymentInstructions>,
}

pub struct SessionLifecycle {
    sessions: Arc<dyn SessionStore>,
    mentors: Arc<dyn MentorDirectory>,
    validator: SlotValidator,
    sweeper: ExpirySweeper,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    scheduling: SchedulingConfig,
    payments: PaymentsConfig,
}

impl SessionLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        mentors: Arc<dyn MentorDirectory>,
        validator: SlotValidator,
        sweeper: ExpirySweeper,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        scheduling: SchedulingConfig,
        payments: PaymentsConfig,
    ) -> Self {
        Self {
            sessions,
            mentors,
            validator,
            sweeper,
            audit,
            clock,
            scheduling,
            payments,
        }
    }

    fn parse_slot(
        &self,
        date: &str,
        time: &str,
        duration: Option<u32>,
    ) -> Result<(NaiveDate, MinuteOfDay, u32)> {
        let date = parse_date(date)?;
        let time = MinuteOfDay::parse(time)?;
        let duration = duration.unwrap_or(DEFAULT_SESSION_DURATION);

        if !self.scheduling.allows_duration(duration) {
            return Err(AppError::Validation {
                message: format!(
                    "Duration must be one of {:?} minutes",
                    self.scheduling.allowed_durations
                ),
                field: Some("duration_minutes".to_string()),
            });
        }
        Ok((date, time, duration))
    }

    /// Fail with `SlotConflict` if a holding session of the mentor collides
    /// with `[start, start + duration)`
    async fn ensure_slot_free(
        &self,
        mentor_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: u32,
        exclude: Option<Uuid>,
    ) -> Result<()> {
        let end = start + Duration::minutes(i64::from(duration_minutes));
        let nearby = self
            .sessions
            .mentor_sessions_between(mentor_id, start - Duration::days(1), end)
            .await?;

        let conflict = nearby
            .iter()
            .filter(|s| Some(s.id) != exclude && s.session_status().is_holding())
            .any(|s| match self.scheduling.conflict_mode {
                ConflictMode::Exact => s.starts_at() == start,
                ConflictMode::Overlap => s.starts_at() < end && s.ends_at() > start,
            });

        if conflict {
            metrics::record_conflict();
            debug!(mentor_id = %mentor_id, start = %start, "Slot already held");
            return Err(AppError::SlotConflict);
        }
        Ok(())
    }

    /// Run every check a booking needs without writing anything
    pub async fn plan_booking(&self, principal: &Principal, request: &BookingRequest) -> Result<BookingPlan> {
        principal.require_role(Role::Student)?;
        request.validate()?;

        let (date, time, duration) =
            self.parse_slot(&request.date, &request.time, request.duration_minutes)?;

        let mentor_id = parse_reference("mentor", &request.mentor_id)?;
        if mentor_id == principal.user_id {
            return Err(AppError::validation("Cannot book a session with yourself"));
        }

        let mentor = self
            .mentors
            .find_approved_mentor(mentor_id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "mentor",
                id: mentor_id.to_string(),
            })?;

        self.validator.validate(mentor_id, date, time, duration).await?;

        let start = scheduled_start(date, time);
        self.ensure_slot_free(mentor_id, start, duration, None).await?;

        Ok(BookingPlan {
            session_id: Uuid::new_v4(),
            student_id: principal.user_id,
            mentor,
            date,
            time,
            duration_minutes: duration,
            scheduled_start: start,
            notes: request.notes.clone().unwrap_or_default(),
        })
    }

    /// Store a planned booking.
    ///
    /// Manual sessions start in `payment_pending`, gateway sessions in
    /// `pending`. The storage layer rejects a concurrent booking of the
    /// same slot with `SlotConflict`.
    pub async fn commit_booking(&self, plan: BookingPlan, terms: PaymentTerms) -> Result<Session> {
        let now = self.clock.now();
        let status = match terms.mode {
            PaymentMode::Manual => SessionStatus::PaymentPending,
            PaymentMode::Gateway => SessionStatus::Pending,
        };

        let session = Session {
            id: plan.session_id,
            student_id: plan.student_id,
            mentor_id: plan.mentor.id,
            date: plan.date.to_string(),
            time: plan.time.to_string(),
            duration_minutes: plan.duration_minutes as i32,
            scheduled_start: plan.scheduled_start.into(),
            amount_minor: terms.amount_minor,
            currency: terms.currency,
            payment_mode: terms.mode.as_str().to_string(),
            payment_status: PaymentStatus::Pending.as_str().to_string(),
            status: status.as_str().to_string(),
            session_status: SessionStage::Booked.as_str().to_string(),
            payment_due_at: terms.due_at.map(Into::into),
            order_id: terms.order_id,
            payment_id: None,
            payment_signature: None,
            transaction_reference: None,
            payment_screenshot: None,
            payment_reject_reason: None,
            verified_by_admin: false,
            verified_at: None,
            meeting_link: None,
            notes: plan.notes,
            feedback: String::new(),
            created_at: now.into(),
            updated_at: now.into(),
        };

        let session = self.sessions.insert_session(session).await.inspect_err(|e| {
            if matches!(e, AppError::SlotConflict) {
                metrics::record_conflict();
            }
        })?;

        metrics::record_booking(terms.mode.as_str());
        info!(
            session_id = %session.id,
            student_id = %session.student_id,
            mentor_id = %session.mentor_id,
            date = %session.date,
            time = %session.time,
            mode = %session.payment_mode,
            "Session booked"
        );

        let action = match terms.mode {
            PaymentMode::Manual => "session.manual_payment.create",
            PaymentMode::Gateway => "session.order.create",
        };
        audit_best_effort(
            &self.audit,
            AuditEntry::session(
                session.student_id,
                action,
                session.id,
                serde_json::json!({
                    "mentor_id": session.mentor_id,
                    "date": session.date,
                    "time": session.time,
                    "amount_minor": session.amount_minor,
                    "order_id": session.order_id,
                }),
            ),
        )
        .await;

        Ok(session)
    }

    /// Load a session, hiding it unless `visible` holds
    async fn load(&self, id: &str, visible: impl Fn(&Session) -> bool) -> Result<Session> {
        let id = parse_reference("session", id)?;
        self.sessions
            .find_session(id)
            .await?
            .filter(|s| visible(s))
            .ok_or_else(|| AppError::NotFound {
                resource_type: "session",
                id: id.to_string(),
            })
    }

    /// Load a session the caller is a party to
    async fn load_for_party(&self, principal: &Principal, id: &str) -> Result<Session> {
        principal.require_any(&[Role::Student, Role::Mentor])?;
        let session = self.load(id, |_| true).await?;
        if !session.involves(principal.user_id) {
            return Err(AppError::Forbidden {
                message: "Only the session's student or mentor may change it".to_string(),
            });
        }
        Ok(session)
    }

    /// Write `session` if its stored status is still `expected`
    pub(crate) async fn apply(
        &self,
        mut session: Session,
        expected: SessionStatus,
        action: &'static str,
    ) -> Result<Session> {
        session.updated_at = self.clock.now().into();

        if self.sessions.update_guarded(&session, expected).await? {
            metrics::record_transition(action);
            info!(
                session_id = %session.id,
                action,
                from = %expected.as_str(),
                to = %session.status,
                "Session updated"
            );
            return Ok(session);
        }

        // Lost a race: report the status that won
        let current = self
            .sessions
            .find_session(session.id)
            .await?
            .map(|s| s.status)
            .unwrap_or_else(|| "missing".to_string());
        Err(AppError::InvalidStateTransition {
            action,
            status: current,
        })
    }

    async fn audit(&self, actor: Uuid, action: &str, session_id: Uuid, metadata: serde_json::Value) {
        audit_best_effort(&self.audit, AuditEntry::session(actor, action, session_id, metadata)).await;
    }

    async fn decide(
        &self,
        principal: &Principal,
        id: &str,
        target: SessionStatus,
        action: &'static str,
    ) -> Result<Session> {
        principal.require_role(Role::Mentor)?;
        let mut session = self.load(id, |s| s.mentor_id == principal.user_id).await?;

        let current = session.session_status();
        if current != SessionStatus::Pending {
            return Err(AppError::InvalidStateTransition {
                action,
                status: session.status,
            });
        }

        session.set_status(target);
        let session = self.apply(session, current, action).await?;
        self.audit(principal.user_id, &format!("session.{}", action), session.id, serde_json::json!({}))
            .await;
        Ok(session)
    }

    /// Mentor accepts a pending request
    pub async fn approve(&self, principal: &Principal, id: &str) -> Result<Session> {
        self.decide(principal, id, SessionStatus::Approved, "approve").await
    }

    /// Mentor declines a pending request
    pub async fn reject(&self, principal: &Principal, id: &str) -> Result<Session> {
        self.decide(principal, id, SessionStatus::Rejected, "reject").await
    }

    /// Cancel from `pending` or `approved`.
    ///
    /// Students must cancel at least the configured cutoff before the
    /// start; mentors may cancel at any time.
    pub async fn cancel(&self, principal: &Principal, id: &str) -> Result<Session> {
        let mut session = self.load_for_party(principal, id).await?;

        let current = session.session_status();
        if !matches!(current, SessionStatus::Pending | SessionStatus::Approved) {
            return Err(AppError::InvalidStateTransition {
                action: "cancel",
                status: session.status,
            });
        }

        if session.student_id == principal.user_id {
            let cutoff = self.scheduling.student_cancel_cutoff_minutes;
            if session.starts_at() - self.clock.now() < Duration::minutes(cutoff) {
                return Err(AppError::CancellationWindowClosed {
                    cutoff_minutes: cutoff,
                });
            }
        }

        session.set_status(SessionStatus::Cancelled);
        let session = self.apply(session, current, "cancel").await?;
        self.audit(principal.user_id, "session.cancel", session.id, serde_json::json!({}))
            .await;
        Ok(session)
    }

    /// Move a `pending` or `approved` session to a new slot; it goes back
    /// to `pending` for re-approval
    pub async fn reschedule(
        &self,
        principal: &Principal,
        id: &str,
        request: RescheduleRequest,
    ) -> Result<Session> {
        let mut session = self.load_for_party(principal, id).await?;

        let current = session.session_status();
        if !matches!(current, SessionStatus::Pending | SessionStatus::Approved) {
            return Err(AppError::InvalidStateTransition {
                action: "reschedule",
                status: session.status,
            });
        }

        let (date, time, duration) =
            self.parse_slot(&request.date, &request.time, request.duration_minutes)?;
        self.validator
            .validate(session.mentor_id, date, time, duration)
            .await?;

        let start = scheduled_start(date, time);
        self.ensure_slot_free(session.mentor_id, start, duration, Some(session.id))
            .await?;

        session.date = date.to_string();
        session.time = time.to_string();
        session.duration_minutes = duration as i32;
        session.scheduled_start = start.into();
        session.set_status(SessionStatus::Pending);

        let session = self.apply(session, current, "reschedule").await?;
        self.audit(
            principal.user_id,
            "session.reschedule",
            session.id,
            serde_json::json!({
                "date": session.date,
                "time": session.time,
                "duration_minutes": session.duration_minutes,
            }),
        )
        .await;
        Ok(session)
    }

    /// Mentor attaches the call link once payment has settled
    pub async fn update_meeting_link(
        &self,
        principal: &Principal,
        id: &str,
        request: MeetingLinkRequest,
    ) -> Result<Session> {
        principal.require_role(Role::Mentor)?;
        let mut session = self.load(id, |s| s.mentor_id == principal.user_id).await?;
        request.validate()?;

        let current = session.session_status();
        if current.is_terminal() {
            return Err(AppError::InvalidStateTransition {
                action: "update meeting link",
                status: session.status,
            });
        }
        if !session.is_payment_settled() {
            return Err(AppError::PaymentNotSettled);
        }

        session.meeting_link = Some(request.meeting_link.trim().to_string());
        let session = self.apply(session, current, "update meeting link").await?;
        self.audit(principal.user_id, "session.meeting_link.update", session.id, serde_json::json!({}))
            .await;
        Ok(session)
    }

    /// Mentor marks an accepted session as held
    pub async fn complete(&self, principal: &Principal, id: &str) -> Result<Session> {
        principal.require_role(Role::Mentor)?;
        let mut session = self.load(id, |s| s.mentor_id == principal.user_id).await?;

        let current = session.session_status();
        let started = session.starts_at() <= self.clock.now();
        if !matches!(current, SessionStatus::Approved | SessionStatus::Confirmed) || !started {
            return Err(AppError::InvalidStateTransition {
                action: "complete",
                status: session.status,
            });
        }

        session.set_status(SessionStatus::Completed);
        let session = self.apply(session, current, "complete").await?;
        self.audit(principal.user_id, "session.complete", session.id, serde_json::json!({}))
            .await;
        Ok(session)
    }

    /// The calling student's sessions, soonest first
    pub async fn list_for_student(&self, principal: &Principal) -> Result<Vec<SessionView>> {
        principal.require_role(Role::Student)?;
        self.sweeper.sweep_best_effort().await;

        let sessions = self.sessions.sessions_for_student(principal.user_id).await?;
        Ok(sessions
            .into_iter()
            .map(|session| {
                let payment_instructions = needs_instructions(&session)
                    .then(|| PaymentInstructions::for_session(&self.payments, &session));
                SessionView {
                    amount: session.amount(),
                    session,
                    payment_instructions,
                }
            })
            .collect())
    }

    /// The calling mentor's sessions, soonest first
    pub async fn list_for_mentor(&self, principal: &Principal) -> Result<Vec<SessionView>> {
        principal.require_role(Role::Mentor)?;
        self.sweeper.sweep_best_effort().await;

        let sessions = self.sessions.sessions_for_mentor(principal.user_id).await?;
        Ok(sessions
            .into_iter()
            .map(|session| SessionView {
                amount: session.amount(),
                session,
                payment_instructions: None,
            })
            .collect())
    }
}

/// Manual sessions whose payment is still open or was bounced
fn needs_instructions(session: &Session) -> bool {
    session.payment_mode() == PaymentMode::Manual
        && matches!(
            session.payment_status(),
            PaymentStatus::Pending | PaymentStatus::WaitingVerification | PaymentStatus::Rejected
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::InMemoryStore;
    use crate::store::AvailabilityStore;
    use crate::testing::{at, blocked, mentor_listing, rule};

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<FixedClock>,
        lifecycle: SessionLifecycle,
        mentor: Principal,
        student: Principal,
    }

    async fn fixture_with(scheduling: SchedulingConfig) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        // Sunday evening before the Monday rule
        let clock = Arc::new(FixedClock::new(at("2026-10-18T18:00:00Z")));
        let mentor = Principal::new(Uuid::new_v4(), Role::Mentor);
        let student = Principal::new(Uuid::new_v4(), Role::Student);

        store.add_mentor(mentor_listing(mentor.user_id), true).await;
        store
            .insert_entry(rule(mentor.user_id, "Mon", "09:00", "12:00", 30))
            .await
            .unwrap();

        let lifecycle = SessionLifecycle::new(
            store.clone(),
            store.clone(),
            SlotValidator::new(store.clone()),
            ExpirySweeper::new(store.clone(), clock.clone()),
            store.clone(),
            clock.clone(),
            scheduling,
            PaymentsConfig::default(),
        );

        Fixture {
            store,
            clock,
            lifecycle,
            mentor,
            student,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(SchedulingConfig::default()).await
    }

    fn request(f: &Fixture, time: &str, duration: u32) -> BookingRequest {
        BookingRequest {
            mentor_id: f.mentor.user_id.to_string(),
            date: "2026-10-19".to_string(),
            time: time.to_string(),
            duration_minutes: Some(duration),
            notes: None,
            payment_mode: None,
        }
    }

    fn gateway_terms() -> PaymentTerms {
        PaymentTerms {
            mode: PaymentMode::Gateway,
            amount_minor: 49_900,
            currency: "INR".to_string(),
            due_at: None,
            order_id: Some("order_1".to_string()),
        }
    }

    async fn book(f: &Fixture, time: &str) -> Session {
        let plan = f.lifecycle.plan_booking(&f.student, &request(f, time, 30)).await.unwrap();
        f.lifecycle.commit_booking(plan, gateway_terms()).await.unwrap()
    }

    #[tokio::test]
    async fn test_book_creates_pending_session() {
        let f = fixture().await;
        let session = book(&f, "09:30").await;

        assert_eq!(session.session_status(), SessionStatus::Pending);
        assert_eq!(session.stage(), SessionStage::Booked);
        assert_eq!(session.starts_at(), at("2026-10-19T09:30:00Z"));
        assert_eq!(f.store.audit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_double_booking_is_a_conflict() {
        let f = fixture().await;
        book(&f, "09:00").await;

        let other = Principal::new(Uuid::new_v4(), Role::Student);
        let err = f
            .lifecycle
            .plan_booking(&other, &request(&f, "09:00", 30))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotConflict));
    }

    #[tokio::test]
    async fn test_racing_commits_hold_one_slot() {
        let f = fixture().await;

        // Both plans pass the pre-check before either is stored
        let first = f.lifecycle.plan_booking(&f.student, &request(&f, "10:00", 30)).await.unwrap();
        let second = f.lifecycle.plan_booking(&f.student, &request(&f, "10:00", 30)).await.unwrap();

        f.lifecycle.commit_booking(first, gateway_terms()).await.unwrap();
        let err = f.lifecycle.commit_booking(second, gateway_terms()).await.unwrap_err();
        assert!(matches!(err, AppError::SlotConflict));
    }

    #[tokio::test]
    async fn test_cancelled_session_frees_the_slot() {
        let f = fixture().await;
        let session = book(&f, "09:00").await;
        f.lifecycle.cancel(&f.mentor, &session.id.to_string()).await.unwrap();

        assert!(f.lifecycle.plan_booking(&f.student, &request(&f, "09:00", 30)).await.is_ok());
    }

    #[tokio::test]
    async fn test_overlap_mode_catches_staggered_sessions() {
        let mut config = SchedulingConfig::default();
        config.conflict_mode = ConflictMode::Overlap;
        let strict = fixture_with(config).await;
        let plan = strict
            .lifecycle
            .plan_booking(&strict.student, &request(&strict, "09:00", 60))
            .await
            .unwrap();
        strict.lifecycle.commit_booking(plan, gateway_terms()).await.unwrap();

        let err = strict
            .lifecycle
            .plan_booking(&strict.student, &request(&strict, "09:30", 30))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotConflict));
        assert!(strict
            .lifecycle
            .plan_booking(&strict.student, &request(&strict, "10:00", 30))
            .await
            .is_ok());

        // Exact mode lets the same staggered pair through
        let lenient = fixture().await;
        let plan = lenient
            .lifecycle
            .plan_booking(&lenient.student, &request(&lenient, "09:00", 60))
            .await
            .unwrap();
        lenient.lifecycle.commit_booking(plan, gateway_terms()).await.unwrap();
        assert!(lenient
            .lifecycle
            .plan_booking(&lenient.student, &request(&lenient, "09:30", 30))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_booking_validation_failures() {
        let f = fixture().await;

        let mut own = request(&f, "09:00", 30);
        own.mentor_id = f.student.user_id.to_string();
        assert!(matches!(
            f.lifecycle.plan_booking(&f.student, &own).await,
            Err(AppError::Validation { .. })
        ));

        let mut bad_id = request(&f, "09:00", 30);
        bad_id.mentor_id = "abc".to_string();
        assert!(matches!(
            f.lifecycle.plan_booking(&f.student, &bad_id).await,
            Err(AppError::InvalidReference { .. })
        ));

        let mut unknown = request(&f, "09:00", 30);
        unknown.mentor_id = Uuid::new_v4().to_string();
        assert!(matches!(
            f.lifecycle.plan_booking(&f.student, &unknown).await,
            Err(AppError::NotFound { .. })
        ));

        assert!(matches!(
            f.lifecycle.plan_booking(&f.student, &request(&f, "09:00", 45)).await,
            Err(AppError::Validation { .. })
        ));

        let mut long_notes = request(&f, "09:00", 30);
        long_notes.notes = Some("x".repeat(601));
        assert!(matches!(
            f.lifecycle.plan_booking(&f.student, &long_notes).await,
            Err(AppError::Validation { .. })
        ));

        assert!(matches!(
            f.lifecycle.plan_booking(&f.student, &request(&f, "11:45", 30)).await,
            Err(AppError::SlotOutsideAvailability)
        ));

        assert!(matches!(
            f.lifecycle.plan_booking(&f.mentor, &request(&f, "09:00", 30)).await,
            Err(AppError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_blocked_date_rejects_booking() {
        let f = fixture().await;
        f.store
            .insert_entry(blocked(f.mentor.user_id, parse_date("2026-10-19").unwrap()))
            .await
            .unwrap();

        assert!(matches!(
            f.lifecycle.plan_booking(&f.student, &request(&f, "09:00", 30)).await,
            Err(AppError::SlotBlocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_approve_is_compare_and_swap() {
        let f = fixture().await;
        let session = book(&f, "09:00").await;
        let id = session.id.to_string();

        let approved = f.lifecycle.approve(&f.mentor, &id).await.unwrap();
        assert_eq!(approved.session_status(), SessionStatus::Approved);

        let err = f.lifecycle.approve(&f.mentor, &id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition { .. }));
        assert!(matches!(
            f.lifecycle.reject(&f.mentor, &id).await,
            Err(AppError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_other_mentor_cannot_see_session() {
        let f = fixture().await;
        let session = book(&f, "09:00").await;
        let stranger = Principal::new(Uuid::new_v4(), Role::Mentor);

        assert!(matches!(
            f.lifecycle.approve(&stranger, &session.id.to_string()).await,
            Err(AppError::NotFound { .. })
        ));
        assert!(matches!(
            f.lifecycle.cancel(&stranger, &session.id.to_string()).await,
            Err(AppError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_student_cancellation_cutoff() {
        let f = fixture().await;
        let session = book(&f, "09:00").await;
        let id = session.id.to_string();

        f.clock.set(at("2026-10-19T07:30:00Z"));
        let err = f.lifecycle.cancel(&f.student, &id).await.unwrap_err();
        assert!(matches!(err, AppError::CancellationWindowClosed { cutoff_minutes: 120 }));

        f.clock.set(at("2026-10-19T06:59:00Z"));
        let cancelled = f.lifecycle.cancel(&f.student, &id).await.unwrap();
        assert_eq!(cancelled.session_status(), SessionStatus::Cancelled);

        assert!(matches!(
            f.lifecycle.cancel(&f.student, &id).await,
            Err(AppError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_mentor_cancels_without_cutoff() {
        let f = fixture().await;
        let session = book(&f, "09:00").await;

        f.clock.set(at("2026-10-19T08:50:00Z"));
        let cancelled = f.lifecycle.cancel(&f.mentor, &session.id.to_string()).await.unwrap();
        assert_eq!(cancelled.session_status(), SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_reschedule_outside_availability_leaves_session() {
        let f = fixture().await;
        let session = book(&f, "09:00").await;
        let id = session.id.to_string();
        f.lifecycle.approve(&f.mentor, &id).await.unwrap();

        let err = f
            .lifecycle
            .reschedule(
                &f.student,
                &id,
                RescheduleRequest {
                    date: "2026-10-20".to_string(),
                    time: "09:00".to_string(),
                    duration_minutes: Some(30),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotOutsideAvailability));

        let stored = f.store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.date, "2026-10-19");
        assert_eq!(stored.time, "09:00");
        assert_eq!(stored.session_status(), SessionStatus::Approved);
    }

    #[tokio::test]
    async fn test_reschedule_resets_to_pending() {
        let f = fixture().await;
        let session = book(&f, "09:00").await;
        let id = session.id.to_string();
        f.lifecycle.approve(&f.mentor, &id).await.unwrap();

        let moved = f
            .lifecycle
            .reschedule(
                &f.mentor,
                &id,
                RescheduleRequest {
                    date: "2026-10-26".to_string(),
                    time: "11:00".to_string(),
                    duration_minutes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(moved.session_status(), SessionStatus::Pending);
        assert_eq!(moved.duration_minutes, 60);
        assert_eq!(moved.starts_at(), at("2026-10-26T11:00:00Z"));
    }

    #[tokio::test]
    async fn test_reschedule_onto_taken_slot_conflicts() {
        let f = fixture().await;
        book(&f, "09:00").await;
        let second = book(&f, "09:30").await;

        let err = f
            .lifecycle
            .reschedule(
                &f.student,
                &second.id.to_string(),
                RescheduleRequest {
                    date: "2026-10-19".to_string(),
                    time: "09:00".to_string(),
                    duration_minutes: Some(30),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlotConflict));

        // Rescheduling onto its own current slot is not a conflict
        assert!(f
            .lifecycle
            .reschedule(
                &f.student,
                &second.id.to_string(),
                RescheduleRequest {
                    date: "2026-10-19".to_string(),
                    time: "09:30".to_string(),
                    duration_minutes: Some(30),
                },
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_meeting_link_requires_settled_payment() {
        let f = fixture().await;
        let session = book(&f, "09:00").await;
        let id = session.id.to_string();
        let link = MeetingLinkRequest {
            meeting_link: "https://meet.example.com/abc".to_string(),
        };

        assert!(matches!(
            f.lifecycle.update_meeting_link(&f.mentor, &id, link.clone()).await,
            Err(AppError::PaymentNotSettled)
        ));

        let mut paid = f.store.find_session(session.id).await.unwrap().unwrap();
        paid.set_payment_status(PaymentStatus::Paid);
        paid.set_stage(SessionStage::Confirmed);
        paid.set_status(SessionStatus::Approved);
        f.store.update_guarded(&paid, SessionStatus::Pending).await.unwrap();

        let bad = MeetingLinkRequest {
            meeting_link: "not a url".to_string(),
        };
        assert!(matches!(
            f.lifecycle.update_meeting_link(&f.mentor, &id, bad).await,
            Err(AppError::Validation { .. })
        ));

        let updated = f.lifecycle.update_meeting_link(&f.mentor, &id, link).await.unwrap();
        assert_eq!(updated.meeting_link.as_deref(), Some("https://meet.example.com/abc"));
    }

    #[tokio::test]
    async fn test_complete_only_after_start() {
        let f = fixture().await;
        let session = book(&f, "09:00").await;
        let id = session.id.to_string();
        f.lifecycle.approve(&f.mentor, &id).await.unwrap();

        assert!(matches!(
            f.lifecycle.complete(&f.mentor, &id).await,
            Err(AppError::InvalidStateTransition { .. })
        ));

        f.clock.set(at("2026-10-19T09:45:00Z"));
        let done = f.lifecycle.complete(&f.mentor, &id).await.unwrap();
        assert_eq!(done.session_status(), SessionStatus::Completed);
        assert!(matches!(
            f.lifecycle.cancel(&f.mentor, &id).await,
            Err(AppError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_listings_are_ordered_and_scoped() {
        let f = fixture().await;
        book(&f, "10:00").await;
        book(&f, "09:00").await;

        let mine = f.lifecycle.list_for_student(&f.student).await.unwrap();
        let times: Vec<&str> = mine.iter().map(|v| v.session.time.as_str()).collect();
        assert_eq!(times, vec!["09:00", "10:00"]);
        assert!(mine.iter().all(|v| v.payment_instructions.is_none()));
        assert_eq!(mine[0].amount, 499.0);

        let other = Principal::new(Uuid::new_v4(), Role::Student);
        assert!(f.lifecycle.list_for_student(&other).await.unwrap().is_empty());
        assert_eq!(f.lifecycle.list_for_mentor(&f.mentor).await.unwrap().len(), 2);
    }

    async fn settle(f: &Fixture, session: &Session) {
        let mut paid = f.store.find_session(session.id).await.unwrap().unwrap();
        paid.set_payment_status(PaymentStatus::Paid);
        paid.set_stage(SessionStage::Confirmed);
        paid.set_status(SessionStatus::Approved);
        assert!(f.store.update_guarded(&paid, SessionStatus::Pending).await.unwrap());
    }

    fn meeting_link() -> MeetingLinkRequest {
        MeetingLinkRequest {
            meeting_link: "https://meet.example.com/abc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_meeting_link_refused_after_cancel() {
        let f = fixture().await;
        let session = book(&f, "09:00").await;
        let id = session.id.to_string();
        settle(&f, &session).await;
        f.lifecycle.cancel(&f.mentor, &id).await.unwrap();

        assert!(matches!(
            f.lifecycle.update_meeting_link(&f.mentor, &id, meeting_link()).await,
            Err(AppError::InvalidStateTransition { .. })
        ));
        let stored = f.store.find_session(session.id).await.unwrap().unwrap();
        assert!(stored.meeting_link.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_writes_leave_terminal_sessions_alone() {
        for terminal in [
            SessionStatus::Cancelled,
            SessionStatus::Rejected,
            SessionStatus::Completed,
        ] {
            let f = fixture().await;
            let session = book(&f, "09:00").await;
            let id = session.id.to_string();
            settle(&f, &session).await;

            let mut stored = f.store.find_session(session.id).await.unwrap().unwrap();
            stored.set_status(terminal);
            assert!(f.store.update_guarded(&stored, SessionStatus::Approved).await.unwrap());

            // Past the start, so only the status can refuse completion
            f.clock.set(at("2026-10-19T09:45:00Z"));

            let reschedule = RescheduleRequest {
                date: "2026-10-26".to_string(),
                time: "10:00".to_string(),
                duration_minutes: Some(30),
            };
            let attempts = [
                ("approve", f.lifecycle.approve(&f.mentor, &id).await),
                ("reject", f.lifecycle.reject(&f.mentor, &id).await),
                ("mentor cancel", f.lifecycle.cancel(&f.mentor, &id).await),
                ("student cancel", f.lifecycle.cancel(&f.student, &id).await),
                ("reschedule", f.lifecycle.reschedule(&f.student, &id, reschedule).await),
                (
                    "meeting link",
                    f.lifecycle.update_meeting_link(&f.mentor, &id, meeting_link()).await,
                ),
                ("complete", f.lifecycle.complete(&f.mentor, &id).await),
            ];
            for (name, result) in attempts {
                assert!(
                    matches!(result, Err(AppError::InvalidStateTransition { .. })),
                    "{} on a {} session",
                    name,
                    terminal.as_str()
                );
            }

            let after = f.store.find_session(session.id).await.unwrap().unwrap();
            assert_eq!(after.session_status(), terminal);
            assert_eq!(after.date, "2026-10-19");
            assert_eq!(after.time, "09:00");
            assert!(after.meeting_link.is_none());
        }
    }
}
