//! Payment orchestration for session bookings
//!
//! Two modes share one booking path:
//! - Manual: the session waits in `payment_pending` until the student
//!   submits proof and an admin reviews it
//! - Gateway: an order is opened upstream before the session is stored,
//!   and the signed receipt confirms it

pub mod gateway;
pub mod pricing;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{Principal, Role};
use crate::booking::{BookingRequest, PaymentTerms, SessionLifecycle};
use crate::clock::Clock;
use crate::config::PaymentsConfig;
use crate::db::models::{PaymentMode, PaymentStatus, Session, SessionStage, SessionStatus};
use crate::errors::{parse_reference, AppError, Result};
use crate::metrics;
use crate::notify::{audit_best_effort, notify_best_effort, AuditEntry, AuditSink, NewNotification, NotificationSink};
use crate::store::{SessionStore, EXPIRED_REASON};
use crate::sweeper::ExpirySweeper;

pub use gateway::{create_gateway, GatewayOrder, MockGateway, OrderRequest, PaymentGateway};

const DEFAULT_REJECT_REASON: &str = "Payment could not be verified";

/// Static transfer instructions for a manual-mode session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentInstructions {
    pub upi_id: String,
    pub qr_image_url: String,
    pub amount: f64,
    pub currency: String,
    pub due_at: Option<DateTime<Utc>>,
}

impl PaymentInstructions {
    pub fn for_session(config: &PaymentsConfig, session: &Session) -> Self {
        Self {
            upi_id: config.upi_id.clone(),
            qr_image_url: config.qr_image_url.clone(),
            amount: session.amount(),
            currency: session.currency.clone(),
            due_at: session.payment_due_at.map(|d| d.with_timezone(&Utc)),
        }
    }
}

/// Checkout parameters for the client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

/// Result of creating a booking
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BookingOutcome {
    Manual {
        session: Session,
        payment_instructions: PaymentInstructions,
    },
    Gateway {
        session: Session,
        order: CheckoutOrder,
    },
}

impl BookingOutcome {
    pub fn session(&self) -> &Session {
        match self {
            BookingOutcome::Manual { session, .. } | BookingOutcome::Gateway { session, .. } => session,
        }
    }
}

/// Signed receipt returned by the checkout client
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    pub session_id: String,
    #[validate(length(min = 1, max = 100))]
    pub order_id: String,
    #[validate(length(min = 1, max = 100))]
    pub payment_id: String,
    #[validate(length(min = 1, max = 256))]
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ManualProofRequest {
    #[validate(length(min = 1, max = 120))]
    pub transaction_reference: String,
    /// Opaque reference to an already uploaded image
    #[validate(length(max = 500))]
    pub payment_screenshot: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Verify,
    Reject,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReviewRequest {
    pub action: ReviewAction,
    #[validate(length(max = 300))]
    pub reject_reason: Option<String>,
}

pub struct PaymentOrchestrator {
    lifecycle: Arc<SessionLifecycle>,
    sessions: Arc<dyn SessionStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifications: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
    sweeper: ExpirySweeper,
    clock: Arc<dyn Clock>,
    config: PaymentsConfig,
}

impl PaymentOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lifecycle: Arc<SessionLifecycle>,
        sessions: Arc<dyn SessionStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
        sweeper: ExpirySweeper,
        clock: Arc<dyn Clock>,
        config: PaymentsConfig,
    ) -> Self {
        Self {
            lifecycle,
            sessions,
            gateway,
            notifications,
            audit,
            sweeper,
            clock,
            config,
        }
    }

    /// Book a slot and open its payment.
    ///
    /// In gateway mode the upstream order is created first; if it fails no
    /// session exists afterwards.
    pub async fn create_order(&self, principal: &Principal, request: BookingRequest) -> Result<BookingOutcome> {
        self.sweeper.sweep().await?;

        let plan = self.lifecycle.plan_booking(principal, &request).await?;
        let mode = request.payment_mode.unwrap_or(self.config.mode);
        let amount_minor = pricing::resolve_session_amount(&plan.mentor, self.config.default_session_price);
        let currency = self.config.currency.clone();

        match mode {
            PaymentMode::Manual => {
                let due_at = self.clock.now() + self.config.manual_window();
                let session = self
                    .lifecycle
                    .commit_booking(
                        plan,
                        PaymentTerms {
                            mode,
                            amount_minor,
                            currency,
                            due_at: Some(due_at),
                            order_id: None,
                        },
                    )
                    .await?;

                let payment_instructions = PaymentInstructions::for_session(&self.config, &session);
                Ok(BookingOutcome::Manual {
                    session,
                    payment_instructions,
                })
            }
            PaymentMode::Gateway => {
                let order = self
                    .gateway
                    .create_order(&OrderRequest {
                        amount: amount_minor,
                        currency: currency.clone(),
                        receipt: format!("sess_{}", plan.session_id.simple()),
                        notes: serde_json::json!({
                            "student_id": plan.student_id,
                            "mentor_id": plan.mentor.id,
                            "date": plan.date.to_string(),
                            "time": plan.time.to_string(),
                        }),
                    })
                    .await?;

                let session = self
                    .lifecycle
                    .commit_booking(
                        plan,
                        PaymentTerms {
                            mode,
                            amount_minor,
                            currency,
                            due_at: None,
                            order_id: Some(order.id.clone()),
                        },
                    )
                    .await
                    .inspect_err(|e| {
                        warn!(
                            order_id = %order.id,
                            provider = self.gateway.provider(),
                            error = %e,
                            "Upstream order left without a session"
                        );
                    })?;

                Ok(BookingOutcome::Gateway {
                    session,
                    order: CheckoutOrder {
                        id: order.id,
                        amount: order.amount,
                        currency: order.currency,
                        key_id: self.gateway.key_id().to_string(),
                    },
                })
            }
        }
    }

    async fn load_owned(&self, principal: &Principal, id: &str) -> Result<Session> {
        let id = parse_reference("session", id)?;
        self.sessions
            .find_session(id)
            .await?
            .filter(|s| s.student_id == principal.user_id)
            .ok_or_else(|| AppError::NotFound {
                resource_type: "session",
                id: id.to_string(),
            })
    }

    /// Confirm a gateway session from its signed receipt. Verifying an
    /// already paid session succeeds without writing.
    pub async fn verify_gateway_payment(
        &self,
        principal: &Principal,
        request: VerifyPaymentRequest,
    ) -> Result<Session> {
        principal.require_role(Role::Student)?;
        let mut session = self.load_owned(principal, &request.session_id).await?;
        request.validate()?;

        if session.payment_mode() != PaymentMode::Gateway {
            return Err(AppError::WrongPaymentMode { expected: "gateway" });
        }
        if session.payment_status() == PaymentStatus::Paid {
            return Ok(session);
        }
        if session.order_id.as_deref() != Some(request.order_id.as_str()) {
            return Err(AppError::Validation {
                message: "Order id mismatch".to_string(),
                field: Some("order_id".to_string()),
            });
        }

        if !self
            .gateway
            .verify_signature(&request.order_id, &request.payment_id, &request.signature)
        {
            metrics::record_payment("gateway", "bad_signature");
            warn!(session_id = %session.id, order_id = %request.order_id, "Payment signature mismatch");
            return Err(AppError::InvalidPaymentSignature);
        }

        let current = session.session_status();
        if !matches!(current, SessionStatus::Pending | SessionStatus::Approved) {
            return Err(AppError::InvalidStateTransition {
                action: "verify payment",
                status: session.status,
            });
        }

        session.set_payment_status(PaymentStatus::Paid);
        session.payment_id = Some(request.payment_id.clone());
        session.payment_signature = Some(request.signature.clone());
        session.set_stage(SessionStage::Confirmed);
        session.set_status(SessionStatus::Approved);

        let session = self.lifecycle.apply(session, current, "verify payment").await?;
        metrics::record_payment("gateway", "paid");

        audit_best_effort(
            &self.audit,
            AuditEntry::session(
                principal.user_id,
                "session.payment.verify",
                session.id,
                serde_json::json!({
                    "order_id": request.order_id,
                    "payment_id": request.payment_id,
                }),
            ),
        )
        .await;

        Ok(session)
    }

    /// Attach transfer proof to a manual session and queue it for review
    pub async fn submit_manual_proof(
        &self,
        principal: &Principal,
        id: &str,
        request: ManualProofRequest,
    ) -> Result<Session> {
        principal.require_role(Role::Student)?;
        self.sweeper.sweep().await?;

        let mut session = self.load_owned(principal, id).await?;
        if session.payment_mode() != PaymentMode::Manual {
            return Err(AppError::WrongPaymentMode { expected: "manual" });
        }

        let now = self.clock.now();
        let current = session.session_status();
        if session.payment_window_elapsed(now)
            && matches!(current, SessionStatus::PaymentPending | SessionStatus::Cancelled)
        {
            self.expire(session).await?;
            return Err(AppError::PaymentWindowExpired);
        }

        if !matches!(current, SessionStatus::PaymentPending | SessionStatus::Pending) {
            return Err(AppError::InvalidStateTransition {
                action: "submit payment proof",
                status: session.status,
            });
        }

        request.validate()?;
        let reference = request.transaction_reference.trim();
        if reference.is_empty() {
            return Err(AppError::Validation {
                message: "Transaction reference is required".to_string(),
                field: Some("transaction_reference".to_string()),
            });
        }

        session.transaction_reference = Some(reference.to_string());
        session.payment_screenshot = request
            .payment_screenshot
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        session.set_payment_status(PaymentStatus::WaitingVerification);
        session.set_status(SessionStatus::Pending);
        session.payment_reject_reason = None;

        let session = self.lifecycle.apply(session, current, "submit payment proof").await?;
        metrics::record_payment("manual", "submitted");

        audit_best_effort(
            &self.audit,
            AuditEntry::session(
                principal.user_id,
                "session.manual_payment.submit",
                session.id,
                serde_json::json!({ "transaction_reference": session.transaction_reference }),
            ),
        )
        .await;

        Ok(session)
    }

    /// Persist the cancellation of a session whose payment window closed
    async fn expire(&self, mut session: Session) -> Result<()> {
        let current = session.session_status();
        if current != SessionStatus::PaymentPending {
            return Ok(());
        }

        session.set_status(SessionStatus::Cancelled);
        session.set_payment_status(PaymentStatus::Rejected);
        session.payment_reject_reason = Some(EXPIRED_REASON.to_string());
        session.updated_at = self.clock.now().into();

        // A concurrent writer already moved it; the expiry error stands either way
        if self.sessions.update_guarded(&session, current).await? {
            metrics::record_expired(1);
            info!(session_id = %session.id, "Manual payment window expired");
        }
        Ok(())
    }

    /// Manual sessions waiting on an admin, most recently updated first
    pub async fn pending_manual_payments(&self, principal: &Principal) -> Result<Vec<Session>> {
        principal.require_role(Role::Admin)?;
        self.sweeper.sweep_best_effort().await;
        self.sessions.pending_manual_reviews().await
    }

    /// Admin decision on submitted proof
    pub async fn review_manual_payment(
        &self,
        principal: &Principal,
        id: &str,
        request: ReviewRequest,
    ) -> Result<Session> {
        principal.require_role(Role::Admin)?;
        request.validate()?;

        let id = parse_reference("session", id)?;
        let mut session = self
            .sessions
            .find_session(id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "session",
                id: id.to_string(),
            })?;

        if session.payment_mode() != PaymentMode::Manual {
            return Err(AppError::WrongPaymentMode { expected: "manual" });
        }
        let current = session.session_status();
        if !matches!(current, SessionStatus::Pending | SessionStatus::PaymentPending) {
            return Err(AppError::InvalidStateTransition {
                action: "review payment",
                status: session.status,
            });
        }
        if session.payment_status() != PaymentStatus::WaitingVerification {
            return Err(AppError::InvalidStateTransition {
                action: "review payment",
                status: session.payment_status,
            });
        }

        let now = self.clock.now();

        let (student_msg, mentor_msg, action, outcome) = match request.action {
            ReviewAction::Verify => {
                session.set_payment_status(PaymentStatus::Verified);
                session.verified_by_admin = true;
                session.verified_at = Some(now.into());
                session.set_stage(SessionStage::Confirmed);
                session.set_status(SessionStatus::Confirmed);
                session.payment_reject_reason = None;
                (
                    NewNotification::direct(
                        "student",
                        session.student_id,
                        principal.user_id,
                        "Payment Verified",
                        "Your session payment is verified. Session is confirmed.",
                    ),
                    NewNotification::direct(
                        "mentor",
                        session.mentor_id,
                        principal.user_id,
                        "Session Confirmed",
                        "A student's manual payment was verified. Session is now confirmed.",
                    ),
                    "session.manual_payment.verify",
                    "verified",
                )
            }
            ReviewAction::Reject => {
                let reason = request
                    .reject_reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .unwrap_or(DEFAULT_REJECT_REASON)
                    .to_string();

                session.set_payment_status(PaymentStatus::Rejected);
                session.set_status(SessionStatus::Cancelled);
                session.set_stage(SessionStage::Booked);
                session.payment_reject_reason = Some(reason.clone());
                (
                    NewNotification::direct(
                        "student",
                        session.student_id,
                        principal.user_id,
                        "Payment Rejected",
                        format!("Your session payment was rejected. Reason: {}", reason),
                    ),
                    NewNotification::direct(
                        "mentor",
                        session.mentor_id,
                        principal.user_id,
                        "Session Payment Rejected",
                        "A student's manual payment was rejected. Session has been cancelled.",
                    ),
                    "session.manual_payment.reject",
                    "rejected",
                )
            }
        };

        let session = self.lifecycle.apply(session, current, "review payment").await?;
        metrics::record_payment("manual", outcome);

        notify_best_effort(&self.notifications, student_msg).await;
        notify_best_effort(&self.notifications, mentor_msg).await;
        audit_best_effort(
            &self.audit,
            AuditEntry::session(
                principal.user_id,
                action,
                session.id,
                serde_json::json!({ "reject_reason": session.payment_reject_reason }),
            ),
        )
        .await;

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::SchedulingConfig;
    use crate::scheduling::SlotValidator;
    use crate::store::{AvailabilityStore, InMemoryStore};
    use crate::testing::{at, mentor_listing, rule};
    use chrono::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<FixedClock>,
        gateway: Arc<MockGateway>,
        payments: PaymentOrchestrator,
        lifecycle: Arc<SessionLifecycle>,
        mentor: Principal,
        student: Principal,
        admin: Principal,
    }

    async fn fixture_with(gateway: MockGateway, config: PaymentsConfig) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FixedClock::new(at("2026-10-18T18:00:00Z")));
        let gateway = Arc::new(gateway);
        let mentor = Principal::new(Uuid::new_v4(), Role::Mentor);
        let student = Principal::new(Uuid::new_v4(), Role::Student);
        let admin = Principal::new(Uuid::new_v4(), Role::Admin);

        let mut listing = mentor_listing(mentor.user_id);
        listing.profile_price = Some(799.0);
        store.add_mentor(listing, true).await;
        store
            .insert_entry(rule(mentor.user_id, "Mon", "09:00", "12:00", 30))
            .await
            .unwrap();

        let sweeper = ExpirySweeper::new(store.clone(), clock.clone());
        let lifecycle = Arc::new(SessionLifecycle::new(
            store.clone(),
            store.clone(),
            SlotValidator::new(store.clone()),
            sweeper.clone(),
            store.clone(),
            clock.clone(),
            SchedulingConfig::default(),
            config.clone(),
        ));
        let payments = PaymentOrchestrator::new(
            lifecycle.clone(),
            store.clone(),
            gateway.clone(),
            store.clone(),
            store.clone(),
            sweeper,
            clock.clone(),
            config,
        );

        Fixture {
            store,
            clock,
            gateway,
            payments,
            lifecycle,
            mentor,
            student,
            admin,
        }
    }

    async fn fixture() -> Fixture {
        let mut config = PaymentsConfig::default();
        config.upi_id = "mentorhub@upi".to_string();
        fixture_with(MockGateway::new("test_secret"), config).await
    }

    fn booking(f: &Fixture, time: &str, mode: PaymentMode) -> BookingRequest {
        BookingRequest {
            mentor_id: f.mentor.user_id.to_string(),
            date: "2026-10-19".to_string(),
            time: time.to_string(),
            duration_minutes: Some(30),
            notes: Some("Career chat".to_string()),
            payment_mode: Some(mode),
        }
    }

    fn proof() -> ManualProofRequest {
        ManualProofRequest {
            transaction_reference: "  UTR123456  ".to_string(),
            payment_screenshot: Some("uploads/proof.png".to_string()),
        }
    }

    async fn gateway_booking(f: &Fixture) -> (Session, CheckoutOrder) {
        match f.payments.create_order(&f.student, booking(f, "09:00", PaymentMode::Gateway)).await.unwrap() {
            BookingOutcome::Gateway { session, order } => (session, order),
            other => panic!("expected gateway outcome, got {:?}", other),
        }
    }

    async fn manual_booking(f: &Fixture) -> Session {
        f.payments
            .create_order(&f.student, booking(f, "09:00", PaymentMode::Manual))
            .await
            .unwrap()
            .session()
            .clone()
    }

    fn receipt(f: &Fixture, session: &Session, payment_id: &str) -> VerifyPaymentRequest {
        let order_id = session.order_id.clone().unwrap();
        VerifyPaymentRequest {
            session_id: session.id.to_string(),
            signature: f.gateway.sign(&order_id, payment_id).unwrap(),
            order_id,
            payment_id: payment_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_manual_booking_freezes_price_and_window() {
        let f = fixture().await;
        let outcome = f
            .payments
            .create_order(&f.student, booking(&f, "09:00", PaymentMode::Manual))
            .await
            .unwrap();

        let BookingOutcome::Manual { session, payment_instructions } = outcome else {
            panic!("expected manual outcome");
        };
        assert_eq!(session.session_status(), SessionStatus::PaymentPending);
        assert_eq!(session.amount_minor, 79_900);
        assert_eq!(payment_instructions.amount, 799.0);
        assert_eq!(payment_instructions.upi_id, "mentorhub@upi");
        assert_eq!(payment_instructions.due_at, Some(at("2026-10-18T18:30:00Z")));
    }

    #[tokio::test]
    async fn test_gateway_booking_opens_order() {
        let f = fixture().await;
        let (session, order) = gateway_booking(&f).await;

        assert_eq!(session.session_status(), SessionStatus::Pending);
        assert_eq!(session.order_id.as_deref(), Some(order.id.as_str()));
        assert_eq!(order.amount, 79_900);
        assert_eq!(order.key_id, "mock_key");
        assert!(session.payment_due_at.is_none());
    }

    #[tokio::test]
    async fn test_mode_defaults_to_config() {
        let mut config = PaymentsConfig::default();
        config.mode = PaymentMode::Gateway;
        let f = fixture_with(MockGateway::new("s"), config).await;

        let mut request = booking(&f, "09:00", PaymentMode::Manual);
        request.payment_mode = None;
        let outcome = f.payments.create_order(&f.student, request).await.unwrap();
        assert!(matches!(outcome, BookingOutcome::Gateway { .. }));
    }

    #[tokio::test]
    async fn test_upstream_failure_creates_no_session() {
        let f = fixture_with(
            MockGateway::failing("Amount exceeds maximum amount allowed"),
            PaymentsConfig::default(),
        )
        .await;

        let err = f
            .payments
            .create_order(&f.student, booking(&f, "09:00", PaymentMode::Gateway))
            .await
            .unwrap_err();
        match err {
            AppError::UpstreamPaymentFailure { reason, .. } => {
                assert_eq!(reason, "Amount exceeds maximum amount allowed")
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(f.store.sessions_for_student(f.student.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verify_payment_confirms_and_is_idempotent() {
        let f = fixture().await;
        let (session, _) = gateway_booking(&f).await;

        let paid = f
            .payments
            .verify_gateway_payment(&f.student, receipt(&f, &session, "pay_1"))
            .await
            .unwrap();
        assert_eq!(paid.payment_status(), PaymentStatus::Paid);
        assert_eq!(paid.session_status(), SessionStatus::Approved);
        assert_eq!(paid.stage(), SessionStage::Confirmed);
        assert_eq!(paid.payment_id.as_deref(), Some("pay_1"));

        // A second receipt for a paid session changes nothing
        let again = f
            .payments
            .verify_gateway_payment(&f.student, receipt(&f, &session, "pay_2"))
            .await
            .unwrap();
        assert_eq!(again.payment_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn test_tampered_signature_writes_nothing() {
        let f = fixture().await;
        let (session, _) = gateway_booking(&f).await;

        let mut request = receipt(&f, &session, "pay_1");
        request.payment_id = "pay_other".to_string();
        let err = f.payments.verify_gateway_payment(&f.student, request).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidPaymentSignature));

        let stored = f.store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status(), PaymentStatus::Pending);
        assert!(stored.payment_id.is_none());
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_order_owner_and_mode() {
        let f = fixture().await;
        let (session, _) = gateway_booking(&f).await;

        let mut mismatch = receipt(&f, &session, "pay_1");
        mismatch.order_id = "order_elsewhere".to_string();
        assert!(matches!(
            f.payments.verify_gateway_payment(&f.student, mismatch).await,
            Err(AppError::Validation { .. })
        ));

        let stranger = Principal::new(Uuid::new_v4(), Role::Student);
        assert!(matches!(
            f.payments
                .verify_gateway_payment(&stranger, receipt(&f, &session, "pay_1"))
                .await,
            Err(AppError::NotFound { .. })
        ));

        let manual = f
            .payments
            .create_order(&f.student, booking(&f, "10:00", PaymentMode::Manual))
            .await
            .unwrap()
            .session()
            .clone();
        let request = VerifyPaymentRequest {
            session_id: manual.id.to_string(),
            order_id: "order_x".to_string(),
            payment_id: "pay_x".to_string(),
            signature: "00".to_string(),
        };
        assert!(matches!(
            f.payments.verify_gateway_payment(&f.student, request).await,
            Err(AppError::WrongPaymentMode { expected: "gateway" })
        ));
    }

    #[tokio::test]
    async fn test_manual_proof_then_verify() {
        let f = fixture().await;
        let session = manual_booking(&f).await;
        let id = session.id.to_string();

        let submitted = f.payments.submit_manual_proof(&f.student, &id, proof()).await.unwrap();
        assert_eq!(submitted.payment_status(), PaymentStatus::WaitingVerification);
        assert_eq!(submitted.session_status(), SessionStatus::Pending);
        assert_eq!(submitted.transaction_reference.as_deref(), Some("UTR123456"));

        let queue = f.payments.pending_manual_payments(&f.admin).await.unwrap();
        assert_eq!(queue.len(), 1);

        let reviewed = f
            .payments
            .review_manual_payment(
                &f.admin,
                &id,
                ReviewRequest {
                    action: ReviewAction::Verify,
                    reject_reason: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(reviewed.payment_status(), PaymentStatus::Verified);
        assert_eq!(reviewed.session_status(), SessionStatus::Confirmed);
        assert!(reviewed.verified_by_admin);
        assert!(reviewed.is_payment_settled());

        let notes = f.store.notifications().await;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].recipient, f.student.user_id);
        assert_eq!(notes[0].title, "Payment Verified");
        assert_eq!(notes[1].recipient, f.mentor.user_id);
        assert_eq!(notes[1].title, "Session Confirmed");

        assert!(f.payments.pending_manual_payments(&f.admin).await.unwrap().is_empty());
        assert!(matches!(
            f.payments
                .review_manual_payment(
                    &f.admin,
                    &id,
                    ReviewRequest {
                        action: ReviewAction::Reject,
                        reject_reason: None,
                    },
                )
                .await,
            Err(AppError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_proof_cancels_session() {
        let f = fixture().await;
        let session = manual_booking(&f).await;
        let id = session.id.to_string();
        f.payments.submit_manual_proof(&f.student, &id, proof()).await.unwrap();

        let reviewed = f
            .payments
            .review_manual_payment(
                &f.admin,
                &id,
                ReviewRequest {
                    action: ReviewAction::Reject,
                    reject_reason: Some(" Reference not found ".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(reviewed.session_status(), SessionStatus::Cancelled);
        assert_eq!(reviewed.payment_status(), PaymentStatus::Rejected);
        assert_eq!(reviewed.payment_reject_reason.as_deref(), Some("Reference not found"));

        let notes = f.store.notifications().await;
        assert_eq!(
            notes[0].message,
            "Your session payment was rejected. Reason: Reference not found"
        );

        // The slot is free again
        assert!(f
            .payments
            .create_order(&f.student, booking(&f, "09:00", PaymentMode::Manual))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_late_proof_expires_session() {
        let f = fixture().await;
        let session = manual_booking(&f).await;

        f.clock.advance(Duration::minutes(31));
        let err = f
            .payments
            .submit_manual_proof(&f.student, &session.id.to_string(), proof())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentWindowExpired));

        let stored = f.store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.session_status(), SessionStatus::Cancelled);
        assert_eq!(stored.payment_status(), PaymentStatus::Rejected);
        assert_eq!(stored.payment_reject_reason.as_deref(), Some(EXPIRED_REASON));
    }

    #[tokio::test]
    async fn test_listing_shows_expired_manual_session() {
        let f = fixture().await;
        manual_booking(&f).await;

        let before = f.lifecycle.list_for_student(&f.student).await.unwrap();
        assert!(before[0].payment_instructions.is_some());

        f.clock.advance(Duration::minutes(45));
        let after = f.lifecycle.list_for_student(&f.student).await.unwrap();
        assert_eq!(after[0].session.session_status(), SessionStatus::Cancelled);
        assert_eq!(after[0].session.payment_status(), PaymentStatus::Rejected);
        // Rejected manual payments still show how to pay
        assert!(after[0].payment_instructions.is_some());
    }

    #[tokio::test]
    async fn test_review_requires_manual_mode_and_admin() {
        let f = fixture().await;
        let (session, _) = gateway_booking(&f).await;
        let review = ReviewRequest {
            action: ReviewAction::Verify,
            reject_reason: None,
        };

        assert!(matches!(
            f.payments
                .review_manual_payment(&f.admin, &session.id.to_string(), review.clone())
                .await,
            Err(AppError::WrongPaymentMode { expected: "manual" })
        ));
        assert!(matches!(
            f.payments
                .review_manual_payment(&f.mentor, &session.id.to_string(), review)
                .await,
            Err(AppError::Forbidden { .. })
        ));
        assert!(matches!(
            f.payments
                .submit_manual_proof(&f.student, &session.id.to_string(), proof())
                .await,
            Err(AppError::WrongPaymentMode { expected: "manual" })
        ));
    }

    async fn force_status(f: &Fixture, id: Uuid, status: SessionStatus) {
        let mut session = f.store.find_session(id).await.unwrap().unwrap();
        let current = session.session_status();
        session.set_status(status);
        assert!(f.store.update_guarded(&session, current).await.unwrap());
    }

    fn review(action: ReviewAction) -> ReviewRequest {
        ReviewRequest {
            action,
            reject_reason: None,
        }
    }

    #[tokio::test]
    async fn test_review_after_cancel_is_refused() {
        let f = fixture().await;
        let session = manual_booking(&f).await;
        let id = session.id.to_string();
        f.payments.submit_manual_proof(&f.student, &id, proof()).await.unwrap();
        f.lifecycle.cancel(&f.mentor, &id).await.unwrap();

        assert!(matches!(
            f.payments.review_manual_payment(&f.admin, &id, review(ReviewAction::Verify)).await,
            Err(AppError::InvalidStateTransition { .. })
        ));

        let stored = f.store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.session_status(), SessionStatus::Cancelled);
        assert_eq!(stored.payment_status(), PaymentStatus::WaitingVerification);
        assert!(f.store.notifications().await.is_empty());
    }

    #[tokio::test]
    async fn test_payment_writes_leave_terminal_sessions_alone() {
        for terminal in [
            SessionStatus::Cancelled,
            SessionStatus::Rejected,
            SessionStatus::Completed,
        ] {
            let f = fixture().await;

            let manual = manual_booking(&f).await;
            let manual_id = manual.id.to_string();
            f.payments.submit_manual_proof(&f.student, &manual_id, proof()).await.unwrap();
            force_status(&f, manual.id, terminal).await;

            for action in [ReviewAction::Verify, ReviewAction::Reject] {
                assert!(
                    matches!(
                        f.payments.review_manual_payment(&f.admin, &manual_id, review(action)).await,
                        Err(AppError::InvalidStateTransition { .. })
                    ),
                    "review of a {} session",
                    terminal.as_str()
                );
            }
            assert!(
                matches!(
                    f.payments.submit_manual_proof(&f.student, &manual_id, proof()).await,
                    Err(AppError::InvalidStateTransition { .. })
                ),
                "proof for a {} session",
                terminal.as_str()
            );

            let stored = f.store.find_session(manual.id).await.unwrap().unwrap();
            assert_eq!(stored.session_status(), terminal);
            assert_eq!(stored.payment_status(), PaymentStatus::WaitingVerification);

            let gateway = f
                .payments
                .create_order(&f.student, booking(&f, "10:00", PaymentMode::Gateway))
                .await
                .unwrap()
                .session()
                .clone();
            force_status(&f, gateway.id, terminal).await;
            assert!(
                matches!(
                    f.payments
                        .verify_gateway_payment(&f.student, receipt(&f, &gateway, "pay_1"))
                        .await,
                    Err(AppError::InvalidStateTransition { .. })
                ),
                "receipt for a {} session",
                terminal.as_str()
            );

            let stored = f.store.find_session(gateway.id).await.unwrap().unwrap();
            assert_eq!(stored.session_status(), terminal);
            assert_eq!(stored.payment_status(), PaymentStatus::Pending);
            assert!(stored.payment_id.is_none());
            assert!(f.store.notifications().await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_confirmed_session_survives_late_proof() {
        let f = fixture().await;
        let session = manual_booking(&f).await;
        let id = session.id.to_string();
        f.payments.submit_manual_proof(&f.student, &id, proof()).await.unwrap();
        f.payments
            .review_manual_payment(&f.admin, &id, review(ReviewAction::Verify))
            .await
            .unwrap();

        f.clock.advance(Duration::minutes(45));
        assert!(matches!(
            f.payments.submit_manual_proof(&f.student, &id, proof()).await,
            Err(AppError::InvalidStateTransition { .. })
        ));

        let stored = f.store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.session_status(), SessionStatus::Confirmed);
        assert_eq!(stored.payment_status(), PaymentStatus::Verified);
    }

    #[tokio::test]
    async fn test_concurrent_gateway_orders_hold_one_slot() {
        let f = fixture().await;
        let other = Principal::new(Uuid::new_v4(), Role::Student);

        let (first, second) = tokio::join!(
            f.payments.create_order(&f.student, booking(&f, "09:00", PaymentMode::Gateway)),
            f.payments.create_order(&other, booking(&f, "09:00", PaymentMode::Gateway)),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::SlotConflict))));

        let held = f.store.sessions_for_student(f.student.user_id).await.unwrap().len()
            + f.store.sessions_for_student(other.user_id).await.unwrap().len();
        assert_eq!(held, 1);
    }
}
