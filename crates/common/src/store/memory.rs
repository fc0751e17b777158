//! Process-local store used by tests and database-less local runs
//!
//! Every write takes the single write lock, so check-and-insert is atomic
//! the same way the partial unique index makes it atomic in Postgres.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AvailabilityStore, MentorDirectory, MentorListing, SessionStore, EXPIRED_REASON};
use crate::db::models::{Availability, PaymentMode, PaymentStatus, Session, SessionStatus};
use crate::errors::{AppError, Result};
use crate::notify::{AuditEntry, AuditSink, NewNotification, NotificationSink};

#[derive(Default)]
struct State {
    availability: Vec<Availability>,
    sessions: HashMap<Uuid, Session>,
    mentors: HashMap<Uuid, (MentorListing, bool)>,
    notifications: Vec<NewNotification>,
    audit: Vec<AuditEntry>,
}

impl State {
    fn slot_taken(&self, candidate: &Session) -> bool {
        candidate.session_status().is_holding()
            && self.sessions.values().any(|existing| {
                existing.id != candidate.id
                    && existing.mentor_id == candidate.mentor_id
                    && existing.scheduled_start == candidate.scheduled_start
                    && existing.session_status().is_holding()
            })
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mentor account; only approved ones are bookable
    pub async fn add_mentor(&self, listing: MentorListing, approved: bool) {
        let mut state = self.state.write().await;
        state.mentors.insert(listing.id, (listing, approved));
    }

    pub async fn notifications(&self) -> Vec<NewNotification> {
        self.state.read().await.notifications.clone()
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.read().await.audit.clone()
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryStore {
    async fn insert_entry(&self, entry: Availability) -> Result<Availability> {
        let mut state = self.state.write().await;

        if let Some(date) = entry.blocked_on() {
            let duplicate = state
                .availability
                .iter()
                .any(|e| e.mentor_id == entry.mentor_id && e.blocked_on() == Some(date));
            if duplicate {
                return Err(AppError::Duplicate {
                    message: "Date already blocked".to_string(),
                });
            }
        }

        state.availability.push(entry.clone());
        Ok(entry)
    }

    async fn update_rule(&self, entry: Availability) -> Result<Availability> {
        let mut state = self.state.write().await;
        let slot = state
            .availability
            .iter_mut()
            .find(|e| e.id == entry.id && e.mentor_id == entry.mentor_id && !e.is_blocked_date)
            .ok_or_else(|| AppError::NotFound {
                resource_type: "availability",
                id: entry.id.to_string(),
            })?;
        *slot = entry.clone();
        Ok(entry)
    }

    async fn delete_rule(&self, mentor_id: Uuid, rule_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.availability.len();
        state
            .availability
            .retain(|e| !(e.id == rule_id && e.mentor_id == mentor_id && !e.is_blocked_date));
        Ok(state.availability.len() < before)
    }

    async fn find_rule(&self, mentor_id: Uuid, rule_id: Uuid) -> Result<Option<Availability>> {
        let state = self.state.read().await;
        Ok(state
            .availability
            .iter()
            .find(|e| e.id == rule_id && e.mentor_id == mentor_id && !e.is_blocked_date)
            .cloned())
    }

    async fn rules_for(&self, mentor_id: Uuid) -> Result<Vec<Availability>> {
        let state = self.state.read().await;
        Ok(state
            .availability
            .iter()
            .filter(|e| e.mentor_id == mentor_id && !e.is_blocked_date)
            .cloned()
            .collect())
    }

    async fn blocked_dates(&self, mentor_id: Uuid) -> Result<Vec<Availability>> {
        let state = self.state.read().await;
        let mut blocked: Vec<Availability> = state
            .availability
            .iter()
            .filter(|e| e.mentor_id == mentor_id && e.is_blocked_date)
            .cloned()
            .collect();
        blocked.sort_by_key(|e| e.blocked_date);
        Ok(blocked)
    }

    async fn is_blocked(&self, mentor_id: Uuid, date: NaiveDate) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .availability
            .iter()
            .any(|e| e.mentor_id == mentor_id && e.blocked_on() == Some(date)))
    }

    async fn unblock_date(&self, mentor_id: Uuid, date: NaiveDate) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.availability.len();
        state
            .availability
            .retain(|e| !(e.mentor_id == mentor_id && e.blocked_on() == Some(date)));
        Ok(state.availability.len() < before)
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn find_session(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.state.read().await.sessions.get(&id).cloned())
    }

    async fn insert_session(&self, session: Session) -> Result<Session> {
        let mut state = self.state.write().await;
        if state.slot_taken(&session) {
            return Err(AppError::SlotConflict);
        }
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn update_guarded(&self, session: &Session, expected: SessionStatus) -> Result<bool> {
        let mut state = self.state.write().await;

        let current = match state.sessions.get(&session.id) {
            Some(current) => current.session_status(),
            None => return Ok(false),
        };
        if current != expected {
            return Ok(false);
        }
        if state.slot_taken(session) {
            return Err(AppError::SlotConflict);
        }

        state.sessions.insert(session.id, session.clone());
        Ok(true)
    }

    async fn mentor_sessions_between(
        &self,
        mentor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.mentor_id == mentor_id && s.starts_at() >= from && s.starts_at() < to)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.scheduled_start);
        Ok(sessions)
    }

    async fn sessions_for_student(&self, student_id: Uuid) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.student_id == student_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.scheduled_start);
        Ok(sessions)
    }

    async fn sessions_for_mentor(&self, mentor_id: Uuid) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.mentor_id == mentor_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.scheduled_start);
        Ok(sessions)
    }

    async fn pending_manual_reviews(&self) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| {
                s.payment_mode() == PaymentMode::Manual
                    && s.payment_status() == PaymentStatus::WaitingVerification
                    && matches!(
                        s.session_status(),
                        SessionStatus::Pending | SessionStatus::PaymentPending
                    )
            })
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn expire_overdue_manual(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut expired = 0;

        for session in state.sessions.values_mut() {
            let overdue = session.payment_mode() == PaymentMode::Manual
                && session.payment_status() == PaymentStatus::Pending
                && session.session_status() == SessionStatus::PaymentPending
                && session.payment_window_elapsed(now);

            if overdue {
                session.set_status(SessionStatus::Cancelled);
                session.set_payment_status(PaymentStatus::Rejected);
                session.payment_reject_reason = Some(EXPIRED_REASON.to_string());
                session.updated_at = now.into();
                expired += 1;
            }
        }

        Ok(expired)
    }
}

#[async_trait]
impl MentorDirectory for InMemoryStore {
    async fn find_approved_mentor(&self, id: Uuid) -> Result<Option<MentorListing>> {
        let state = self.state.read().await;
        Ok(state
            .mentors
            .get(&id)
            .filter(|(_, approved)| *approved)
            .map(|(listing, _)| listing.clone()))
    }
}

#[async_trait]
impl NotificationSink for InMemoryStore {
    async fn notify(&self, notification: NewNotification) -> Result<()> {
        self.state.write().await.notifications.push(notification);
        Ok(())
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        self.state.write().await.audit.push(entry);
        Ok(())
    }
}
