//! Notification and audit sinks
//!
//! Both are fire-and-forget from the caller's point of view: a failed
//! delivery is logged and never undoes the state change that caused it.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::errors::Result;

/// Notification addressed to one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNotification {
    pub target_role: String,
    pub recipient: Uuid,
    pub sent_by: Uuid,
    pub title: String,
    pub message: String,
}

impl NewNotification {
    pub fn direct(
        target_role: &str,
        recipient: Uuid,
        sent_by: Uuid,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target_role: target_role.to_string(),
            recipient,
            sent_by,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Audit record of a state change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub actor_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub metadata: serde_json::Value,
}

impl AuditEntry {
    pub fn session(
        actor_id: Uuid,
        action: &str,
        session_id: Uuid,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            actor_id,
            action: action.to_string(),
            entity_type: "session".to_string(),
            entity_id: session_id,
            metadata,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: NewNotification) -> Result<()>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;
}

/// Deliver a notification, logging instead of failing
pub async fn notify_best_effort(sink: &Arc<dyn NotificationSink>, notification: NewNotification) {
    let recipient = notification.recipient;
    if let Err(e) = sink.notify(notification).await {
        warn!(recipient = %recipient, error = %e, "Notification delivery failed");
    }
}

/// Write an audit record, logging instead of failing
pub async fn audit_best_effort(sink: &Arc<dyn AuditSink>, entry: AuditEntry) {
    let action = entry.action.clone();
    let entity_id = entry.entity_id;
    if let Err(e) = sink.record(entry).await {
        warn!(action = %action, entity_id = %entity_id, error = %e, "Audit write failed");
    }
}
