//! Mentorship session entity and its lifecycle/payment enums

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    PaymentPending,
    Approved,
    Confirmed,
    Completed,
    Cancelled,
    Rejected,
}

impl SessionStatus {
    /// Statuses that reserve a mentor's slot against double-booking
    pub const HOLDING: [SessionStatus; 4] = [
        SessionStatus::Pending,
        SessionStatus::PaymentPending,
        SessionStatus::Approved,
        SessionStatus::Confirmed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::PaymentPending => "payment_pending",
            SessionStatus::Approved => "approved",
            SessionStatus::Confirmed => "confirmed",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Rejected => "rejected",
        }
    }

    pub fn is_holding(&self) -> bool {
        Self::HOLDING.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Rejected
        )
    }
}

impl From<&str> for SessionStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => SessionStatus::Pending,
            "payment_pending" => SessionStatus::PaymentPending,
            "approved" => SessionStatus::Approved,
            "confirmed" => SessionStatus::Confirmed,
            "completed" => SessionStatus::Completed,
            "rejected" => SessionStatus::Rejected,
            // Unknown values are treated as terminal so nothing can act on them
            _ => SessionStatus::Cancelled,
        }
    }
}

/// Payment progress of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    WaitingVerification,
    Verified,
    Rejected,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::WaitingVerification => "waiting_verification",
            PaymentStatus::Verified => "verified",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Paid => "paid",
        }
    }

    /// Money has been received and acknowledged
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Verified)
    }
}

impl From<&str> for PaymentStatus {
    fn from(s: &str) -> Self {
        match s {
            "waiting_verification" => PaymentStatus::WaitingVerification,
            "verified" => PaymentStatus::Verified,
            "rejected" => PaymentStatus::Rejected,
            "paid" => PaymentStatus::Paid,
            _ => PaymentStatus::Pending,
        }
    }
}

/// How the student pays for a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Out-of-band transfer, proof reviewed by an admin
    Manual,
    /// Online checkout with signed receipts
    Gateway,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Manual => "manual",
            PaymentMode::Gateway => "gateway",
        }
    }
}

impl From<&str> for PaymentMode {
    fn from(s: &str) -> Self {
        match s {
            "gateway" => PaymentMode::Gateway,
            _ => PaymentMode::Manual,
        }
    }
}

/// Whether the session is merely booked or confirmed by payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Booked,
    Confirmed,
}

impl SessionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStage::Booked => "booked",
            SessionStage::Confirmed => "confirmed",
        }
    }
}

impl From<&str> for SessionStage {
    fn from(s: &str) -> Self {
        match s {
            "confirmed" => SessionStage::Confirmed,
            _ => SessionStage::Booked,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mentorship_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub student_id: Uuid,

    pub mentor_id: Uuid,

    /// Calendar date, `YYYY-MM-DD`
    #[sea_orm(column_type = "Text")]
    pub date: String,

    /// Start time, `HH:MM`
    #[sea_orm(column_type = "Text")]
    pub time: String,

    pub duration_minutes: i32,

    /// Always `date` + `time` in UTC
    pub scheduled_start: DateTimeWithTimeZone,

    /// Price snapshot in minor units
    pub amount_minor: i64,

    #[sea_orm(column_type = "Text")]
    pub currency: String,

    #[sea_orm(column_type = "Text")]
    pub payment_mode: String,

    #[sea_orm(column_type = "Text")]
    pub payment_status: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text")]
    pub session_status: String,

    pub payment_due_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub order_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub payment_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub payment_signature: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub transaction_reference: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub payment_screenshot: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub payment_reject_reason: Option<String>,

    pub verified_by_admin: bool,

    pub verified_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub meeting_link: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub notes: String,

    #[sea_orm(column_type = "Text")]
    pub feedback: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn session_status(&self) -> SessionStatus {
        SessionStatus::from(self.status.as_str())
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from(self.payment_status.as_str())
    }

    pub fn payment_mode(&self) -> PaymentMode {
        PaymentMode::from(self.payment_mode.as_str())
    }

    pub fn stage(&self) -> SessionStage {
        SessionStage::from(self.session_status.as_str())
    }

    /// Start instant in UTC
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.scheduled_start.with_timezone(&Utc)
    }

    /// End instant in UTC
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at() + chrono::Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Whether the user is the student or the mentor of this session
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.student_id == user_id || self.mentor_id == user_id
    }

    /// Payment received and session confirmed; the slot shows as booked
    pub fn is_payment_settled(&self) -> bool {
        self.payment_status().is_settled() && self.stage() == SessionStage::Confirmed
    }

    /// Manual payment whose window has elapsed at `now`
    pub fn payment_window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.payment_due_at
            .map(|due| due.with_timezone(&Utc) < now)
            .unwrap_or(false)
    }

    /// Amount in major units, for display
    pub fn amount(&self) -> f64 {
        self.amount_minor as f64 / 100.0
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status.as_str().to_string();
    }

    pub fn set_payment_status(&mut self, status: PaymentStatus) {
        self.payment_status = status.as_str().to_string();
    }

    pub fn set_stage(&mut self, stage: SessionStage) {
        self.session_status = stage.as_str().to_string();
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
