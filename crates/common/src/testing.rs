//! Fixtures shared by the unit tests

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::db::models::{
    Availability, PaymentMode, PaymentStatus, Session, SessionStage, SessionStatus,
};
use crate::scheduling::time_of_day::{parse_date, scheduled_start, MinuteOfDay};
use crate::store::MentorListing;

pub fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
}

pub fn rule(mentor_id: Uuid, day: &str, start: &str, end: &str, duration: i32) -> Availability {
    let now = Utc::now();
    Availability {
        id: Uuid::new_v4(),
        mentor_id,
        day: Some(day.to_string()),
        start_time: Some(start.to_string()),
        end_time: Some(end.to_string()),
        session_duration_minutes: duration,
        blocked_date: None,
        is_blocked_date: false,
        created_at: now.into(),
        updated_at: now.into(),
    }
}

pub fn blocked(mentor_id: Uuid, date: NaiveDate) -> Availability {
    let now = Utc::now();
    Availability {
        id: Uuid::new_v4(),
        mentor_id,
        day: None,
        start_time: None,
        end_time: None,
        session_duration_minutes: 60,
        blocked_date: Some(date),
        is_blocked_date: true,
        created_at: now.into(),
        updated_at: now.into(),
    }
}

pub fn mentor_listing(id: Uuid) -> MentorListing {
    MentorListing {
        id,
        name: "Asha Mentor".to_string(),
        email: "asha@example.com".to_string(),
        profile_price: None,
        legacy_price: None,
    }
}

/// Pending gateway-mode session of a fresh student
pub fn session(mentor_id: Uuid, date: &str, time: &str) -> Session {
    let now = Utc::now();
    let start = scheduled_start(parse_date(date).unwrap(), MinuteOfDay::parse(time).unwrap());
    Session {
        id: Uuid::new_v4(),
        student_id: Uuid::new_v4(),
        mentor_id,
        date: date.to_string(),
        time: time.to_string(),
        duration_minutes: 30,
        scheduled_start: start.into(),
        amount_minor: 49_900,
        currency: "INR".to_string(),
        payment_mode: PaymentMode::Gateway.as_str().to_string(),
        payment_status: PaymentStatus::Pending.as_str().to_string(),
        status: SessionStatus::Pending.as_str().to_string(),
        session_status: SessionStage::Booked.as_str().to_string(),
        payment_due_at: None,
        order_id: None,
        payment_id: None,
        payment_signature: None,
        transaction_reference: None,
        payment_screenshot: None,
        payment_reject_reason: None,
        verified_by_admin: false,
        verified_at: None,
        meeting_link: None,
        notes: String::new(),
        feedback: String::new(),
        created_at: now.into(),
        updated_at: now.into(),
    }
}

/// Gateway session that has been paid for
pub fn settled_session(mentor_id: Uuid, date: &str, time: &str) -> Session {
    let mut s = session(mentor_id, date, time);
    s.set_status(SessionStatus::Approved);
    s.set_payment_status(PaymentStatus::Paid);
    s.set_stage(SessionStage::Confirmed);
    s
}
