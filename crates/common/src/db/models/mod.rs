//! SeaORM entity models
//!
//! Database entities for the MentorHub scheduling core

mod audit_log;
mod availability;
mod mentor_profile;
mod notification;
mod session;
mod user;

pub use availability::{
    Entity as AvailabilityEntity,
    Model as Availability,
    ActiveModel as AvailabilityActiveModel,
    Column as AvailabilityColumn,
};

pub use session::{
    Entity as SessionEntity,
    Model as Session,
    ActiveModel as SessionActiveModel,
    Column as SessionColumn,
    PaymentMode,
    PaymentStatus,
    SessionStage,
    SessionStatus,
};

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use mentor_profile::{
    Entity as MentorProfileEntity,
    Model as MentorProfile,
    ActiveModel as MentorProfileActiveModel,
    Column as MentorProfileColumn,
};

pub use notification::{
    Entity as NotificationEntity,
    Model as Notification,
    ActiveModel as NotificationActiveModel,
    Column as NotificationColumn,
};

pub use audit_log::{
    Entity as AuditLogEntity,
    Model as AuditLog,
    ActiveModel as AuditLogActiveModel,
    Column as AuditLogColumn,
};
