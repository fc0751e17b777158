//! MentorHub Common Library
//!
//! Scheduling and booking core shared by the MentorHub services:
//! - Availability rules, blocked dates and slot projection
//! - Session lifecycle with guarded status transitions
//! - Manual and gateway payment orchestration
//! - Database models and the store traits behind them
//! - Error types, configuration, authentication and metrics

pub mod auth;
pub mod booking;
pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod notify;
pub mod payments;
pub mod scheduling;
pub mod store;
pub mod sweeper;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::Repository;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
