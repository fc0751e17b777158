//! API handlers module

pub mod availability;
pub mod health;
pub mod payments;
pub mod sessions;
