//! Session price resolution shared by every booking path

use crate::store::MentorListing;

/// Price in major units: profile price, then the legacy user price, then
/// the platform default. Non-positive prices count as unset.
pub fn resolve_session_price(mentor: &MentorListing, default_price: f64) -> f64 {
    [mentor.profile_price, mentor.legacy_price]
        .into_iter()
        .flatten()
        .find(|price| price.is_finite() && *price > 0.0)
        .unwrap_or(default_price)
}

/// Convert a major-unit price to integer minor units, rounding half away
/// from zero
pub fn to_minor_units(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

/// Resolved price of a session with `mentor`, in minor units
pub fn resolve_session_amount(mentor: &MentorListing, default_price: f64) -> i64 {
    to_minor_units(resolve_session_price(mentor, default_price))
}
