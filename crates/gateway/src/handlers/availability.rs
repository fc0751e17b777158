//! Availability handlers: mentor rule management and the public calendar

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::AppState;
use mentorhub_common::{
    auth::Principal,
    db::models::Availability,
    errors::Result,
    scheduling::{BlockDateRequest, MentorAvailability, RuleRequest, RuleUpdate},
};

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub message: &'static str,
    pub availability: Availability,
}

/// Create a recurring weekly rule
pub async fn create_rule(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<RuleRequest>,
) -> Result<(StatusCode, Json<AvailabilityResponse>)> {
    let availability = state.availability.create_rule(&principal, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(AvailabilityResponse {
            message: "Availability added",
            availability,
        }),
    ))
}

/// Update one of the caller's rules
pub async fn update_rule(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<RuleUpdate>,
) -> Result<Json<AvailabilityResponse>> {
    let availability = state.availability.update_rule(&principal, &id, request).await?;

    Ok(Json(AvailabilityResponse {
        message: "Availability updated",
        availability,
    }))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.availability.delete_rule(&principal, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn block_date(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<BlockDateRequest>,
) -> Result<(StatusCode, Json<AvailabilityResponse>)> {
    let availability = state.availability.block_date(&principal, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(AvailabilityResponse {
            message: "Date blocked",
            availability,
        }),
    ))
}

pub async fn unblock_date(
    State(state): State<AppState>,
    principal: Principal,
    Path(date): Path<String>,
) -> Result<StatusCode> {
    state.availability.unblock_date(&principal, &date).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Public calendar of a mentor (no auth)
pub async fn mentor_availability(
    State(state): State<AppState>,
    Path(mentor_id): Path<String>,
) -> Result<Json<MentorAvailability>> {
    let calendar = state.availability.mentor_availability(&mentor_id).await?;

    tracing::debug!(
        mentor_id = %calendar.mentor.id,
        free_slots = calendar.free_slot_count,
        "Mentor availability served"
    );

    Ok(Json(calendar))
}
