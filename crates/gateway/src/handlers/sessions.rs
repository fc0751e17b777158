//! Session handlers: booking, lifecycle transitions and listings

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::AppState;
use mentorhub_common::{
    auth::Principal,
    booking::{BookingRequest, MeetingLinkRequest, RescheduleRequest, SessionView},
    db::models::Session,
    errors::Result,
    payments::BookingOutcome,
};

/// Mutation result with a human-readable message
#[derive(Serialize)]
pub struct SessionResponse {
    pub message: &'static str,
    pub session: Session,
}

impl SessionResponse {
    pub fn new(message: &'static str, session: Session) -> Json<Self> {
        Json(Self { message, session })
    }
}

#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionView>,
}

/// Book a slot; serves both `/book` and `/create-order`
pub async fn book(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingOutcome>)> {
    let outcome = state.payments.create_order(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn approve(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = state.sessions.approve(&principal, &id).await?;
    Ok(SessionResponse::new("Session approved", session))
}

pub async fn reject(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = state.sessions.reject(&principal, &id).await?;
    Ok(SessionResponse::new("Session rejected", session))
}

pub async fn cancel(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = state.sessions.cancel(&principal, &id).await?;
    Ok(SessionResponse::new("Session cancelled", session))
}

pub async fn reschedule(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<SessionResponse>> {
    let session = state.sessions.reschedule(&principal, &id, request).await?;
    Ok(SessionResponse::new("Session rescheduled", session))
}

pub async fn meeting_link(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<MeetingLinkRequest>,
) -> Result<Json<SessionResponse>> {
    let session = state.sessions.update_meeting_link(&principal, &id, request).await?;
    Ok(SessionResponse::new("Meeting link updated", session))
}

pub async fn complete(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = state.sessions.complete(&principal, &id).await?;
    Ok(SessionResponse::new("Session completed", session))
}

pub async fn student_sessions(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<SessionListResponse>> {
    let sessions = state.sessions.list_for_student(&principal).await?;
    Ok(Json(SessionListResponse { sessions }))
}

pub async fn mentor_sessions(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<SessionListResponse>> {
    let sessions = state.sessions.list_for_mentor(&principal).await?;
    Ok(Json(SessionListResponse { sessions }))
}
