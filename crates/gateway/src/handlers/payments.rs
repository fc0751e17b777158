//! Payment handlers: gateway receipts, manual proof and the admin review queue

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use super::sessions::SessionResponse;
use crate::AppState;
use mentorhub_common::{
    auth::Principal,
    db::models::Session,
    errors::Result,
    payments::{ManualProofRequest, ReviewAction, ReviewRequest, VerifyPaymentRequest},
};

#[derive(Serialize)]
pub struct PendingPaymentsResponse {
    pub sessions: Vec<Session>,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<SessionResponse>> {
    let session = state.payments.verify_gateway_payment(&principal, request).await?;
    Ok(SessionResponse::new("Payment verified and session confirmed", session))
}

pub async fn submit_manual_proof(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<ManualProofRequest>,
) -> Result<Json<SessionResponse>> {
    let session = state.payments.submit_manual_proof(&principal, &id, request).await?;
    Ok(SessionResponse::new("Payment submitted. Awaiting admin verification.", session))
}

pub async fn pending_manual_payments(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<PendingPaymentsResponse>> {
    let sessions = state.payments.pending_manual_payments(&principal).await?;
    Ok(Json(PendingPaymentsResponse { sessions }))
}

pub async fn review_manual_payment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<SessionResponse>> {
    let message = match request.action {
        ReviewAction::Verify => "Manual payment verified",
        ReviewAction::Reject => "Manual payment rejected",
    };
    let session = state.payments.review_manual_payment(&principal, &id, request).await?;
    Ok(SessionResponse::new(message, session))
}
