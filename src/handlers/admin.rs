use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::SentinelError,
    handlers::AppState,
    models::{AdminDecision, ApiResponse, VerificationResult},
};

/// Admin approval of a payment awaiting review. Idempotent: repeating the
/// same decision returns the standing result without a new audit event.
pub async fn approve_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    Json(decision): Json<AdminDecision>,
) -> Result<Json<ApiResponse<VerificationResult>>, SentinelError> {
    decide(state, payment_id, decision, true).await
}

pub async fn reject_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    Json(decision): Json<AdminDecision>,
) -> Result<Json<ApiResponse<VerificationResult>>, SentinelError> {
    decide(state, payment_id, decision, false).await
}

async fn decide(
    state: AppState,
    payment_id: String,
    decision: AdminDecision,
    approve: bool,
) -> Result<Json<ApiResponse<VerificationResult>>, SentinelError> {
    if decision.admin.trim().is_empty() {
        return Err(SentinelError::Validation(
            "admin identifier is required".to_string(),
        ));
    }

    let result = state
        .orchestrator
        .decide(&payment_id, approve, decision.admin.trim(), decision.notes)
        .await?;
    Ok(Json(ApiResponse::ok(result)))
}
