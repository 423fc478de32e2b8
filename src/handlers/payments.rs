use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    chains::AdapterRegistry,
    error::SentinelError,
    models::{ApiResponse, PaymentDetail, PaymentSummary, SubmitPayment, VerificationStatus},
    services::{Orchestrator, StatsService, VerifyQueue},
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub queue: Arc<VerifyQueue>,
    pub stats: Arc<StatsService>,
    pub adapters: Arc<AdapterRegistry>,
}

/// Intake endpoint for the payment flow: validate, score, persist and
/// queue the first verification pass.
pub async fn submit_payment(
    State(state): State<AppState>,
    Json(submit): Json<SubmitPayment>,
) -> Result<Json<ApiResponse<PaymentSummary>>, SentinelError> {
    let record = state.orchestrator.intake(submit).await?;
    state.queue.submit(&record.payment.payment_id).await;

    Ok(Json(ApiResponse::ok(PaymentSummary::from_record(
        &record.payment,
        &record.result,
    ))))
}

/// Listing consumed by the statistics view.
pub async fn list_payments(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PaymentSummary>>>, SentinelError> {
    let records = state.orchestrator.store().list().await?;
    let summaries = records
        .iter()
        .map(|r| PaymentSummary::from_record(&r.payment, &r.result))
        .collect();
    Ok(Json(ApiResponse::ok(summaries)))
}

/// Full record for the verification detail view, checks and raw chain
/// payload included.
pub async fn payment_detail(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<ApiResponse<PaymentDetail>>, SentinelError> {
    let store = state.orchestrator.store();
    let record = store
        .get(&payment_id)
        .await?
        .ok_or_else(|| SentinelError::PaymentNotFound(payment_id.clone()))?;
    let audit = store.audit_for(&payment_id).await?;

    Ok(Json(ApiResponse::ok(PaymentDetail {
        payment: record.payment,
        result: record.result,
        audit,
    })))
}

#[derive(Debug, Serialize)]
pub struct VerifyTriggered {
    pub payment_id: String,
    /// False when a pass for this payment was already waiting.
    pub queued: bool,
}

/// Re-check trigger behind the dashboard refresh button. Safe to spam:
/// submissions collapse in the queue and passes serialize per payment.
pub async fn trigger_verification(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<ApiResponse<VerifyTriggered>>, SentinelError> {
    let record = state
        .orchestrator
        .store()
        .get(&payment_id)
        .await?
        .ok_or_else(|| SentinelError::PaymentNotFound(payment_id.clone()))?;

    if record.result.verification_status == VerificationStatus::Expired {
        return Err(SentinelError::ExpiredPayment(payment_id));
    }

    let queued = state.queue.submit(&payment_id).await;
    Ok(Json(ApiResponse::ok(VerifyTriggered { payment_id, queued })))
}
