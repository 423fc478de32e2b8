use crate::models::{AuditEvent, ManualPayment, VerificationResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: bool,
    pub chains: Vec<String>,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

/// One row of the statistics view listing.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentSummary {
    pub payment_id: String,
    pub amount_usd: Decimal,
    pub auto_approved: bool,
    pub confidence: u8,
    pub created_at: DateTime<Utc>,
    /// First recorded reason, or empty when the payment sailed through.
    pub reason: String,
}

impl PaymentSummary {
    pub fn from_record(payment: &ManualPayment, result: &VerificationResult) -> Self {
        Self {
            payment_id: payment.payment_id.clone(),
            amount_usd: payment.amount_usd,
            auto_approved: matches!(
                result.verification_status,
                crate::models::VerificationStatus::AutoApproved
            ),
            confidence: result.verification_confidence,
            created_at: payment.created_at,
            reason: result
                .verification_errors
                .first()
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// Full record for the verification detail view.
#[derive(Serialize, Deserialize, Debug)]
pub struct PaymentDetail {
    pub payment: ManualPayment,
    pub result: VerificationResult,
    pub audit: Vec<AuditEvent>,
}

/// Aggregate counters surfaced on the dashboard cards and the websocket.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VerificationStats {
    pub total: u64,
    pub pending: u64,
    pub auto_approved: u64,
    pub manual_review_required: u64,
    pub blockchain_failed: u64,
    pub approved: u64,
    pub rejected: u64,
    pub expired: u64,
    pub auto_approval_rate: f64,
    pub avg_confidence: f64,
}

/// Body of an admin approve/reject call.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminDecision {
    pub admin: String,
    pub notes: Option<String>,
}
