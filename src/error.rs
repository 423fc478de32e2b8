use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Chain;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Chain {chain} unavailable: {reason}")]
    ChainUnavailable { chain: Chain, reason: String },

    #[error("On-chain data contradicts submission: {0}")]
    ChainMismatch(String),

    #[error("Transaction hash already attributed to payment {existing_payment_id}")]
    DuplicateTransaction { existing_payment_id: String },

    #[error("Concurrent modification on payment {0}, retries exhausted")]
    ConcurrentModification(String),

    #[error("Payment {0} is expired")]
    ExpiredPayment(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl IntoResponse for SentinelError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        let (status, error_code) = match &self {
            SentinelError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            SentinelError::PaymentNotFound(_) => (StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND"),
            SentinelError::ChainUnavailable { .. } => {
                (StatusCode::BAD_GATEWAY, "CHAIN_UNAVAILABLE")
            }
            SentinelError::ChainMismatch(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CHAIN_MISMATCH")
            }
            SentinelError::DuplicateTransaction { .. } => {
                (StatusCode::CONFLICT, "DUPLICATE_TRANSACTION")
            }
            SentinelError::ConcurrentModification(_) => {
                (StatusCode::CONFLICT, "CONCURRENT_MODIFICATION")
            }
            SentinelError::ExpiredPayment(_) => (StatusCode::GONE, "PAYMENT_EXPIRED"),
            SentinelError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            SentinelError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
        };

        tracing::error!(
            error = ?self,
            error_code = error_code,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_transaction_message_names_the_holder() {
        let err = SentinelError::DuplicateTransaction {
            existing_payment_id: "pay-1".to_string(),
        };
        assert!(err.to_string().contains("pay-1"));
    }
}
