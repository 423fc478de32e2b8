use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a payment inside the verification engine.
///
/// `pending` -> `auto_approved` | `manual_review_required` | `blockchain_failed`,
/// then admin action takes the review states to `approved` | `rejected`.
/// Any non-terminal state can reach `expired` through the expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    AutoApproved,
    ManualReviewRequired,
    BlockchainFailed,
    Approved,
    Rejected,
    Expired,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::AutoApproved => "auto_approved",
            VerificationStatus::ManualReviewRequired => "manual_review_required",
            VerificationStatus::BlockchainFailed => "blockchain_failed",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
            VerificationStatus::Expired => "expired",
        }
    }

    /// Terminal states never leave the engine again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Approved | VerificationStatus::Rejected | VerificationStatus::Expired
        )
    }

    /// States an admin decision can act on.
    pub fn awaits_admin(&self) -> bool {
        matches!(
            self,
            VerificationStatus::ManualReviewRequired | VerificationStatus::BlockchainFailed
        )
    }

    /// Whether the expiry sweep may reap this state. `blockchain_failed`
    /// stays actionable unless the policy flag opts it in.
    pub fn expirable(&self, expire_blockchain_failed: bool) -> bool {
        match self {
            VerificationStatus::Pending | VerificationStatus::ManualReviewRequired => true,
            VerificationStatus::BlockchainFailed => expire_blockchain_failed,
            _ => false,
        }
    }

    /// Re-verification only makes sense for states the engine still owns.
    /// `auto_approved` is included so contradicting on-chain evidence can
    /// downgrade it.
    pub fn reverifiable(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Pending
                | VerificationStatus::ManualReviewRequired
                | VerificationStatus::BlockchainFailed
                | VerificationStatus::AutoApproved
        )
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The seven named facts behind a `blockchain_verified` determination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationChecks {
    pub no_duplicates: bool,
    pub transaction_exists: bool,
    pub sender_verified: bool,
    pub recipient_verified: bool,
    pub amount_verified: bool,
    pub confirmed: bool,
    pub time_valid: bool,
}

impl VerificationChecks {
    pub fn all_passed(&self) -> bool {
        self.no_duplicates
            && self.transaction_exists
            && self.sender_verified
            && self.recipient_verified
            && self.amount_verified
            && self.confirmed
            && self.time_valid
    }

    pub fn failed_names(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.no_duplicates {
            failed.push("no_duplicates");
        }
        if !self.transaction_exists {
            failed.push("transaction_exists");
        }
        if !self.sender_verified {
            failed.push("sender_verified");
        }
        if !self.recipient_verified {
            failed.push("recipient_verified");
        }
        if !self.amount_verified {
            failed.push("amount_verified");
        }
        if !self.confirmed {
            failed.push("confirmed");
        }
        if !self.time_valid {
            failed.push("time_valid");
        }
        failed
    }
}

/// Current verification outcome for one payment. Recomputed on every
/// engine pass; only the latest values are kept, while status transitions
/// are recorded separately as audit events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub payment_id: String,
    pub verification_status: VerificationStatus,
    pub blockchain_verified: bool,
    pub verification_confidence: u8,
    /// None until a blockchain pass has run for this payment.
    pub verification_checks: Option<VerificationChecks>,
    pub verification_errors: Vec<String>,
    pub blockchain_data: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationResult {
    /// Result written at the first scoring pass, before any chain lookup.
    pub fn initial(payment_id: &str, confidence: u8, reasons: Vec<String>) -> Self {
        Self {
            payment_id: payment_id.to_string(),
            verification_status: VerificationStatus::Pending,
            blockchain_verified: false,
            verification_confidence: confidence,
            verification_checks: None,
            verification_errors: reasons,
            blockchain_data: None,
            updated_at: Utc::now(),
        }
    }
}

/// Append-only record of one status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub payment_id: String,
    /// "engine" for automatic transitions, otherwise the acting admin.
    pub actor: String,
    pub from_status: Option<VerificationStatus>,
    pub to_status: VerificationStatus,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        payment_id: &str,
        actor: &str,
        from_status: Option<VerificationStatus>,
        to_status: VerificationStatus,
        notes: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            payment_id: payment_id.to_string(),
            actor: actor.to_string(),
            from_status,
            to_status,
            notes,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_passed_requires_every_check() {
        let mut checks = VerificationChecks {
            no_duplicates: true,
            transaction_exists: true,
            sender_verified: true,
            recipient_verified: true,
            amount_verified: true,
            confirmed: true,
            time_valid: true,
        };
        assert!(checks.all_passed());
        checks.confirmed = false;
        assert!(!checks.all_passed());
        assert_eq!(checks.failed_names(), vec!["confirmed"]);
    }

    #[test]
    fn expirable_respects_policy_flag() {
        assert!(VerificationStatus::Pending.expirable(false));
        assert!(VerificationStatus::ManualReviewRequired.expirable(false));
        assert!(!VerificationStatus::BlockchainFailed.expirable(false));
        assert!(VerificationStatus::BlockchainFailed.expirable(true));
        assert!(!VerificationStatus::Approved.expirable(true));
        assert!(!VerificationStatus::Expired.expirable(true));
    }

    #[test]
    fn status_wire_names_are_snake_case() {
        let s = serde_json::to_string(&VerificationStatus::ManualReviewRequired).unwrap();
        assert_eq!(s, "\"manual_review_required\"");
    }
}
