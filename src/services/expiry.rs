use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::config::EngineConfig;
use crate::error::SentinelError;
use crate::models::{AuditEvent, VerificationStatus};
use crate::services::store::VerificationStore;

const ACTOR_ENGINE: &str = "engine";

/// Periodic sweep that reaps payments whose review window elapsed.
pub struct ExpiryMonitor {
    store: Arc<dyn VerificationStore>,
    engine: EngineConfig,
}

impl ExpiryMonitor {
    pub fn new(store: Arc<dyn VerificationStore>, engine: EngineConfig) -> Self {
        Self { store, engine }
    }

    /// Transition every over-window record to `expired`. Idempotent: a
    /// record that is already expired, or that another writer just moved,
    /// is skipped, so re-running a sweep never double-transitions.
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> Result<usize, SentinelError> {
        let records = self.store.list().await?;
        let mut reaped = 0;

        for record in records {
            let status = record.result.verification_status;
            if !status.expirable(self.engine.expire_blockchain_failed) {
                continue;
            }
            if !record.payment.is_expired(now) {
                continue;
            }

            let mut result = record.result.clone();
            result.verification_status = VerificationStatus::Expired;
            result.updated_at = now;

            match self.store.save(result, status).await {
                Ok(()) => {
                    let event = AuditEvent::new(
                        &record.payment.payment_id,
                        ACTOR_ENGINE,
                        Some(status),
                        VerificationStatus::Expired,
                        Some("Review window elapsed".to_string()),
                    );
                    if let Err(e) = self.store.append_audit(event).await {
                        tracing::error!(
                            payment_id = %record.payment.payment_id,
                            "Failed to append expiry audit event: {}",
                            e
                        );
                    }
                    reaped += 1;
                }
                Err(SentinelError::ConcurrentModification(_)) => {
                    // Lost the race to a verification pass or an earlier
                    // sweep; the record already moved on.
                    tracing::debug!(
                        payment_id = %record.payment.payment_id,
                        "Expiry sweep lost write race, skipping"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if reaped > 0 {
            tracing::info!(reaped, "Expiry sweep reaped stale payments");
        }
        Ok(reaped)
    }

    /// Run the sweep forever on the configured cadence.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = Duration::from_secs(self.engine.expiry_sweep_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = self.reap_expired(Utc::now()).await {
                    tracing::error!("Expiry sweep failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chain, ManualPayment, VerificationResult};
    use crate::services::store::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn seed_payment(
        id: &str,
        status: VerificationStatus,
        expired: bool,
    ) -> (ManualPayment, VerificationResult) {
        let now = Utc::now();
        let (created, expires) = if expired {
            (now - ChronoDuration::hours(100), now - ChronoDuration::hours(28))
        } else {
            (now, now + ChronoDuration::hours(72))
        };
        let payment = ManualPayment {
            payment_id: id.to_string(),
            user_id: "user-1".to_string(),
            amount_usd: dec!(100),
            chain: Chain::Ethereum,
            sender_wallet_address: None,
            transaction_hash: None,
            sender_name: None,
            notes: None,
            created_at: created,
            expires_at: expires,
        };
        let mut result = VerificationResult::initial(id, 25, vec![]);
        result.verification_status = status;
        (payment, result)
    }

    async fn store_with(
        seeds: Vec<(ManualPayment, VerificationResult)>,
    ) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (payment, result) in seeds {
            store.insert_payment(payment, result).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn sweep_reaps_stale_records_exactly_once() {
        let store = store_with(vec![
            seed_payment("stale-pending", VerificationStatus::Pending, true),
            seed_payment("stale-review", VerificationStatus::ManualReviewRequired, true),
            seed_payment("fresh", VerificationStatus::Pending, false),
            seed_payment("approved", VerificationStatus::Approved, true),
        ])
        .await;

        let monitor = ExpiryMonitor::new(store.clone(), EngineConfig::test_defaults());
        let now = Utc::now();

        assert_eq!(monitor.reap_expired(now).await.unwrap(), 2);
        // Second sweep over the same window is a no-op.
        assert_eq!(monitor.reap_expired(now).await.unwrap(), 0);

        let stale = store.get("stale-pending").await.unwrap().unwrap();
        assert_eq!(
            stale.result.verification_status,
            VerificationStatus::Expired
        );
        let approved = store.get("approved").await.unwrap().unwrap();
        assert_eq!(
            approved.result.verification_status,
            VerificationStatus::Approved
        );
        // One expiry audit event per reaped record, not per sweep.
        assert_eq!(store.audit_for("stale-pending").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blockchain_failed_follows_policy_flag() {
        let store = store_with(vec![seed_payment(
            "failed",
            VerificationStatus::BlockchainFailed,
            true,
        )])
        .await;

        let keep = ExpiryMonitor::new(store.clone(), EngineConfig::test_defaults());
        assert_eq!(keep.reap_expired(Utc::now()).await.unwrap(), 0);

        let mut engine = EngineConfig::test_defaults();
        engine.expire_blockchain_failed = true;
        let reap = ExpiryMonitor::new(store.clone(), engine);
        assert_eq!(reap.reap_expired(Utc::now()).await.unwrap(), 1);
    }
}
