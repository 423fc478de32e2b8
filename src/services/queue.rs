use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::error::SentinelError;
use crate::services::Orchestrator;

/// Explicit submission queue in front of the orchestrator. Dashboard
/// refresh buttons and intake both funnel through here, so repeated
/// triggers collapse into one pending job per payment.
pub struct VerifyQueue {
    tx: mpsc::Sender<String>,
    queued: Arc<Mutex<HashSet<String>>>,
}

impl VerifyQueue {
    /// Spawn `workers` consumers draining the queue into verification
    /// passes. Worker handles live for the process lifetime.
    pub fn start(orchestrator: Arc<Orchestrator>, workers: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<String>(1024);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let queued = Arc::new(Mutex::new(HashSet::new()));

        for worker in 0..workers.max(1) {
            let rx = rx.clone();
            let queued = queued.clone();
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                loop {
                    let payment_id = { rx.lock().await.recv().await };
                    let Some(payment_id) = payment_id else {
                        break;
                    };
                    if let Ok(mut set) = queued.lock() {
                        set.remove(&payment_id);
                    }

                    match orchestrator.verify_payment(&payment_id).await {
                        Ok(result) => {
                            tracing::debug!(
                                worker,
                                payment_id = %payment_id,
                                status = %result.verification_status,
                                "Queued verification finished"
                            );
                        }
                        Err(SentinelError::ExpiredPayment(_)) => {
                            tracing::debug!(
                                payment_id = %payment_id,
                                "Skipped verification of expired payment"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                payment_id = %payment_id,
                                "Queued verification failed: {}",
                                e
                            );
                        }
                    }
                }
            });
        }

        Arc::new(Self { tx, queued })
    }

    /// Enqueue a verification pass. Returns false when the payment is
    /// already waiting, which makes repeated UI triggers harmless.
    pub async fn submit(&self, payment_id: &str) -> bool {
        {
            let mut set = match self.queued.lock() {
                Ok(set) => set,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !set.insert(payment_id.to_string()) {
                return false;
            }
        }

        if self.tx.send(payment_id.to_string()).await.is_err() {
            tracing::error!("Verification queue closed, dropping {}", payment_id);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::AdapterRegistry;
    use crate::config::EngineConfig;
    use crate::models::{Chain, SubmitPayment, VerificationStatus};
    use crate::services::store::{MemoryStore, VerificationStore};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[tokio::test]
    async fn queued_payment_reaches_manual_review() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            Arc::new(AdapterRegistry::new()),
            EngineConfig::test_defaults(),
        ));
        let queue = VerifyQueue::start(orchestrator.clone(), 2);

        let record = orchestrator
            .intake(SubmitPayment {
                payment_id: None,
                user_id: "user-1".to_string(),
                amount_usd: dec!(100),
                chain: Chain::Bsc,
                sender_wallet_address: None,
                transaction_hash: None,
                sender_name: None,
                notes: None,
            })
            .await
            .unwrap();
        let id = record.payment.payment_id.clone();

        assert!(queue.submit(&id).await);

        // Wait for a worker to pick it up.
        for _ in 0..50 {
            let current = store.get(&id).await.unwrap().unwrap();
            if current.result.verification_status == VerificationStatus::ManualReviewRequired {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("queued verification never completed");
    }

    #[tokio::test]
    async fn repeated_submission_is_collapsed() {
        // No workers draining, so submissions stay queued.
        let (tx, _rx) = mpsc::channel::<String>(16);
        let queue = VerifyQueue {
            tx,
            queued: Arc::new(Mutex::new(HashSet::new())),
        };

        assert!(queue.submit("pay-1").await);
        assert!(!queue.submit("pay-1").await);
        assert!(queue.submit("pay-2").await);
    }
}
