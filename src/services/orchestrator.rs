use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::chains::{AdapterError, AdapterRegistry, ChainAdapter, VerifyRequest};
use crate::config::EngineConfig;
use crate::error::SentinelError;
use crate::models::{
    AuditEvent, Chain, ManualPayment, SubmitPayment, VerificationChecks, VerificationResult,
    VerificationStatus,
};
use crate::services::scoring;
use crate::services::store::{PaymentRecord, VerificationStore};

const ACTOR_ENGINE: &str = "engine";

/// Attempts at a conditional store write before giving up. The per-id lock
/// keeps other verifications out, so the only writer we can lose to is the
/// expiry sweep.
const SAVE_ATTEMPTS: usize = 2;

/// Coordinates scoring, duplicate attribution, chain adapters and the
/// status state machine. Sole writer of verification results.
pub struct Orchestrator {
    store: Arc<dyn VerificationStore>,
    adapters: Arc<AdapterRegistry>,
    engine: EngineConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    chain_limits: HashMap<Chain, Arc<Semaphore>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        adapters: Arc<AdapterRegistry>,
        engine: EngineConfig,
    ) -> Self {
        let chain_limits = Chain::ALL
            .iter()
            .map(|&chain| (chain, Arc::new(Semaphore::new(engine.chain_concurrency))))
            .collect();

        Self {
            store,
            adapters,
            engine,
            locks: Mutex::new(HashMap::new()),
            chain_limits,
        }
    }

    pub fn store(&self) -> &Arc<dyn VerificationStore> {
        &self.store
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Accept a submitted payment: validate at the boundary, run the first
    /// scoring pass and persist the initial pending result.
    pub async fn intake(&self, submit: SubmitPayment) -> Result<PaymentRecord, SentinelError> {
        if submit.amount_usd <= rust_decimal::Decimal::ZERO {
            return Err(SentinelError::Validation(
                "amount_usd must be positive".to_string(),
            ));
        }
        if submit.user_id.trim().is_empty() {
            return Err(SentinelError::Validation("user_id is required".to_string()));
        }

        let payment_id = submit
            .payment_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let now = Utc::now();
        let payment = ManualPayment {
            payment_id: payment_id.clone(),
            user_id: submit.user_id,
            amount_usd: submit.amount_usd,
            chain: submit.chain,
            sender_wallet_address: normalize(submit.sender_wallet_address),
            transaction_hash: normalize(submit.transaction_hash),
            sender_name: normalize(submit.sender_name),
            notes: normalize(submit.notes),
            created_at: now,
            expires_at: now + ChronoDuration::hours(self.engine.review_window_hours),
        };

        let report = scoring::score(&payment, &self.engine);
        let result = VerificationResult::initial(&payment_id, report.score, report.reasons);

        self.store
            .insert_payment(payment.clone(), result.clone())
            .await?;
        self.record_audit(&payment_id, ACTOR_ENGINE, None, VerificationStatus::Pending, None)
            .await;

        tracing::info!(
            payment_id = %payment_id,
            chain = %payment.chain,
            score = report.score,
            "Payment accepted for verification"
        );

        Ok(PaymentRecord { payment, result })
    }

    /// Run one full verification pass for a payment. Serialized per id;
    /// always leaves the record in a determinable state.
    pub async fn verify_payment(
        &self,
        payment_id: &str,
    ) -> Result<VerificationResult, SentinelError> {
        let lock = self.lock_for(payment_id).await;
        let _guard = lock.lock().await;

        for _attempt in 0..SAVE_ATTEMPTS {
            let record = self
                .store
                .get(payment_id)
                .await?
                .ok_or_else(|| SentinelError::PaymentNotFound(payment_id.to_string()))?;
            let prior = record.result.verification_status;
            let now = Utc::now();

            if prior == VerificationStatus::Expired {
                return Err(SentinelError::ExpiredPayment(payment_id.to_string()));
            }
            if !prior.reverifiable() {
                // Admin-terminal records are left untouched; repeated
                // triggers are no-ops.
                return Ok(record.result);
            }

            if record.payment.is_expired(now)
                && prior.expirable(self.engine.expire_blockchain_failed)
            {
                let mut result = record.result.clone();
                result.verification_status = VerificationStatus::Expired;
                result.updated_at = now;
                match self.store.save(result.clone(), prior).await {
                    Ok(()) => {
                        self.record_audit(
                            payment_id,
                            ACTOR_ENGINE,
                            Some(prior),
                            VerificationStatus::Expired,
                            Some("Review window elapsed".to_string()),
                        )
                        .await;
                        return Ok(result);
                    }
                    Err(SentinelError::ConcurrentModification(_)) => continue,
                    Err(e) => return Err(e),
                }
            }

            let result = self.evaluate(&record.payment, prior).await?;
            match self.store.save(result.clone(), prior).await {
                Ok(()) => {
                    if result.verification_status != prior {
                        self.record_audit(
                            payment_id,
                            ACTOR_ENGINE,
                            Some(prior),
                            result.verification_status,
                            result.verification_errors.first().cloned(),
                        )
                        .await;
                    }
                    tracing::info!(
                        payment_id = %payment_id,
                        status = %result.verification_status,
                        confidence = result.verification_confidence,
                        verified = result.blockchain_verified,
                        "Verification pass complete"
                    );
                    return Ok(result);
                }
                Err(SentinelError::ConcurrentModification(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(SentinelError::ConcurrentModification(payment_id.to_string()))
    }

    /// Score the payment and cross-check it on-chain, producing the next
    /// verification result per the transition rules.
    async fn evaluate(
        &self,
        payment: &ManualPayment,
        prior: VerificationStatus,
    ) -> Result<VerificationResult, SentinelError> {
        use VerificationStatus::*;

        let report = scoring::score(payment, &self.engine);
        let candidate = report.is_auto_approve_candidate(&self.engine);

        let mut errors = report.reasons;
        let mut confidence = report.score;
        let mut checks: Option<VerificationChecks> = None;
        let mut blockchain_data = None;
        let mut verified = false;

        let status = match &payment.transaction_hash {
            None => {
                errors.push("No transaction hash to verify on-chain".to_string());
                ManualReviewRequired
            }
            Some(tx_hash) => {
                let duplicate_owner = self
                    .store
                    .claim_hash(payment.chain, tx_hash, &payment.payment_id)
                    .await?;
                let no_duplicates = duplicate_owner.is_none();
                if let Some(owner) = duplicate_owner {
                    errors.push(
                        SentinelError::DuplicateTransaction {
                            existing_payment_id: owner,
                        }
                        .to_string(),
                    );
                }

                match self.adapters.get(payment.chain) {
                    None => {
                        errors.push(format!(
                            "No {} adapter configured; on-chain verification unavailable",
                            payment.chain
                        ));
                        if no_duplicates {
                            ManualReviewRequired
                        } else {
                            BlockchainFailed
                        }
                    }
                    Some(adapter) => {
                        let request = VerifyRequest {
                            tx_hash: tx_hash.clone(),
                            amount_usd: payment.amount_usd,
                            sender: payment.sender_wallet_address.clone(),
                            submitted_at: payment.created_at,
                        };

                        match self.call_adapter(adapter, &request).await {
                            Ok(adapter_report) => {
                                let merged =
                                    adapter_report.checks.into_verification_checks(no_duplicates);
                                verified = merged.all_passed();
                                checks = Some(merged);
                                errors.extend(adapter_report.reasons);
                                blockchain_data = Some(adapter_report.raw);
                                if verified {
                                    confidence = 100;
                                }

                                if !no_duplicates || adapter_report.checks.definitive_failure() {
                                    BlockchainFailed
                                } else if verified && candidate && prior == Pending {
                                    AutoApproved
                                } else if prior == AutoApproved || prior == BlockchainFailed {
                                    // Non-definitive movement never flips an
                                    // already-classified record.
                                    prior
                                } else {
                                    ManualReviewRequired
                                }
                            }
                            Err(unavailable @ SentinelError::ChainUnavailable { .. }) => {
                                tracing::warn!(
                                    payment_id = %payment.payment_id,
                                    chain = %payment.chain,
                                    "{}",
                                    unavailable
                                );
                                errors.push(format!(
                                    "{}; falling back to manual review",
                                    unavailable
                                ));
                                match prior {
                                    AutoApproved | BlockchainFailed => prior,
                                    _ => ManualReviewRequired,
                                }
                            }
                            Err(other) => return Err(other),
                        }
                    }
                }
            }
        };

        Ok(VerificationResult {
            payment_id: payment.payment_id.clone(),
            verification_status: status,
            blockchain_verified: verified,
            verification_confidence: confidence,
            verification_checks: checks,
            verification_errors: errors,
            blockchain_data,
            updated_at: Utc::now(),
        })
    }

    /// Bounded adapter call: per-chain concurrency cap, per-call timeout,
    /// fixed retry count with exponential backoff between attempts.
    /// Exhausted retries surface as `ChainUnavailable`.
    async fn call_adapter(
        &self,
        adapter: Arc<dyn ChainAdapter>,
        request: &VerifyRequest,
    ) -> Result<crate::chains::AdapterReport, SentinelError> {
        let chain = adapter.chain();
        let limiter = self.chain_limits.get(&chain).cloned();
        let _permit = match &limiter {
            Some(semaphore) => {
                Some(semaphore.acquire().await.map_err(|_| {
                    SentinelError::Internal("concurrency limiter closed".to_string())
                })?)
            }
            None => None,
        };

        let timeout = Duration::from_secs(self.engine.adapter_timeout_secs);
        let mut policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(400),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: Duration::from_secs(5),
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut last_err: Option<AdapterError> = None;
        for attempt in 0..=self.engine.adapter_retries {
            if attempt > 0 {
                if let Some(delay) = policy.next_backoff() {
                    tokio::time::sleep(delay).await;
                }
                tracing::debug!(
                    chain = %adapter.chain(),
                    attempt,
                    "Retrying adapter call"
                );
            }

            match tokio::time::timeout(timeout, adapter.verify(request)).await {
                Ok(Ok(report)) => return Ok(report),
                Ok(Err(e)) => last_err = Some(e),
                Err(_) => {
                    last_err = Some(AdapterError::Unavailable(format!(
                        "call timed out after {}s",
                        self.engine.adapter_timeout_secs
                    )))
                }
            }
        }

        let reason = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no adapter attempts made".to_string());
        Err(SentinelError::ChainUnavailable { chain, reason })
    }

    /// Admin decision. One-way, idempotent: re-issuing the decision that
    /// already stands is a no-op and records nothing.
    pub async fn decide(
        &self,
        payment_id: &str,
        approve: bool,
        admin: &str,
        notes: Option<String>,
    ) -> Result<VerificationResult, SentinelError> {
        let target = if approve {
            VerificationStatus::Approved
        } else {
            VerificationStatus::Rejected
        };

        let lock = self.lock_for(payment_id).await;
        let _guard = lock.lock().await;

        for _attempt in 0..SAVE_ATTEMPTS {
            let record = self
                .store
                .get(payment_id)
                .await?
                .ok_or_else(|| SentinelError::PaymentNotFound(payment_id.to_string()))?;
            let prior = record.result.verification_status;

            if prior == target {
                return Ok(record.result);
            }
            if prior == VerificationStatus::Expired {
                return Err(SentinelError::ExpiredPayment(payment_id.to_string()));
            }
            if !prior.awaits_admin() {
                return Err(SentinelError::Validation(format!(
                    "payment is {}, not awaiting an admin decision",
                    prior
                )));
            }

            let mut result = record.result.clone();
            result.verification_status = target;
            result.updated_at = Utc::now();

            match self.store.save(result.clone(), prior).await {
                Ok(()) => {
                    self.record_audit(payment_id, admin, Some(prior), target, notes)
                        .await;
                    tracing::info!(
                        payment_id = %payment_id,
                        admin = %admin,
                        decision = %target,
                        "Admin decision recorded"
                    );
                    return Ok(result);
                }
                Err(SentinelError::ConcurrentModification(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(SentinelError::ConcurrentModification(payment_id.to_string()))
    }

    async fn lock_for(&self, payment_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(payment_id.to_string()).or_default().clone()
    }

    async fn record_audit(
        &self,
        payment_id: &str,
        actor: &str,
        from: Option<VerificationStatus>,
        to: VerificationStatus,
        notes: Option<String>,
    ) {
        let event = AuditEvent::new(payment_id, actor, from, to, notes);
        if let Err(e) = self.store.append_audit(event).await {
            tracing::error!(payment_id = %payment_id, "Failed to append audit event: {}", e);
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{AdapterReport, ChainChecks};
    use crate::services::store::MemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::VecDeque;

    enum Scripted {
        Pass,
        Fail(ChainChecks, &'static str),
        Unavailable,
    }

    struct ScriptedAdapter {
        chain: Chain,
        outcomes: Mutex<VecDeque<Scripted>>,
    }

    impl ScriptedAdapter {
        fn new(chain: Chain, outcomes: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                chain,
                outcomes: Mutex::new(outcomes.into()),
            })
        }
    }

    #[async_trait]
    impl ChainAdapter for ScriptedAdapter {
        fn chain(&self) -> Chain {
            self.chain
        }

        async fn verify(&self, _req: &VerifyRequest) -> Result<AdapterReport, AdapterError> {
            let mut outcomes = self.outcomes.lock().await;
            let outcome = if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                // Keep replaying the final outcome.
                match outcomes.front().unwrap() {
                    Scripted::Pass => Scripted::Pass,
                    Scripted::Fail(checks, reason) => Scripted::Fail(*checks, *reason),
                    Scripted::Unavailable => Scripted::Unavailable,
                }
            };

            match outcome {
                Scripted::Pass => Ok(AdapterReport {
                    checks: ChainChecks {
                        transaction_exists: true,
                        sender_verified: true,
                        recipient_verified: true,
                        amount_verified: true,
                        confirmed: true,
                        time_valid: true,
                    },
                    reasons: vec![],
                    raw: json!({"scripted": true}),
                }),
                Scripted::Fail(checks, reason) => Ok(AdapterReport {
                    checks,
                    reasons: vec![reason.to_string()],
                    raw: json!({"scripted": true}),
                }),
                Scripted::Unavailable => {
                    Err(AdapterError::Unavailable("scripted outage".to_string()))
                }
            }
        }

        async fn healthy(&self) -> bool {
            true
        }
    }

    fn fast_engine() -> EngineConfig {
        let mut engine = EngineConfig::test_defaults();
        engine.adapter_retries = 0;
        engine.adapter_timeout_secs = 2;
        engine
    }

    fn orchestrator_with(
        adapter: Option<Arc<ScriptedAdapter>>,
        engine: EngineConfig,
    ) -> Orchestrator {
        let store = Arc::new(MemoryStore::new());
        let mut registry = AdapterRegistry::new();
        if let Some(adapter) = adapter {
            registry.register(adapter);
        }
        Orchestrator::new(store, Arc::new(registry), engine)
    }

    fn submission(hash: &str) -> SubmitPayment {
        SubmitPayment {
            payment_id: None,
            user_id: "user-1".to_string(),
            amount_usd: dec!(1000),
            chain: Chain::Bsc,
            sender_wallet_address: Some(
                "0x1111111111111111111111111111111111111111".to_string(),
            ),
            transaction_hash: Some(hash.to_string()),
            sender_name: Some("Alice".to_string()),
            notes: None,
        }
    }

    fn evm_hash(seed: &str) -> String {
        format!("0x{}", seed.repeat(32))
    }

    #[tokio::test]
    async fn full_pass_auto_approves() {
        let adapter = ScriptedAdapter::new(Chain::Bsc, vec![Scripted::Pass]);
        let orch = orchestrator_with(Some(adapter), fast_engine());

        let record = orch.intake(submission(&evm_hash("ab"))).await.unwrap();
        assert_eq!(record.result.verification_confidence, 100);
        assert_eq!(
            record.result.verification_status,
            VerificationStatus::Pending
        );

        let result = orch.verify_payment(&record.payment.payment_id).await.unwrap();
        assert_eq!(result.verification_status, VerificationStatus::AutoApproved);
        assert!(result.blockchain_verified);
        assert_eq!(result.verification_confidence, 100);
        assert!(result.verification_checks.unwrap().all_passed());
        assert!(result.verification_errors.is_empty());
    }

    #[tokio::test]
    async fn outage_falls_back_to_manual_review() {
        let adapter = ScriptedAdapter::new(Chain::Bsc, vec![Scripted::Unavailable]);
        let orch = orchestrator_with(Some(adapter), fast_engine());

        let record = orch.intake(submission(&evm_hash("ab"))).await.unwrap();
        let result = orch.verify_payment(&record.payment.payment_id).await.unwrap();

        assert_eq!(
            result.verification_status,
            VerificationStatus::ManualReviewRequired
        );
        assert!(!result.blockchain_verified);
        // Confidence from scoring is retained even though the chain call
        // never completed.
        assert_eq!(result.verification_confidence, 100);
        assert!(result
            .verification_errors
            .iter()
            .any(|r| r.contains("unavailable")));
    }

    #[tokio::test]
    async fn low_score_never_auto_approves() {
        let adapter = ScriptedAdapter::new(Chain::Bsc, vec![Scripted::Pass]);
        let orch = orchestrator_with(Some(adapter), fast_engine());

        // Valid hash only: 30 points, well under the threshold.
        let mut submit = submission(&evm_hash("ab"));
        submit.sender_wallet_address = None;
        submit.amount_usd = dec!(75000);
        let record = orch.intake(submit).await.unwrap();
        assert_eq!(record.result.verification_confidence, 30);

        let result = orch.verify_payment(&record.payment.payment_id).await.unwrap();
        assert_eq!(
            result.verification_status,
            VerificationStatus::ManualReviewRequired
        );
    }

    #[tokio::test]
    async fn duplicate_hash_fails_second_payment() {
        let adapter = ScriptedAdapter::new(Chain::Bsc, vec![Scripted::Pass]);
        let orch = orchestrator_with(Some(adapter), fast_engine());
        let hash = evm_hash("ab");

        let first = orch.intake(submission(&hash)).await.unwrap();
        let first_result = orch.verify_payment(&first.payment.payment_id).await.unwrap();
        assert_eq!(
            first_result.verification_status,
            VerificationStatus::AutoApproved
        );

        let second = orch.intake(submission(&hash)).await.unwrap();
        let second_result = orch
            .verify_payment(&second.payment.payment_id)
            .await
            .unwrap();
        assert_eq!(
            second_result.verification_status,
            VerificationStatus::BlockchainFailed
        );
        let checks = second_result.verification_checks.unwrap();
        assert!(!checks.no_duplicates);
        assert!(!second_result.blockchain_verified);
        assert!(second_result
            .verification_errors
            .iter()
            .any(|r| r.contains(&first.payment.payment_id)));
    }

    #[tokio::test]
    async fn definitive_mismatch_downgrades_auto_approved() {
        let mismatch = ChainChecks {
            transaction_exists: true,
            sender_verified: true,
            recipient_verified: true,
            amount_verified: false,
            confirmed: true,
            time_valid: true,
        };
        let adapter = ScriptedAdapter::new(
            Chain::Bsc,
            vec![
                Scripted::Pass,
                Scripted::Fail(mismatch, "On-chain amount 5 outside tolerance of submitted 1000"),
            ],
        );
        let orch = orchestrator_with(Some(adapter), fast_engine());

        let record = orch.intake(submission(&evm_hash("ab"))).await.unwrap();
        let id = record.payment.payment_id.clone();

        let first = orch.verify_payment(&id).await.unwrap();
        assert_eq!(first.verification_status, VerificationStatus::AutoApproved);

        let second = orch.verify_payment(&id).await.unwrap();
        assert_eq!(
            second.verification_status,
            VerificationStatus::BlockchainFailed
        );
        assert!(!second.blockchain_verified);
    }

    #[tokio::test]
    async fn transient_outage_does_not_downgrade_auto_approved() {
        let adapter = ScriptedAdapter::new(
            Chain::Bsc,
            vec![Scripted::Pass, Scripted::Unavailable],
        );
        let orch = orchestrator_with(Some(adapter), fast_engine());

        let record = orch.intake(submission(&evm_hash("ab"))).await.unwrap();
        let id = record.payment.payment_id.clone();

        let first = orch.verify_payment(&id).await.unwrap();
        assert_eq!(first.verification_status, VerificationStatus::AutoApproved);

        let second = orch.verify_payment(&id).await.unwrap();
        assert_eq!(second.verification_status, VerificationStatus::AutoApproved);
    }

    #[tokio::test]
    async fn approve_is_idempotent_and_audited_once() {
        let adapter = ScriptedAdapter::new(Chain::Bsc, vec![Scripted::Unavailable]);
        let orch = orchestrator_with(Some(adapter), fast_engine());

        let record = orch.intake(submission(&evm_hash("ab"))).await.unwrap();
        let id = record.payment.payment_id.clone();
        orch.verify_payment(&id).await.unwrap();

        let first = orch
            .decide(&id, true, "admin-1", Some("looks good".to_string()))
            .await
            .unwrap();
        assert_eq!(first.verification_status, VerificationStatus::Approved);

        let second = orch.decide(&id, true, "admin-1", None).await.unwrap();
        assert_eq!(second.verification_status, VerificationStatus::Approved);

        // intake + manual_review + approved: the repeat decision added nothing.
        let audit = orch.store().audit_for(&id).await.unwrap();
        assert_eq!(audit.len(), 3);
        assert_eq!(audit[2].actor, "admin-1");
    }

    #[tokio::test]
    async fn conflicting_decision_is_an_error() {
        let adapter = ScriptedAdapter::new(Chain::Bsc, vec![Scripted::Unavailable]);
        let orch = orchestrator_with(Some(adapter), fast_engine());

        let record = orch.intake(submission(&evm_hash("ab"))).await.unwrap();
        let id = record.payment.payment_id.clone();
        orch.verify_payment(&id).await.unwrap();

        orch.decide(&id, false, "admin-1", None).await.unwrap();
        let err = orch.decide(&id, true, "admin-2", None).await.unwrap_err();
        assert!(matches!(err, SentinelError::Validation(_)));
    }

    #[tokio::test]
    async fn verify_rejects_already_expired_records() {
        let orch = orchestrator_with(None, fast_engine());

        // Seed a payment whose review window already elapsed.
        let now = Utc::now();
        let payment = ManualPayment {
            payment_id: "pay-exp".to_string(),
            user_id: "user-1".to_string(),
            amount_usd: dec!(100),
            chain: Chain::Bsc,
            sender_wallet_address: None,
            transaction_hash: None,
            sender_name: None,
            notes: None,
            created_at: now - ChronoDuration::hours(100),
            expires_at: now - ChronoDuration::hours(28),
        };
        let initial = VerificationResult::initial("pay-exp", 25, vec![]);
        orch.store().insert_payment(payment, initial).await.unwrap();

        // First pass reaps the record, the second refuses to touch it.
        let result = orch.verify_payment("pay-exp").await.unwrap();
        assert_eq!(result.verification_status, VerificationStatus::Expired);

        let err = orch.verify_payment("pay-exp").await.unwrap_err();
        assert!(matches!(err, SentinelError::ExpiredPayment(_)));
    }

    #[tokio::test]
    async fn missing_adapter_goes_to_manual_review() {
        let orch = orchestrator_with(None, fast_engine());

        let record = orch.intake(submission(&evm_hash("ab"))).await.unwrap();
        let result = orch.verify_payment(&record.payment.payment_id).await.unwrap();

        assert_eq!(
            result.verification_status,
            VerificationStatus::ManualReviewRequired
        );
        assert!(result
            .verification_errors
            .iter()
            .any(|r| r.contains("No bsc adapter configured")));
    }

    #[tokio::test]
    async fn missing_hash_skips_chain_and_needs_review() {
        let adapter = ScriptedAdapter::new(Chain::Bsc, vec![Scripted::Pass]);
        let orch = orchestrator_with(Some(adapter), fast_engine());

        let mut submit = submission("ignored");
        submit.transaction_hash = None;
        let record = orch.intake(submit).await.unwrap();

        let result = orch.verify_payment(&record.payment.payment_id).await.unwrap();
        assert_eq!(
            result.verification_status,
            VerificationStatus::ManualReviewRequired
        );
        assert!(result.verification_checks.is_none());
    }

    #[tokio::test]
    async fn intake_rejects_non_positive_amounts() {
        let orch = orchestrator_with(None, fast_engine());
        let mut submit = submission(&evm_hash("ab"));
        submit.amount_usd = dec!(0);
        let err = orch.intake(submit).await.unwrap_err();
        assert!(matches!(err, SentinelError::Validation(_)));
    }
}
