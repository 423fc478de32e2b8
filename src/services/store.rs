use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::SentinelError;
use crate::models::{AuditEvent, Chain, ManualPayment, VerificationResult, VerificationStatus};

/// A payment together with its current verification result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment: ManualPayment,
    pub result: VerificationResult,
}

/// Persistence boundary for the engine. The engine is the only writer of
/// verification results; every result write is conditional on the last
/// observed status so concurrent triggers cannot silently overwrite each
/// other.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Persist a freshly submitted payment with its initial result.
    async fn insert_payment(
        &self,
        payment: ManualPayment,
        result: VerificationResult,
    ) -> Result<(), SentinelError>;

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>, SentinelError>;

    /// Optimistic-concurrency write: fails with `ConcurrentModification`
    /// when the stored status no longer matches `expected_prior`.
    async fn save(
        &self,
        result: VerificationResult,
        expected_prior: VerificationStatus,
    ) -> Result<(), SentinelError>;

    /// Which payment, if any, a transaction hash is attributed to.
    async fn exists_hash(
        &self,
        chain: Chain,
        tx_hash: &str,
    ) -> Result<Option<String>, SentinelError>;

    /// Attribute a hash to a payment, first writer wins. Returns `None`
    /// when the claim succeeded (or the hash was already ours), otherwise
    /// the id of the payment that holds it.
    async fn claim_hash(
        &self,
        chain: Chain,
        tx_hash: &str,
        payment_id: &str,
    ) -> Result<Option<String>, SentinelError>;

    async fn list(&self) -> Result<Vec<PaymentRecord>, SentinelError>;

    async fn append_audit(&self, event: AuditEvent) -> Result<(), SentinelError>;

    async fn audit_for(&self, payment_id: &str) -> Result<Vec<AuditEvent>, SentinelError>;

    async fn ping(&self) -> bool;
}

fn hash_key(chain: Chain, tx_hash: &str) -> String {
    format!("{}:{}", chain, tx_hash.to_lowercase())
}

/// In-memory store used in development and tests.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, PaymentRecord>>,
    hash_index: RwLock<HashMap<String, String>>,
    audit: RwLock<Vec<AuditEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn insert_payment(
        &self,
        payment: ManualPayment,
        result: VerificationResult,
    ) -> Result<(), SentinelError> {
        let mut records = self.records.write().await;
        if records.contains_key(&payment.payment_id) {
            return Err(SentinelError::Validation(format!(
                "payment {} already exists",
                payment.payment_id
            )));
        }
        records.insert(payment.payment_id.clone(), PaymentRecord { payment, result });
        Ok(())
    }

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>, SentinelError> {
        Ok(self.records.read().await.get(payment_id).cloned())
    }

    async fn save(
        &self,
        result: VerificationResult,
        expected_prior: VerificationStatus,
    ) -> Result<(), SentinelError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&result.payment_id)
            .ok_or_else(|| SentinelError::PaymentNotFound(result.payment_id.clone()))?;

        if record.result.verification_status != expected_prior {
            return Err(SentinelError::ConcurrentModification(
                result.payment_id.clone(),
            ));
        }
        record.result = result;
        Ok(())
    }

    async fn exists_hash(
        &self,
        chain: Chain,
        tx_hash: &str,
    ) -> Result<Option<String>, SentinelError> {
        Ok(self
            .hash_index
            .read()
            .await
            .get(&hash_key(chain, tx_hash))
            .cloned())
    }

    async fn claim_hash(
        &self,
        chain: Chain,
        tx_hash: &str,
        payment_id: &str,
    ) -> Result<Option<String>, SentinelError> {
        let mut index = self.hash_index.write().await;
        match index.get(&hash_key(chain, tx_hash)) {
            Some(owner) if owner == payment_id => Ok(None),
            Some(owner) => Ok(Some(owner.clone())),
            None => {
                index.insert(hash_key(chain, tx_hash), payment_id.to_string());
                Ok(None)
            }
        }
    }

    async fn list(&self) -> Result<Vec<PaymentRecord>, SentinelError> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.payment.created_at.cmp(&a.payment.created_at));
        Ok(records)
    }

    async fn append_audit(&self, event: AuditEvent) -> Result<(), SentinelError> {
        self.audit.write().await.push(event);
        Ok(())
    }

    async fn audit_for(&self, payment_id: &str) -> Result<Vec<AuditEvent>, SentinelError> {
        Ok(self
            .audit
            .read()
            .await
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// Redis-backed store for deployments. Records live as JSON values, the
/// hash attribution index as a Redis hash with set-if-absent semantics.
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

const IDS_KEY: &str = "sentinel:payments";
const HASH_INDEX_KEY: &str = "sentinel:hash_index";

impl RedisStore {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!("Redis store connected");
        Ok(Self { conn })
    }

    fn record_key(payment_id: &str) -> String {
        format!("sentinel:payment:{}", payment_id)
    }

    fn audit_key(payment_id: &str) -> String {
        format!("sentinel:audit:{}", payment_id)
    }

    async fn read_record(&self, payment_id: &str) -> Result<Option<PaymentRecord>, SentinelError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::record_key(payment_id))
            .await
            .map_err(|e| SentinelError::Store(e.to_string()))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| SentinelError::Store(format!("corrupt record: {}", e))),
            None => Ok(None),
        }
    }

    async fn write_record(&self, record: &PaymentRecord) -> Result<(), SentinelError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)
            .map_err(|e| SentinelError::Store(e.to_string()))?;
        conn.set::<_, _, ()>(Self::record_key(&record.payment.payment_id), json)
            .await
            .map_err(|e| SentinelError::Store(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl VerificationStore for RedisStore {
    async fn insert_payment(
        &self,
        payment: ManualPayment,
        result: VerificationResult,
    ) -> Result<(), SentinelError> {
        if self.read_record(&payment.payment_id).await?.is_some() {
            return Err(SentinelError::Validation(format!(
                "payment {} already exists",
                payment.payment_id
            )));
        }
        let record = PaymentRecord { payment, result };
        self.write_record(&record).await?;

        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(IDS_KEY, &record.payment.payment_id)
            .await
            .map_err(|e| SentinelError::Store(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, payment_id: &str) -> Result<Option<PaymentRecord>, SentinelError> {
        self.read_record(payment_id).await
    }

    // The engine serializes writers per payment id, so read-compare-write
    // here only races the expiry sweep; the status comparison is what
    // detects that race.
    async fn save(
        &self,
        result: VerificationResult,
        expected_prior: VerificationStatus,
    ) -> Result<(), SentinelError> {
        let mut record = self
            .read_record(&result.payment_id)
            .await?
            .ok_or_else(|| SentinelError::PaymentNotFound(result.payment_id.clone()))?;

        if record.result.verification_status != expected_prior {
            return Err(SentinelError::ConcurrentModification(
                result.payment_id.clone(),
            ));
        }
        record.result = result;
        self.write_record(&record).await
    }

    async fn exists_hash(
        &self,
        chain: Chain,
        tx_hash: &str,
    ) -> Result<Option<String>, SentinelError> {
        let mut conn = self.conn.clone();
        conn.hget(HASH_INDEX_KEY, hash_key(chain, tx_hash))
            .await
            .map_err(|e| SentinelError::Store(e.to_string()))
    }

    async fn claim_hash(
        &self,
        chain: Chain,
        tx_hash: &str,
        payment_id: &str,
    ) -> Result<Option<String>, SentinelError> {
        let mut conn = self.conn.clone();
        let field = hash_key(chain, tx_hash);
        let claimed: bool = conn
            .hset_nx(HASH_INDEX_KEY, &field, payment_id)
            .await
            .map_err(|e| SentinelError::Store(e.to_string()))?;
        if claimed {
            return Ok(None);
        }
        let owner: Option<String> = conn
            .hget(HASH_INDEX_KEY, &field)
            .await
            .map_err(|e| SentinelError::Store(e.to_string()))?;
        match owner {
            Some(owner) if owner == payment_id => Ok(None),
            other => Ok(other),
        }
    }

    async fn list(&self) -> Result<Vec<PaymentRecord>, SentinelError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(IDS_KEY)
            .await
            .map_err(|e| SentinelError::Store(e.to_string()))?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.read_record(&id).await? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.payment.created_at.cmp(&a.payment.created_at));
        Ok(records)
    }

    async fn append_audit(&self, event: AuditEvent) -> Result<(), SentinelError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&event)
            .map_err(|e| SentinelError::Store(e.to_string()))?;
        conn.rpush::<_, _, ()>(Self::audit_key(&event.payment_id), json)
            .await
            .map_err(|e| SentinelError::Store(e.to_string()))?;
        Ok(())
    }

    async fn audit_for(&self, payment_id: &str) -> Result<Vec<AuditEvent>, SentinelError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(Self::audit_key(payment_id), 0, -1)
            .await
            .map_err(|e| SentinelError::Store(e.to_string()))?;
        raw.iter()
            .map(|json| {
                serde_json::from_str(json)
                    .map_err(|e| SentinelError::Store(format!("corrupt audit event: {}", e)))
            })
            .collect()
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}

/// Pick the store implementation from configuration: Redis when a URL is
/// configured and reachable, otherwise memory.
pub async fn build_store(
    redis_url: Option<&str>,
) -> std::sync::Arc<dyn VerificationStore> {
    if let Some(url) = redis_url {
        match RedisStore::new(url).await {
            Ok(store) => return std::sync::Arc::new(store),
            Err(e) => {
                tracing::warn!("Redis store unavailable: {}, using memory store", e);
            }
        }
    }
    std::sync::Arc::new(MemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn record(payment_id: &str, hash: Option<&str>) -> (ManualPayment, VerificationResult) {
        let now = Utc::now();
        let payment = ManualPayment {
            payment_id: payment_id.to_string(),
            user_id: "user-1".to_string(),
            amount_usd: dec!(100),
            chain: Chain::Bsc,
            sender_wallet_address: None,
            transaction_hash: hash.map(String::from),
            sender_name: None,
            notes: None,
            created_at: now,
            expires_at: now + Duration::hours(72),
        };
        let result = VerificationResult::initial(payment_id, 45, vec![]);
        (payment, result)
    }

    #[tokio::test]
    async fn save_rejects_stale_status() {
        let store = MemoryStore::new();
        let (payment, result) = record("pay-1", None);
        store.insert_payment(payment, result.clone()).await.unwrap();

        let mut approved = result.clone();
        approved.verification_status = VerificationStatus::ManualReviewRequired;
        store
            .save(approved, VerificationStatus::Pending)
            .await
            .unwrap();

        // A second writer that still believes the record is pending loses.
        let mut stale = result;
        stale.verification_status = VerificationStatus::Expired;
        let err = store
            .save(stale, VerificationStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, SentinelError::ConcurrentModification(_)));
    }

    #[tokio::test]
    async fn hash_claims_are_first_writer_wins() {
        let store = MemoryStore::new();
        let hash = "0xabc";

        assert_eq!(store.claim_hash(Chain::Bsc, hash, "pay-1").await.unwrap(), None);
        // Re-claiming our own hash is a no-op.
        assert_eq!(store.claim_hash(Chain::Bsc, hash, "pay-1").await.unwrap(), None);
        // A different payment is told who owns it.
        assert_eq!(
            store.claim_hash(Chain::Bsc, hash, "pay-2").await.unwrap(),
            Some("pay-1".to_string())
        );
        // Case differences in the hash do not dodge the index.
        assert_eq!(
            store.claim_hash(Chain::Bsc, "0xABC", "pay-3").await.unwrap(),
            Some("pay-1".to_string())
        );
        // The same hash on another chain is a distinct attribution.
        assert_eq!(
            store.claim_hash(Chain::Ethereum, hash, "pay-2").await.unwrap(),
            None
        );
        assert_eq!(
            store.exists_hash(Chain::Bsc, hash).await.unwrap(),
            Some("pay-1".to_string())
        );
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryStore::new();
        let (payment, result) = record("pay-1", None);
        store
            .insert_payment(payment.clone(), result.clone())
            .await
            .unwrap();
        let err = store.insert_payment(payment, result).await.unwrap_err();
        assert!(matches!(err, SentinelError::Validation(_)));
    }
}
