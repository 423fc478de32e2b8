use std::sync::Arc;
use std::time::Instant;

use crate::error::SentinelError;
use crate::models::{VerificationStats, VerificationStatus};
use crate::services::store::VerificationStore;

/// Aggregates store contents into the counters the dashboard cards and the
/// websocket stream show.
pub struct StatsService {
    store: Arc<dyn VerificationStore>,
    start_time: Instant,
}

impl StatsService {
    pub fn new(store: Arc<dyn VerificationStore>) -> Self {
        Self {
            store,
            start_time: Instant::now(),
        }
    }

    pub async fn get_stats(&self) -> Result<VerificationStats, SentinelError> {
        let records = self.store.list().await?;

        let mut stats = VerificationStats {
            total: records.len() as u64,
            ..VerificationStats::default()
        };
        let mut confidence_sum: u64 = 0;

        for record in &records {
            confidence_sum += record.result.verification_confidence as u64;
            match record.result.verification_status {
                VerificationStatus::Pending => stats.pending += 1,
                VerificationStatus::AutoApproved => stats.auto_approved += 1,
                VerificationStatus::ManualReviewRequired => stats.manual_review_required += 1,
                VerificationStatus::BlockchainFailed => stats.blockchain_failed += 1,
                VerificationStatus::Approved => stats.approved += 1,
                VerificationStatus::Rejected => stats.rejected += 1,
                VerificationStatus::Expired => stats.expired += 1,
            }
        }

        if stats.total > 0 {
            stats.auto_approval_rate = stats.auto_approved as f64 / stats.total as f64;
            stats.avg_confidence = confidence_sum as f64 / stats.total as f64;
        }

        Ok(stats)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chain, ManualPayment, VerificationResult};
    use crate::services::store::MemoryStore;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn stats_count_statuses_and_rates() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();

        for (id, status, confidence) in [
            ("a", VerificationStatus::AutoApproved, 100u8),
            ("b", VerificationStatus::ManualReviewRequired, 40),
            ("c", VerificationStatus::ManualReviewRequired, 40),
            ("d", VerificationStatus::Expired, 20),
        ] {
            let payment = ManualPayment {
                payment_id: id.to_string(),
                user_id: "user-1".to_string(),
                amount_usd: dec!(10),
                chain: Chain::Polygon,
                sender_wallet_address: None,
                transaction_hash: None,
                sender_name: None,
                notes: None,
                created_at: now,
                expires_at: now + Duration::hours(72),
            };
            let mut result = VerificationResult::initial(id, confidence, vec![]);
            result.verification_status = status;
            store.insert_payment(payment, result).await.unwrap();
        }

        let stats = StatsService::new(store).get_stats().await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.auto_approved, 1);
        assert_eq!(stats.manual_review_required, 2);
        assert_eq!(stats.expired, 1);
        assert!((stats.auto_approval_rate - 0.25).abs() < f64::EPSILON);
        assert!((stats.avg_confidence - 50.0).abs() < f64::EPSILON);
    }
}
