pub mod evm;
pub mod tron;

pub use evm::EvmAdapter;
pub use tron::TronAdapter;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::models::{Chain, VerificationChecks};

/// What the orchestrator hands an adapter for one verification pass.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub tx_hash: String,
    pub amount_usd: Decimal,
    pub sender: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// The six on-chain facts an adapter can establish. `no_duplicates` is a
/// store-side fact and is resolved by the orchestrator, not here.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChainChecks {
    pub transaction_exists: bool,
    pub sender_verified: bool,
    pub recipient_verified: bool,
    pub amount_verified: bool,
    pub confirmed: bool,
    pub time_valid: bool,
}

impl ChainChecks {
    pub fn all_passed(&self) -> bool {
        self.transaction_exists
            && self.sender_verified
            && self.recipient_verified
            && self.amount_verified
            && self.confirmed
            && self.time_valid
    }

    /// Checks that represent hard on-chain contradictions rather than
    /// not-yet-true facts. Confirmation depth and timing can still move;
    /// a missing transaction, wrong party or wrong amount cannot.
    pub fn definitive_failure(&self) -> bool {
        !self.transaction_exists
            || (self.transaction_exists
                && (!self.sender_verified || !self.recipient_verified || !self.amount_verified))
    }

    pub fn into_verification_checks(self, no_duplicates: bool) -> VerificationChecks {
        VerificationChecks {
            no_duplicates,
            transaction_exists: self.transaction_exists,
            sender_verified: self.sender_verified,
            recipient_verified: self.recipient_verified,
            amount_verified: self.amount_verified,
            confirmed: self.confirmed,
            time_valid: self.time_valid,
        }
    }
}

/// Outcome of one adapter pass. Definitive mismatches are reports, not
/// errors: the checks say what failed and `reasons` say why.
#[derive(Debug, Clone)]
pub struct AdapterReport {
    pub checks: ChainChecks,
    pub reasons: Vec<String>,
    pub raw: serde_json::Value,
}

/// Only transient conditions are adapter errors. The orchestrator maps
/// these to "unable to verify", never to "verification failed".
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("chain unavailable: {0}")]
    Unavailable(String),
    #[error("malformed RPC response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    async fn verify(&self, req: &VerifyRequest) -> Result<AdapterReport, AdapterError>;

    /// Cheap reachability probe for the health endpoint.
    async fn healthy(&self) -> bool;
}

/// Capability table mapping each configured chain to its adapter.
pub struct AdapterRegistry {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn get(&self, chain: Chain) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain).cloned()
    }

    pub fn chains(&self) -> Vec<Chain> {
        self.adapters.keys().copied().collect()
    }

    /// Build adapters for every chain the configuration names.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        let engine = &config.engine;

        for (&chain, settings) in &config.chains {
            let adapter: Arc<dyn ChainAdapter> = if chain.is_evm() {
                Arc::new(EvmAdapter::new(chain, settings, engine).await?)
            } else {
                Arc::new(TronAdapter::new(settings, engine)?)
            };
            registry.register(adapter);
            tracing::info!("Registered {} adapter", chain);
        }

        if registry.adapters.is_empty() {
            tracing::warn!("No chain adapters configured; every payment will need manual review");
        }

        Ok(registry)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Tolerance band for matching the submitted USD amount against the
/// on-chain stablecoin transfer: the wider of a fixed absolute band and a
/// percentage of the submitted amount, absorbing token price wobble.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    pub absolute_usd: Decimal,
    pub percent: Decimal,
}

impl Tolerance {
    pub fn band(&self, submitted: Decimal) -> Decimal {
        let relative = submitted * self.percent / Decimal::from(100);
        self.absolute_usd.max(relative)
    }

    pub fn matches(&self, submitted: Decimal, onchain: Decimal) -> bool {
        (submitted - onchain).abs() <= self.band(submitted)
    }
}

/// Convert raw token units to a decimal amount. Returns None for values
/// too large to represent, which no real stablecoin transfer reaches.
pub fn token_units_to_decimal(units: u128, decimals: u32) -> Option<Decimal> {
    let signed = i128::try_from(units).ok()?;
    Some(Decimal::from_i128_with_scale(signed, decimals))
}

/// Transaction timestamp must sit within the allowed skew around the
/// submission time.
pub fn within_time_window(
    tx_time: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    skew_hours: i64,
) -> bool {
    let skew = Duration::hours(skew_hours);
    let delta = tx_time - submitted_at;
    delta <= skew && delta >= -skew
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tolerance_uses_wider_of_absolute_and_percent() {
        let tol = Tolerance {
            absolute_usd: dec!(1.00),
            percent: dec!(1.5),
        };
        // Small amount: absolute band dominates.
        assert_eq!(tol.band(dec!(10)), dec!(1.00));
        assert!(tol.matches(dec!(10), dec!(9.10)));
        assert!(!tol.matches(dec!(10), dec!(8.90)));

        // Large amount: percent band dominates (1.5% of 1000 = 15).
        assert_eq!(tol.band(dec!(1000)), dec!(15.000));
        assert!(tol.matches(dec!(1000), dec!(986)));
        assert!(!tol.matches(dec!(1000), dec!(984)));
    }

    #[test]
    fn token_units_scale_to_usd() {
        // 1_000_000 units of a 6-decimal token = 1.000000
        assert_eq!(
            token_units_to_decimal(1_000_000, 6).unwrap(),
            dec!(1.000000)
        );
        assert_eq!(
            token_units_to_decimal(1_234_560_000, 6).unwrap(),
            dec!(1234.560000)
        );
    }

    #[test]
    fn time_window_is_symmetric() {
        let submitted = Utc::now();
        assert!(within_time_window(
            submitted - Duration::hours(5),
            submitted,
            6
        ));
        assert!(within_time_window(
            submitted + Duration::hours(5),
            submitted,
            6
        ));
        assert!(!within_time_window(
            submitted - Duration::hours(7),
            submitted,
            6
        ));
    }

    #[test]
    fn definitive_failure_excludes_depth_and_timing() {
        let pending_depth = ChainChecks {
            transaction_exists: true,
            sender_verified: true,
            recipient_verified: true,
            amount_verified: true,
            confirmed: false,
            time_valid: true,
        };
        assert!(!pending_depth.definitive_failure());

        let wrong_amount = ChainChecks {
            amount_verified: false,
            ..pending_depth
        };
        assert!(wrong_amount.definitive_failure());

        let missing = ChainChecks::default();
        assert!(missing.definitive_failure());
    }
}
