use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ethers::{
    providers::{Http, Middleware, Provider, ProviderError},
    types::{Address, TransactionReceipt, H256, U256},
};
use moka::future::Cache;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::chains::{
    token_units_to_decimal, within_time_window, AdapterError, AdapterReport, ChainAdapter,
    ChainChecks, Tolerance, VerifyRequest,
};
use crate::config::{ChainSettings, EngineConfig};
use crate::models::Chain;

/// ERC-20 Transfer(address,address,uint256) event signature.
const TRANSFER_TOPIC: &str = "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Immutable facts about a mined transaction. Confirmation depth is
/// recomputed against the live chain head on every pass, so these entries
/// can be cached; the short TTL bounds reorg staleness.
#[derive(Debug, Clone)]
struct TxFacts {
    success: bool,
    block_number: u64,
    timestamp_secs: u64,
    transfer: Option<TokenTransfer>,
}

#[derive(Debug, Clone, Copy)]
struct TokenTransfer {
    from: Address,
    to: Address,
    amount: U256,
}

/// One adapter type covers all EVM chains; it is instantiated per chain
/// with that chain's RPC endpoints, receiving wallet and token contract.
pub struct EvmAdapter {
    chain: Chain,
    primary: Arc<Provider<Http>>,
    fallback: Option<Arc<Provider<Http>>>,
    receiving_wallet: Address,
    token_contract: Address,
    token_decimals: u32,
    min_confirmations: u64,
    tolerance: Tolerance,
    time_skew_hours: i64,
    facts_cache: Cache<H256, Arc<TxFacts>>,
}

impl EvmAdapter {
    pub async fn new(
        chain: Chain,
        settings: &ChainSettings,
        engine: &EngineConfig,
    ) -> anyhow::Result<Self> {
        let primary = Arc::new(Provider::<Http>::try_from(settings.rpc_url.as_str())?);

        let fallback = match &settings.rpc_fallback {
            Some(url) => Some(Arc::new(Provider::<Http>::try_from(url.as_str())?)),
            None => None,
        };

        let receiving_wallet = Address::from_str(&settings.receiving_wallet)?;
        let token_contract = Address::from_str(&settings.token_contract)?;

        // Probe the endpoint but keep the adapter either way; outages are
        // handled per call.
        match primary.get_block_number().await {
            Ok(block) => tracing::info!("{} RPC connected, current block: {}", chain, block),
            Err(e) => tracing::warn!("{} RPC unreachable at startup: {}", chain, e),
        }

        Ok(Self {
            chain,
            primary,
            fallback,
            receiving_wallet,
            token_contract,
            token_decimals: settings.token_decimals,
            min_confirmations: settings.min_confirmations,
            tolerance: Tolerance {
                absolute_usd: engine.amount_tolerance_usd,
                percent: engine.amount_tolerance_pct,
            },
            time_skew_hours: engine.time_valid_skew_hours,
            facts_cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(60))
                .build(),
        })
    }

    async fn get_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        match self.primary.get_transaction_receipt(hash).await {
            Ok(receipt) => Ok(receipt),
            Err(_) if self.fallback.is_some() => {
                tracing::warn!("{} primary RPC failed, trying fallback", self.chain);
                self.fallback
                    .as_ref()
                    .unwrap()
                    .get_transaction_receipt(hash)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn get_block_timestamp(&self, number: u64) -> Result<Option<u64>, ProviderError> {
        let block = match self.primary.get_block(number).await {
            Ok(block) => block,
            Err(_) if self.fallback.is_some() => {
                self.fallback.as_ref().unwrap().get_block(number).await?
            }
            Err(e) => return Err(e),
        };
        Ok(block.map(|b| b.timestamp.as_u64()))
    }

    async fn latest_block(&self) -> Result<u64, ProviderError> {
        match self.primary.get_block_number().await {
            Ok(num) => Ok(num.as_u64()),
            Err(_) if self.fallback.is_some() => self
                .fallback
                .as_ref()
                .unwrap()
                .get_block_number()
                .await
                .map(|n| n.as_u64()),
            Err(e) => Err(e),
        }
    }

    /// Resolve the immutable facts for a hash, from cache or the chain.
    /// Absent transactions are never cached so a still-propagating tx can
    /// show up on the next pass.
    async fn load_facts(&self, hash: H256) -> Result<Option<Arc<TxFacts>>, AdapterError> {
        if let Some(facts) = self.facts_cache.get(&hash).await {
            tracing::debug!("{} facts cache hit for {:?}", self.chain, hash);
            return Ok(Some(facts));
        }

        let receipt = self
            .get_receipt(hash)
            .await
            .map_err(|e| AdapterError::Unavailable(e.to_string()))?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };

        let Some(block_number) = receipt.block_number else {
            // Receipt exists but the tx is not mined yet.
            return Ok(None);
        };

        let timestamp_secs = self
            .get_block_timestamp(block_number.as_u64())
            .await
            .map_err(|e| AdapterError::Unavailable(e.to_string()))?
            .ok_or_else(|| {
                AdapterError::Malformed(format!(
                    "receipt references missing block {}",
                    block_number
                ))
            })?;

        let facts = Arc::new(TxFacts {
            success: receipt.status == Some(1.into()),
            block_number: block_number.as_u64(),
            timestamp_secs,
            transfer: self.parse_token_transfer(&receipt),
        });

        self.facts_cache.insert(hash, facts.clone()).await;
        Ok(Some(facts))
    }

    fn parse_token_transfer(&self, receipt: &TransactionReceipt) -> Option<TokenTransfer> {
        let transfer_topic = H256::from_str(TRANSFER_TOPIC).unwrap();

        for log in &receipt.logs {
            if log.address == self.token_contract
                && log.topics.first() == Some(&transfer_topic)
                && log.topics.len() >= 3
            {
                return Some(TokenTransfer {
                    from: Address::from(log.topics[1]),
                    to: Address::from(log.topics[2]),
                    amount: U256::from_big_endian(&log.data),
                });
            }
        }
        None
    }

    fn not_found_report(&self, reason: String) -> AdapterReport {
        AdapterReport {
            checks: ChainChecks::default(),
            reasons: vec![reason],
            raw: json!({ "chain": self.chain.as_str(), "found": false }),
        }
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn verify(&self, req: &VerifyRequest) -> Result<AdapterReport, AdapterError> {
        let Ok(hash) = H256::from_str(req.tx_hash.trim_start_matches("0x")) else {
            return Ok(self.not_found_report(format!(
                "Malformed transaction hash for {}",
                self.chain
            )));
        };

        let Some(facts) = self.load_facts(hash).await? else {
            return Ok(
                self.not_found_report(format!("Transaction not found on {}", self.chain))
            );
        };

        if !facts.success {
            return Ok(self.not_found_report(format!(
                "Transaction reverted on {}",
                self.chain
            )));
        }

        let mut checks = ChainChecks {
            transaction_exists: true,
            ..ChainChecks::default()
        };
        let mut reasons = Vec::new();

        let latest = self
            .latest_block()
            .await
            .map_err(|e| AdapterError::Unavailable(e.to_string()))?;
        let confirmations = latest.saturating_sub(facts.block_number) + 1;
        checks.confirmed = confirmations >= self.min_confirmations;
        if !checks.confirmed {
            reasons.push(format!(
                "Only {}/{} confirmations on {}",
                confirmations, self.min_confirmations, self.chain
            ));
        }

        let tx_time = Utc
            .timestamp_opt(facts.timestamp_secs as i64, 0)
            .single()
            .ok_or_else(|| {
                AdapterError::Malformed(format!("invalid block timestamp {}", facts.timestamp_secs))
            })?;
        checks.time_valid = within_time_window(tx_time, req.submitted_at, self.time_skew_hours);
        if !checks.time_valid {
            reasons.push(format!(
                "Transaction mined at {} outside the allowed window around submission",
                tx_time
            ));
        }

        match facts.transfer {
            Some(transfer) => {
                checks.recipient_verified = transfer.to == self.receiving_wallet;
                if !checks.recipient_verified {
                    reasons.push(format!(
                        "Token transfer recipient {:?} is not the platform wallet",
                        transfer.to
                    ));
                }

                match &req.sender {
                    Some(sender) => match Address::from_str(sender) {
                        Ok(addr) => {
                            checks.sender_verified = addr == transfer.from;
                            if !checks.sender_verified {
                                reasons.push(format!(
                                    "Submitted sender {:?} does not match on-chain sender {:?}",
                                    addr, transfer.from
                                ));
                            }
                        }
                        Err(_) => {
                            reasons.push(format!(
                                "Submitted sender address is not a valid {} address",
                                self.chain
                            ));
                        }
                    },
                    None => {
                        reasons.push("No sender wallet address submitted".to_string());
                    }
                }

                let units = if transfer.amount.bits() <= 128 {
                    Some(transfer.amount.as_u128())
                } else {
                    None
                };
                match units.and_then(|u| token_units_to_decimal(u, self.token_decimals)) {
                    Some(onchain_usd) => {
                        checks.amount_verified = self.tolerance.matches(req.amount_usd, onchain_usd);
                        if !checks.amount_verified {
                            reasons.push(format!(
                                "On-chain amount {} outside tolerance of submitted {}",
                                onchain_usd, req.amount_usd
                            ));
                        }
                    }
                    None => {
                        reasons.push("On-chain token amount out of representable range".to_string());
                    }
                }
            }
            None => {
                reasons.push(format!(
                    "No transfer from the configured token contract in transaction logs on {}",
                    self.chain
                ));
            }
        }

        let raw = json!({
            "chain": self.chain.as_str(),
            "tx_hash": format!("{:?}", hash),
            "block_number": facts.block_number,
            "confirmations": confirmations,
            "block_timestamp": facts.timestamp_secs,
            "transfer": facts.transfer.map(|t| json!({
                "from": format!("{:?}", t.from),
                "to": format!("{:?}", t.to),
                "token_units": t.amount.to_string(),
            })),
        });

        Ok(AdapterReport {
            checks,
            reasons,
            raw,
        })
    }

    async fn healthy(&self) -> bool {
        self.latest_block().await.is_ok()
    }
}
