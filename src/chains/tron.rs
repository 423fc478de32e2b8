use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::chains::{
    token_units_to_decimal, within_time_window, AdapterError, AdapterReport, ChainAdapter,
    ChainChecks, Tolerance, VerifyRequest,
};
use crate::config::{ChainSettings, EngineConfig};
use crate::models::{Chain, BASE58_ALPHABET};

/// TRC-20 Transfer(address,address,uint256) event signature, same keccak
/// hash as on EVM chains.
const TRANSFER_TOPIC: &str = "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Tron mainnet address version byte.
const TRON_VERSION: u8 = 0x41;

/// Adapter for Tron full-node HTTP APIs (TronGrid-compatible):
/// `gettransactioninfobyid` for the transaction, `getnowblock` for depth.
pub struct TronAdapter {
    api_url: String,
    client: reqwest::Client,
    receiving_wallet: [u8; 20],
    token_contract: [u8; 20],
    token_decimals: u32,
    min_confirmations: u64,
    tolerance: Tolerance,
    time_skew_hours: i64,
}

impl TronAdapter {
    pub fn new(settings: &ChainSettings, engine: &EngineConfig) -> anyhow::Result<Self> {
        let receiving_wallet = base58check_decode(&settings.receiving_wallet)
            .ok_or_else(|| anyhow::anyhow!("TRON_RECEIVING_WALLET failed base58check"))?;
        let token_contract = base58check_decode(&settings.token_contract)
            .ok_or_else(|| anyhow::anyhow!("TRON_TOKEN_CONTRACT failed base58check"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(engine.adapter_timeout_secs))
            .build()?;

        Ok(Self {
            api_url: settings.rpc_url.trim_end_matches('/').to_string(),
            client,
            receiving_wallet,
            token_contract,
            token_decimals: settings.token_decimals,
            min_confirmations: settings.min_confirmations,
            tolerance: Tolerance {
                absolute_usd: engine.amount_tolerance_usd,
                percent: engine.amount_tolerance_pct,
            },
            time_skew_hours: engine.time_valid_skew_hours,
        })
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, AdapterError> {
        let url = format!("{}{}", self.api_url, path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AdapterError::Unavailable(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AdapterError::Malformed(e.to_string()))
    }

    async fn latest_block(&self) -> Result<u64, AdapterError> {
        let now_block = self.post_json("/wallet/getnowblock", json!({})).await?;
        now_block["block_header"]["raw_data"]["number"]
            .as_u64()
            .ok_or_else(|| AdapterError::Malformed("getnowblock missing block number".to_string()))
    }

    /// Scan transaction logs for a transfer from the configured token
    /// contract. Log addresses come back as 20-byte hex, with or without
    /// the 0x41 version prefix depending on the node.
    fn find_token_transfer(&self, info: &serde_json::Value) -> Option<TronTransfer> {
        let logs = info["log"].as_array()?;

        for log in logs {
            let Some(address) = log["address"]
                .as_str()
                .and_then(|raw| normalize_hex_address(raw))
            else {
                continue;
            };
            if address != hex::encode(self.token_contract) {
                continue;
            }

            let Some(topics) = log["topics"].as_array() else {
                continue;
            };
            if topics.len() < 3 {
                continue;
            }
            let Some(first_topic) = topics[0].as_str() else {
                continue;
            };
            if !first_topic.eq_ignore_ascii_case(TRANSFER_TOPIC) {
                continue;
            }

            let from = topics[1].as_str().and_then(topic_to_address);
            let to = topics[2].as_str().and_then(topic_to_address);
            let amount = log["data"].as_str().and_then(parse_hex_amount);
            if let (Some(from), Some(to), Some(amount)) = (from, to, amount) {
                return Some(TronTransfer { from, to, amount });
            }
        }
        None
    }

    fn not_found_report(&self, reason: String) -> AdapterReport {
        AdapterReport {
            checks: ChainChecks::default(),
            reasons: vec![reason],
            raw: json!({ "chain": "tron", "found": false }),
        }
    }
}

#[derive(Debug, Clone)]
struct TronTransfer {
    from: String,
    to: String,
    amount: u128,
}

#[async_trait]
impl ChainAdapter for TronAdapter {
    fn chain(&self) -> Chain {
        Chain::Tron
    }

    async fn verify(&self, req: &VerifyRequest) -> Result<AdapterReport, AdapterError> {
        if !Chain::Tron.valid_tx_hash(&req.tx_hash) {
            return Ok(self.not_found_report("Malformed transaction hash for tron".to_string()));
        }

        let info = self
            .post_json(
                "/wallet/gettransactioninfobyid",
                json!({ "value": req.tx_hash }),
            )
            .await?;

        if info["id"].as_str().is_none() {
            return Ok(self.not_found_report("Transaction not found on tron".to_string()));
        }

        let Some(block_number) = info["blockNumber"].as_u64() else {
            return Ok(
                self.not_found_report("Transaction not yet included in a block on tron".to_string())
            );
        };

        // TriggerSmartContract receipts carry a result; anything other than
        // SUCCESS means the transfer reverted.
        if let Some(result) = info["receipt"]["result"].as_str() {
            if result != "SUCCESS" {
                return Ok(
                    self.not_found_report(format!("Transaction reverted on tron: {}", result))
                );
            }
        }

        let mut checks = ChainChecks {
            transaction_exists: true,
            ..ChainChecks::default()
        };
        let mut reasons = Vec::new();

        let latest = self.latest_block().await?;
        let confirmations = latest.saturating_sub(block_number) + 1;
        checks.confirmed = confirmations >= self.min_confirmations;
        if !checks.confirmed {
            reasons.push(format!(
                "Only {}/{} confirmations on tron",
                confirmations, self.min_confirmations
            ));
        }

        let timestamp_ms = info["blockTimeStamp"].as_i64().unwrap_or(0);
        match Utc.timestamp_millis_opt(timestamp_ms).single() {
            Some(tx_time) => {
                checks.time_valid =
                    within_time_window(tx_time, req.submitted_at, self.time_skew_hours);
                if !checks.time_valid {
                    reasons.push(format!(
                        "Transaction mined at {} outside the allowed window around submission",
                        tx_time
                    ));
                }
            }
            None => {
                reasons.push("Block timestamp missing from node response".to_string());
            }
        }

        let transfer = self.find_token_transfer(&info);
        match &transfer {
            Some(transfer) => {
                checks.recipient_verified = transfer.to == hex::encode(self.receiving_wallet);
                if !checks.recipient_verified {
                    reasons.push(format!(
                        "Token transfer recipient {} is not the platform wallet",
                        transfer.to
                    ));
                }

                match &req.sender {
                    Some(sender) => match base58check_decode(sender) {
                        Some(sender_bytes) => {
                            checks.sender_verified = hex::encode(sender_bytes) == transfer.from;
                            if !checks.sender_verified {
                                reasons.push(format!(
                                    "Submitted sender {} does not match on-chain sender",
                                    sender
                                ));
                            }
                        }
                        None => {
                            reasons
                                .push("Submitted sender address failed base58check".to_string());
                        }
                    },
                    None => {
                        reasons.push("No sender wallet address submitted".to_string());
                    }
                }

                match token_units_to_decimal(transfer.amount, self.token_decimals) {
                    Some(onchain_usd) => {
                        checks.amount_verified =
                            self.tolerance.matches(req.amount_usd, onchain_usd);
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
                reasons.push(
                    "No transfer from the configured token contract in transaction logs on tron"
                        .to_string(),
                );
            }
        }

        let raw = json!({
            "chain": "tron",
            "tx_hash": req.tx_hash,
            "block_number": block_number,
            "confirmations": confirmations,
            "block_timestamp_ms": timestamp_ms,
            "transfer": transfer.as_ref().map(|t| json!({
                "from": t.from,
                "to": t.to,
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

/// Strip the optional 0x41 version prefix from a 21-byte hex log address.
fn normalize_hex_address(raw: &str) -> Option<String> {
    let lower = raw.trim_start_matches("0x").to_lowercase();
    match lower.len() {
        40 => Some(lower),
        42 if lower.starts_with("41") => Some(lower[2..].to_string()),
        _ => None,
    }
}

/// An address-typed topic is the 20-byte address left-padded to 32 bytes.
fn topic_to_address(topic: &str) -> Option<String> {
    let lower = topic.trim_start_matches("0x").to_lowercase();
    if lower.len() != 64 {
        return None;
    }
    Some(lower[24..].to_string())
}

fn parse_hex_amount(data: &str) -> Option<u128> {
    let trimmed = data.trim_start_matches("0x").trim_start_matches('0');
    if trimmed.is_empty() {
        return Some(0);
    }
    if trimmed.len() > 32 {
        return None;
    }
    u128::from_str_radix(trimmed, 16).ok()
}

/// Decode a Tron base58check address to its 20-byte body, verifying the
/// double-sha256 checksum and the 0x41 version byte.
pub fn base58check_decode(addr: &str) -> Option<[u8; 20]> {
    // Base58 big-number decode, little-endian accumulator.
    let mut num: Vec<u8> = Vec::with_capacity(25);
    for &c in addr.as_bytes() {
        let idx = BASE58_ALPHABET.iter().position(|&b| b == c)? as u32;
        let mut carry = idx;
        for byte in num.iter_mut() {
            let v = (*byte as u32) * 58 + carry;
            *byte = (v & 0xff) as u8;
            carry = v >> 8;
        }
        while carry > 0 {
            num.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    for &c in addr.as_bytes() {
        if c == b'1' {
            num.push(0);
        } else {
            break;
        }
    }
    num.reverse();

    if num.len() != 25 {
        return None;
    }
    let (payload, checksum) = num.split_at(21);
    let digest = Sha256::digest(Sha256::digest(payload));
    if digest[..4] != *checksum || payload[0] != TRON_VERSION {
        return None;
    }

    let mut out = [0u8; 20];
    out.copy_from_slice(&payload[1..]);
    Some(out)
}

#[cfg(test)]
pub(crate) fn base58check_encode(body: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(25);
    payload.push(TRON_VERSION);
    payload.extend_from_slice(body);
    let digest = Sha256::digest(Sha256::digest(&payload));
    payload.extend_from_slice(&digest[..4]);

    // Base58 big-number encode.
    let mut digits: Vec<u8> = vec![0];
    for &byte in &payload {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            let v = (*d as u32) * 256 + carry;
            *d = (v % 58) as u8;
            carry = v / 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }
    for &byte in &payload {
        if byte == 0 {
            digits.push(0);
        } else {
            break;
        }
    }

    digits
        .iter()
        .rev()
        .map(|&d| BASE58_ALPHABET[d as usize] as char)
        .collect()
}
