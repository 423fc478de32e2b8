use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base58 alphabet used by Tron addresses (Bitcoin alphabet, no 0/O/I/l).
pub const BASE58_ALPHABET: &[u8] =
    b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Supported settlement chains. Bitcoin is offered by the submission UI but
/// has no adapter, so it is rejected at the intake boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Bsc,
    Polygon,
    Tron,
}

impl Chain {
    pub const ALL: [Chain; 4] = [Chain::Ethereum, Chain::Bsc, Chain::Polygon, Chain::Tron];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bsc => "bsc",
            Chain::Polygon => "polygon",
            Chain::Tron => "tron",
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, Chain::Ethereum | Chain::Bsc | Chain::Polygon)
    }

    /// Format screening for a submitted transaction hash. EVM chains use
    /// 0x-prefixed 32-byte hex; Tron uses bare 32-byte hex.
    pub fn valid_tx_hash(&self, hash: &str) -> bool {
        if self.is_evm() {
            hash.strip_prefix("0x")
                .map(|rest| is_hex_of_len(rest, 64))
                .unwrap_or(false)
        } else {
            is_hex_of_len(hash, 64)
        }
    }

    /// Format screening for a submitted wallet address. This is the cheap
    /// shape check used by scoring; the Tron adapter re-derives the full
    /// base58check form before comparing against on-chain data.
    pub fn valid_address(&self, addr: &str) -> bool {
        if self.is_evm() {
            addr.strip_prefix("0x")
                .map(|rest| is_hex_of_len(rest, 40))
                .unwrap_or(false)
        } else {
            addr.len() == 34
                && addr.starts_with('T')
                && addr.bytes().all(|b| BASE58_ALPHABET.contains(&b))
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "bsc" | "bnb" => Ok(Chain::Bsc),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "tron" | "trx" => Ok(Chain::Tron),
            other => Err(format!("Unsupported chain: {}", other)),
        }
    }
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A user-submitted crypto payment. Created once at intake and never
/// mutated by the engine; `expires_at` is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualPayment {
    pub payment_id: String,
    pub user_id: String,
    pub amount_usd: Decimal,
    pub chain: Chain,
    pub sender_wallet_address: Option<String>,
    pub transaction_hash: Option<String>,
    pub sender_name: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ManualPayment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Intake request body. `payment_id` is assigned by the upstream payment
/// flow when present; otherwise the engine mints one.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitPayment {
    pub payment_id: Option<String>,
    pub user_id: String,
    pub amount_usd: Decimal,
    pub chain: Chain,
    pub sender_wallet_address: Option<String>,
    pub transaction_hash: Option<String>,
    pub sender_name: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_parses_wire_names_and_aliases() {
        assert_eq!("ethereum".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("BSC".parse::<Chain>().unwrap(), Chain::Bsc);
        assert_eq!("matic".parse::<Chain>().unwrap(), Chain::Polygon);
        assert_eq!("trx".parse::<Chain>().unwrap(), Chain::Tron);
        assert!("bitcoin".parse::<Chain>().is_err());
    }

    #[test]
    fn evm_tx_hash_format() {
        let good = format!("0x{}", "ab".repeat(32));
        assert!(Chain::Ethereum.valid_tx_hash(&good));
        assert!(Chain::Bsc.valid_tx_hash(&good));
        // missing prefix, wrong length, non-hex
        assert!(!Chain::Ethereum.valid_tx_hash(&"ab".repeat(32)));
        assert!(!Chain::Ethereum.valid_tx_hash("0xabcd"));
        assert!(!Chain::Ethereum.valid_tx_hash(&format!("0x{}", "zz".repeat(32))));
    }

    #[test]
    fn tron_tx_hash_format() {
        assert!(Chain::Tron.valid_tx_hash(&"cd".repeat(32)));
        assert!(!Chain::Tron.valid_tx_hash(&format!("0x{}", "cd".repeat(32))));
    }

    #[test]
    fn evm_address_format() {
        assert!(Chain::Polygon.valid_address("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"));
        assert!(!Chain::Polygon.valid_address("7a250d5630B4cF539739dF2C5dAcb4c659F2488D"));
        assert!(!Chain::Polygon.valid_address("0x7a25"));
    }

    #[test]
    fn tron_address_format() {
        assert!(Chain::Tron.valid_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"));
        // 0 is not in the base58 alphabet
        assert!(!Chain::Tron.valid_address("T0000000000000000000000000000000aa"));
        assert!(!Chain::Tron.valid_address("R7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6tX"));
        assert!(!Chain::Tron.valid_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6"));
    }
}
