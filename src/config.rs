use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::models::Chain;

#[derive(Debug, Clone)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

/// Per-chain verification settings. A chain with no RPC URL configured gets
/// no adapter; its payments fall to manual review with a reason.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub rpc_fallback: Option<String>,
    /// The platform's receiving wallet on this chain.
    pub receiving_wallet: String,
    /// Stablecoin contract whose Transfer events settle payments.
    pub token_contract: String,
    pub token_decimals: u32,
    pub min_confirmations: u64,
}

/// Engine tuning knobs, all overridable from the environment so thresholds
/// can move without redeploying adapters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub auto_approve_threshold: u8,
    pub large_amount_cutoff_usd: Decimal,
    pub amount_tolerance_usd: Decimal,
    pub amount_tolerance_pct: Decimal,
    pub review_window_hours: i64,
    /// Allowed distance between the on-chain timestamp and submission time.
    pub time_valid_skew_hours: i64,
    pub adapter_timeout_secs: u64,
    pub adapter_retries: u32,
    pub verify_workers: usize,
    /// Concurrent RPC calls allowed per chain.
    pub chain_concurrency: usize,
    pub expiry_sweep_secs: u64,
    /// Whether the expiry sweep may reap blockchain_failed records.
    pub expire_blockchain_failed: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub chains: HashMap<Chain, ChainSettings>,
    pub engine: EngineConfig,
    pub redis_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;

        let config = Self {
            environment: environment.clone(),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,

            chains: Self::parse_chains()?,
            engine: Self::parse_engine()?,

            redis_url: std::env::var("REDIS_URL").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_chains() -> Result<HashMap<Chain, ChainSettings>> {
        let mut chains = HashMap::new();

        for chain in Chain::ALL {
            let prefix = Self::env_prefix(chain);
            let Ok(rpc_url) = std::env::var(format!("{}_RPC_URL", prefix)) else {
                continue;
            };

            let settings = ChainSettings {
                rpc_url,
                rpc_fallback: std::env::var(format!("{}_RPC_FALLBACK", prefix)).ok(),
                receiving_wallet: std::env::var(format!("{}_RECEIVING_WALLET", prefix))
                    .with_context(|| format!("{}_RECEIVING_WALLET required", prefix))?,
                token_contract: std::env::var(format!("{}_TOKEN_CONTRACT", prefix))
                    .with_context(|| format!("{}_TOKEN_CONTRACT required", prefix))?,
                token_decimals: Self::env_parse(
                    &format!("{}_TOKEN_DECIMALS", prefix),
                    "6",
                )?,
                min_confirmations: Self::env_parse(
                    &format!("{}_MIN_CONFIRMATIONS", prefix),
                    Self::default_confirmations(chain),
                )?,
            };
            chains.insert(chain, settings);
        }

        Ok(chains)
    }

    fn parse_engine() -> Result<EngineConfig> {
        Ok(EngineConfig {
            auto_approve_threshold: Self::env_parse("AUTO_APPROVE_THRESHOLD", "80")?,
            large_amount_cutoff_usd: Self::env_decimal("LARGE_AMOUNT_CUTOFF_USD", "50000")?,
            amount_tolerance_usd: Self::env_decimal("AMOUNT_TOLERANCE_USD", "1.00")?,
            amount_tolerance_pct: Self::env_decimal("AMOUNT_TOLERANCE_PCT", "1.5")?,
            review_window_hours: Self::env_parse("REVIEW_WINDOW_HOURS", "72")?,
            time_valid_skew_hours: Self::env_parse("TIME_VALID_SKEW_HOURS", "73")?,
            adapter_timeout_secs: Self::env_parse("ADAPTER_TIMEOUT_SECS", "10")?,
            adapter_retries: Self::env_parse("ADAPTER_RETRIES", "2")?,
            verify_workers: Self::env_parse("VERIFY_WORKERS", "4")?,
            chain_concurrency: Self::env_parse("CHAIN_CONCURRENCY", "4")?,
            expiry_sweep_secs: Self::env_parse("EXPIRY_SWEEP_SECS", "60")?,
            expire_blockchain_failed: Self::env_parse("EXPIRE_BLOCKCHAIN_FAILED", "false")?,
        })
    }

    fn env_prefix(chain: Chain) -> &'static str {
        match chain {
            Chain::Ethereum => "ETH",
            Chain::Bsc => "BSC",
            Chain::Polygon => "POLYGON",
            Chain::Tron => "TRON",
        }
    }

    fn default_confirmations(chain: Chain) -> &'static str {
        match chain {
            Chain::Ethereum => "12",
            Chain::Bsc => "15",
            Chain::Polygon => "30",
            Chain::Tron => "19",
        }
    }

    fn env_parse<T: FromStr>(var: &str, default: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
        raw.parse()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", var, e))
    }

    fn env_decimal(var: &str, default: &str) -> Result<Decimal> {
        let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
        Decimal::from_str(&raw).with_context(|| format!("Invalid {}", var))
    }

    fn validate(&self) -> Result<()> {
        for (chain, settings) in &self.chains {
            if !settings.rpc_url.starts_with("http") {
                bail!("{}_RPC_URL must be HTTP(S) URL", Self::env_prefix(*chain));
            }
            if !chain.valid_address(&settings.receiving_wallet) {
                bail!(
                    "{}_RECEIVING_WALLET is not a valid {} address",
                    Self::env_prefix(*chain),
                    chain
                );
            }
        }

        if self.engine.auto_approve_threshold > 100 {
            bail!("AUTO_APPROVE_THRESHOLD must be 0-100");
        }
        if self.engine.review_window_hours <= 0 {
            bail!("REVIEW_WINDOW_HOURS must be positive");
        }
        if self.engine.verify_workers == 0 {
            bail!("VERIFY_WORKERS must be at least 1");
        }

        tracing::info!(
            "Configuration validated for {:?} environment ({} chains)",
            self.environment,
            self.chains.len()
        );

        Ok(())
    }
}

#[cfg(test)]
impl EngineConfig {
    /// Default knobs for unit tests across the crate.
    pub fn test_defaults() -> Self {
        EngineConfig {
            auto_approve_threshold: 80,
            large_amount_cutoff_usd: Decimal::from(50_000),
            amount_tolerance_usd: Decimal::new(100, 2),
            amount_tolerance_pct: Decimal::new(15, 1),
            review_window_hours: 72,
            time_valid_skew_hours: 73,
            adapter_timeout_secs: 10,
            adapter_retries: 2,
            verify_workers: 4,
            chain_concurrency: 4,
            expiry_sweep_secs: 60,
            expire_blockchain_failed: false,
        }
    }
}
