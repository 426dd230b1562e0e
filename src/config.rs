use anyhow::{bail, Context, Result};
use ethers::types::{Address, U256};
use std::str::FromStr;
use std::time::Duration;

use crate::models::PriceSpec;

// Cronos testnet defaults, matching the network the dev token is deployed on.
const DEFAULT_CHAIN_RPC_URL: &str = "https://evm-t3.cronos.org";
const DEFAULT_TOKEN_ADDRESS: &str = "0xc01efAaF7C5C61bEbFAeb358E1161b537b8bC0e0";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    // Payment network
    pub chain_rpc_url: String,
    pub network_name: String,
    pub seller_address: Address,
    pub token_address: Address,
    pub currency_symbol: String,
    pub price_units: U256,
    pub invoice_ttl_secs: u64,

    // Verification budget
    pub verify_max_attempts: u32,
    pub verify_retry_delay_ms: u64,
    pub proof_retention_secs: u64,

    // Operational surface
    pub events_capacity: usize,

    // Redis
    pub redis_url: String,

    // Downstream providers
    pub market_api_url: String,
    pub ai_api_url: String,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("Invalid PORT")?,

            chain_rpc_url: std::env::var("CHAIN_RPC_URL")
                .unwrap_or_else(|_| DEFAULT_CHAIN_RPC_URL.to_string()),
            network_name: std::env::var("NETWORK_NAME")
                .unwrap_or_else(|_| "cronos-testnet".to_string()),
            seller_address: Self::parse_address("SELLER_WALLET")?,
            token_address: Self::parse_address_or("TOKEN_ADDRESS", DEFAULT_TOKEN_ADDRESS)?,
            currency_symbol: std::env::var("CURRENCY_SYMBOL")
                .unwrap_or_else(|_| "USDC".to_string()),
            price_units: parse_price_units(
                &std::env::var("PRICE_UNITS").unwrap_or_else(|_| "10000".to_string()),
            )?,
            invoice_ttl_secs: std::env::var("INVOICE_TTL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .context("Invalid INVOICE_TTL_SECS")?,

            verify_max_attempts: std::env::var("VERIFY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid VERIFY_MAX_ATTEMPTS")?,
            verify_retry_delay_ms: std::env::var("VERIFY_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .context("Invalid VERIFY_RETRY_DELAY_MS")?,
            proof_retention_secs: std::env::var("PROOF_RETENTION_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .context("Invalid PROOF_RETENTION_SECS")?,

            events_capacity: std::env::var("EVENTS_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .context("Invalid EVENTS_CAPACITY")?,

            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            market_api_url: std::env::var("MARKET_API_URL")
                .unwrap_or_else(|_| "https://api.crypto.com/v2".to_string()),
            ai_api_url: std::env::var("AI_API_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            ai_api_key: std::env::var("AI_API_KEY").ok(),
            ai_model: std::env::var("AI_MODEL")
                .unwrap_or_else(|_| "llama-3.1-70b-versatile".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// The pricing the invoice issuer quotes from, fixed for the process
    /// lifetime.
    pub fn price_spec(&self) -> PriceSpec {
        PriceSpec {
            pay_to: self.seller_address,
            amount: self.price_units,
            token: self.token_address,
            currency: self.currency_symbol.clone(),
            network: self.network_name.clone(),
            invoice_ttl: Duration::from_secs(self.invoice_ttl_secs),
        }
    }

    pub fn verify_retry_delay(&self) -> Duration {
        Duration::from_millis(self.verify_retry_delay_ms)
    }

    fn parse_address(var: &str) -> Result<Address> {
        let addr_str = std::env::var(var).with_context(|| format!("{} required", var))?;
        Address::from_str(&addr_str).with_context(|| format!("Invalid address for {}", var))
    }

    fn parse_address_or(var: &str, default: &str) -> Result<Address> {
        let addr_str = std::env::var(var).unwrap_or_else(|_| default.to_string());
        Address::from_str(&addr_str).with_context(|| format!("Invalid address for {}", var))
    }

    fn validate(&self) -> Result<()> {
        if !self.chain_rpc_url.starts_with("http") {
            bail!("CHAIN_RPC_URL must be HTTP(S) URL");
        }
        if !self.market_api_url.starts_with("http") {
            bail!("MARKET_API_URL must be HTTP(S) URL");
        }
        if self.verify_max_attempts == 0 {
            bail!("VERIFY_MAX_ATTEMPTS must be at least 1");
        }
        if self.events_capacity == 0 {
            bail!("EVENTS_CAPACITY must be at least 1");
        }
        if self.proof_retention_secs == 0 {
            bail!("PROOF_RETENTION_SECS must be at least 1");
        }

        tracing::info!(
            "Configuration validated: network={}, price={} {} smallest units",
            self.network_name,
            self.price_units,
            self.currency_symbol
        );

        Ok(())
    }
}

/// Prices are integers in smallest token units. A decimal here means the
/// operator is thinking in display units; refuse to start rather than round.
pub fn parse_price_units(raw: &str) -> Result<U256> {
    let trimmed = raw.trim();
    let amount = U256::from_dec_str(trimmed).with_context(|| {
        format!(
            "PRICE_UNITS must be an integer amount in smallest token units, got {:?}",
            trimmed
        )
    })?;
    if amount.is_zero() {
        bail!("PRICE_UNITS must be non-zero");
    }
    Ok(amount)
}
