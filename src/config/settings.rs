use crate::api::rate_limiter::{RateLimitCategory, RateLimitPolicy};
use crate::api::retry::RetryPolicy;
use crate::error::ClientError;
use crate::utils::is_valid_address;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://subzero-q6rn.onrender.com";
pub const DEFAULT_TRADING_CONTRACT: &str = "0xefF79F639543f38223e02DbaBAE4200Df2b7A2F4";
pub const DEFAULT_VAULT_CONTRACT: &str = "0xF0ECCD0844CE83Af362f029667c7dEDf664087Dd";

/// Chain the wallet is switched to on connect (Avalanche Fuji by default)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkConfig {
    pub chain_id: String,
    pub chain_name: String,
    pub rpc_url: String,
    pub block_explorer: String,
    pub currency_name: String,
    pub currency_symbol: String,
    pub currency_decimals: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: "0xa869".to_string(),
            chain_name: "Avalanche Fuji Testnet".to_string(),
            rpc_url: "https://api.avax-test.network/ext/bc/C/rpc".to_string(),
            block_explorer: "https://testnet.snowtrace.io/".to_string(),
            currency_name: "AVAX".to_string(),
            currency_symbol: "AVAX".to_string(),
            currency_decimals: 18,
        }
    }
}

impl NetworkConfig {
    /// Params object for `wallet_addEthereumChain`
    pub fn add_chain_params(&self) -> Value {
        json!({
            "chainId": self.chain_id,
            "chainName": self.chain_name,
            "rpcUrls": [self.rpc_url],
            "nativeCurrency": {
                "name": self.currency_name,
                "symbol": self.currency_symbol,
                "decimals": self.currency_decimals,
            },
            "blockExplorerUrls": [self.block_explorer],
        })
    }
}

/// Endpoint namespaces on the trading API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiEndpoints {
    pub assets: String,
    pub trading: String,
    pub portfolio: String,
    pub copy_trading: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            assets: "/v1/api/assets".to_string(),
            trading: "/v1/api/trading".to_string(),
            portfolio: "/v1/api/portfolio".to_string(),
            copy_trading: "/v1/api/copytrading".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub endpoints: ApiEndpoints,
    pub network: NetworkConfig,
    pub trading_contract: String,
    pub vault_contract: String,
    pub http_timeout_secs: u64,
    pub cache_max_entries: usize,
    pub connection_cooldown_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub rate_limits: HashMap<RateLimitCategory, RateLimitPolicy>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            endpoints: ApiEndpoints::default(),
            network: NetworkConfig::default(),
            trading_contract: DEFAULT_TRADING_CONTRACT.to_string(),
            vault_contract: DEFAULT_VAULT_CONTRACT.to_string(),
            http_timeout_secs: 30,
            cache_max_entries: 100,
            connection_cooldown_ms: 5_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 5_000,
            rate_limits: default_rate_limits(),
        }
    }
}

fn default_rate_limits() -> HashMap<RateLimitCategory, RateLimitPolicy> {
    RateLimitCategory::builtin()
        .into_iter()
        .filter_map(|c| RateLimitPolicy::default_for(&c).map(|p| (c, p)))
        .collect()
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses `<max>/<window_ms>`, e.g. `5/60000`
pub fn parse_rate_limit(raw: &str) -> Option<RateLimitPolicy> {
    let (max, window) = raw.split_once('/')?;
    let max_requests = max.trim().parse().ok()?;
    let window_ms: u64 = window.trim().parse().ok()?;
    if window_ms == 0 {
        return None;
    }
    Some(RateLimitPolicy::new(max_requests, Duration::from_millis(window_ms)))
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let network = NetworkConfig {
            chain_id: env::var("SUBZERO_CHAIN_ID").unwrap_or(defaults.network.chain_id.clone()),
            chain_name: env::var("SUBZERO_CHAIN_NAME").unwrap_or(defaults.network.chain_name.clone()),
            rpc_url: env::var("SUBZERO_RPC_URL").unwrap_or(defaults.network.rpc_url.clone()),
            block_explorer: env::var("SUBZERO_BLOCK_EXPLORER")
                .unwrap_or(defaults.network.block_explorer.clone()),
            ..defaults.network.clone()
        };

        let mut rate_limits = defaults.rate_limits.clone();
        for (key, value) in env::vars() {
            let Some(name) = key.strip_prefix("RATE_LIMIT_") else {
                continue;
            };
            match parse_rate_limit(&value) {
                Some(policy) => {
                    rate_limits.insert(RateLimitCategory::parse(name), policy);
                }
                None => log::warn!("Ignoring malformed {}={} (expected <max>/<window_ms>)", key, value),
            }
        }

        Config {
            api_base_url: env::var("SUBZERO_API_BASE_URL").unwrap_or(defaults.api_base_url),
            endpoints: defaults.endpoints,
            network,
            trading_contract: env::var("SUBZERO_TRADING_CONTRACT").unwrap_or(defaults.trading_contract),
            vault_contract: env::var("SUBZERO_VAULT_CONTRACT").unwrap_or(defaults.vault_contract),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            cache_max_entries: env_or("CACHE_MAX_ENTRIES", defaults.cache_max_entries),
            connection_cooldown_ms: env_or("CONNECTION_COOLDOWN_MS", defaults.connection_cooldown_ms),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms),
            retry_max_delay_ms: env_or("RETRY_MAX_DELAY_MS", defaults.retry_max_delay_ms),
            rate_limits,
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        Url::parse(&self.api_base_url)
            .map_err(|e| ClientError::Config(format!("SUBZERO_API_BASE_URL is not a URL: {}", e)))?;
        Url::parse(&self.network.rpc_url)
            .map_err(|e| ClientError::Config(format!("SUBZERO_RPC_URL is not a URL: {}", e)))?;
        if !is_valid_address(&self.trading_contract) {
            return Err(ClientError::Config(format!(
                "Invalid trading contract address: {}",
                self.trading_contract
            )));
        }
        if !is_valid_address(&self.vault_contract) {
            return Err(ClientError::Config(format!(
                "Invalid vault contract address: {}",
                self.vault_contract
            )));
        }
        if self.retry_max_attempts == 0 {
            return Err(ClientError::Config("RETRY_MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if self.cache_max_entries == 0 {
            return Err(ClientError::Config("CACHE_MAX_ENTRIES must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn log_settings(&self) {
        log::info!("Application Configuration Loaded: {:?}", self);
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn connection_cooldown(&self) -> Duration {
        Duration::from_millis(self.connection_cooldown_ms)
    }

    /// Retry policy for read-only calls
    pub fn read_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}
