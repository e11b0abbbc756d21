// src/contracts/mod.rs
//! Governed access to the trading and vault contracts.
//!
//! Reads run under the `contract_read` category with the read retry policy and are
//! cached briefly. Writes run under `contract_write`, are attempted exactly once, are
//! never cached, and drop every cached contract or balance read that mentions the signer.

pub mod assets;
pub mod backend;
pub mod trading;
pub mod vault;

pub use assets::{get_asset_bytes32, symbol_for_bytes32, ASSET_SYMBOLS, SUPPORTED_SYMBOLS};
pub use backend::{ContractBackend, ContractEvent, TxOptions, TxReceipt};
pub use trading::UserTotalValue;
pub use vault::{CopyTradingInfo, FollowingStatus};

use crate::api::governor::{CachePolicy, GovernedCall, RequestGovernor};
use crate::api::rate_limiter::RateLimitCategory;
use crate::api::retry::{with_retry, RetryPolicy};
use crate::error::{ClientError, Result};
use crate::wallet::actor::ActorId;
use crate::wallet::connection::ConnectionGuard;
use log::{debug, error, info};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const READ_CACHE_TTL: Duration = Duration::from_secs(15);
pub const READ_FAILURE_TTL: Duration = Duration::from_secs(5);

pub struct ContractClient {
    backend: Arc<dyn ContractBackend>,
    governor: Arc<RequestGovernor>,
    connection: Arc<ConnectionGuard>,
    read_retry: RetryPolicy,
    trading_address: String,
    vault_address: String,
}

impl ContractClient {
    pub fn new(
        backend: Arc<dyn ContractBackend>,
        governor: Arc<RequestGovernor>,
        connection: Arc<ConnectionGuard>,
        read_retry: RetryPolicy,
        trading_address: &str,
        vault_address: &str,
    ) -> Self {
        Self {
            backend,
            governor,
            connection,
            read_retry,
            trading_address: trading_address.to_string(),
            vault_address: vault_address.to_string(),
        }
    }

    pub fn trading_address(&self) -> &str {
        &self.trading_address
    }

    pub fn vault_address(&self) -> &str {
        &self.vault_address
    }

    async fn read(&self, contract: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let actor = self.connection.actor_id();
        let key = read_cache_key(contract, method, &args);
        let call = GovernedCall {
            actor: &actor,
            category: RateLimitCategory::ContractRead,
            label: method,
            cache: Some(CachePolicy::new(key, READ_CACHE_TTL).with_failure_ttl(READ_FAILURE_TTL)),
            retry: &self.read_retry,
        };
        self.governor
            .execute(call, || self.backend.call(contract, method, args.clone()))
            .await
    }

    async fn write(
        &self,
        contract: &str,
        method: &str,
        args: Vec<Value>,
        options: TxOptions,
        label: &str,
    ) -> Result<TxReceipt> {
        let signer = self.connection.current_account().ok_or(ClientError::NoAccounts)?;
        let actor = ActorId::from_address(&signer);
        self.governor.admit(&actor, &RateLimitCategory::ContractWrite)?;

        let result = with_retry(
            || self.backend.send(contract, method, args.clone(), options.clone()),
            &RetryPolicy::transaction(),
            label,
        )
        .await;

        match result {
            Ok(receipt) => {
                info!("{} confirmed: {}", label, receipt.hash);
                self.invalidate_reads_for(&signer);
                Ok(receipt)
            }
            Err(e) => {
                error!("{} failed: {}", label, e);
                Err(ClientError::TransactionFailed {
                    label: label.to_string(),
                    message: e.root_cause().to_string(),
                })
            }
        }
    }

    fn invalidate_reads_for(&self, address: &str) {
        invalidate_reads(&self.governor, address);
    }
}

/// Drop cached contract and balance reads that mention `address`
fn invalidate_reads(governor: &RequestGovernor, address: &str) {
    let needle = address.to_lowercase();
    let removed = governor.cache().remove_where(|key| {
        (key.starts_with("contract:") || key.starts_with("rpc:")) && key.contains(&needle)
    });
    if removed > 0 {
        debug!("Invalidated {} cached contract reads for {}", removed, address);
    }
}

/// `contract:<address>:<method>:<args>`, lowercased so address casing never splits entries
fn read_cache_key(contract: &str, method: &str, args: &[Value]) -> String {
    format!("contract:{}:{}:{}", contract, method, Value::Array(args.to_vec())).to_lowercase()
}
