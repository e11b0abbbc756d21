// src/contracts/backend.rs
//! Seam between governed contract access and whatever signs and encodes calls.

use crate::error::Result;
use crate::utils::is_valid_address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOptions {
    /// Native value attached to the call
    pub value_wei: Option<u128>,
    pub gas_limit: Option<u64>,
}

impl TxOptions {
    pub fn gas(gas_limit: u64) -> Self {
        Self {
            value_wei: None,
            gas_limit: Some(gas_limit),
        }
    }

    pub fn with_value(mut self, wei: u128) -> Self {
        self.value_wei = Some(wei);
        self
    }
}

/// A mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: String,
}

/// Contract log decoded by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub contract: String,
    /// e.g. `TraderFollowed`, `TradeCopied`
    pub name: String,
    /// Named arguments, encoded like call results
    pub args: Value,
    pub transaction_hash: String,
    pub block_number: u64,
}

impl ContractEvent {
    /// Every address among the arguments, lowercased
    pub fn addresses(&self) -> Vec<String> {
        let values: Vec<&Value> = match &self.args {
            Value::Object(map) => map.values().collect(),
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        values
            .into_iter()
            .filter_map(Value::as_str)
            .filter(|s| is_valid_address(s))
            .map(str::to_lowercase)
            .collect()
    }
}

/// Contract calls by method name with JSON-encoded arguments.
///
/// Addresses and bytes32 values are `0x` hex strings; uint256 arguments are decimal
/// strings. Results use the same encoding, with tuples returned as arrays.
#[async_trait]
pub trait ContractBackend: Send + Sync {
    /// Read-only call against `contract`
    async fn call(&self, contract: &str, method: &str, args: Vec<Value>) -> Result<Value>;

    /// Signed write from the connected account; resolves once the transaction is mined
    async fn send(&self, contract: &str, method: &str, args: Vec<Value>, options: TxOptions) -> Result<TxReceipt>;

    /// Decoded logs of `contract`, if the backend streams them
    fn subscribe(&self, _contract: &str) -> Option<broadcast::Receiver<ContractEvent>> {
        None
    }
}
