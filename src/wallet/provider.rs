// src/wallet/provider.rs
//! Wallet provider seam: the EIP-1193 shaped `request({method, params})` surface plus
//! the `accountsChanged` / `chainChanged` event stream.

use crate::error::ClientError;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

/// JSON-RPC style error returned by a provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    /// `wallet_switchEthereumChain` on a chain the wallet does not know
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for ProviderError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountsChanged(Vec<String>),
    /// Hex chain id, e.g. `0xa869`
    ChainChanged(String),
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Event stream, if the provider emits any
    fn subscribe(&self) -> Option<broadcast::Receiver<WalletEvent>> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ProviderError>,
}

/// Read-only provider talking JSON-RPC to a node over HTTP
#[derive(Debug)]
pub struct HttpRpcProvider {
    client: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

impl HttpRpcProvider {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| ClientError::Config(format!("Invalid RPC url '{}': {}", rpc_url, e)))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl WalletProvider for HttpRpcProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("JSON-RPC -> {} #{} {}", self.url, id, method);

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(ProviderError::INTERNAL, format!("transport error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::new(
                i64::from(status.as_u16()),
                format!("RPC endpoint returned HTTP {}", status),
            ));
        }

        let parsed: JsonRpcResponse = response.json().await.map_err(|e| {
            ProviderError::new(ProviderError::INTERNAL, format!("malformed JSON-RPC response: {}", e))
        })?;

        match (parsed.result, parsed.error) {
            (_, Some(err)) => Err(err),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}
