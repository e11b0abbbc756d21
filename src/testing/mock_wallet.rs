//! In-memory wallet provider
//!
//! Answers the handful of EIP-1193 methods the client uses, counts calls per method,
//! and can be told to fail, stall or reject so connection handling can be exercised.

use crate::wallet::provider::{ProviderError, WalletEvent, WalletProvider};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

const EVENT_CAPACITY: usize = 16;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MockWallet {
    accounts: Mutex<Vec<String>>,
    chain_id: Mutex<String>,
    known_chains: Mutex<HashSet<String>>,
    balances: Mutex<HashMap<String, u128>>,
    latency: Duration,
    failures_left: AtomicU32,
    reject_connect: AtomicBool,
    connect_gate: Mutex<Option<Arc<Notify>>>,
    accounts_gate: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<HashMap<String, u32>>,
    events: Mutex<Option<broadcast::Sender<WalletEvent>>>,
}

impl MockWallet {
    pub fn with_accounts(accounts: &[&str]) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            accounts: Mutex::new(accounts.iter().map(|a| a.to_string()).collect()),
            chain_id: Mutex::new("0x1".to_string()),
            known_chains: Mutex::new(["0x1", "0xa869", "0xa86a"].iter().map(|c| c.to_string()).collect()),
            balances: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            failures_left: AtomicU32::new(0),
            reject_connect: AtomicBool::new(false),
            connect_gate: Mutex::new(None),
            accounts_gate: Mutex::new(None),
            calls: Mutex::new(HashMap::new()),
            events: Mutex::new(Some(events)),
        }
    }

    /// Every request sleeps this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Only the wallet's current chain is known; switching anywhere else yields 4902
    pub fn without_known_chains(self) -> Self {
        {
            let current = lock(&self.chain_id).clone();
            let mut known = lock(&self.known_chains);
            known.clear();
            known.insert(current);
        }
        self
    }

    /// The next `n` requests fail with an internal JSON-RPC error
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// `eth_requestAccounts` waits until the returned handle is notified
    pub fn hold_connect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.connect_gate) = Some(gate.clone());
        gate
    }

    /// `eth_accounts` answers with the accounts present when the request arrived, but only
    /// once the returned handle is notified
    pub fn hold_accounts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.accounts_gate) = Some(gate.clone());
        gate
    }

    pub fn reject_connect(&self, reject: bool) {
        self.reject_connect.store(reject, Ordering::SeqCst);
    }

    pub fn set_accounts(&self, accounts: &[&str]) {
        *lock(&self.accounts) = accounts.iter().map(|a| a.to_string()).collect();
    }

    pub fn set_balance(&self, address: &str, wei: u128) {
        lock(&self.balances).insert(address.to_lowercase(), wei);
    }

    pub fn chain_id(&self) -> String {
        lock(&self.chain_id).clone()
    }

    pub fn call_count(&self, method: &str) -> u32 {
        lock(&self.calls).get(method).copied().unwrap_or(0)
    }

    pub fn emit(&self, event: WalletEvent) {
        if let Some(sender) = lock(&self.events).as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Drop the event sender so subscribers see the stream end
    pub fn close_events(&self) {
        lock(&self.events).take();
    }

    fn switch_chain(&self, params: &Value) -> Result<Value, ProviderError> {
        let requested = chain_param(params)?;
        if !lock(&self.known_chains).contains(&requested) {
            return Err(ProviderError::new(
                ProviderError::UNRECOGNIZED_CHAIN,
                format!("Unrecognized chain ID \"{}\"", requested),
            ));
        }
        *lock(&self.chain_id) = requested;
        Ok(Value::Null)
    }

    fn add_chain(&self, params: &Value) -> Result<Value, ProviderError> {
        let chain = chain_param(params)?;
        lock(&self.known_chains).insert(chain.clone());
        *lock(&self.chain_id) = chain;
        Ok(Value::Null)
    }

    fn balance(&self, params: &Value) -> Result<Value, ProviderError> {
        let address = params
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::new(-32602, "missing address"))?;
        let wei = lock(&self.balances).get(&address.to_lowercase()).copied().unwrap_or(0);
        Ok(json!(format!("{:#x}", wei)))
    }
}

fn chain_param(params: &Value) -> Result<String, ProviderError> {
    params
        .get(0)
        .and_then(|p| p.get("chainId"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::new(-32602, "missing chainId"))
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        *lock(&self.calls).entry(method.to_string()).or_insert(0) += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProviderError::new(ProviderError::INTERNAL, "mock wallet failure"));
        }

        match method {
            "eth_accounts" => {
                let seen = lock(&self.accounts).clone();
                let gate = lock(&self.accounts_gate).clone();
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                Ok(json!(seen))
            }
            "eth_requestAccounts" => {
                let gate = lock(&self.connect_gate).clone();
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                if self.reject_connect.load(Ordering::SeqCst) {
                    return Err(ProviderError::new(4001, "User rejected the request."));
                }
                Ok(json!(lock(&self.accounts).clone()))
            }
            "eth_chainId" => Ok(json!(self.chain_id())),
            "eth_getBalance" => self.balance(&params),
            "wallet_switchEthereumChain" => self.switch_chain(&params),
            "wallet_addEthereumChain" => self.add_chain(&params),
            other => Err(ProviderError::new(-32601, format!("method {} not supported", other))),
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<WalletEvent>> {
        lock(&self.events).as_ref().map(|sender| sender.subscribe())
    }
}
