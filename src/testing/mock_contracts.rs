//! Scripted contract backend

use crate::contracts::backend::{ContractBackend, ContractEvent, TxOptions, TxReceipt};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 16;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn reverted(reason: &str) -> ClientError {
    ClientError::Provider {
        code: -32000,
        message: format!("execution reverted: {}", reason),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentTransaction {
    pub contract: String,
    pub method: String,
    pub args: Vec<Value>,
    pub options: TxOptions,
    pub hash: String,
}

/// Reads answer from a per-method table; writes are logged and get sequential hashes.
#[derive(Default)]
pub struct MockContracts {
    reads: Mutex<HashMap<String, Value>>,
    read_calls: Mutex<HashMap<String, u32>>,
    sends: Mutex<Vec<SentTransaction>>,
    read_failures_left: AtomicU32,
    send_failures_left: AtomicU32,
    events: Mutex<Option<broadcast::Sender<ContractEvent>>>,
}

impl MockContracts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read(&self, method: &str, value: Value) {
        lock(&self.reads).insert(method.to_string(), value);
    }

    pub fn fail_reads(&self, n: u32) {
        self.read_failures_left.store(n, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, n: u32) {
        self.send_failures_left.store(n, Ordering::SeqCst);
    }

    pub fn read_count(&self, method: &str) -> u32 {
        lock(&self.read_calls).get(method).copied().unwrap_or(0)
    }

    /// Transactions attempted, including failed ones
    pub fn send_count(&self) -> usize {
        lock(&self.sends).len()
    }

    pub fn last_send(&self) -> Option<SentTransaction> {
        lock(&self.sends).last().cloned()
    }

    /// Deliver `event` to every current subscriber, whatever contract it names
    pub fn emit_event(&self, event: ContractEvent) {
        if let Some(sender) = lock(&self.events).as_ref() {
            let _ = sender.send(event);
        }
    }

    /// Drop the event sender so subscribers see the stream end
    pub fn close_events(&self) {
        lock(&self.events).take();
    }
}

#[async_trait]
impl ContractBackend for MockContracts {
    async fn call(&self, _contract: &str, method: &str, _args: Vec<Value>) -> Result<Value> {
        *lock(&self.read_calls).entry(method.to_string()).or_insert(0) += 1;
        if take_one(&self.read_failures_left) {
            return Err(ClientError::Network("mock backend: node unreachable".to_string()));
        }
        lock(&self.reads)
            .get(method)
            .cloned()
            .ok_or_else(|| reverted(&format!("no scripted result for {}", method)))
    }

    async fn send(&self, contract: &str, method: &str, args: Vec<Value>, options: TxOptions) -> Result<TxReceipt> {
        let mut sends = lock(&self.sends);
        let hash = format!("0x{:064x}", sends.len() + 1);
        sends.push(SentTransaction {
            contract: contract.to_string(),
            method: method.to_string(),
            args,
            options,
            hash: hash.clone(),
        });
        drop(sends);

        if take_one(&self.send_failures_left) {
            return Err(reverted("mock rejection"));
        }
        Ok(TxReceipt { hash })
    }

    fn subscribe(&self, _contract: &str) -> Option<broadcast::Receiver<ContractEvent>> {
        let mut events = lock(&self.events);
        let sender = events.get_or_insert_with(|| broadcast::channel(EVENT_CAPACITY).0);
        Some(sender.subscribe())
    }
}
