// src/wallet/connection.rs
//! Wallet connection state guard.
//!
//! - Concurrent `check_connection` callers share one in-flight `eth_accounts` probe
//! - Completed probes are reused for `cooldown`; failed probes are not cached
//! - `connect` is single-flight and fails fast while another attempt is pending
//! - A failed reconnect keeps the previously cached session

use crate::api::rate_limiter::{RateLimitCategory, RateLimitDecision, RateLimiter};
use crate::config::settings::NetworkConfig;
use crate::error::{ClientError, Result};
use crate::wallet::actor::{ActorId, SessionToken};
use crate::wallet::provider::{ProviderError, WalletEvent, WalletProvider};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_CONNECTION_COOLDOWN: Duration = Duration::from_secs(5);

type ProbeFuture = Shared<BoxFuture<'static, Result<ConnectionStatus>>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub account: Option<String>,
}

/// Point-in-time view of the guard, for UI display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub is_connected: bool,
    pub account: Option<String>,
    pub chain_id: Option<String>,
    pub is_connecting: bool,
    pub probe_in_flight: bool,
    pub last_checked: Option<Duration>,
}

#[derive(Default)]
struct ConnectionState {
    is_connected: bool,
    account: Option<String>,
    chain_id: Option<String>,
    last_checked_at: Option<Instant>,
    in_flight: Option<(u64, ProbeFuture)>,
    // survives resets so a probe started before a reset cannot write afterwards
    next_probe_id: u64,
}

impl ConnectionState {
    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            is_connected: self.is_connected,
            account: self.account.clone(),
        }
    }

    fn reset(&mut self) {
        self.is_connected = false;
        self.account = None;
        self.chain_id = None;
        self.last_checked_at = None;
        self.in_flight = None;
    }
}

fn lock(state: &Mutex<ConnectionState>) -> MutexGuard<'_, ConnectionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears `is_connecting` when the attempt ends, however it ends
struct ConnectAttempt<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ConnectAttempt<'a> {
    fn begin(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClientError::ConnectionInProgress)?;
        Ok(Self { flag })
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct ConnectionGuard {
    provider: Option<Arc<dyn WalletProvider>>,
    limiter: Arc<RateLimiter>,
    session: SessionToken,
    network: NetworkConfig,
    cooldown: Duration,
    state: Arc<Mutex<ConnectionState>>,
    is_connecting: AtomicBool,
}

impl ConnectionGuard {
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        limiter: Arc<RateLimiter>,
        session: SessionToken,
        network: NetworkConfig,
        cooldown: Duration,
    ) -> Self {
        Self {
            provider,
            limiter,
            session,
            network,
            cooldown,
            state: Arc::new(Mutex::new(ConnectionState::default())),
            is_connecting: AtomicBool::new(false),
        }
    }

    pub fn provider(&self) -> Result<Arc<dyn WalletProvider>> {
        self.provider.clone().ok_or(ClientError::ProviderUnavailable)
    }

    pub fn session(&self) -> &SessionToken {
        &self.session
    }

    /// Identity for quotas and cache keys: the connected account, else the session
    pub fn actor_id(&self) -> ActorId {
        let state = lock(&self.state);
        ActorId::resolve(state.account.as_deref(), &self.session)
    }

    pub fn current_account(&self) -> Option<String> {
        lock(&self.state).account.clone()
    }

    pub fn is_connecting(&self) -> bool {
        self.is_connecting.load(Ordering::Acquire)
    }

    pub fn is_on_correct_network(&self) -> bool {
        lock(&self.state)
            .chain_id
            .as_deref()
            .map(|id| id.eq_ignore_ascii_case(&self.network.chain_id))
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let state = lock(&self.state);
        ConnectionSnapshot {
            is_connected: state.is_connected,
            account: state.account.clone(),
            chain_id: state.chain_id.clone(),
            is_connecting: self.is_connecting(),
            probe_in_flight: state.in_flight.is_some(),
            last_checked: state.last_checked_at.map(|at| at.elapsed()),
        }
    }

    /// Current connectivity, probing the wallet at most once per cooldown.
    pub async fn check_connection(&self) -> Result<ConnectionStatus> {
        let provider = self.provider()?;

        let probe = {
            let mut state = lock(&self.state);
            let joined = state
                .in_flight
                .as_ref()
                .map(|(id, probe)| (*id, probe.clone()));
            if let Some((id, probe)) = joined {
                debug!("Joining in-flight connection probe #{}", id);
                probe
            } else if state
                .last_checked_at
                .map(|at| at.elapsed() < self.cooldown)
                .unwrap_or(false)
            {
                debug!("Connection checked recently, returning cached status");
                return Ok(state.status());
            } else {
                let probe_id = state.next_probe_id;
                state.next_probe_id += 1;
                let actor = ActorId::resolve(state.account.as_deref(), &self.session);

                // registered before the task can run, so callers arriving during the
                // rate-limit check or the RPC itself join this probe
                let task = tokio::spawn(run_probe(
                    provider,
                    self.limiter.clone(),
                    self.state.clone(),
                    actor,
                    probe_id,
                ));
                let probe: ProbeFuture = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(ClientError::Internal(format!("connection probe aborted: {}", e)))
                    })
                }
                .boxed()
                .shared();
                state.in_flight = Some((probe_id, probe.clone()));
                debug!("Started connection probe #{}", probe_id);
                probe
            }
        };

        probe.await
    }

    /// Request accounts from the wallet and make sure it is on the configured chain.
    pub async fn connect(&self) -> Result<ConnectionStatus> {
        let provider = self.provider()?;
        let _attempt = ConnectAttempt::begin(&self.is_connecting)?;

        let actor = self.actor_id();
        if let RateLimitDecision::Denied { retry_after } =
            self.limiter.check_limit(&actor, &RateLimitCategory::Wallet)
        {
            return Err(ClientError::RateLimited {
                category: RateLimitCategory::Wallet.to_string(),
                retry_after,
            });
        }

        info!("Requesting wallet connection");
        match self.request_and_switch(provider.as_ref()).await {
            Ok(account) => {
                let mut state = lock(&self.state);
                state.is_connected = true;
                state.account = Some(account);
                state.chain_id = Some(self.network.chain_id.clone());
                state.last_checked_at = Some(Instant::now());
                // a probe started before approval must not overwrite this
                state.in_flight = None;
                info!(
                    "Wallet connected: {} on {}",
                    state.account.as_deref().unwrap_or_default(),
                    self.network.chain_name
                );
                Ok(state.status())
            }
            Err(e) => {
                // previously cached session stays as it was
                warn!("Wallet connection failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn disconnect(&self) {
        lock(&self.state).reset();
        info!("Wallet disconnected");
    }

    /// Drop all cached connection state
    pub fn reset(&self) {
        lock(&self.state).reset();
    }

    pub fn handle_event(&self, event: WalletEvent) {
        match event {
            WalletEvent::AccountsChanged(accounts) => match accounts.into_iter().next() {
                None => self.disconnect(),
                Some(account) => {
                    let mut state = lock(&self.state);
                    if state.account.as_deref() != Some(account.as_str()) {
                        info!("Wallet account changed to {}", account);
                    }
                    state.is_connected = true;
                    state.account = Some(account);
                    state.last_checked_at = Some(Instant::now());
                    state.in_flight = None;
                }
            },
            WalletEvent::ChainChanged(chain_id) => {
                info!("Wallet chain changed to {}", chain_id);
                lock(&self.state).chain_id = Some(chain_id);
            }
        }
    }

    /// Apply provider events to this guard until the stream closes
    pub fn spawn_event_listener(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut events = self.provider.as_ref()?.subscribe()?;
        let guard = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => guard.handle_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Wallet event listener lagged, skipped {} events", skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Wallet event stream closed");
        }))
    }

    async fn request_and_switch(&self, provider: &dyn WalletProvider) -> Result<String> {
        let accounts = provider.request("eth_requestAccounts", json!([])).await?;
        let account = parse_accounts(accounts)?
            .into_iter()
            .next()
            .ok_or(ClientError::NoAccounts)?;

        let switch = provider
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": self.network.chain_id }]),
            )
            .await;
        match switch {
            Ok(_) => {}
            Err(e) if e.code == ProviderError::UNRECOGNIZED_CHAIN => {
                info!("Adding {} to wallet", self.network.chain_name);
                provider
                    .request("wallet_addEthereumChain", json!([self.network.add_chain_params()]))
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(account)
    }
}

async fn run_probe(
    provider: Arc<dyn WalletProvider>,
    limiter: Arc<RateLimiter>,
    shared: Arc<Mutex<ConnectionState>>,
    actor: ActorId,
    probe_id: u64,
) -> Result<ConnectionStatus> {
    let outcome = query_accounts(provider.as_ref(), &limiter, &actor).await;

    let mut state = lock(&shared);
    let owns_slot = matches!(&state.in_flight, Some((id, _)) if *id == probe_id);
    if owns_slot {
        state.in_flight = None;
    }

    match outcome {
        Ok(accounts) => {
            let status = ConnectionStatus {
                is_connected: !accounts.is_empty(),
                account: accounts.into_iter().next(),
            };
            if owns_slot {
                state.is_connected = status.is_connected;
                state.account = status.account.clone();
                state.last_checked_at = Some(Instant::now());
            }
            Ok(status)
        }
        Err(e) => {
            // last_checked_at untouched: the next call probes again
            warn!("Connection probe #{} failed: {}", probe_id, e);
            Err(e)
        }
    }
}

async fn query_accounts(
    provider: &dyn WalletProvider,
    limiter: &RateLimiter,
    actor: &ActorId,
) -> Result<Vec<String>> {
    if let RateLimitDecision::Denied { retry_after } =
        limiter.check_limit(actor, &RateLimitCategory::Wallet)
    {
        return Err(ClientError::RateLimited {
            category: RateLimitCategory::Wallet.to_string(),
            retry_after,
        });
    }
    let accounts = provider.request("eth_accounts", json!([])).await?;
    parse_accounts(accounts)
}

fn parse_accounts(value: Value) -> Result<Vec<String>> {
    serde_json::from_value(value).map_err(|e| ClientError::Parse(format!("accounts list: {}", e)))
}
