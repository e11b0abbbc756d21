// src/context.rs
//! Process-wide client state and the entry points that compose it.

use crate::api::cache::{CachedOutcome, ExpiringCache};
use crate::api::client::ApiClient;
use crate::api::governor::{CachePolicy, GovernedCall, RequestGovernor};
use crate::api::rate_limiter::{RateLimitCategory, RateLimiter};
use crate::api::retry::RetryPolicy;
use crate::api::transport::{ApiTransport, ReqwestTransport};
use crate::config::Config;
use crate::contracts::{ContractBackend, ContractClient, ContractEvent};
use crate::error::{ClientError, Result};
use crate::utils::{format_ether, parse_hex_quantity};
use crate::wallet::actor::SessionToken;
use crate::wallet::connection::{ConnectionGuard, ConnectionStatus};
use crate::wallet::provider::{HttpRpcProvider, WalletProvider};
use log::{debug, info};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const BALANCE_CACHE_TTL: Duration = Duration::from_secs(15);

/// External collaborators the context is built around
pub struct ClientDeps {
    pub wallet: Option<Arc<dyn WalletProvider>>,
    pub transport: Arc<dyn ApiTransport>,
    pub contracts: Arc<dyn ContractBackend>,
}

impl ClientDeps {
    /// Real HTTP transport for the trading API, with the given wallet and contract backend
    pub fn http(
        config: &Config,
        wallet: Option<Arc<dyn WalletProvider>>,
        contracts: Arc<dyn ContractBackend>,
    ) -> Result<Self> {
        Ok(Self {
            wallet,
            transport: Arc::new(ReqwestTransport::new(config.http_timeout())?),
            contracts,
        })
    }

    /// No injected wallet: the configured RPC node answers provider requests, so balances
    /// resolve but `connect()` finds no accounts
    pub fn read_only(config: &Config, contracts: Arc<dyn ContractBackend>) -> Result<Self> {
        let node = HttpRpcProvider::new(&config.network.rpc_url, config.http_timeout())?;
        Self::http(config, Some(Arc::new(node)), contracts)
    }
}

pub struct ClientContext {
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
    pub cache: Arc<ExpiringCache<CachedOutcome>>,
    pub governor: Arc<RequestGovernor>,
    pub connection: Arc<ConnectionGuard>,
    pub api: ApiClient,
    pub contracts: ContractClient,
    read_retry: RetryPolicy,
    event_listener: Mutex<Option<JoinHandle<()>>>,
    vault_listener: Mutex<Option<JoinHandle<()>>>,
}

impl ClientContext {
    pub fn new(config: Arc<Config>, deps: ClientDeps) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
        let cache = Arc::new(ExpiringCache::new(config.cache_max_entries));
        let governor = Arc::new(RequestGovernor::new(limiter.clone(), cache.clone()));
        let read_retry = config.read_retry_policy();

        let connection = Arc::new(ConnectionGuard::new(
            deps.wallet,
            limiter.clone(),
            SessionToken::generate(),
            config.network.clone(),
            config.connection_cooldown(),
        ));

        let api = ApiClient::new(
            &config.api_base_url,
            config.endpoints.clone(),
            deps.transport,
            governor.clone(),
            connection.clone(),
            read_retry.clone(),
        );
        let contracts = ContractClient::new(
            deps.contracts,
            governor.clone(),
            connection.clone(),
            read_retry.clone(),
            &config.trading_contract,
            &config.vault_contract,
        );

        info!(
            "Client context ready (session {}, cache capacity {})",
            connection.session().as_str(),
            cache.capacity()
        );

        Self {
            config,
            limiter,
            cache,
            governor,
            connection,
            api,
            contracts,
            read_retry,
            event_listener: Mutex::new(None),
            vault_listener: Mutex::new(None),
        }
    }

    pub async fn connect_wallet(&self) -> Result<ConnectionStatus> {
        self.connection.connect().await
    }

    pub async fn check_connection(&self) -> Result<ConnectionStatus> {
        self.connection.check_connection().await
    }

    /// Start applying wallet account/chain events to the connection state.
    /// Returns false when the provider has no event stream.
    pub fn listen_for_wallet_events(&self) -> bool {
        let mut slot = lock_slot(&self.event_listener);
        if slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return true;
        }
        *slot = self.connection.spawn_event_listener();
        slot.is_some()
    }

    /// Forward vault contract events to `handler`, replacing any earlier vault listener.
    /// Returns false when the contract backend has no event stream.
    pub fn listen_for_vault_events<F>(&self, handler: F) -> bool
    where
        F: Fn(ContractEvent) + Send + 'static,
    {
        let handle = self.contracts.listen_to_vault_events(handler);
        let started = handle.is_some();
        let previous = std::mem::replace(&mut *lock_slot(&self.vault_listener), handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        started
    }

    /// Native AVAX balance of `address`, via the wallet provider.
    pub async fn get_user_avax_balance(&self, address: &str) -> Result<f64> {
        let provider = self.connection.provider()?;
        let actor = self.connection.actor_id();
        let call = GovernedCall {
            actor: &actor,
            category: RateLimitCategory::Rpc,
            label: "eth_getBalance",
            cache: Some(CachePolicy::new(
                format!("rpc:eth_getBalance:{}", address.to_lowercase()),
                BALANCE_CACHE_TTL,
            )),
            retry: &self.read_retry,
        };

        let value = self
            .governor
            .execute(call, || {
                let provider = provider.clone();
                let params = json!([address, "latest"]);
                async move {
                    provider
                        .request("eth_getBalance", params)
                        .await
                        .map_err(ClientError::from)
                }
            })
            .await?;

        let raw = match &value {
            Value::String(s) => s.as_str(),
            other => return Err(ClientError::Parse(format!("eth_getBalance returned {}", other))),
        };
        Ok(format_ether(parse_hex_quantity(raw)?))
    }

    /// Drop cached results and connection state. Rate-limit history is kept.
    pub fn cleanup(&self) {
        self.cache.clear();
        self.connection.reset();
        debug!("Client state cleaned up");
    }

    /// `cleanup` plus stopping the wallet and vault event listeners
    pub fn shutdown(&self) {
        for slot in [&self.event_listener, &self.vault_listener] {
            if let Some(handle) = lock_slot(slot).take() {
                handle.abort();
            }
        }
        self.cleanup();
    }
}

fn lock_slot(slot: &Mutex<Option<JoinHandle<()>>>) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockContracts, MockTransport, MockWallet};
    use assert_approx_eq::assert_approx_eq;
    use crate::utils::WEI_PER_ETHER;

    const USER: &str = "0xAbC0000000000000000000000000000000000001";

    fn context(wallet: Option<Arc<MockWallet>>) -> ClientContext {
        let deps = ClientDeps {
            wallet: wallet.map(|w| w as Arc<dyn WalletProvider>),
            transport: Arc::new(MockTransport::new()),
            contracts: Arc::new(MockContracts::new()),
        };
        ClientContext::new(Arc::new(Config::default()), deps)
    }

    #[tokio::test]
    async fn test_balance_is_cached() {
        let wallet = Arc::new(MockWallet::with_accounts(&[USER]));
        wallet.set_balance(USER, WEI_PER_ETHER * 5 / 2);
        let ctx = context(Some(wallet.clone()));

        assert_approx_eq!(ctx.get_user_avax_balance(USER).await.unwrap(), 2.5);
        wallet.set_balance(USER, 0);
        assert_approx_eq!(ctx.get_user_avax_balance(USER).await.unwrap(), 2.5);
        assert_eq!(wallet.call_count("eth_getBalance"), 1);

        ctx.cleanup();
        assert_approx_eq!(ctx.get_user_avax_balance(USER).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_balance_without_provider() {
        let ctx = context(None);
        assert!(matches!(
            ctx.get_user_avax_balance(USER).await,
            Err(ClientError::ProviderUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_cleanup_resets_connection_but_not_quota() {
        let wallet = Arc::new(MockWallet::with_accounts(&[USER]));
        let ctx = context(Some(wallet));
        ctx.connect_wallet().await.unwrap();

        let actor = ctx.connection.actor_id();
        let before = ctx.limiter.get_remaining_requests(&actor, &RateLimitCategory::Wallet);

        ctx.cleanup();
        assert!(!ctx.connection.snapshot().is_connected);
        assert!(ctx.cache.is_empty());
        assert_eq!(
            ctx.limiter.get_remaining_requests(&actor, &RateLimitCategory::Wallet),
            before
        );
    }

    #[tokio::test]
    async fn test_vault_listener_is_replaced_and_stopped() {
        let contracts = Arc::new(MockContracts::new());
        let ctx = ClientContext::new(
            Arc::new(Config::default()),
            ClientDeps {
                wallet: None,
                transport: Arc::new(MockTransport::new()),
                contracts: contracts.clone(),
            },
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let first = tx.clone();
        assert!(ctx.listen_for_vault_events(move |event| {
            let _ = first.send(("first", event.name));
        }));
        assert!(ctx.listen_for_vault_events(move |event| {
            let _ = tx.send(("second", event.name));
        }));
        tokio::task::yield_now().await;

        contracts.emit_event(ContractEvent {
            contract: ctx.contracts.vault_address().to_string(),
            name: "FundsDeposited".to_string(),
            args: json!({"user": USER, "amount": "1000"}),
            transaction_hash: "0x01".to_string(),
            block_number: 1,
        });
        assert_eq!(rx.recv().await, Some(("second", "FundsDeposited".to_string())));

        ctx.shutdown();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_event_listener_needs_a_stream() {
        let wallet = Arc::new(MockWallet::with_accounts(&[USER]));
        let ctx = context(Some(wallet.clone()));
        assert!(ctx.listen_for_wallet_events());
        assert!(ctx.listen_for_wallet_events());
        ctx.shutdown();

        wallet.close_events();
        assert!(!ctx.listen_for_wallet_events());
    }
}
