// src/api/client.rs
//! Governed access to the trading API.
//!
//! Every call goes through [`RequestGovernor`] under the `api` category for the
//! current actor. GET reads are retried with the read policy; anything that mutates
//! server state is attempted once.

use crate::api::governor::{CachePolicy, GovernedCall, RequestGovernor};
use crate::api::models::{
    decode_envelope, CopyHistoryResponse, FollowTraderRequest, FollowingResponse,
    LeaderboardResponse, StatsResponse, SyncResponse, TransactionRequest, UnfollowTraderRequest,
};
use crate::api::rate_limiter::RateLimitCategory;
use crate::api::retry::RetryPolicy;
use crate::api::transport::{ApiTransport, HttpMethod, HttpRequest};
use crate::config::settings::ApiEndpoints;
use crate::error::{ClientError, Result};
use crate::wallet::connection::ConnectionGuard;
use log::{debug, error};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const FOLLOW_TRADER_CACHE_TTL: Duration = Duration::from_secs(30);
pub const FOLLOWING_CACHE_TTL: Duration = Duration::from_secs(15);
pub const LEADERBOARD_CACHE_TTL: Duration = Duration::from_secs(30);
pub const HISTORY_CACHE_TTL: Duration = Duration::from_secs(15);
pub const STATS_CACHE_TTL: Duration = Duration::from_secs(30);
pub const ASSETS_CACHE_TTL: Duration = Duration::from_secs(60);

pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 20;
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiCallOptions {
    pub method: HttpMethod,
    pub body: Option<Value>,
    pub cache_ttl: Option<Duration>,
    pub retry: Option<RetryPolicy>,
}

impl ApiCallOptions {
    pub fn get() -> Self {
        Self {
            method: HttpMethod::Get,
            body: None,
            cache_ttl: None,
            retry: None,
        }
    }

    pub fn post(body: Option<Value>) -> Self {
        Self {
            method: HttpMethod::Post,
            body,
            cache_ttl: None,
            retry: None,
        }
    }

    pub fn post_json<T: Serialize>(body: &T) -> Result<Self> {
        Ok(Self::post(Some(serde_json::to_value(body)?)))
    }

    pub fn cached(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

impl Default for ApiCallOptions {
    fn default() -> Self {
        Self::get()
    }
}

pub struct ApiClient {
    base_url: String,
    endpoints: ApiEndpoints,
    transport: Arc<dyn ApiTransport>,
    governor: Arc<RequestGovernor>,
    connection: Arc<ConnectionGuard>,
    read_retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        endpoints: ApiEndpoints,
        transport: Arc<dyn ApiTransport>,
        governor: Arc<RequestGovernor>,
        connection: Arc<ConnectionGuard>,
        read_retry: RetryPolicy,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
            transport,
            governor,
            connection,
            read_retry,
        }
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.base_url, endpoint))
            .map_err(|e| ClientError::InvalidInput(format!("Bad endpoint '{}': {}", endpoint, e)))
    }

    /// Issue one governed request against `base_url + endpoint`.
    pub async fn api_call(&self, endpoint: &str, options: ApiCallOptions) -> Result<Value> {
        let url = self.endpoint_url(endpoint)?;
        let actor = self.connection.actor_id();
        let retry = options.retry.clone().unwrap_or_else(|| match options.method {
            HttpMethod::Get => self.read_retry.clone(),
            _ => RetryPolicy::transaction(),
        });
        let cache = options
            .cache_ttl
            .map(|ttl| CachePolicy::new(api_cache_key(options.method, endpoint, options.body.as_ref()), ttl));
        let label = format!("{} {}", options.method, endpoint);

        let call = GovernedCall {
            actor: &actor,
            category: RateLimitCategory::Api,
            label: &label,
            cache,
            retry: &retry,
        };
        let request = HttpRequest {
            method: options.method,
            url,
            body: options.body,
        };

        let result = self
            .governor
            .execute(call, || {
                let request = request.clone();
                async move {
                    let response = self.transport.send(request).await?;
                    if response.is_success() {
                        Ok(response.body)
                    } else {
                        let message = response
                            .body
                            .get("error")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("API call failed: {}", response.status));
                        Err(ClientError::Api {
                            status: response.status,
                            message,
                        })
                    }
                }
            })
            .await;

        if let Err(e) = &result {
            error!("API call failed for {}: {}", endpoint, e);
        }
        result
    }

    /// `fragment` is matched case-insensitively, like the keys `api_cache_key` builds
    fn invalidate_containing(&self, fragment: &str) {
        let needle = fragment.to_lowercase();
        let removed = self.governor.cache().remove_where(|key| key.contains(&needle));
        if removed > 0 {
            debug!("Invalidated {} cached API reads matching '{}'", removed, fragment);
        }
    }

    fn copy_trading(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.copy_trading, path)
    }

    // ---- copy trading ----

    /// Records a follow with the backend; repeated identical calls are served from cache for 30s.
    pub async fn follow_trader_api(
        &self,
        follower_address: &str,
        trader_address: &str,
        allocation_percentage: u8,
    ) -> Result<Value> {
        let body = FollowTraderRequest {
            follower_address: follower_address.to_string(),
            trader_address: trader_address.to_string(),
            allocation_percentage,
        };
        let options = ApiCallOptions::post_json(&body)?.cached(FOLLOW_TRADER_CACHE_TTL);
        let response = self.api_call(&self.copy_trading("/follow"), options).await?;
        self.invalidate_containing(&format!("/following/{}", follower_address));
        Ok(response)
    }

    pub async fn unfollow_trader_api(&self, follower_address: &str, trader_address: &str) -> Result<Value> {
        let body = UnfollowTraderRequest {
            follower_address: follower_address.to_string(),
            trader_address: trader_address.to_string(),
        };
        let response = self
            .api_call(&self.copy_trading("/unfollow"), ApiCallOptions::post_json(&body)?)
            .await?;
        self.invalidate_containing(&format!("/following/{}", follower_address));
        // a later follow with the same arguments must reach the server again
        self.invalidate_containing("/follow#");
        Ok(response)
    }

    pub async fn get_followed_traders(&self, address: &str) -> Result<FollowingResponse> {
        let endpoint = self.copy_trading(&format!("/following/{}", address));
        let body = self
            .api_call(&endpoint, ApiCallOptions::get().cached(FOLLOWING_CACHE_TTL))
            .await?;
        decode_envelope(body)
    }

    pub async fn get_traders_leaderboard(&self, limit: Option<u32>) -> Result<LeaderboardResponse> {
        let limit = limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
        let endpoint = self.copy_trading(&format!("/leaderboard?limit={}", limit));
        let body = self
            .api_call(&endpoint, ApiCallOptions::get().cached(LEADERBOARD_CACHE_TTL))
            .await?;
        decode_envelope(body)
    }

    pub async fn get_copy_trade_history(
        &self,
        address: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<CopyHistoryResponse> {
        let endpoint = self.copy_trading(&format!(
            "/history/{}?limit={}&offset={}",
            address,
            limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            offset.unwrap_or(0)
        ));
        let body = self
            .api_call(&endpoint, ApiCallOptions::get().cached(HISTORY_CACHE_TTL))
            .await?;
        decode_envelope(body)
    }

    pub async fn get_copy_trading_stats(&self) -> Result<StatsResponse> {
        let body = self
            .api_call(&self.copy_trading("/stats"), ApiCallOptions::get().cached(STATS_CACHE_TTL))
            .await?;
        decode_envelope(body)
    }

    /// Asks the backend to recompute trader performance; cached leaderboards are dropped.
    pub async fn sync_trader_performance(&self) -> Result<SyncResponse> {
        let body = self
            .api_call(&self.copy_trading("/sync-trader-performance"), ApiCallOptions::post(None))
            .await?;
        self.invalidate_containing("/leaderboard");
        decode_envelope(body)
    }

    pub async fn test_copy_trading_events(&self) -> Result<Value> {
        self.api_call(&self.copy_trading("/test-events"), ApiCallOptions::get())
            .await
    }

    pub async fn check_vault_configuration(&self) -> Result<Value> {
        self.api_call(&self.copy_trading("/check-vault-config"), ApiCallOptions::get())
            .await
    }

    // ---- trading records ----

    pub async fn record_buy(&self, request: &TransactionRequest) -> Result<Value> {
        self.record_trade("/buy", request).await
    }

    pub async fn record_sell(&self, request: &TransactionRequest) -> Result<Value> {
        self.record_trade("/sell", request).await
    }

    pub async fn record_partial_sell(&self, request: &TransactionRequest) -> Result<Value> {
        self.record_trade("/sellpartial", request).await
    }

    async fn record_trade(&self, path: &str, request: &TransactionRequest) -> Result<Value> {
        let endpoint = format!("{}{}", self.endpoints.trading, path);
        let response = self
            .api_call(&endpoint, ApiCallOptions::post_json(request)?)
            .await?;
        self.invalidate_containing(&format!("{}/{}", self.endpoints.portfolio, request.user_address));
        Ok(response)
    }

    // ---- assets & portfolio ----

    pub async fn get_assets(&self) -> Result<Value> {
        let endpoint = self.endpoints.assets.clone();
        self.api_call(&endpoint, ApiCallOptions::get().cached(ASSETS_CACHE_TTL))
            .await
    }

    pub async fn get_portfolio_history(&self, address: &str) -> Result<Value> {
        let endpoint = format!("{}/{}/history", self.endpoints.portfolio, address);
        self.api_call(&endpoint, ApiCallOptions::get().cached(HISTORY_CACHE_TTL))
            .await
    }
}

/// `api:<METHOD> <endpoint>`, plus `#<body>` when there is one. Endpoint and body are
/// lowercased so checksummed and lowercase addresses share one entry.
fn api_cache_key(method: HttpMethod, endpoint: &str, body: Option<&Value>) -> String {
    match body {
        Some(body) => format!(
            "api:{} {}#{}",
            method,
            endpoint.to_lowercase(),
            body.to_string().to_lowercase()
        ),
        None => format!("api:{} {}", method, endpoint.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::cache::ExpiringCache;
    use crate::api::rate_limiter::RateLimiter;
    use crate::config::settings::{NetworkConfig, DEFAULT_API_BASE_URL};
    use crate::testing::MockTransport;
    use crate::wallet::actor::SessionToken;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const FOLLOWER: &str = "0xAbC0000000000000000000000000000000000001";
    const TRADER: &str = "0xB0B0000000000000000000000000000000000002";

    fn client(transport: Arc<MockTransport>) -> ApiClient {
        let limiter = Arc::new(RateLimiter::with_default_policies());
        let governor = Arc::new(RequestGovernor::new(
            limiter.clone(),
            Arc::new(ExpiringCache::new(100)),
        ));
        let connection = Arc::new(ConnectionGuard::new(
            None,
            limiter,
            SessionToken::generate(),
            NetworkConfig::default(),
            Duration::from_secs(5),
        ));
        ApiClient::new(
            DEFAULT_API_BASE_URL,
            ApiEndpoints::default(),
            transport,
            governor,
            connection,
            RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40)),
        )
    }

    #[test]
    fn test_cache_key_includes_body() {
        assert_eq!(api_cache_key(HttpMethod::Get, "/a", None), "api:GET /a");
        assert_eq!(
            api_cache_key(HttpMethod::Post, "/a", Some(&json!({"x": 1}))),
            r#"api:POST /a#{"x":1}"#
        );
    }

    #[tokio::test]
    async fn test_error_body_message_is_surfaced() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            HttpMethod::Post,
            "/v1/api/trading/buy",
            400,
            json!({"success": false, "error": "Unknown asset"}),
        );
        let api = client(transport.clone());

        let req = TransactionRequest {
            user_address: FOLLOWER.to_string(),
            asset_symbol: "DOGE".to_string(),
            amount_avax: Some(1.0),
            sell_amount_avax: None,
            tx_hash: "0x01".to_string(),
        };
        let err = api.record_buy(&req).await.unwrap_err();
        match err.root_cause() {
            ClientError::Api { status, message } => {
                assert_eq!(*status, 400);
                assert_eq!(message, "Unknown asset");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_status_only_failure_message() {
        let transport = Arc::new(MockTransport::new());
        let api = client(transport.clone());

        let err = api.test_copy_trading_events().await.unwrap_err();
        assert_eq!(
            err.root_cause().to_string(),
            "API Error (404): API call failed: 404"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_reads_are_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            HttpMethod::Get,
            "/v1/api/copytrading/leaderboard?limit=20",
            200,
            json!({"success": true, "leaderboard": [], "total_traders": 0}),
        );
        transport.fail_next(2);
        let api = client(transport.clone());

        let board = api.get_traders_leaderboard(None).await.unwrap();
        assert_eq!(board.total_traders, 0);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_follow_invalidates_following_reads() {
        let transport = Arc::new(MockTransport::new());
        let following = format!("/v1/api/copytrading/following/{}", FOLLOWER);
        transport.respond(HttpMethod::Get, &following, 200, json!({"success": true, "following": []}));
        transport.respond(HttpMethod::Post, "/v1/api/copytrading/follow", 200, json!({"success": true}));
        let api = client(transport.clone());

        api.get_followed_traders(FOLLOWER).await.unwrap();
        api.get_followed_traders(FOLLOWER).await.unwrap();
        assert_eq!(transport.count_for(HttpMethod::Get, &following), 1);

        api.follow_trader_api(FOLLOWER, TRADER, 25).await.unwrap();
        api.get_followed_traders(FOLLOWER).await.unwrap();
        assert_eq!(transport.count_for(HttpMethod::Get, &following), 2);

        let sent = transport.last_body(HttpMethod::Post, "/v1/api/copytrading/follow").unwrap();
        assert_eq!(
            sent,
            json!({
                "follower_address": FOLLOWER,
                "trader_address": TRADER,
                "allocation_percentage": 25
            })
        );
    }

    #[test]
    fn test_cache_key_ignores_address_case() {
        let checksummed = format!("/v1/api/copytrading/following/{}", FOLLOWER);
        let lower = checksummed.to_lowercase();
        assert_eq!(
            api_cache_key(HttpMethod::Get, &checksummed, None),
            api_cache_key(HttpMethod::Get, &lower, None)
        );
        assert!(api_cache_key(HttpMethod::Get, &checksummed, None).starts_with("api:GET "));
    }

    #[tokio::test]
    async fn test_follow_with_checksummed_address_drops_lowercase_reads() {
        let transport = Arc::new(MockTransport::new());
        let lower = FOLLOWER.to_lowercase();
        let following = format!("/v1/api/copytrading/following/{}", lower);
        transport.respond(HttpMethod::Get, &following, 200, json!({"success": true, "following": []}));
        transport.respond(HttpMethod::Post, "/v1/api/copytrading/follow", 200, json!({"success": true}));
        transport.respond(HttpMethod::Post, "/v1/api/copytrading/unfollow", 200, json!({"success": true}));
        let api = client(transport.clone());

        api.get_followed_traders(&lower).await.unwrap();
        api.follow_trader_api(FOLLOWER, TRADER, 25).await.unwrap();
        api.get_followed_traders(&lower).await.unwrap();
        assert_eq!(transport.count_for(HttpMethod::Get, &following), 2);

        api.unfollow_trader_api(FOLLOWER, TRADER).await.unwrap();
        api.get_followed_traders(&lower).await.unwrap();
        assert_eq!(transport.count_for(HttpMethod::Get, &following), 3);
    }

    #[tokio::test]
    async fn test_trade_record_drops_portfolio_history_in_any_case() {
        let transport = Arc::new(MockTransport::new());
        let lower = FOLLOWER.to_lowercase();
        let history = format!("/v1/api/portfolio/{}/history", lower);
        transport.respond(HttpMethod::Get, &history, 200, json!({"success": true, "history": []}));
        transport.respond(HttpMethod::Post, "/v1/api/trading/sell", 200, json!({"success": true}));
        let api = client(transport.clone());

        api.get_portfolio_history(&lower).await.unwrap();
        api.get_portfolio_history(&lower).await.unwrap();
        assert_eq!(transport.count_for(HttpMethod::Get, &history), 1);

        let req = TransactionRequest {
            user_address: FOLLOWER.to_string(),
            asset_symbol: "AVAX".to_string(),
            amount_avax: None,
            sell_amount_avax: Some(0.5),
            tx_hash: "0x02".to_string(),
        };
        api.record_sell(&req).await.unwrap();
        api.get_portfolio_history(&lower).await.unwrap();
        assert_eq!(transport.count_for(HttpMethod::Get, &history), 2);
    }

    #[tokio::test]
    async fn test_history_defaults_in_query() {
        let transport = Arc::new(MockTransport::new());
        let path = format!("/v1/api/copytrading/history/{}?limit=50&offset=0", FOLLOWER);
        transport.respond(HttpMethod::Get, &path, 200, json!({"success": true, "copy_trades": []}));
        let api = client(transport.clone());

        let history = api.get_copy_trade_history(FOLLOWER, None, None).await.unwrap();
        assert!(history.copy_trades.is_empty());
        assert_eq!(transport.count_for(HttpMethod::Get, &path), 1);
    }
}
