// src/api/mod.rs
//! API Management Module
//!
//! Client-side request governance for everything the client sends out:
//! - Per-actor sliding-window rate limiting by call category
//! - Bounded TTL cache for successes and recent failures
//! - Bounded exponential-backoff retry
//! - Governed access to the trading API over a pluggable HTTP transport

pub mod cache;
pub mod client;
pub mod governor;
pub mod models;
pub mod rate_limiter;
pub mod retry;
pub mod transport;

pub use rate_limiter::{
    RateLimitCategory,
    RateLimitDecision,
    RateLimitPolicy,
    RateLimitStats,
    RateLimiter,
};

pub use cache::{CacheStats, CachedOutcome, ExpiringCache, DEFAULT_MAX_ENTRIES};

pub use retry::{with_retry, RetryPolicy};

pub use governor::{CachePolicy, GovernedCall, RequestGovernor};

pub use transport::{ApiTransport, HttpMethod, HttpRequest, HttpResponse, ReqwestTransport};

pub use client::{ApiCallOptions, ApiClient};

pub use models::{
    CopyHistoryResponse,
    FollowTraderRequest,
    FollowingResponse,
    LeaderboardResponse,
    StatsResponse,
    SyncResponse,
    TransactionRequest,
};
