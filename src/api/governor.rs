// src/api/governor.rs
//! Composition point for outbound calls: rate limit, cache, retry, cache write.

use crate::api::cache::{CachedOutcome, ExpiringCache};
use crate::api::rate_limiter::{RateLimitCategory, RateLimitDecision, RateLimiter};
use crate::api::retry::{with_retry, RetryPolicy};
use crate::error::{ClientError, Result};
use crate::wallet::actor::ActorId;
use log::debug;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(5);

/// Where and how long a governed call's outcome is memoized
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub key: String,
    pub success_ttl: Duration,
    pub failure_ttl: Duration,
}

impl CachePolicy {
    pub fn new(key: impl Into<String>, success_ttl: Duration) -> Self {
        Self {
            key: key.into(),
            success_ttl,
            failure_ttl: DEFAULT_FAILURE_TTL,
        }
    }

    pub fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }
}

/// Everything the governor needs to know about one call
#[derive(Debug, Clone)]
pub struct GovernedCall<'a> {
    pub actor: &'a ActorId,
    pub category: RateLimitCategory,
    pub label: &'a str,
    pub cache: Option<CachePolicy>,
    pub retry: &'a RetryPolicy,
}

pub struct RequestGovernor {
    limiter: Arc<RateLimiter>,
    cache: Arc<ExpiringCache<CachedOutcome>>,
}

impl RequestGovernor {
    pub fn new(limiter: Arc<RateLimiter>, cache: Arc<ExpiringCache<CachedOutcome>>) -> Self {
        Self { limiter, cache }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &Arc<ExpiringCache<CachedOutcome>> {
        &self.cache
    }

    /// Consume one slot for `actor` in `category`, or fail with the time until one frees up.
    pub fn admit(&self, actor: &ActorId, category: &RateLimitCategory) -> Result<()> {
        match self.limiter.check_limit(actor, category) {
            RateLimitDecision::Allowed => Ok(()),
            RateLimitDecision::Denied { retry_after } => Err(ClientError::RateLimited {
                category: category.to_string(),
                retry_after,
            }),
        }
    }

    /// Deny with a cooldown estimate, serve from cache, or run `operation` under retry.
    pub async fn execute<F, Fut>(&self, call: GovernedCall<'_>, operation: F) -> Result<Value>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        self.admit(call.actor, &call.category)?;

        if let Some(policy) = &call.cache {
            match self.cache.get(&policy.key) {
                Some(CachedOutcome::Success(value)) => {
                    debug!("{}: served from cache", call.label);
                    return Ok(value);
                }
                Some(CachedOutcome::Failure(message)) => {
                    debug!("{}: recent failure still cached", call.label);
                    return Err(ClientError::CachedFailure {
                        label: call.label.to_string(),
                        message,
                    });
                }
                None => {}
            }
        }

        let result = with_retry(operation, call.retry, call.label).await;

        if let Some(policy) = call.cache {
            match &result {
                Ok(value) => self
                    .cache
                    .set(policy.key, CachedOutcome::Success(value.clone()), policy.success_ttl),
                Err(e) => self.cache.set(
                    policy.key,
                    CachedOutcome::Failure(e.root_cause().to_string()),
                    policy.failure_ttl,
                ),
            }
        }

        result
    }
}
