// src/api/rate_limiter.rs
//! Sliding-window rate limiting for outbound client calls
//!
//! Every governed call consumes one slot of its `(actor, category)` window:
//! - Cheap reads (`api`, `rpc`, `contract_read`) get generous windows
//! - Mutating chain operations (`contract_write`) get the tightest quota
//! - Wallet probes (`wallet`) are bounded so a UI loop cannot hammer the provider
//!
//! Records are pruned lazily whenever a key is queried. Keys whose window has emptied are
//! swept out every `SWEEP_EVERY` admissions, so one-off session tokens do not accumulate.

use crate::wallet::actor::ActorId;
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Call-site category a quota applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitCategory {
    Api,
    Rpc,
    ContractRead,
    ContractWrite,
    Wallet,
    /// Call sites added without a registered policy
    Custom(String),
}

impl RateLimitCategory {
    pub fn as_str(&self) -> &str {
        match self {
            RateLimitCategory::Api => "api",
            RateLimitCategory::Rpc => "rpc",
            RateLimitCategory::ContractRead => "contract_read",
            RateLimitCategory::ContractWrite => "contract_write",
            RateLimitCategory::Wallet => "wallet",
            RateLimitCategory::Custom(name) => name,
        }
    }

    pub fn builtin() -> [RateLimitCategory; 5] {
        [
            RateLimitCategory::Api,
            RateLimitCategory::Rpc,
            RateLimitCategory::ContractRead,
            RateLimitCategory::ContractWrite,
            RateLimitCategory::Wallet,
        ]
    }

    /// Parses the config spelling (`contract_write`, `api`, ...). Unknown names become `Custom`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "api" => RateLimitCategory::Api,
            "rpc" => RateLimitCategory::Rpc,
            "contract_read" => RateLimitCategory::ContractRead,
            "contract_write" => RateLimitCategory::ContractWrite,
            "wallet" => RateLimitCategory::Wallet,
            other => RateLimitCategory::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for RateLimitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `max_requests` slots per rolling `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    pub fn default_for(category: &RateLimitCategory) -> Option<Self> {
        let minute = Duration::from_secs(60);
        match category {
            RateLimitCategory::Api => Some(Self::new(30, minute)),
            RateLimitCategory::Rpc => Some(Self::new(60, minute)),
            RateLimitCategory::ContractRead => Some(Self::new(60, minute)),
            RateLimitCategory::ContractWrite => Some(Self::new(5, minute)),
            RateLimitCategory::Wallet => Some(Self::new(10, minute)),
            RateLimitCategory::Custom(_) => None,
        }
    }
}

/// Outcome of a `check_limit` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    /// Denied; `retry_after` is the time until the oldest counted record leaves the window
    Denied { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

type LimitKey = (ActorId, RateLimitCategory);

/// Admissions between sweeps of emptied keys
pub const SWEEP_EVERY: u64 = 256;

/// Per-actor, per-category sliding window limiter
#[derive(Debug)]
pub struct RateLimiter {
    policies: HashMap<RateLimitCategory, RateLimitPolicy>,
    records: DashMap<LimitKey, VecDeque<Instant>>,
    checks: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter with a fixed set of policies. Policies cannot change afterwards.
    pub fn new(policies: HashMap<RateLimitCategory, RateLimitPolicy>) -> Self {
        for (category, policy) in &policies {
            info!(
                "Rate limit policy for {}: {} req / {:?}",
                category, policy.max_requests, policy.window
            );
        }
        Self {
            policies,
            records: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    /// Limiter with the built-in policy for every standard category
    pub fn with_default_policies() -> Self {
        let policies = RateLimitCategory::builtin()
            .into_iter()
            .filter_map(|c| RateLimitPolicy::default_for(&c).map(|p| (c, p)))
            .collect();
        Self::new(policies)
    }

    pub fn policy(&self, category: &RateLimitCategory) -> Option<RateLimitPolicy> {
        self.policies.get(category).copied()
    }

    /// Consume a slot if one is free. Denials leave state untouched.
    pub fn check_limit(&self, actor: &ActorId, category: &RateLimitCategory) -> RateLimitDecision {
        let Some(policy) = self.policy(category) else {
            warn!(
                "No rate limit policy registered for category '{}', allowing request",
                category
            );
            return RateLimitDecision::Allowed;
        };

        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired();
        }

        let now = Instant::now();
        let key = (actor.clone(), category.clone());
        let mut entry = self.records.entry(key.clone()).or_default();
        let history = entry.value_mut();
        prune(history, now, policy.window);

        if history.len() >= policy.max_requests as usize {
            let retry_after = history
                .front()
                .map(|oldest| policy.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(policy.window);
            debug!(
                "{} limit reached for {}: {}/{}, retry in {:?}",
                category,
                actor,
                history.len(),
                policy.max_requests,
                retry_after
            );
            if history.is_empty() {
                // zero-quota policy: nothing to remember for this key
                drop(entry);
                self.records.remove_if(&key, |_, history| history.is_empty());
            }
            return RateLimitDecision::Denied { retry_after };
        }

        history.push_back(now);
        debug!(
            "{} request allowed for {} ({}/{})",
            category,
            actor,
            history.len(),
            policy.max_requests
        );
        RateLimitDecision::Allowed
    }

    /// Slots still free in the current window. Read-only.
    pub fn get_remaining_requests(&self, actor: &ActorId, category: &RateLimitCategory) -> u32 {
        let Some(policy) = self.policy(category) else {
            return u32::MAX;
        };
        let used = self.live_count(actor, category, policy);
        policy.max_requests.saturating_sub(used)
    }

    /// Time until the oldest live record expires, zero when nothing is counted. Read-only.
    pub fn time_until_reset(&self, actor: &ActorId, category: &RateLimitCategory) -> Duration {
        let Some(policy) = self.policy(category) else {
            return Duration::ZERO;
        };
        let now = Instant::now();
        let key = (actor.clone(), category.clone());
        self.records
            .get(&key)
            .and_then(|history| {
                history
                    .iter()
                    .find(|ts| now.duration_since(**ts) < policy.window)
                    .map(|oldest| policy.window.saturating_sub(now.duration_since(*oldest)))
            })
            .unwrap_or(Duration::ZERO)
    }

    pub fn stats(&self, actor: &ActorId, category: &RateLimitCategory) -> RateLimitStats {
        let policy = self.policy(category);
        let used = policy
            .map(|p| self.live_count(actor, category, p))
            .unwrap_or(0);
        RateLimitStats {
            category: category.clone(),
            used,
            limit: policy.map(|p| p.max_requests),
            window: policy.map(|p| p.window),
            reset_in: self.time_until_reset(actor, category),
        }
    }

    /// Prune every key and drop the ones left with no live records. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|(_, category), history| match self.policies.get(category) {
            Some(policy) => {
                prune(history, now, policy.window);
                !history.is_empty()
            }
            None => false,
        });
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!("Swept {} idle rate limit keys", removed);
        }
        removed
    }

    /// Number of `(actor, category)` pairs currently holding records
    pub fn tracked_keys(&self) -> usize {
        self.records.len()
    }

    /// Drop every record. Policies are kept.
    pub fn reset(&self) {
        self.records.clear();
    }

    fn live_count(&self, actor: &ActorId, category: &RateLimitCategory, policy: RateLimitPolicy) -> u32 {
        let now = Instant::now();
        let key = (actor.clone(), category.clone());
        self.records
            .get(&key)
            .map(|history| {
                history
                    .iter()
                    .filter(|ts| now.duration_since(**ts) < policy.window)
                    .count() as u32
            })
            .unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_default_policies()
    }
}

// Records are appended with a monotonic clock, so expired ones sit at the front.
fn prune(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = history.front() {
        if now.duration_since(*front) >= window {
            history.pop_front();
        } else {
            break;
        }
    }
}

/// Usage snapshot for one `(actor, category)` pair
#[derive(Debug, Clone)]
pub struct RateLimitStats {
    pub category: RateLimitCategory,
    pub used: u32,
    pub limit: Option<u32>,
    pub window: Option<Duration>,
    pub reset_in: Duration,
}

impl fmt::Display for RateLimitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.limit, self.window) {
            (Some(limit), Some(window)) => write!(
                f,
                "{}: {}/{} per {:?}, reset in {:?}",
                self.category, self.used, limit, window, self.reset_in
            ),
            _ => write!(f, "{}: unlimited", self.category),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn actor() -> ActorId {
        ActorId::from_address("0xABC0000000000000000000000000000000000001")
    }

    fn limiter_with(category: RateLimitCategory, max: u32, window_ms: u64) -> RateLimiter {
        let mut policies = HashMap::new();
        policies.insert(category, RateLimitPolicy::new(max, Duration::from_millis(window_ms)));
        RateLimiter::new(policies)
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_fills_then_reopens() {
        let category = RateLimitCategory::Api;
        let limiter = limiter_with(category.clone(), 3, 1_000);

        for _ in 0..3 {
            assert!(limiter.check_limit(&actor(), &category).is_allowed());
        }
        assert!(!limiter.check_limit(&actor(), &category).is_allowed());

        advance(Duration::from_millis(1_000)).await;
        assert!(limiter.check_limit(&actor(), &category).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denial_reports_time_until_oldest_expires() {
        let category = RateLimitCategory::ContractWrite;
        let limiter = limiter_with(category.clone(), 2, 10_000);

        assert!(limiter.check_limit(&actor(), &category).is_allowed());
        advance(Duration::from_millis(4_000)).await;
        assert!(limiter.check_limit(&actor(), &category).is_allowed());

        match limiter.check_limit(&actor(), &category) {
            RateLimitDecision::Denied { retry_after } => {
                assert_eq!(retry_after, Duration::from_millis(6_000))
            }
            RateLimitDecision::Allowed => panic!("third call should be denied"),
        }
        // denial does not consume a slot
        assert_eq!(limiter.get_remaining_requests(&actor(), &category), 0);
        advance(Duration::from_millis(6_000)).await;
        assert_eq!(limiter.get_remaining_requests(&actor(), &category), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_requests_is_read_only() {
        let category = RateLimitCategory::Rpc;
        let limiter = limiter_with(category.clone(), 2, 60_000);

        assert!(limiter.check_limit(&actor(), &category).is_allowed());
        for _ in 0..10 {
            assert_eq!(limiter.get_remaining_requests(&actor(), &category), 1);
        }
        assert!(limiter.check_limit(&actor(), &category).is_allowed());
        assert_eq!(limiter.get_remaining_requests(&actor(), &category), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partitions_are_independent() {
        let category = RateLimitCategory::Wallet;
        let limiter = limiter_with(category.clone(), 1, 60_000);
        let other = ActorId::from_address("0xDEF0000000000000000000000000000000000002");

        assert!(limiter.check_limit(&actor(), &category).is_allowed());
        assert!(!limiter.check_limit(&actor(), &category).is_allowed());
        assert!(limiter.check_limit(&other, &category).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_keys_are_swept() {
        let category = RateLimitCategory::Api;
        let limiter = limiter_with(category.clone(), 1_000, 60_000);
        for i in 0..10 {
            let session = ActorId::from_address(&format!("session_{}", i));
            assert!(limiter.check_limit(&session, &category).is_allowed());
        }
        assert_eq!(limiter.tracked_keys(), 10);

        advance(Duration::from_secs(61)).await;
        for _ in 0..SWEEP_EVERY {
            assert!(limiter.check_limit(&actor(), &category).is_allowed());
        }
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.get_remaining_requests(&actor(), &category), 1_000 - SWEEP_EVERY as u32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_keeps_live_windows() {
        let category = RateLimitCategory::Rpc;
        let limiter = limiter_with(category.clone(), 5, 10_000);
        let other = ActorId::from_address("0xDEF0000000000000000000000000000000000002");

        limiter.check_limit(&actor(), &category);
        advance(Duration::from_secs(6)).await;
        limiter.check_limit(&other, &category);
        advance(Duration::from_secs(5)).await;

        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.get_remaining_requests(&other, &category), 4);
    }

    #[tokio::test]
    async fn test_zero_quota_denial_leaves_no_key() {
        let category = RateLimitCategory::ContractWrite;
        let limiter = limiter_with(category.clone(), 0, 60_000);
        assert!(!limiter.check_limit(&actor(), &category).is_allowed());
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_unregistered_category_fails_open() {
        let limiter = RateLimiter::new(HashMap::new());
        let category = RateLimitCategory::Custom("leaderboard_poll".to_string());
        for _ in 0..100 {
            assert!(limiter.check_limit(&actor(), &category).is_allowed());
        }
        assert_eq!(limiter.get_remaining_requests(&actor(), &category), u32::MAX);
    }

    #[test]
    fn test_category_parse_roundtrips_config_names() {
        for category in RateLimitCategory::builtin() {
            assert_eq!(RateLimitCategory::parse(category.as_str()), category);
        }
        assert_eq!(
            RateLimitCategory::parse("Price_Feed"),
            RateLimitCategory::Custom("price_feed".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_display() {
        let limiter = RateLimiter::with_default_policies();
        limiter.check_limit(&actor(), &RateLimitCategory::ContractWrite);
        let stats = limiter.stats(&actor(), &RateLimitCategory::ContractWrite);
        assert_eq!(stats.used, 1);
        assert_eq!(stats.limit, Some(5));
        assert!(stats.to_string().starts_with("contract_write: 1/5"));
    }
}
