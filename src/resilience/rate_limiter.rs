use crate::clock::{self, Clock};
use crate::types::{ProviderId, UserTier};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of a pre-call quota check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    pub fn deny(retry_after: Option<Duration>) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }
}

/// Per-requester quota gate consulted before every provider call.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_limit(
        &self,
        provider: ProviderId,
        requester_id: &str,
        tier: UserTier,
        estimated_tokens: u32,
    ) -> RateLimitDecision;

    async fn track_usage(
        &self,
        provider: ProviderId,
        requester_id: &str,
        tokens_used: u32,
        tier: UserTier,
    );
}

/// Limiter that never denies.
pub struct AllowAllRateLimiter;

#[async_trait]
impl RateLimiter for AllowAllRateLimiter {
    async fn check_limit(&self, _: ProviderId, _: &str, _: UserTier, _: u32) -> RateLimitDecision {
        RateLimitDecision::allow()
    }

    async fn track_usage(&self, _: ProviderId, _: &str, _: u32, _: UserTier) {}
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Token budget per minute, by tier.
    pub tokens_per_minute: HashMap<UserTier, f64>,
    /// Full buckets untouched for this long are dropped.
    pub idle_ttl: Duration,
}

impl RateLimiterConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        let tokens_per_minute = [
            (UserTier::Free, 10_000.0),
            (UserTier::Basic, 40_000.0),
            (UserTier::Pro, 100_000.0),
            (UserTier::Premium, 250_000.0),
        ]
        .into_iter()
        .collect();
        Self {
            tokens_per_minute,
            idle_ttl: Duration::from_secs(600),
        }
    }

    /// Set the per-minute token budget for one tier
    pub fn with_tier_budget(mut self, tier: UserTier, tokens_per_minute: f64) -> Self {
        if tokens_per_minute.is_finite() && tokens_per_minute >= 0.0 {
            self.tokens_per_minute.insert(tier, tokens_per_minute);
        }
        self
    }

    /// Set how long a full, unused bucket is kept
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    fn budget(&self, tier: UserTier) -> f64 {
        self.tokens_per_minute.get(&tier).copied().unwrap_or(0.0)
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    last: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            last: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.capacity / 60.0).min(self.capacity);
            self.last = now;
        }
    }

    /// Refilled to capacity and untouched for `ttl`: dropping it loses nothing.
    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        let idle = now.saturating_duration_since(self.last);
        let refilled = self.tokens + idle.as_secs_f64() * self.capacity / 60.0 >= self.capacity;
        idle >= ttl && refilled
    }
}

/// Token-bucket limiter keyed by (provider, requester).
///
/// - Bucket capacity is one minute of the tier's budget
/// - Checks do not reserve; actual usage is deducted by `track_usage`
/// - Usage may overdraw the bucket by up to one capacity, delaying later requests
/// - Idle full buckets are evicted at most once per `idle_ttl`, or on
///   [`purge_idle`](Self::purge_idle)
pub struct TokenBucketRateLimiter {
    cfg: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    buckets: DashMap<(ProviderId, String), Bucket>,
    last_purge: Mutex<Instant>,
}

impl TokenBucketRateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        Self::with_clock(cfg, clock::system())
    }

    pub fn with_clock(cfg: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            cfg,
            clock,
            buckets: DashMap::new(),
            last_purge: Mutex::new(now),
        }
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop buckets that are full and idle past the TTL; returns how many were dropped.
    pub fn purge_idle(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.cfg.idle_ttl;
        let before = self.buckets.len();
        self.buckets.retain(|_, b| !b.is_idle(now, ttl));
        let purged = before.saturating_sub(self.buckets.len());
        if purged > 0 {
            debug!(purged, remaining = self.buckets.len(), "idle rate-limit buckets evicted");
        }
        purged
    }

    /// Runs before any shard lock is taken; `retain` must not overlap an entry guard.
    fn maybe_purge(&self, now: Instant) {
        let due = {
            let mut last = self.last_purge.lock().unwrap_or_else(|e| e.into_inner());
            if now.saturating_duration_since(*last) >= self.cfg.idle_ttl {
                *last = now;
                true
            } else {
                false
            }
        };
        if due {
            self.purge_idle();
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucketRateLimiter {
    async fn check_limit(
        &self,
        provider: ProviderId,
        requester_id: &str,
        tier: UserTier,
        estimated_tokens: u32,
    ) -> RateLimitDecision {
        let capacity = self.cfg.budget(tier);
        if capacity <= 0.0 {
            return RateLimitDecision::deny(None);
        }
        let now = self.clock.now();
        self.maybe_purge(now);

        let mut bucket = self
            .buckets
            .entry((provider, requester_id.to_string()))
            .or_insert_with(|| Bucket::full(capacity, now));
        bucket.capacity = capacity;
        bucket.refill(now);

        let needed = (estimated_tokens as f64).min(capacity);
        if bucket.tokens >= needed {
            RateLimitDecision::allow()
        } else {
            let missing = needed - bucket.tokens;
            RateLimitDecision::deny(Some(Duration::from_secs_f64(missing * 60.0 / capacity)))
        }
    }

    async fn track_usage(
        &self,
        provider: ProviderId,
        requester_id: &str,
        tokens_used: u32,
        tier: UserTier,
    ) {
        let capacity = self.cfg.budget(tier);
        let now = self.clock.now();
        let mut bucket = self
            .buckets
            .entry((provider, requester_id.to_string()))
            .or_insert_with(|| Bucket::full(capacity, now));
        bucket.capacity = capacity;
        bucket.refill(now);
        bucket.tokens = (bucket.tokens - tokens_used as f64).max(-capacity);
    }
}
