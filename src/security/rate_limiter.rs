//! Per-client token bucket admission control.
//!
//! # Algorithm
//!
//! Each client key owns a bucket holding at most `capacity` tokens. Refill is
//! intervallic: every full `refill_period` elapsed since the last refill adds
//! `refill_tokens`, capped at `capacity`, and `last_refill` advances by whole
//! periods only. Refill is applied lazily on each [`RateLimiter::admit`]; there
//! is no timer thread.
//!
//! # Concurrency
//!
//! Buckets live in a [`moka::sync::Cache`] bounded by `max_cache_size` with an
//! LRU eviction policy. The cache is internally sharded, so lookups for unrelated
//! clients never contend on one lock. The read-modify-write on a single bucket
//! happens under that bucket's own `parking_lot::Mutex`.
//!
//! An evicted bucket is simply forgotten: the next request from that client
//! starts with a full bucket.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use parking_lot::Mutex;
use thiserror::Error;

use crate::clock::SharedClock;
use crate::config::RateLimitConfig;

/// Invalid rate limiter settings, detected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitConfigError {
    #[error("rate limit capacity must be greater than 0")]
    ZeroCapacity,
    #[error("rate limit refill tokens must be greater than 0")]
    ZeroRefillTokens,
    #[error("rate limit refill period must be at least one millisecond")]
    ZeroRefillPeriod,
    #[error("rate limit cache size must be greater than 0")]
    ZeroCacheSize,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Tokens left in the bucket after this decision
    pub remaining: u64,
    /// Configured bucket capacity
    pub limit: u64,
    /// Time until the next refill, set only when denied
    pub retry_after: Option<Duration>,
}

#[derive(Debug)]
struct Bucket {
    available: u64,
    last_refill: DateTime<Utc>,
}

impl Bucket {
    fn full(capacity: u64, now: DateTime<Utc>) -> Self {
        Self {
            available: capacity,
            last_refill: now,
        }
    }

    /// Apply every whole refill period elapsed since `last_refill`.
    fn refill(&mut self, now: DateTime<Utc>, policy: &RefillPolicy) {
        // A clock that steps backwards adds nothing
        let elapsed_ms = (now - self.last_refill).num_milliseconds();
        if elapsed_ms < policy.period_ms {
            return;
        }

        let periods = elapsed_ms / policy.period_ms;
        let added = policy
            .refill_tokens
            .saturating_mul(u64::try_from(periods).unwrap_or(u64::MAX));
        self.available = self.available.saturating_add(added).min(policy.capacity);

        let advance = periods.saturating_mul(policy.period_ms);
        self.last_refill = self
            .last_refill
            .checked_add_signed(TimeDelta::milliseconds(advance))
            .unwrap_or(now);
    }

    fn until_next_refill(&self, now: DateTime<Utc>, policy: &RefillPolicy) -> Duration {
        let next = self
            .last_refill
            .checked_add_signed(TimeDelta::milliseconds(policy.period_ms))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let wait_ms = (next - now).num_milliseconds().max(0);
        // Whole seconds, rounded up, never zero
        let secs = u64::try_from(wait_ms).unwrap_or(0).div_ceil(1000).max(1);
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy)]
struct RefillPolicy {
    capacity: u64,
    refill_tokens: u64,
    period_ms: i64,
}

/// Bounded, concurrent per-client rate limiter.
///
/// Cheap to clone; clones share the same bucket cache.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Cache<String, Arc<Mutex<Bucket>>>,
    policy: RefillPolicy,
    clock: SharedClock,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .field("buckets", &self.buckets.entry_count())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitConfigError`] if any size or interval is zero.
    pub fn new(config: &RateLimitConfig, clock: SharedClock) -> Result<Self, RateLimitConfigError> {
        if config.capacity == 0 {
            return Err(RateLimitConfigError::ZeroCapacity);
        }
        if config.refill_tokens == 0 {
            return Err(RateLimitConfigError::ZeroRefillTokens);
        }
        if config.max_cache_size == 0 {
            return Err(RateLimitConfigError::ZeroCacheSize);
        }
        let period_ms = i64::try_from(config.refill_period.as_millis()).unwrap_or(i64::MAX);
        if period_ms == 0 {
            return Err(RateLimitConfigError::ZeroRefillPeriod);
        }

        let buckets = Cache::builder()
            .max_capacity(config.max_cache_size)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Ok(Self {
            buckets,
            policy: RefillPolicy {
                capacity: config.capacity,
                refill_tokens: config.refill_tokens,
                period_ms,
            },
            clock,
        })
    }

    /// Decide whether one request from `client_key` may proceed.
    ///
    /// Creates the bucket at full capacity on first sight. Atomic per key.
    pub fn admit(&self, client_key: &str) -> Admission {
        let now = self.clock.now();
        let capacity = self.policy.capacity;
        let bucket = self
            .buckets
            .get_with_by_ref(client_key, || Arc::new(Mutex::new(Bucket::full(capacity, now))));

        let mut bucket = bucket.lock();
        bucket.refill(now, &self.policy);

        if bucket.available >= 1 {
            bucket.available -= 1;
            Admission {
                allowed: true,
                remaining: bucket.available,
                limit: capacity,
                retry_after: None,
            }
        } else {
            Admission {
                allowed: false,
                remaining: 0,
                limit: capacity,
                retry_after: Some(bucket.until_next_refill(now, &self.policy)),
            }
        }
    }

    /// Configured bucket capacity.
    pub fn limit(&self) -> u64 {
        self.policy.capacity
    }

    /// Approximate number of tracked client buckets.
    pub fn bucket_count(&self) -> u64 {
        self.buckets.entry_count()
    }

    /// Apply pending evictions so the bucket count converges to the bound.
    pub fn run_maintenance(&self) {
        self.buckets.run_pending_tasks();
    }
}
