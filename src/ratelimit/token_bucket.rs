//! # Token bucket stage.
//!
//! Standard leaky-token bucket: the bucket holds up to `token_limit`
//! tokens, `tokens_per_period` return every `replenishment_period`, and an
//! acquisition consumes `n` tokens or fails immediately.
//!
//! Replenishment is lazy: elapsed whole periods are credited on the
//! acquire/inspect path when `auto_replenish` is on, so no timer task is
//! needed. With `auto_replenish` off, tokens return only through lease
//! disposal or [`TokenBucket::replenish_now`].
//!
//! A failed lease carries a [`RETRY_AFTER`] estimate of the wait until
//! enough tokens have accumulated.
//!
//! ## Retirement
//! The adaptive loop replaces the bucket wholesale when capacity moves far
//! enough. [`TokenBucket::retire`] marks the old instance: acquisition
//! fails there, and releases from in-flight leases become silent no-ops.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::config::TokenBucketConfig;
use super::lease::{MetadataValue, RateLimitLease, REASON, RETRY_AFTER};

/// Mutable bucket state behind the mutex.
struct BucketState {
    tokens: u64,
    last_replenished_at: Instant,
}

/// Burst-smoothing stage of the composite limiter.
pub struct TokenBucket {
    config: TokenBucketConfig,
    state: Mutex<BucketState>,
    retired: AtomicBool,
}

impl TokenBucket {
    /// Creates a full bucket. `config` must already be validated.
    pub fn new(config: TokenBucketConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: config.token_limit,
                last_replenished_at: Instant::now(),
            }),
            config,
            retired: AtomicBool::new(false),
        }
    }

    /// Attempts to take `n` tokens without waiting.
    ///
    /// The granted lease returns the tokens on disposal. A failed lease
    /// carries a `retry_after` estimate; acquisition against a retired
    /// bucket fails unconditionally.
    pub fn try_acquire(self: &Arc<Self>, n: u64) -> RateLimitLease {
        if self.is_retired() {
            return RateLimitLease::failed(vec![(REASON, MetadataValue::Text("bucket retired"))]);
        }

        let mut state = self.state.lock().expect("token bucket poisoned");
        let now = Instant::now();
        self.replenish_locked(&mut state, now);

        if state.tokens >= n {
            state.tokens -= n;
            let bucket = Arc::clone(self);
            return RateLimitLease::granted(
                vec![("permits", MetadataValue::Count(n))],
                move || bucket.release(n),
            );
        }

        let mut metadata = vec![("permits", MetadataValue::Count(n))];
        if let Some(wait) = self.estimate_wait(&state, now, n) {
            metadata.push((RETRY_AFTER, MetadataValue::Duration(wait)));
        }
        RateLimitLease::failed(metadata)
    }

    /// Returns `n` tokens to the bucket, capped at the limit.
    ///
    /// A release against a retired bucket is a silent no-op; in-flight
    /// leases taken before a rebuild stay safe to dispose.
    pub fn release(&self, n: u64) {
        if self.is_retired() {
            return;
        }
        let mut state = self.state.lock().expect("token bucket poisoned");
        state.tokens = (state.tokens + n).min(self.config.token_limit);
    }

    /// Credits elapsed periods immediately, regardless of
    /// `auto_replenish`.
    pub fn replenish_now(&self) {
        let mut state = self.state.lock().expect("token bucket poisoned");
        let now = Instant::now();
        Self::credit_elapsed(&self.config, &mut state, now);
    }

    /// Tokens currently available (after lazy replenishment).
    pub fn available(&self) -> u64 {
        let mut state = self.state.lock().expect("token bucket poisoned");
        self.replenish_locked(&mut state, Instant::now());
        state.tokens
    }

    /// Marks the bucket retired; see the module docs.
    pub fn retire(&self) {
        self.retired.store(true, AtomicOrdering::Release);
    }

    /// Whether the bucket has been retired by a rebuild.
    pub fn is_retired(&self) -> bool {
        self.retired.load(AtomicOrdering::Acquire)
    }

    /// The capacity this bucket was built with.
    pub fn token_limit(&self) -> u64 {
        self.config.token_limit
    }

    fn replenish_locked(&self, state: &mut BucketState, now: Instant) {
        if self.config.auto_replenish {
            Self::credit_elapsed(&self.config, state, now);
        }
    }

    /// Credits every whole period elapsed since the last replenishment.
    fn credit_elapsed(config: &TokenBucketConfig, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_replenished_at);
        let periods = (elapsed.as_nanos() / config.replenishment_period.as_nanos())
            .min(u128::from(u32::MAX)) as u32;
        if periods == 0 {
            return;
        }
        let credit = config.tokens_per_period.saturating_mul(u64::from(periods));
        state.tokens = (state.tokens.saturating_add(credit)).min(config.token_limit);
        state.last_replenished_at += config.replenishment_period * periods;
    }

    /// Estimates the wait until `n` tokens are available, or `None` when
    /// `n` exceeds the bucket's capacity or replenishment is manual.
    fn estimate_wait(&self, state: &BucketState, now: Instant, n: u64) -> Option<Duration> {
        if !self.config.auto_replenish || n > self.config.token_limit {
            return None;
        }
        let missing = n - state.tokens;
        let periods = missing.div_ceil(self.config.tokens_per_period) as u32;
        let ready_at = state.last_replenished_at + self.config.replenishment_period * periods;
        Some(ready_at.saturating_duration_since(now))
    }
}
