//! # Composite adaptive rate limiter.
//!
//! Two-stage admission: the token bucket smooths bursts, the sliding
//! window bounds the aggregate rate. Both must grant before a request is
//! admitted.
//!
//! ## Paired acquisition
//! ```text
//! acquire(n)
//!   1. token bucket try-acquire
//!        └─ refused → record failure → adjust → composite (not acquired)
//!   2. sliding window try-acquire
//!        └─ refused → dispose bucket lease (tokens roll back)
//!                   → record failure → adjust → composite (not acquired)
//!   3. record success → adjust → CompositeLease over both leases
//! ```
//!
//! ## Adaptive loop
//! After every acquisition outcome the loop consults the weighted success
//! EMA **and** the raw acceptance rate (conjunctive gate, dampens
//! oscillation) over the retained outcomes. When both cross a threshold,
//! it proposes new stage limits scaled from the **live** limits, so
//! adjustments compound. A stage is rebuilt only when the proposal moves
//! more than `rebuild_fraction` away from the live value: a fresh instance
//! is swapped in and the old one retired. In-flight leases on the retired
//! instance stay valid — their disposal releases into the retired stage as
//! a no-op. Adjustment is rare by construction, so the few wasted permits
//! cost less than a full re-plumb.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, ExecuteError};
use crate::metrics::MetricsWindow;

use super::config::{RateLimiterConfig, SlidingWindowConfig, TokenBucketConfig};
use super::lease::{CompositeLease, MetadataValue, RateLimitLease, RETRY_AFTER};
use super::sliding_window::SlidingWindow;
use super::token_bucket::TokenBucket;

/// Two-stage admission filter whose capacities self-tune from acceptance
/// outcomes.
pub struct CompositeRateLimiter {
    config: RateLimiterConfig,
    bucket: ArcSwap<TokenBucket>,
    window: ArcSwap<SlidingWindow>,
    /// Live limits the adaptive loop proposes against (the initial config
    /// values would pin scaling one step from the start).
    live_token_limit: AtomicU64,
    live_permit_limit: AtomicU64,
    outcomes: MetricsWindow,
    /// Serializes rebuilds; a contended adjust is skipped, not queued.
    adjust_gate: Mutex<()>,
}

impl CompositeRateLimiter {
    /// Validates `config` and builds both stages at their configured
    /// starting capacities.
    pub fn new(config: RateLimiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            bucket: ArcSwap::from_pointee(TokenBucket::new(config.token_bucket)),
            window: ArcSwap::from_pointee(SlidingWindow::new(config.sliding_window)),
            live_token_limit: AtomicU64::new(config.token_bucket.token_limit),
            live_permit_limit: AtomicU64::new(config.sliding_window.permit_limit),
            outcomes: MetricsWindow::with_time_window(
                config.adaptive.outcome_window_size,
                config.adaptive.outcome_time_window,
            ),
            adjust_gate: Mutex::new(()),
            config,
        })
    }

    /// Runs the paired acquisition protocol for `n` permits.
    pub fn acquire(&self, n: u64) -> CompositeLease {
        let bucket = self.bucket.load_full();
        let bucket_lease = bucket.try_acquire(n);
        if !bucket_lease.acquired() {
            self.record_outcome(false);
            self.adjust();
            return CompositeLease::new(bucket_lease, RateLimitLease::idle());
        }

        let window = self.window.load_full();
        let window_lease = window.try_acquire(n);
        if !window_lease.acquired() {
            // Roll the speculative tokens back before reporting failure.
            let mut bucket_lease = bucket_lease;
            bucket_lease.dispose();
            self.record_outcome(false);
            self.adjust();
            return CompositeLease::new(bucket_lease, window_lease);
        }

        self.record_outcome(true);
        self.adjust();
        CompositeLease::new(bucket_lease, window_lease)
    }

    /// Acquires one permit and runs `f` under it (cooperative surface).
    ///
    /// Refusal maps to [`ExecuteError::RateLimited`] with the limiter's
    /// `retry_after` estimate when one is available. The token is
    /// forwarded to `f` but, as with the bulkhead, not enforced once the
    /// callback has started.
    pub async fn execute<T, E, F, Fut>(
        &self,
        token: &CancellationToken,
        f: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if token.is_cancelled() {
            return Err(ExecuteError::Canceled);
        }

        let mut lease = self.acquire(1);
        if !lease.acquired() {
            let retry_after = lease
                .try_get_metadata(RETRY_AFTER)
                .and_then(MetadataValue::as_duration);
            return Err(ExecuteError::RateLimited { retry_after });
        }

        let outcome = std::panic::AssertUnwindSafe(f(token.clone()))
            .catch_unwind()
            .await;
        lease.dispose();
        match outcome {
            Ok(result) => result.map_err(ExecuteError::Operation),
            Err(panic_err) => std::panic::resume_unwind(panic_err),
        }
    }

    /// Blocking variant of [`execute`](Self::execute); identical
    /// semantics, driven on the calling thread.
    pub fn execute_blocking<T, E, F>(
        &self,
        token: &CancellationToken,
        f: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce(CancellationToken) -> Result<T, E>,
    {
        futures::executor::block_on(self.execute(token, |forwarded| async move { f(forwarded) }))
    }

    /// The token limit the adaptive loop currently targets.
    pub fn current_token_limit(&self) -> u64 {
        self.live_token_limit.load(AtomicOrdering::Acquire)
    }

    /// The permit limit the adaptive loop currently targets.
    pub fn current_permit_limit(&self) -> u64 {
        self.live_permit_limit.load(AtomicOrdering::Acquire)
    }

    /// Tokens available in the live bucket right now.
    pub fn available_tokens(&self) -> u64 {
        self.bucket.load().available()
    }

    /// Permits available in the live window right now.
    pub fn available_permits(&self) -> u64 {
        self.window.load().available()
    }

    /// The static configuration this limiter was built from.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn record_outcome(&self, accepted: bool) {
        self.outcomes.record(Duration::ZERO, !accepted);
    }

    /// Runs one adjustment evaluation; called after every acquisition
    /// outcome.
    fn adjust(&self) {
        // Skip when another thread is mid-rebuild; outcomes keep
        // accumulating for the next evaluation.
        let Ok(_guard) = self.adjust_gate.try_lock() else {
            return;
        };

        let snapshot = self.outcomes.snapshot();
        if snapshot.sample_count < self.config.adaptive.min_data_points {
            return;
        }
        let ema = self.outcomes.weighted_success_ema();
        let rate_now = 1.0 - snapshot.error_rate;
        let adaptive = &self.config.adaptive;

        let factor = if ema > adaptive.high_threshold && rate_now > adaptive.high_threshold {
            adaptive.increase_mul
        } else if ema < adaptive.low_threshold && rate_now < adaptive.low_threshold {
            adaptive.decrease_mul
        } else {
            return;
        };

        let mut rebuilt = false;
        rebuilt |= self.rescale_bucket(factor);
        rebuilt |= self.rescale_window(factor);
        if rebuilt {
            // Fresh capacities deserve fresh evidence.
            self.outcomes.clear();
        }
    }

    /// Proposes a new token limit; rebuilds the bucket when the move is
    /// large enough. Returns whether a rebuild happened.
    fn rescale_bucket(&self, factor: f64) -> bool {
        let adaptive = &self.config.adaptive;
        let live = self.live_token_limit.load(AtomicOrdering::Acquire);
        let proposed = scale(live, factor, adaptive.min_tokens, adaptive.max_tokens);
        if !moves_enough(live, proposed, adaptive.rebuild_fraction) {
            return false;
        }

        let per_period = rescaled_rate(
            self.config.token_bucket.tokens_per_period,
            self.config.token_bucket.token_limit,
            proposed,
            adaptive.max_tokens_per_period,
        );
        let fresh = Arc::new(TokenBucket::new(TokenBucketConfig {
            token_limit: proposed,
            tokens_per_period: per_period,
            ..self.config.token_bucket
        }));

        let retired = self.bucket.swap(fresh);
        retired.retire();
        self.live_token_limit.store(proposed, AtomicOrdering::Release);
        true
    }

    /// Sliding-window counterpart of [`rescale_bucket`](Self::rescale_bucket).
    fn rescale_window(&self, factor: f64) -> bool {
        let adaptive = &self.config.adaptive;
        let live = self.live_permit_limit.load(AtomicOrdering::Acquire);
        let proposed = scale(live, factor, adaptive.min_permits, adaptive.max_permits);
        if !moves_enough(live, proposed, adaptive.rebuild_fraction) {
            return false;
        }

        let fresh = Arc::new(SlidingWindow::new(SlidingWindowConfig {
            permit_limit: proposed,
            ..self.config.sliding_window
        }));

        let retired = self.window.swap(fresh);
        retired.retire();
        self.live_permit_limit.store(proposed, AtomicOrdering::Release);
        true
    }
}

/// Scales `live` by `factor` and clamps to `[min, max]`, never below 1.
fn scale(live: u64, factor: f64, min: u64, max: u64) -> u64 {
    let proposed = (live as f64 * factor).round() as u64;
    proposed.clamp(min.max(1), max)
}

/// Whether `proposed` differs from `live` by more than `fraction` of it.
fn moves_enough(live: u64, proposed: u64, fraction: f64) -> bool {
    let delta = live.abs_diff(proposed) as f64;
    delta > live as f64 * fraction
}

/// Rescales the replenishment rate proportionally to the new capacity,
/// clamped to `[1, max]`.
fn rescaled_rate(base_rate: u64, base_limit: u64, new_limit: u64, max: u64) -> u64 {
    let scaled = (base_rate as f64 * new_limit as f64 / base_limit.max(1) as f64).round() as u64;
    scaled.clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::super::config::AdaptiveLimiterConfig;
    use super::*;

    fn limiter(config: RateLimiterConfig) -> CompositeRateLimiter {
        CompositeRateLimiter::new(config).unwrap()
    }

    fn tight_window_config() -> RateLimiterConfig {
        // Bucket always grants; the window rejects past 2 permits.
        RateLimiterConfig {
            token_bucket: TokenBucketConfig {
                token_limit: 100,
                ..TokenBucketConfig::default()
            },
            sliding_window: SlidingWindowConfig {
                permit_limit: 2,
                window: Duration::from_secs(60),
                segments_per_window: 6,
            },
            adaptive: AdaptiveLimiterConfig {
                min_permits: 2,
                ..Default::default()
            },
        }
    }

    #[test]
    fn paired_acquire_grants_when_both_stages_grant() {
        let limiter = limiter(RateLimiterConfig::default());
        let lease = limiter.acquire(1);
        assert!(lease.acquired());
        assert_eq!(limiter.available_tokens(), 99);
        assert_eq!(limiter.available_permits(), 99);
    }

    #[test]
    fn window_refusal_rolls_the_bucket_back() {
        let limiter = limiter(tight_window_config());
        let _admitted = limiter.acquire(2);
        let tokens_before = limiter.available_tokens();

        let lease = limiter.acquire(1);
        assert!(!lease.acquired());
        // The speculative token came back before acquire returned.
        assert_eq!(limiter.available_tokens(), tokens_before);
    }

    #[test]
    fn bucket_refusal_skips_the_window() {
        let limiter = limiter(RateLimiterConfig {
            token_bucket: TokenBucketConfig {
                token_limit: 10,
                tokens_per_period: 1,
                replenishment_period: Duration::from_secs(600),
                ..TokenBucketConfig::default()
            },
            ..RateLimiterConfig::default()
        });
        let _drained = limiter.acquire(10);
        let permits_before = limiter.available_permits();

        let lease = limiter.acquire(1);
        assert!(!lease.acquired());
        assert!(lease.try_get_metadata(RETRY_AFTER).is_some());
        // The window was never consulted.
        assert_eq!(limiter.available_permits(), permits_before);
    }

    #[test]
    fn disposing_a_granted_composite_returns_the_tokens() {
        let limiter = limiter(RateLimiterConfig::default());
        let mut lease = limiter.acquire(5);
        assert!(lease.acquired());
        assert_eq!(limiter.available_tokens(), 95);

        lease.dispose();
        assert_eq!(limiter.available_tokens(), 100);
    }

    #[test]
    fn sustained_success_scales_both_stages_up() {
        let limiter = limiter(RateLimiterConfig::default());
        for _ in 0..10 {
            limiter.acquire(1);
        }
        assert_eq!(limiter.current_token_limit(), 120);
        assert_eq!(limiter.current_permit_limit(), 120);
    }

    #[test]
    fn scaling_compounds_across_adjustments() {
        let limiter = limiter(RateLimiterConfig::default());
        // Two full rounds of favorable evidence (the outcome window clears
        // after a rebuild, so each round re-earns its data points).
        for _ in 0..20 {
            limiter.acquire(1);
        }
        // 100 → 120 → 144: proposals compare against the live limit, not
        // the initial one.
        assert_eq!(limiter.current_token_limit(), 144);
        assert_eq!(limiter.current_permit_limit(), 144);
    }

    #[test]
    fn sustained_refusal_scales_down_and_respects_min() {
        let config = RateLimiterConfig {
            token_bucket: TokenBucketConfig {
                token_limit: 20,
                tokens_per_period: 1,
                replenishment_period: Duration::from_secs(600),
                ..TokenBucketConfig::default()
            },
            adaptive: AdaptiveLimiterConfig {
                min_tokens: 10,
                ..Default::default()
            },
            ..RateLimiterConfig::default()
        };
        let limiter = limiter(config);
        // Drain the stage directly so no success outcome is recorded.
        let _held = limiter.bucket.load_full().try_acquire(20);

        for _ in 0..10 {
            limiter.acquire(5);
        }
        assert_eq!(limiter.current_token_limit(), 16);

        // Rejections keep coming; 16 → 13 → 10, then the floor holds.
        for _ in 0..200 {
            limiter.acquire(50);
        }
        assert_eq!(limiter.current_token_limit(), 10);
    }

    #[test]
    fn leases_on_a_rebuilt_bucket_release_silently() {
        let limiter = limiter(RateLimiterConfig::default());
        let mut early = limiter.acquire(3);
        assert!(early.acquired());

        // Nine more successes complete the round and force a rebuild.
        for _ in 0..9 {
            limiter.acquire(1);
        }
        assert_eq!(limiter.current_token_limit(), 120);

        // The early lease points at the retired bucket; disposal must be
        // silent and must not perturb the fresh one.
        let fresh_available = limiter.available_tokens();
        early.dispose();
        assert_eq!(limiter.available_tokens(), fresh_available);
    }

    #[test]
    fn mid_band_outcomes_leave_capacity_alone() {
        // Alternate success and failure: rate ≈ 0.5 sits between the
        // thresholds (conjunctive gate holds capacity steady).
        let limiter = limiter(RateLimiterConfig {
            token_bucket: TokenBucketConfig {
                token_limit: 10,
                tokens_per_period: 1,
                replenishment_period: Duration::from_secs(600),
                ..TokenBucketConfig::default()
            },
            adaptive: AdaptiveLimiterConfig {
                min_tokens: 1,
                low_threshold: 0.4,
                ..Default::default()
            },
            ..RateLimiterConfig::default()
        });
        let _drained = limiter.bucket.load_full().try_acquire(10);

        let mut held = Vec::new();
        for _ in 0..15 {
            let refused = limiter.acquire(1); // bucket empty → failure
            assert!(!refused.acquired());
            limiter.bucket.load().release(1);
            let granted = limiter.acquire(1); // one token back → success
            assert!(granted.acquired());
            held.push(granted);
        }
        assert_eq!(limiter.current_token_limit(), 10);
    }
}
