//! # Rate limiter configuration.
//!
//! Three records, one per concern:
//! - [`TokenBucketConfig`] — burst smoothing stage.
//! - [`SlidingWindowConfig`] — aggregate rate stage.
//! - [`AdaptiveLimiterConfig`] — the feedback loop that rebuilds both
//!   stages from acceptance outcomes.
//!
//! [`RateLimiterConfig`] aggregates all three and validates them before a
//! [`CompositeRateLimiter`](super::CompositeRateLimiter) is constructed.

use std::time::Duration;

use crate::error::ConfigError;

/// Token bucket stage parameters.
#[derive(Clone, Copy, Debug)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens the bucket can hold.
    pub token_limit: u64,
    /// Tokens added per replenishment period.
    pub tokens_per_period: u64,
    /// Length of one replenishment period.
    pub replenishment_period: Duration,
    /// Callers allowed to wait for replenishment when the bucket fronts a
    /// queued acquirer. The composite limiter admits fail-fast and never
    /// queues, so it leaves this at its default.
    pub queue_limit: usize,
    /// Whether elapsed periods replenish lazily on the acquire path. When
    /// off, tokens return only through explicit release or
    /// `replenish_now`.
    pub auto_replenish: bool,
}

impl Default for TokenBucketConfig {
    /// 100 tokens, refilled 10 per 100 ms, lazy replenishment.
    fn default() -> Self {
        Self {
            token_limit: 100,
            tokens_per_period: 10,
            replenishment_period: Duration::from_millis(100),
            queue_limit: 0,
            auto_replenish: true,
        }
    }
}

impl TokenBucketConfig {
    /// Checks the stage invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_limit == 0 {
            return Err(ConfigError::ZeroValue { what: "token_limit" });
        }
        if self.tokens_per_period == 0 {
            return Err(ConfigError::ZeroValue {
                what: "tokens_per_period",
            });
        }
        if self.replenishment_period == Duration::ZERO {
            return Err(ConfigError::ZeroValue {
                what: "replenishment_period",
            });
        }
        Ok(())
    }
}

/// Sliding window stage parameters.
#[derive(Clone, Copy, Debug)]
pub struct SlidingWindowConfig {
    /// Permits admitted per full window.
    pub permit_limit: u64,
    /// Wall-clock length of the window.
    pub window: Duration,
    /// Number of segments the window is divided into; counts expire one
    /// segment at a time as the boundary slides.
    pub segments_per_window: usize,
}

impl Default for SlidingWindowConfig {
    /// 100 permits per second across 10 segments.
    fn default() -> Self {
        Self {
            permit_limit: 100,
            window: Duration::from_secs(1),
            segments_per_window: 10,
        }
    }
}

impl SlidingWindowConfig {
    /// Checks the stage invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.permit_limit == 0 {
            return Err(ConfigError::ZeroValue {
                what: "permit_limit",
            });
        }
        if self.window == Duration::ZERO {
            return Err(ConfigError::ZeroValue { what: "window" });
        }
        if self.segments_per_window == 0 {
            return Err(ConfigError::ZeroValue {
                what: "segments_per_window",
            });
        }
        Ok(())
    }
}

/// Feedback loop parameters for capacity adjustment.
///
/// The gating condition is **conjunctive**: both the weighted EMA and the
/// raw acceptance rate must cross a threshold together before capacity
/// moves. This dampens oscillation around the threshold.
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveLimiterConfig {
    /// Acceptance level above which capacity grows.
    pub high_threshold: f64,
    /// Acceptance level below which capacity shrinks.
    pub low_threshold: f64,
    /// Growth factor (> 1) applied to both stage limits.
    pub increase_mul: f64,
    /// Shrink factor in `(0, 1)` applied to both stage limits.
    pub decrease_mul: f64,
    /// Bounds for the token bucket limit.
    pub min_tokens: u64,
    /// Upper bound for the token bucket limit.
    pub max_tokens: u64,
    /// Bounds for the sliding window limit.
    pub min_permits: u64,
    /// Upper bound for the sliding window limit.
    pub max_permits: u64,
    /// Cap on the rescaled replenishment rate.
    pub max_tokens_per_period: u64,
    /// Minimum acceptance outcomes before the loop acts.
    pub min_data_points: usize,
    /// Relative change below which a proposal is ignored (rebuild
    /// hysteresis).
    pub rebuild_fraction: f64,
    /// Bound on retained acceptance outcomes.
    pub outcome_window_size: usize,
    /// Wall-clock horizon of the weighted EMA over outcomes.
    pub outcome_time_window: Duration,
}

impl Default for AdaptiveLimiterConfig {
    /// Grow ×1.2 above 90% acceptance, shrink ×0.8 below 50%, rebuild on
    /// >10% change, after at least 10 outcomes.
    fn default() -> Self {
        Self {
            high_threshold: 0.9,
            low_threshold: 0.5,
            increase_mul: 1.2,
            decrease_mul: 0.8,
            min_tokens: 10,
            max_tokens: 10_000,
            min_permits: 10,
            max_permits: 10_000,
            max_tokens_per_period: 1_000,
            min_data_points: 10,
            rebuild_fraction: 0.10,
            outcome_window_size: 100,
            outcome_time_window: Duration::from_secs(30),
        }
    }
}

impl AdaptiveLimiterConfig {
    /// Checks the feedback-loop invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (what, value) in [
            ("high_threshold", self.high_threshold),
            ("low_threshold", self.low_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RateOutOfRange { what, value });
            }
        }
        if self.low_threshold > self.high_threshold {
            return Err(ConfigError::BoundOrder {
                what: "acceptance thresholds",
                min: (self.low_threshold * 100.0) as u64,
                max: (self.high_threshold * 100.0) as u64,
            });
        }
        if self.increase_mul <= 1.0 {
            return Err(ConfigError::GrowthTooSmall {
                what: "increase_mul",
                value: self.increase_mul,
            });
        }
        if !(self.decrease_mul > 0.0 && self.decrease_mul < 1.0) {
            return Err(ConfigError::FactorOutOfRange {
                what: "decrease_mul",
                value: self.decrease_mul,
            });
        }
        if self.min_tokens == 0 {
            return Err(ConfigError::ZeroValue { what: "min_tokens" });
        }
        if self.min_tokens > self.max_tokens {
            return Err(ConfigError::BoundOrder {
                what: "token limit",
                min: self.min_tokens,
                max: self.max_tokens,
            });
        }
        if self.min_permits == 0 {
            return Err(ConfigError::ZeroValue { what: "min_permits" });
        }
        if self.min_permits > self.max_permits {
            return Err(ConfigError::BoundOrder {
                what: "permit limit",
                min: self.min_permits,
                max: self.max_permits,
            });
        }
        if self.max_tokens_per_period == 0 {
            return Err(ConfigError::ZeroValue {
                what: "max_tokens_per_period",
            });
        }
        if self.min_data_points == 0 {
            return Err(ConfigError::ZeroValue {
                what: "min_data_points",
            });
        }
        if !(0.0..1.0).contains(&self.rebuild_fraction) {
            return Err(ConfigError::RateOutOfRange {
                what: "rebuild_fraction",
                value: self.rebuild_fraction,
            });
        }
        if self.outcome_window_size == 0 {
            return Err(ConfigError::ZeroValue {
                what: "outcome_window_size",
            });
        }
        if self.outcome_time_window == Duration::ZERO {
            return Err(ConfigError::ZeroValue {
                what: "outcome_time_window",
            });
        }
        Ok(())
    }
}

/// Full configuration of a [`CompositeRateLimiter`](super::CompositeRateLimiter).
#[derive(Clone, Copy, Debug, Default)]
pub struct RateLimiterConfig {
    /// Burst smoothing stage.
    pub token_bucket: TokenBucketConfig,
    /// Aggregate rate stage.
    pub sliding_window: SlidingWindowConfig,
    /// Feedback loop.
    pub adaptive: AdaptiveLimiterConfig,
}

impl RateLimiterConfig {
    /// Validates all three sections, plus the cross-cutting requirement
    /// that the starting limits sit inside the adaptive bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.token_bucket.validate()?;
        self.sliding_window.validate()?;
        self.adaptive.validate()?;

        if self.token_bucket.token_limit < self.adaptive.min_tokens
            || self.token_bucket.token_limit > self.adaptive.max_tokens
        {
            return Err(ConfigError::InitialOutOfBounds {
                what: "token limit",
                initial: self.token_bucket.token_limit,
                min: self.adaptive.min_tokens,
                max: self.adaptive.max_tokens,
            });
        }
        if self.sliding_window.permit_limit < self.adaptive.min_permits
            || self.sliding_window.permit_limit > self.adaptive.max_permits
        {
            return Err(ConfigError::InitialOutOfBounds {
                what: "permit limit",
                initial: self.sliding_window.permit_limit,
                min: self.adaptive.min_permits,
                max: self.adaptive.max_permits,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RateLimiterConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_capacities_are_rejected() {
        let cfg = RateLimiterConfig {
            token_bucket: TokenBucketConfig {
                token_limit: 0,
                ..TokenBucketConfig::default()
            },
            ..RateLimiterConfig::default()
        };
        assert_eq!(cfg.validate().unwrap_err().as_label(), "config_zero_value");
    }

    #[test]
    fn growth_factor_must_exceed_one() {
        let cfg = RateLimiterConfig {
            adaptive: AdaptiveLimiterConfig {
                increase_mul: 1.0,
                ..AdaptiveLimiterConfig::default()
            },
            ..RateLimiterConfig::default()
        };
        assert_eq!(
            cfg.validate().unwrap_err().as_label(),
            "config_growth_too_small"
        );
    }

    #[test]
    fn starting_limits_must_sit_inside_adaptive_bounds() {
        let cfg = RateLimiterConfig {
            token_bucket: TokenBucketConfig {
                token_limit: 5,
                ..TokenBucketConfig::default()
            },
            ..RateLimiterConfig::default()
        };
        assert_eq!(
            cfg.validate().unwrap_err().as_label(),
            "config_initial_out_of_bounds"
        );
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let cfg = RateLimiterConfig {
            adaptive: AdaptiveLimiterConfig {
                low_threshold: 0.95,
                ..AdaptiveLimiterConfig::default()
            },
            ..RateLimiterConfig::default()
        };
        assert_eq!(cfg.validate().unwrap_err().as_label(), "config_bound_order");
    }
}
