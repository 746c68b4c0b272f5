//! # Retry strategy snapshot.
//!
//! [`RetrySnapshot`] is the immutable state the surrounding retry executor
//! consumes: attempt budget, delay growth, cap, and jitter. It is created
//! from a [`RetryOptions`] record and replaced wholesale on reload.
//!
//! [`RetrySnapshot::delay_for`] computes the pause before a given attempt:
//!
//! | Kind | Delay before attempt `n` (1-based) |
//! |---|---|
//! | `Constant` | `base_delay` |
//! | `Linear` | `base_delay * n` |
//! | `Exponential` | `base_delay * 2^(n-1)` |
//!
//! The result is capped at `max_delay` when one is configured, then full
//! jitter (`random[0, delay]`) is applied when `use_jitter` is set.

use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

/// Delay growth law between retry attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackoffKind {
    /// Same delay before every attempt.
    Constant,
    /// Delay grows proportionally to the attempt number.
    Linear,
    /// Delay doubles with every attempt.
    #[default]
    Exponential,
}

/// Options record for the retry strategy, as delivered by the
/// configuration boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryOptions {
    /// Maximum number of attempts (the first call counts as attempt 1).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Optional cap on the computed delay.
    pub max_delay: Option<Duration>,
    /// Growth law.
    pub backoff: BackoffKind,
    /// Whether to randomize delays to avoid thundering herds.
    pub use_jitter: bool,
}

impl Default for RetryOptions {
    /// Three attempts, 100 ms exponential backoff capped at 30 s, no jitter.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Some(Duration::from_secs(30)),
            backoff: BackoffKind::Exponential,
            use_jitter: false,
        }
    }
}

/// Immutable retry state consumed by the retry executor.
///
/// Replaced wholesale by the reload binding; never mutated in place.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetrySnapshot {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Optional cap on the computed delay.
    pub max_delay: Option<Duration>,
    /// Growth law.
    pub backoff: BackoffKind,
    /// Whether delays are jittered.
    pub use_jitter: bool,
}

impl RetrySnapshot {
    /// Validates `options` and builds a snapshot.
    ///
    /// Fails with [`ConfigError::DelayOrder`] when `max_delay` is shorter
    /// than `base_delay`.
    pub fn from_options(options: &RetryOptions) -> Result<Self, ConfigError> {
        if let Some(max) = options.max_delay {
            if max < options.base_delay {
                return Err(ConfigError::DelayOrder {
                    base: options.base_delay,
                    max,
                });
            }
        }
        Ok(Self {
            max_attempts: options.max_attempts,
            base_delay: options.base_delay,
            max_delay: options.max_delay,
            backoff: options.backoff,
            use_jitter: options.use_jitter,
        })
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    #[inline]
    pub fn allows_attempt(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Computes the delay before attempt `attempt` (1-based).
    ///
    /// A non-finite or overflowing intermediate saturates at the cap
    /// (`max_delay`, or the uncapped base computation otherwise).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let grown = match self.backoff {
            BackoffKind::Constant => self.base_delay,
            BackoffKind::Linear => self.base_delay.saturating_mul(attempt),
            BackoffKind::Exponential => match 2u32.checked_pow(attempt - 1) {
                Some(factor) => self.base_delay.saturating_mul(factor),
                None => Duration::MAX,
            },
        };

        let capped = match self.max_delay {
            Some(max) if grown > max => max,
            _ => grown,
        };

        if self.use_jitter {
            full_jitter(capped)
        } else {
            capped
        }
    }
}

/// Full jitter: random in `[0, delay]`.
fn full_jitter(delay: Duration) -> Duration {
    let ms = (delay.as_millis().min(u128::from(u64::MAX))) as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let mut rng = rand::rng();
    Duration::from_millis(rng.random_range(0..=ms))
}
