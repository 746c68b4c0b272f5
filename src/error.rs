//! # Error types used by the loadvisor policies.
//!
//! Two main error enums:
//!
//! - [`ConfigError`] invalid policy parameters, surfaced synchronously at
//!   construction, before any execution occurs.
//! - [`ExecuteError`] failures on the execution surface: admission
//!   rejections, cancellation, and propagated user errors.
//!
//! Both types provide `as_label()` for logs/metrics.
//!
//! ## Propagation policy
//! No error is swallowed except inside the controller's adjustment tick
//! (where a panic must not kill the timer) and releases against retired
//! semaphores or buckets. A user error is recorded as `is_error = true` in
//! the metrics window and then re-propagated unchanged.

use std::time::Duration;

use thiserror::Error;

/// # Invalid policy configuration.
///
/// Detected by the `validate()` step of each config record; a policy is
/// never constructed from parameters that fail these checks.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Lower bound exceeds upper bound (`min_limit > max_limit`,
    /// `min_tokens > max_tokens`, ...).
    #[error("{what}: lower bound {min} exceeds upper bound {max}")]
    BoundOrder {
        /// Which pair of bounds is out of order.
        what: &'static str,
        min: u64,
        max: u64,
    },

    /// Initial value falls outside its configured bounds.
    #[error("{what}: initial value {initial} outside [{min}, {max}]")]
    InitialOutOfBounds {
        what: &'static str,
        initial: u64,
        min: u64,
        max: u64,
    },

    /// A parameter that must be strictly positive was zero.
    #[error("{what} must be greater than zero")]
    ZeroValue { what: &'static str },

    /// Multiplicative factor outside the open interval `(0, 1)`.
    #[error("{what} {value} outside (0, 1)")]
    FactorOutOfRange { what: &'static str, value: f64 },

    /// A rate or threshold outside `[0, 1]`.
    #[error("{what} {value} outside [0, 1]")]
    RateOutOfRange { what: &'static str, value: f64 },

    /// A growth factor that must exceed one.
    #[error("{what} {value} must be greater than one")]
    GrowthTooSmall { what: &'static str, value: f64 },

    /// `max_delay` shorter than `base_delay` in a retry snapshot.
    #[error("max delay {max:?} shorter than base delay {base:?}")]
    DelayOrder { base: Duration, max: Duration },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::BoundOrder { .. } => "config_bound_order",
            ConfigError::InitialOutOfBounds { .. } => "config_initial_out_of_bounds",
            ConfigError::ZeroValue { .. } => "config_zero_value",
            ConfigError::FactorOutOfRange { .. } => "config_factor_out_of_range",
            ConfigError::RateOutOfRange { .. } => "config_rate_out_of_range",
            ConfigError::GrowthTooSmall { .. } => "config_growth_too_small",
            ConfigError::DelayOrder { .. } => "config_delay_order",
        }
    }
}

/// # Errors produced by policy execution.
///
/// `E` is the caller's own error type, carried through unchanged.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExecuteError<E> {
    /// The bulkhead's queue had no capacity left (oversubscription).
    ///
    /// Terminal at this layer; the operation was never admitted.
    #[error("rejected: queue capacity exhausted")]
    Rejected,

    /// The token bucket or the sliding window refused admission.
    ///
    /// `retry_after` is the limiter's estimate of when capacity returns,
    /// when one is available.
    #[error("rate limited")]
    RateLimited {
        /// Suggested wait before retrying, if the limiter can estimate one.
        retry_after: Option<Duration>,
    },

    /// The cancellation signal fired during admission or inside the
    /// callback.
    ///
    /// This is **not an error** in the traditional sense, it signals
    /// intentional termination.
    #[error("execution canceled")]
    Canceled,

    /// The user callback failed; recorded in metrics, then re-propagated.
    #[error("operation failed: {0}")]
    Operation(E),
}

impl<E> ExecuteError<E> {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecuteError::Rejected => "execute_rejected",
            ExecuteError::RateLimited { .. } => "execute_rate_limited",
            ExecuteError::Canceled => "execute_canceled",
            ExecuteError::Operation(_) => "execute_operation",
        }
    }

    /// Whether this is an admission rejection (bulkhead or rate limiter).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ExecuteError::Rejected | ExecuteError::RateLimited { .. }
        )
    }

    /// Returns the propagated user error, if any.
    pub fn into_operation(self) -> Option<E> {
        match self {
            ExecuteError::Operation(e) => Some(e),
            _ => None,
        }
    }
}
