//! # Bulkhead configuration.
//!
//! [`BulkheadConfig`] centralizes the admission and AIMD tuning parameters
//! of an [`AdaptiveBulkhead`](super::AdaptiveBulkhead).
//!
//! These parameters rarely require changes from the defaults; incorrect
//! values can lead to meta-stable limit oscillation. Every instance passes
//! through [`BulkheadConfig::validate`] before a policy is constructed.
//!
//! ## Field semantics
//! - `initial_limit`: parallelism at start; the AIMD loop moves it inside
//!   `[min_limit, max_limit]` from there.
//! - `queue_depth`: bounded wait queue in front of the execution slots;
//!   `0` means admission fails as soon as all slots are busy.
//! - `latency_threshold` / `error_rate_threshold`: crossing **either** one
//!   triggers a multiplicative decrease.
//! - `additive_increase` / `multiplicative_decrease`: the AIMD law.
//! - `adjustment_interval`: timer period of the controller.
//! - `sampling_window_size` / `min_samples`: evidence bound and gate for a
//!   single adjustment decision.

use std::time::Duration;

use crate::error::ConfigError;

/// Tuning parameters for an adaptive bulkhead. Static after construction.
#[derive(Clone, Copy, Debug)]
pub struct BulkheadConfig {
    /// Parallelism limit the policy starts with.
    pub initial_limit: u32,
    /// Lower clamp for the adaptive limit (at least 1).
    pub min_limit: u32,
    /// Upper clamp for the adaptive limit.
    pub max_limit: u32,
    /// Number of callers allowed to wait for an execution slot.
    pub queue_depth: u32,
    /// Mean latency above which the controller decreases the limit.
    pub latency_threshold: Duration,
    /// Error fraction above which the controller decreases the limit.
    pub error_rate_threshold: f64,
    /// Slots added per favorable adjustment.
    pub additive_increase: u32,
    /// Factor in `(0, 1)` applied per unfavorable adjustment.
    pub multiplicative_decrease: f64,
    /// Period of the controller's adjustment timer.
    pub adjustment_interval: Duration,
    /// Maximum number of samples one adjustment decision may consume.
    pub sampling_window_size: usize,
    /// Minimum number of samples required before the controller acts.
    pub min_samples: usize,
}

impl Default for BulkheadConfig {
    /// Conservative defaults: start at 10 slots inside `[1, 100]`, a
    /// 10-deep queue, decrease on >500 ms mean latency or >50% errors,
    /// `+1` / `×0.5` steps, one decision per second over at most 100
    /// samples (at least 5).
    fn default() -> Self {
        Self {
            initial_limit: 10,
            min_limit: 1,
            max_limit: 100,
            queue_depth: 10,
            latency_threshold: Duration::from_millis(500),
            error_rate_threshold: 0.5,
            additive_increase: 1,
            multiplicative_decrease: 0.5,
            adjustment_interval: Duration::from_secs(1),
            sampling_window_size: 100,
            min_samples: 5,
        }
    }
}

impl BulkheadConfig {
    /// Checks every invariant; called by the policy constructor before any
    /// execution can occur.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_limit == 0 {
            return Err(ConfigError::ZeroValue { what: "min_limit" });
        }
        if self.min_limit > self.max_limit {
            return Err(ConfigError::BoundOrder {
                what: "parallelism limit",
                min: u64::from(self.min_limit),
                max: u64::from(self.max_limit),
            });
        }
        if self.initial_limit < self.min_limit || self.initial_limit > self.max_limit {
            return Err(ConfigError::InitialOutOfBounds {
                what: "parallelism limit",
                initial: u64::from(self.initial_limit),
                min: u64::from(self.min_limit),
                max: u64::from(self.max_limit),
            });
        }
        if !(self.multiplicative_decrease > 0.0 && self.multiplicative_decrease < 1.0) {
            return Err(ConfigError::FactorOutOfRange {
                what: "multiplicative_decrease",
                value: self.multiplicative_decrease,
            });
        }
        if !(0.0..=1.0).contains(&self.error_rate_threshold) {
            return Err(ConfigError::RateOutOfRange {
                what: "error_rate_threshold",
                value: self.error_rate_threshold,
            });
        }
        if self.additive_increase == 0 {
            return Err(ConfigError::ZeroValue {
                what: "additive_increase",
            });
        }
        if self.adjustment_interval == Duration::ZERO {
            return Err(ConfigError::ZeroValue {
                what: "adjustment_interval",
            });
        }
        if self.latency_threshold == Duration::ZERO {
            return Err(ConfigError::ZeroValue {
                what: "latency_threshold",
            });
        }
        if self.sampling_window_size == 0 {
            return Err(ConfigError::ZeroValue {
                what: "sampling_window_size",
            });
        }
        if self.min_samples == 0 {
            return Err(ConfigError::ZeroValue { what: "min_samples" });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(BulkheadConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let cfg = BulkheadConfig {
            min_limit: 20,
            max_limit: 10,
            initial_limit: 15,
            ..BulkheadConfig::default()
        };
        assert_eq!(cfg.validate().unwrap_err().as_label(), "config_bound_order");
    }

    #[test]
    fn initial_outside_bounds_is_rejected() {
        let cfg = BulkheadConfig {
            initial_limit: 200,
            ..BulkheadConfig::default()
        };
        assert_eq!(
            cfg.validate().unwrap_err().as_label(),
            "config_initial_out_of_bounds"
        );
    }

    #[test]
    fn decrease_factor_must_be_in_open_interval() {
        for value in [0.0, 1.0, 1.5, -0.1] {
            let cfg = BulkheadConfig {
                multiplicative_decrease: value,
                ..BulkheadConfig::default()
            };
            assert_eq!(
                cfg.validate().unwrap_err().as_label(),
                "config_factor_out_of_range",
                "factor {value} should be rejected"
            );
        }
    }

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = BulkheadConfig {
            adjustment_interval: Duration::ZERO,
            ..BulkheadConfig::default()
        };
        assert_eq!(cfg.validate().unwrap_err().as_label(), "config_zero_value");
    }
}
