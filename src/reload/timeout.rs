//! # Timeout strategy snapshot.

use std::time::Duration;

use crate::error::ConfigError;

/// Options record for the timeout strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutOptions {
    /// Wall-clock bound applied to each protected execution.
    pub timeout: Duration,
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Immutable timeout state consumed by the timeout executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutSnapshot {
    /// Wall-clock bound, strictly positive.
    pub timeout: Duration,
}

impl TimeoutSnapshot {
    /// Validates `options` and builds a snapshot; a zero timeout is
    /// rejected.
    pub fn from_options(options: &TimeoutOptions) -> Result<Self, ConfigError> {
        if options.timeout == Duration::ZERO {
            return Err(ConfigError::ZeroValue { what: "timeout" });
        }
        Ok(Self {
            timeout: options.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_is_rejected() {
        let err = TimeoutSnapshot::from_options(&TimeoutOptions {
            timeout: Duration::ZERO,
        })
        .unwrap_err();
        assert_eq!(err.as_label(), "config_zero_value");
    }

    #[test]
    fn positive_timeout_builds() {
        let s = TimeoutSnapshot::from_options(&TimeoutOptions::default()).unwrap();
        assert_eq!(s.timeout, Duration::from_secs(30));
    }
}
