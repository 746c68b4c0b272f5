use std::time::{Duration, Instant};

/// One completed execution observation.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionSample {
    /// Monotonic timestamp taken when the sample was recorded.
    pub recorded_at: Instant,
    /// Wall-clock duration of the user callback.
    pub latency: Duration,
    /// Whether the callback propagated an error.
    pub is_error: bool,
}

impl ExecutionSample {
    /// Creates a sample stamped with the current monotonic clock.
    pub fn now(latency: Duration, is_error: bool) -> Self {
        Self {
            recorded_at: Instant::now(),
            latency,
            is_error,
        }
    }
}
