//! # Bounded FIFO sample window.
//!
//! [`MetricsWindow`] retains at most `window_size` samples; inserting past
//! the bound evicts the oldest entry. Summaries are computed under the same
//! mutex that serializes insertion, so they are always consistent with the
//! contents at the instant of the call (no partial sample).
//!
//! ## Weighted success EMA
//! [`MetricsWindow::weighted_success_ema`] blends two time slices of the
//! configured wall-clock horizon:
//!
//! ```text
//! ema = 0.6 * success_rate(last 25% of time_window)
//!     + 0.4 * success_rate(last 50% of time_window)
//! ```
//!
//! An empty window returns the neutral `0.5`; a time slice with no samples
//! contributes `0.5` for its term.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::sample::ExecutionSample;

/// Default wall-clock horizon for [`MetricsWindow::weighted_success_ema`].
const DEFAULT_TIME_WINDOW: Duration = Duration::from_secs(30);

/// Weight of the most recent quarter of the time window.
const RECENT_QUARTER_WEIGHT: f64 = 0.6;

/// Weight of the most recent half of the time window.
const RECENT_HALF_WEIGHT: f64 = 0.4;

/// Neutral success rate reported when no samples are available.
const NEUTRAL_RATE: f64 = 0.5;

/// Immutable summary of the currently retained samples.
///
/// For an empty window: `sample_count = 0`, `average_latency = 0`,
/// `error_rate = 0`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Number of samples the summary covers, in `[0, window_size]`.
    pub sample_count: usize,
    /// Arithmetic mean of the retained latencies.
    pub average_latency: Duration,
    /// Error fraction in `[0, 1]`.
    pub error_rate: f64,
}

/// Bounded FIFO of [`ExecutionSample`]s with consistent summaries.
///
/// ### Guarantees
/// - `|samples| <= window_size` at every observation point.
/// - Evictions are strictly oldest-first.
/// - `record` never fails; clock regressions are tolerated (timestamps are
///   monotonic `Instant`s, age computation saturates at zero).
pub struct MetricsWindow {
    samples: Mutex<VecDeque<ExecutionSample>>,
    window_size: usize,
    time_window: Duration,
}

impl MetricsWindow {
    /// Creates a window bounded to `window_size` samples.
    ///
    /// The wall-clock horizon for [`weighted_success_ema`](Self::weighted_success_ema)
    /// defaults to 30 s; use [`with_time_window`](Self::with_time_window) to
    /// override it. A `window_size` of 0 is clamped to 1.
    pub fn new(window_size: usize) -> Self {
        Self::with_time_window(window_size, DEFAULT_TIME_WINDOW)
    }

    /// Creates a window with an explicit wall-clock horizon for the EMA.
    pub fn with_time_window(window_size: usize, time_window: Duration) -> Self {
        let window_size = window_size.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(window_size)),
            window_size,
            time_window,
        }
    }

    /// Appends a sample stamped with the current monotonic clock, evicting
    /// the oldest entry if the bound is exceeded.
    pub fn record(&self, latency: Duration, is_error: bool) {
        self.push(ExecutionSample::now(latency, is_error));
    }

    /// Appends a pre-stamped sample. Used by callers that captured the
    /// timestamp before handing off, and by tests that backdate samples.
    pub(crate) fn push(&self, sample: ExecutionSample) {
        let mut samples = self.samples.lock().expect("metrics window poisoned");
        samples.push_back(sample);
        while samples.len() > self.window_size {
            samples.pop_front();
        }
    }

    /// Discards all retained samples.
    ///
    /// The AIMD controller calls this after consuming a summary for an
    /// adjustment decision, so each decision is based on fresh evidence.
    pub fn clear(&self) {
        self.samples.lock().expect("metrics window poisoned").clear();
    }

    /// Returns a consistent summary of the currently retained samples.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.samples.lock().expect("metrics window poisoned");
        let count = samples.len();
        if count == 0 {
            return MetricsSnapshot::default();
        }

        let mut total_latency = Duration::ZERO;
        let mut errors = 0usize;
        for s in samples.iter() {
            total_latency += s.latency;
            if s.is_error {
                errors += 1;
            }
        }

        MetricsSnapshot {
            sample_count: count,
            average_latency: total_latency / count as u32,
            error_rate: errors as f64 / count as f64,
        }
    }

    /// Returns the recency-weighted success rate over the configured
    /// wall-clock horizon.
    ///
    /// Samples inside the most recent quarter of the horizon carry 60% of
    /// the weight, samples inside the most recent half carry 40%. An empty
    /// window returns the neutral `0.5`, as does any slice with no samples.
    pub fn weighted_success_ema(&self) -> f64 {
        let samples = self.samples.lock().expect("metrics window poisoned");
        if samples.is_empty() {
            return NEUTRAL_RATE;
        }

        let now = Instant::now();
        let quarter = self.time_window / 4;
        let half = self.time_window / 2;

        RECENT_QUARTER_WEIGHT * Self::success_rate_within(&samples, now, quarter)
            + RECENT_HALF_WEIGHT * Self::success_rate_within(&samples, now, half)
    }

    /// Number of currently retained samples.
    pub fn len(&self) -> usize {
        self.samples.lock().expect("metrics window poisoned").len()
    }

    /// Whether the window holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained samples.
    #[inline]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Success fraction among samples no older than `max_age`, or the
    /// neutral rate if none qualify.
    fn success_rate_within(
        samples: &VecDeque<ExecutionSample>,
        now: Instant,
        max_age: Duration,
    ) -> f64 {
        let mut total = 0usize;
        let mut ok = 0usize;
        // Newest samples sit at the back; stop at the first one too old.
        for s in samples.iter().rev() {
            if now.saturating_duration_since(s.recorded_at) > max_age {
                break;
            }
            total += 1;
            if !s.is_error {
                ok += 1;
            }
        }
        if total == 0 {
            NEUTRAL_RATE
        } else {
            ok as f64 / total as f64
        }
    }
}
