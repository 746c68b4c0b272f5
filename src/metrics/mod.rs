//! # Execution metrics: bounded sample window and derived summaries.
//!
//! Every completed execution feeds one [`ExecutionSample`] into a
//! [`MetricsWindow`]. The window is a strictly bounded FIFO: memory is
//! `O(window_size)` and evictions are oldest-first.
//!
//! Consumers read the window two ways:
//! - [`MetricsWindow::snapshot`] → [`MetricsSnapshot`] (count, mean latency,
//!   error fraction) — used by the AIMD controller.
//! - [`MetricsWindow::weighted_success_ema`] — a recency-weighted success
//!   rate used by the adaptive rate limiter.
//!
//! All mutation is serialized by a single mutex, so a `record` for operation
//! O happens-before any snapshot that observes O.

mod sample;
mod window;

pub use sample::ExecutionSample;
pub use window::{MetricsSnapshot, MetricsWindow};
