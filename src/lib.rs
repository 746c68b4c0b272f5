//! # loadvisor
//!
//! **Loadvisor** is an adaptive load-protection library.
//!
//! It wraps callers of fallible operations (typically remote I/O) with
//! composable resilience policies whose capacities tune themselves from
//! observed behavior, and whose parameters can be re-bound live without
//! tearing down the enclosing pipeline.
//!
//! ## Features
//!
//! | Area | Description | Key types / traits |
//! |------|-------------|--------------------|
//! | **Adaptive bulkhead** | Concurrency isolation with an AIMD-tuned parallelism limit. | [`AdaptiveBulkhead`], [`BulkheadConfig`] |
//! | **Adaptive rate limiting** | Token bucket + sliding window paired admission with outcome-driven capacity. | [`CompositeRateLimiter`], [`RateLimiterConfig`] |
//! | **Hot reload** | Atomic snapshot slots for retry/timeout parameters. | [`ReloadingSlot`], [`RetrySnapshot`], [`TimeoutSnapshot`] |
//! | **Observability** | Broadcast fan-out of accepted limit changes. | [`Adjustment`], [`AdjustmentSink`] |
//! | **Metrics** | Bounded execution-sample window with consistent summaries. | [`MetricsWindow`], [`MetricsSnapshot`] |
//! | **Errors** | Typed construction and execution errors. | [`ConfigError`], [`ExecuteError`] |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] adjustment sink
//!   _(demo/reference only)_.
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use loadvisor::{AdaptiveBulkhead, BulkheadConfig, ExecuteError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bulkhead = AdaptiveBulkhead::new(BulkheadConfig {
//!         initial_limit: 8,
//!         queue_depth: 16,
//!         latency_threshold: Duration::from_millis(250),
//!         ..BulkheadConfig::default()
//!     })?;
//!
//!     let token = CancellationToken::new();
//!     let reply: Result<String, ExecuteError<std::io::Error>> = bulkhead
//!         .execute(&token, |_ctx| async {
//!             // call the protected dependency here
//!             Ok("pong".to_string())
//!         })
//!         .await;
//!
//!     println!("{:?} (limit now {})", reply, bulkhead.current_max_parallelization());
//!     Ok(())
//! }
//! ```
//!
//! ---

pub mod bulkhead;
pub mod error;
pub mod events;
pub mod metrics;
pub mod ratelimit;
pub mod reload;

// ---- Public re-exports ----

pub use bulkhead::{AdaptiveBulkhead, BulkheadConfig};
pub use error::{ConfigError, ExecuteError};
pub use events::{Adjustment, AdjustmentBus, AdjustmentSink, SinkSet};
pub use metrics::{ExecutionSample, MetricsSnapshot, MetricsWindow};
pub use ratelimit::{
    AdaptiveLimiterConfig, CompositeLease, CompositeRateLimiter, RateLimiterConfig,
    SlidingWindowConfig, TokenBucketConfig,
};
pub use reload::{
    BackoffKind, ChangeSource, DisposableReloadingHandle, MemoryChangeSource, PolicyOptions,
    ReloadingSlot, RetryOptions, RetrySnapshot, Subscription, TimeoutOptions, TimeoutSnapshot,
};

// Optional: expose a simple built-in adjustment logger (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use events::LogWriter;
