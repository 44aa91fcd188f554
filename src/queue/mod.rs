//! Work queue of reconcile keys.
//!
//! ## Contents
//! - [`WorkQueue`] deduplicating queue with at-most-one-in-flight per key, delayed and
//!   rate-limited adds, and shutdown
//! - [`RateLimiter`] per-key failure counter mapped onto a [`BackoffPolicy`](crate::BackoffPolicy)
//!
//! ## Quick reference
//! - **Producers**: `EventSink` (sources → handler), workers requeueing keys.
//! - **Consumers**: controller workers (`get` → reconcile → `done`).

mod rate_limiter;
mod work_queue;

pub use rate_limiter::RateLimiter;
pub use work_queue::WorkQueue;
