//! Requeue policies.
//!
//! Knobs that control **how long** a failing key waits before the work queue hands it
//! out again.
//!
//! ## Contents
//! - [`BackoffPolicy`]: delay as a function of consecutive failures
//! - [`JitterPolicy`]: spread applied on top of it
//!
//! ## Quick wiring
//! ```text
//! ControllerOptions { rate_limiter: BackoffPolicy, .. }
//!      └─► queue::RateLimiter::when(key) = backoff.delay_for(failures(key)); failures(key) += 1
//!      └─► queue::RateLimiter::forget(key) resets the counter after a clean reconcile
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=5ms, factor=2.0, max=1000s, jitter=None.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
