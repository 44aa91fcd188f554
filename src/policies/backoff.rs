//! # Per-key backoff curve.
//!
//! The rate limiter counts consecutive failures per key and asks [`BackoffPolicy`] how long
//! the key must wait: `first × factor^failures`, capped at `max`, then spread by the
//! [`JitterPolicy`]. The unjittered value depends only on the failure count, so without
//! jitter the curve never goes down while `factor >= 1`.
//!
//! ```rust
//! use std::time::Duration;
//! use ctrlvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(5),
//!     max: Duration::from_secs(1),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay_for(0), Duration::from_millis(5));
//! assert_eq!(backoff.delay_for(1), Duration::from_millis(10));
//! assert_eq!(backoff.delay_for(20), Duration::from_secs(1));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Wait after the first failure.
    pub first: Duration,
    /// Upper bound for any wait.
    pub max: Duration,
    /// Growth per additional failure.
    pub factor: f64,
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// 5ms doubling up to 1000s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(5),
            max: Duration::from_secs(1000),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Same delay for every failure.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Wait before retrying a key that has failed `failures` times already.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let base = self.ceiling(failures);
        self.jitter.spread(base, self.first.min(self.max), self.max)
    }

    /// Unjittered delay: `first × factor^failures`, at most `max`.
    fn ceiling(&self, failures: u32) -> Duration {
        let exp = i32::try_from(failures).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if secs.is_finite() && (0.0..=self.max.as_secs_f64()).contains(&secs) {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        }
    }
}
