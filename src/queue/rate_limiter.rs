//! # Per-key rate limiter.
//!
//! Counts consecutive failures per key and maps the count onto a [`BackoffPolicy`].
//!
//! ```text
//! when(k)   → delay = backoff.delay_for(failures[k]); failures[k] += 1
//! forget(k) → failures.remove(k)
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Failure counter per key, backed by a backoff curve.
#[derive(Debug)]
pub struct RateLimiter<K> {
    backoff: BackoffPolicy,
    failures: HashMap<K, u32>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Creates a limiter walking `backoff`.
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            failures: HashMap::new(),
        }
    }

    /// Returns the delay for the next retry of `key` and bumps its failure count.
    pub fn when(&mut self, key: &K) -> Duration {
        let count = self.failures.entry(key.clone()).or_insert(0);
        let delay = self.backoff.delay_for(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Number of rate-limited requeues recorded for `key`.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Clears the failure history of `key`.
    pub fn forget(&mut self, key: &K) {
        self.failures.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_per_key_and_resets_on_forget() {
        let mut rl = RateLimiter::new(BackoffPolicy::default());
        assert_eq!(rl.when(&"a"), Duration::from_millis(5));
        assert_eq!(rl.when(&"a"), Duration::from_millis(10));
        assert_eq!(rl.when(&"b"), Duration::from_millis(5));
        assert_eq!(rl.num_requeues(&"a"), 2);

        rl.forget(&"a");
        assert_eq!(rl.num_requeues(&"a"), 0);
        assert_eq!(rl.when(&"a"), Duration::from_millis(5));
    }
}
