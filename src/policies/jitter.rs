//! # Jitter for requeue delays.
//!
//! When many keys fail together (the API server restarts, say) their backoff curves line
//! up. [`JitterPolicy`] spreads them so the retries do not arrive as one burst.

use std::time::Duration;

use rand::Rng;

/// How a backoff delay is randomized.
///
/// Anything but `None` trades the non-decreasing per-key delay for spread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    #[default]
    None,
    /// Uniform in `[0, d]`.
    Full,
    /// Uniform in `[d/2, d]`.
    Equal,
    /// Uniform in `[floor, 3d]`, capped at the policy maximum.
    Decorrelated,
}

impl JitterPolicy {
    /// Randomizes `delay`; `floor` and `max` bound the decorrelated range.
    pub fn spread(self, delay: Duration, floor: Duration, max: Duration) -> Duration {
        let ms = as_millis(delay);
        let (lo, hi) = match self {
            JitterPolicy::None => return delay,
            JitterPolicy::Full => (0, ms),
            JitterPolicy::Equal => (ms / 2, ms),
            JitterPolicy::Decorrelated => {
                let lo = as_millis(floor);
                (lo, ms.saturating_mul(3).min(as_millis(max)).max(lo))
            }
        };
        if lo >= hi {
            return Duration::from_millis(hi);
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: Duration = Duration::from_secs(60);

    #[test]
    fn none_is_identity() {
        let d = Duration::from_millis(250);
        assert_eq!(JitterPolicy::None.spread(d, Duration::ZERO, MAX), d);
    }

    #[test]
    fn full_stays_below_input() {
        let d = Duration::from_millis(40);
        assert!((0..100).all(|_| JitterPolicy::Full.spread(d, Duration::ZERO, MAX) <= d));
        assert_eq!(
            JitterPolicy::Full.spread(Duration::ZERO, Duration::ZERO, MAX),
            Duration::ZERO
        );
    }

    #[test]
    fn decorrelated_stays_within_floor_and_max() {
        let floor = Duration::from_millis(5);
        let max = Duration::from_millis(100);
        for _ in 0..100 {
            let d = JitterPolicy::Decorrelated.spread(Duration::from_millis(50), floor, max);
            assert!(d >= floor && d <= max, "{d:?}");
        }
    }
}
