//! # Reconcile outcome.
//!
//! [`Action`] tells the worker what to do with the key after a successful reconcile.
//!
//! ```text
//! requeue == true           → add(key) now, backoff counter untouched
//! requeue_after == Some(d>0) → forget(key), add_after(key, d)
//! otherwise                 → forget(key), key dropped
//! ```

use std::time::Duration;

/// Result of a successful reconcile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Action {
    /// Re-add the key immediately.
    pub requeue: bool,
    /// Re-add the key after this delay (ignored when `requeue` is set or the delay is zero).
    pub requeue_after: Option<Duration>,
}

/// What the worker does with a key after `Ok(action)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Requeue {
    Immediately,
    After(Duration),
    Never,
}

impl Action {
    /// Desired state reached; drop the key.
    #[must_use]
    pub fn done() -> Self {
        Self::default()
    }

    /// Reconcile again right away.
    #[must_use]
    pub fn requeue() -> Self {
        Self {
            requeue: true,
            requeue_after: None,
        }
    }

    /// Reconcile again after `delay`.
    #[must_use]
    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: false,
            requeue_after: Some(delay),
        }
    }

    pub(crate) fn plan(&self) -> Requeue {
        if self.requeue {
            return Requeue::Immediately;
        }
        match self.requeue_after {
            Some(d) if !d.is_zero() => Requeue::After(d),
            _ => Requeue::Never,
        }
    }
}
