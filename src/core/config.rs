//! # Runtime configuration.
//!
//! Two plain structs, both with sensible defaults:
//! - [`ManagerConfig`]: settings shared by every controller of a manager.
//! - [`ControllerOptions`]: per-controller settings passed to `Controller::new`.
//!
//! ## Sentinel values
//! - `max_concurrent_reconciles = 0` → one worker
//! - `bus_capacity = 0` → clamped to 1
//! - `tasks = None` → the controller creates its own [`TaskRegistry`]

use std::sync::Arc;

use crate::core::TaskRegistry;
use crate::policies::BackoffPolicy;
use crate::reconcile::Reconciler;

/// Manager-wide configuration.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Capacity of the event bus ring buffer.
    ///
    /// Subscribers that lag behind more than `bus_capacity` events skip the oldest ones.
    pub bus_capacity: usize,
}

impl ManagerConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ManagerConfig {
    /// `bus_capacity = 1024`.
    fn default() -> Self {
        Self { bus_capacity: 1024 }
    }
}

/// Options of a single controller.
///
/// ```rust
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use ctrlvisor::{Action, BackoffPolicy, ControllerOptions, ReconcileError, ReconcilerFn, Request};
///
/// let opts = ControllerOptions::default()
///     .with_reconciler(ReconcilerFn::arc(|_ctx: CancellationToken, _req: Request| async {
///         Ok::<_, ReconcileError>(Action::done())
///     }))
///     .with_max_concurrent_reconciles(4)
///     .with_rate_limiter(BackoffPolicy::constant(Duration::from_millis(50)));
/// assert_eq!(opts.worker_count(), 4);
/// ```
#[derive(Clone, Default)]
pub struct ControllerOptions {
    /// User reconciliation logic. Mandatory.
    pub reconciler: Option<Arc<dyn Reconciler>>,

    /// Number of workers (`0` is treated as `1`).
    pub max_concurrent_reconciles: usize,

    /// Backoff applied to keys whose reconcile failed.
    pub rate_limiter: BackoffPolicy,

    /// Registry tracking every task the controller spawns.
    ///
    /// Provide one to observe the controller's tasks from outside (tests do). It should
    /// not be shared with tasks that outlive the controller: `start` waits for it to drain.
    pub tasks: Option<TaskRegistry>,
}

impl std::fmt::Debug for ControllerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerOptions")
            .field("reconciler", &self.reconciler.is_some())
            .field("max_concurrent_reconciles", &self.max_concurrent_reconciles)
            .field("rate_limiter", &self.rate_limiter)
            .field("tasks", &self.tasks)
            .finish()
    }
}

impl ControllerOptions {
    /// Sets the reconciler.
    #[must_use]
    pub fn with_reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_max_concurrent_reconciles(mut self, n: usize) -> Self {
        self.max_concurrent_reconciles = n;
        self
    }

    /// Sets the failure backoff.
    #[must_use]
    pub fn with_rate_limiter(mut self, backoff: BackoffPolicy) -> Self {
        self.rate_limiter = backoff;
        self
    }

    /// Uses `tasks` as the controller's task registry.
    #[must_use]
    pub fn with_tasks(mut self, tasks: TaskRegistry) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Effective number of workers (at least 1).
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.max_concurrent_reconciles.max(1)
    }
}
