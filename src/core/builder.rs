use std::sync::Arc;

use crate::core::{ManagerConfig, manager::Manager};
use crate::reconcile::Dependencies;
use crate::subscribers::Subscribe;

/// Builder for constructing a [`Manager`] with optional features.
///
/// ```rust
/// use std::sync::Arc;
/// use ctrlvisor::{Manager, ManagerConfig};
///
/// struct ApiClient;
///
/// let mgr = Manager::builder(ManagerConfig::default())
///     .with_dependency(ApiClient)
///     .build();
/// assert!(mgr.dependencies().get::<ApiClient>().is_some());
/// ```
pub struct ManagerBuilder {
    cfg: ManagerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    deps: Dependencies,
}

impl ManagerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ManagerConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            deps: Dependencies::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (controller lifecycle, reconcile outcomes,
    /// requeues) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Offers `value` to reconcilers that implement [`Inject`](crate::Inject).
    pub fn with_dependency<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.deps.insert(value);
        self
    }

    /// Offers an already shared value.
    pub fn with_dependency_arc<T: Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.deps.insert_arc(value);
        self
    }

    /// Builds and returns the Manager instance.
    pub fn build(self) -> Arc<Manager> {
        Arc::new(Manager::new_internal(self.cfg, self.subscribers, self.deps))
    }
}
