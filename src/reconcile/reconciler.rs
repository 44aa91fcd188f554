//! # Reconciler abstraction and function-backed implementation.
//!
//! This module defines the [`Reconciler`] trait (async, cooperatively cancelable), the
//! optional [`Inject`] capability, and a closure-backed implementation [`ReconcilerFn`].
//!
//! A reconciler receives the controller's [`CancellationToken`]; the controller never
//! aborts a running reconcile, it only cancels the token and waits.
//!
//! ## Dependency injection
//! A reconciler that needs something owned by the manager (a client, a cache) returns
//! `Some(self)` from [`Reconciler::injector`]. `Controller::new` then calls
//! [`Inject::inject`] once, synchronously, with the manager's [`Dependencies`]; an error
//! aborts construction.
//!
//! ```rust
//! use std::sync::{Arc, OnceLock};
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use ctrlvisor::{Action, Dependencies, Inject, InjectError, ReconcileError, Reconciler, Request};
//!
//! struct ApiClient;
//!
//! #[derive(Default)]
//! struct PodReconciler {
//!     client: OnceLock<Arc<ApiClient>>,
//! }
//!
//! impl Inject for PodReconciler {
//!     fn inject(&self, deps: &Dependencies) -> Result<(), InjectError> {
//!         let client = deps.require::<ApiClient>()?;
//!         let _ = self.client.set(client);
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl Reconciler for PodReconciler {
//!     async fn reconcile(&self, _ctx: CancellationToken, _req: Request) -> Result<Action, ReconcileError> {
//!         Ok(Action::done())
//!     }
//!
//!     fn injector(&self) -> Option<&dyn Inject> {
//!         Some(self)
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{InjectError, ReconcileError};
use crate::reconcile::{Action, Request};

/// User logic that drives real state toward desired state for one key.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Reconciles the object identified by `req`.
    ///
    /// `Err` is never fatal: the key is requeued with backoff. Return
    /// [`ReconcileError::Canceled`] after observing `ctx.is_cancelled()` to skip the retry.
    async fn reconcile(&self, ctx: CancellationToken, req: Request)
    -> Result<Action, ReconcileError>;

    /// Optional injection capability; `None` by default.
    fn injector(&self) -> Option<&dyn Inject> {
        None
    }
}

/// Capability of receiving manager-owned dependencies before the controller starts.
pub trait Inject: Send + Sync {
    /// Pulls what the reconciler needs out of `deps`.
    fn inject(&self, deps: &Dependencies) -> Result<(), InjectError>;
}

/// Type-keyed set of shared dependencies owned by the manager.
#[derive(Clone, Default)]
pub struct Dependencies {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("len", &self.values.len())
            .finish()
    }
}

impl Dependencies {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.insert_arc(Arc::new(value));
    }

    /// Stores an already shared value.
    pub fn insert_arc<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.values.insert(TypeId::of::<T>(), value);
    }

    /// Returns the value of type `T`, if provided.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// Like [`get`](Self::get), failing with [`InjectError::missing`].
    pub fn require<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectError> {
        self.get::<T>().ok_or_else(InjectError::missing::<T>)
    }

    /// Number of stored dependencies.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Function-backed reconciler.
///
/// Wraps a closure that creates a new future per reconcile.
///
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use ctrlvisor::{Action, ReconcileError, ReconcilerFn, Request};
///
/// let rec = ReconcilerFn::arc(|_ctx: CancellationToken, req: Request| async move {
///     let _ = req;
///     Ok::<_, ReconcileError>(Action::done())
/// });
/// # let _ = rec;
/// ```
pub struct ReconcilerFn<F> {
    f: F,
}

impl<F> ReconcilerFn<F> {
    /// Creates a new function-backed reconciler.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the reconciler as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Reconciler for ReconcilerFn<F>
where
    F: Fn(CancellationToken, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Action, ReconcileError>> + Send + 'static,
{
    async fn reconcile(
        &self,
        ctx: CancellationToken,
        req: Request,
    ) -> Result<Action, ReconcileError> {
        (self.f)(ctx, req).await
    }
}
