//! # ctrlvisor
//!
//! **Ctrlvisor** is a reconciliation controller runtime for Rust.
//!
//! It implements the canonical control loop: watch sources emit change events, handlers
//! map them to keys, a deduplicating rate-limited work queue holds the keys, and a bounded
//! pool of workers calls a user [`Reconciler`] until actual state matches desired state.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Source    │   │    Source    │   │    Source    │
//!     │  (channel)   │   │   (stream)   │   │   (custom)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼ EventSink        ▼                  ▼
//!     predicates ─► Handler::map(&WatchEvent) ─► Vec<Request>
//!            └──────────────────┼──────────────────┘
//!                               ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Controller                                                       │
//! │  - WorkQueue<Request> (dedup, in-flight set, delayed adds)        │
//! │  - RateLimiter (per-key BackoffPolicy)                            │
//! │  - TaskRegistry (every spawned task, joinable)                    │
//! │  - Lifecycle: Unstarted → Running → Stopping → Stopped            │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   worker-0   │   │   worker-1   │   │   worker-N   │
//!     │ get→reconcile│   │ get→reconcile│   │ get→reconcile│
//!     │   →requeue   │   │   →requeue   │   │   →requeue   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ Publishes        │                  │
//!      │ - ReconcileStarting / Succeeded / Failed
//!      │ - RequeueScheduled
//!      ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │               (capacity: ManagerConfig::bus_capacity)             │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │   Manager listener     │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                         ┌─────────┼─────────┐
//!                         ▼         ▼         ▼
//!                     LogWriter   sub2      subN
//! ```
//!
//! ### Shutdown
//! ```text
//! ctx.cancel()
//!   └─► Controller: Running → Stopping
//!         ├─► sources cancelled, queue shut down (get() → None)
//!         ├─► workers finish their current reconcile, then exit
//!         ├─► delayed requeues abandoned
//!         └─► registry empty → Stopped → start() returns
//! ```
//!
//! ## Features
//! | Area               | Description                                                  | Key types / traits                          |
//! |--------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Reconcile**      | User logic and its outcome.                                  | [`Reconciler`], [`ReconcilerFn`], [`Action`]|
//! | **Injection**      | Manager-owned dependencies handed to reconcilers.            | [`Inject`], [`Dependencies`]                |
//! | **Watches**        | Event producers, filters and key mapping.                    | [`Source`], [`Predicate`], [`Handler`]      |
//! | **Runtime**        | Controllers and the manager running them.                    | [`Controller`], [`Manager`]                 |
//! | **Queue**          | Dedup, in-flight tracking, rate-limited requeues.            | [`WorkQueue`], [`BackoffPolicy`]            |
//! | **Subscriber API** | Hook into runtime events (logging, custom subscribers).      | [`Subscribe`], [`Event`]                    |
//! | **Errors**         | Typed errors for construction, lifecycle and reconciles.     | [`ControllerError`], [`ReconcileError`]     |
//!
//! ## Optional features
//! - `logging` (default): exports the [`LogWriter`] subscriber, which renders events
//!   through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use ctrlvisor::{
//!     Action, ChannelSource, Controller, ControllerOptions, EnqueueRequestForObject, Manager,
//!     ManagerConfig, ObjectMeta, ReconcileError, ReconcilerFn, Request, WatchEvent,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mgr = Manager::new(ManagerConfig::default());
//!
//!     let reconciler = ReconcilerFn::arc(|_ctx: CancellationToken, req: Request| async move {
//!         println!("reconciling {req}");
//!         Ok::<_, ReconcileError>(Action::done())
//!     });
//!     let ctrl = Controller::new(
//!         "pods",
//!         &mgr,
//!         ControllerOptions::default().with_reconciler(reconciler),
//!     )?;
//!
//!     let (tx, source) = ChannelSource::channel("pods", 16);
//!     ctrl.watch(source, EnqueueRequestForObject, Vec::new())?;
//!     tx.send(WatchEvent::generic(ObjectMeta::new("default", "web-0"))).await?;
//!
//!     let ctx = CancellationToken::new();
//!     let stop = ctx.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!         stop.cancel();
//!     });
//!     mgr.start(ctx).await?;
//!     assert!(ctrl.tasks().is_empty());
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod handler;
mod policies;
mod predicate;
mod queue;
mod reconcile;
mod source;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    Controller, ControllerOptions, LifecycleState, Manager, ManagerBuilder, ManagerConfig,
    TaskRegistry,
};
pub use error::{ControllerError, InjectError, ManagerError, ReconcileError, SourceError};
pub use events::{Bus, Event, EventKind, RequeueSource};
pub use handler::{
    EnqueueRequestForObject, EnqueueRequestForOwner, EnqueueRequestsFromMapFunc, Handler,
};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use predicate::{GenerationChanged, LabelSelector, Predicate, PredicateFn};
pub use queue::{RateLimiter, WorkQueue};
pub use reconcile::{Action, Dependencies, Inject, Reconciler, ReconcilerFn, Request};
pub use source::{
    ChannelSource, EventSink, ObjectMeta, OwnerReference, Source, StreamSource, WatchEvent,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: built-in subscriber rendering events through `tracing`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
