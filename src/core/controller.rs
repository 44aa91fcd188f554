//! # Controller: sources, queue and worker pool for one reconciler.
//!
//! ## Lifecycle
//! ```text
//! Controller::new(name, &manager, opts)
//!   ├─ name empty?              → Validation("must specify Name for Controller")
//!   ├─ reconciler missing?      → Validation("must specify Reconciler for Controller")
//!   ├─ reconciler.injector()    → inject(manager.dependencies()) or Injection(err)
//!   └─ manager.register(name)   → DuplicateName
//!
//! watch(source, handler, predicates)     (Unstarted only)
//!
//! start(ctx):  Unstarted ─► Running
//!   ├─► spawn "{name}:source:{src}"  (each with an EventSink)
//!   ├─► spawn "{name}:worker-{i}"    (i in 0..max_concurrent_reconciles)
//!   ├─► wait: ctx cancelled │ first source error
//!   │
//!   ├─► queue.shutdown()              (no new key is handed out)
//!   └─ Running ─► Stopping
//!        ├─► cancel sources + reconcile token
//!        ├─► join workers             (in-flight reconciles finish)
//!        ├─► join sources
//!        ├─► tasks.wait_idle()        (delayed requeues observe shutdown)
//!        └─► Stopping ─► Stopped, return
//! ```
//!
//! ## Rules
//! - `start` returns strictly after every reconcile that began before cancellation.
//! - No task spawned by the controller is alive once `start` returns.
//! - Reconcile failures never surface through `start`; they are events.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::core::config::ControllerOptions;
use crate::core::lifecycle::{Lifecycle, LifecycleState};
use crate::core::manager::Manager;
use crate::core::registry::TaskRegistry;
use crate::core::worker::Worker;
use crate::error::{ControllerError, SourceError};
use crate::events::{Bus, Event, EventKind};
use crate::handler::Handler;
use crate::predicate::Predicate;
use crate::queue::WorkQueue;
use crate::reconcile::{Reconciler, Request};
use crate::source::{EventSink, Source};
use crate::subscribers::panic_message;

/// One registered (source, handler, predicates) triple.
struct Watch {
    source: Arc<dyn Source>,
    handler: Arc<dyn Handler>,
    predicates: Vec<Arc<dyn Predicate>>,
}

type SourceHandle = JoinHandle<(String, Result<(), SourceError>)>;

/// Drives one reconciler from its watches.
pub struct Controller {
    name: Arc<str>,
    reconciler: Arc<dyn Reconciler>,
    workers: usize,
    queue: WorkQueue<Request>,
    watches: Mutex<Vec<Watch>>,
    lifecycle: Lifecycle,
    tasks: TaskRegistry,
    bus: Bus,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("state", &self.state())
            .finish()
    }
}

impl Controller {
    /// Validates `opts`, injects the manager's dependencies into the reconciler and
    /// registers the controller with `manager`.
    ///
    /// Nothing is spawned until [`start`](Self::start). On error no controller is
    /// registered and the name stays free.
    pub fn new(
        name: impl Into<String>,
        manager: &Manager,
        opts: ControllerOptions,
    ) -> Result<Arc<Self>, ControllerError> {
        let name: String = name.into();
        if name.is_empty() {
            return Err(ControllerError::missing("Name", "Controller"));
        }
        let workers = opts.worker_count();
        let Some(reconciler) = opts.reconciler else {
            return Err(ControllerError::missing("Reconciler", "Controller"));
        };
        if let Some(injector) = reconciler.injector() {
            injector.inject(manager.dependencies())?;
        }

        let name: Arc<str> = name.into();
        let tasks = opts.tasks.unwrap_or_default();
        let controller = Arc::new(Self {
            queue: WorkQueue::new(Arc::clone(&name), opts.rate_limiter, tasks.clone()),
            name,
            reconciler,
            workers,
            watches: Mutex::new(Vec::new()),
            lifecycle: Lifecycle::new(),
            tasks,
            bus: manager.bus().clone(),
        });
        manager.register(Arc::clone(&controller))?;
        Ok(controller)
    }

    /// Controller name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    /// Registry of the controller's background tasks.
    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// The controller's work queue.
    pub fn queue(&self) -> &WorkQueue<Request> {
        &self.queue
    }

    /// Number of registered watches not yet started.
    pub fn watch_count(&self) -> usize {
        self.watches().len()
    }

    fn watches(&self) -> MutexGuard<'_, Vec<Watch>> {
        self.watches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `source`; its events pass every predicate, then `handler` maps them to keys.
    ///
    /// Only valid before [`start`](Self::start).
    pub fn watch<S, H>(
        &self,
        source: S,
        handler: H,
        predicates: Vec<Arc<dyn Predicate>>,
    ) -> Result<(), ControllerError>
    where
        S: Source,
        H: Handler,
    {
        let mut watches = self.watches();
        match self.state() {
            LifecycleState::Unstarted => {
                watches.push(Watch {
                    source: Arc::new(source),
                    handler: Arc::new(handler),
                    predicates,
                });
                Ok(())
            }
            state => Err(ControllerError::InvalidState { op: "watch", state }),
        }
    }

    /// Runs sources and workers until `ctx` is cancelled or a source fails.
    ///
    /// Returns `Ok(())` on a clean shutdown, however many reconciles failed, and
    /// [`ControllerError::SourceStart`] for the first source that failed. Callable once.
    pub async fn start(&self, ctx: CancellationToken) -> Result<(), ControllerError> {
        let watches = {
            let mut watches = self.watches();
            self.lifecycle
                .advance(LifecycleState::Unstarted, LifecycleState::Running)
                .map_err(|_| ControllerError::AlreadyStarted {
                    name: self.name.to_string(),
                })?;
            std::mem::take(&mut *watches)
        };
        self.publish(Event::new(EventKind::ControllerStarting).with_attempt(self.workers as u32));

        let run = ctx.child_token();
        let mut sources: FuturesUnordered<SourceHandle> = watches
            .into_iter()
            .map(|w| self.spawn_source(w, run.clone()))
            .collect();
        let workers: Vec<JoinHandle<()>> = (0..self.workers)
            .map(|i| self.spawn_worker(i, run.clone()))
            .collect();

        let mut failure = None;
        while failure.is_none() {
            tokio::select! {
                _ = run.cancelled() => break,
                Some(joined) = sources.next() => failure = self.source_outcome(joined),
            }
        }

        self.stop(&run, workers, sources, failure.as_ref()).await;
        match failure {
            Some((source_name, error)) => Err(ControllerError::SourceStart { source_name, error }),
            None => Ok(()),
        }
    }

    async fn stop(
        &self,
        run: &CancellationToken,
        workers: Vec<JoinHandle<()>>,
        mut sources: FuturesUnordered<SourceHandle>,
        failure: Option<&(String, SourceError)>,
    ) {
        // No key is handed out once the controller reports `Stopping`.
        self.queue.shutdown();
        let _ = self
            .lifecycle
            .advance(LifecycleState::Running, LifecycleState::Stopping);
        let mut ev = Event::new(EventKind::ControllerStopping);
        if let Some((source, err)) = failure {
            ev = ev.with_reason(format!("source {source} failed: {err}"));
        }
        self.publish(ev);

        run.cancel();
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(controller = %self.name, error = %e, "worker ended abnormally");
            }
        }
        while let Some(joined) = sources.next().await {
            // Errors after the stop decision are reported, not returned.
            let _ = self.source_outcome(joined);
        }
        self.tasks.wait_idle().await;

        let _ = self
            .lifecycle
            .advance(LifecycleState::Stopping, LifecycleState::Stopped);
        self.publish(Event::new(EventKind::ControllerStopped));
    }

    fn spawn_source(&self, watch: Watch, ctx: CancellationToken) -> SourceHandle {
        let sink = EventSink::new(self.queue.clone(), watch.handler, watch.predicates);
        let source = watch.source;
        let label = format!("{}:source:{}", self.name, source.name());
        self.tasks.spawn(label, async move {
            let res = match AssertUnwindSafe(source.start(ctx, sink)).catch_unwind().await {
                Ok(res) => res,
                Err(panic) => Err(SourceError::failed(format!(
                    "panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            (source.name().to_string(), res)
        })
    }

    fn spawn_worker(&self, index: usize, ctx: CancellationToken) -> JoinHandle<()> {
        let worker = Worker {
            controller: Arc::clone(&self.name),
            reconciler: Arc::clone(&self.reconciler),
            queue: self.queue.clone(),
            bus: self.bus.clone(),
            ctx,
        };
        self.tasks.spawn(format!("{}:worker-{index}", self.name), worker.run())
    }

    /// Turns a finished source task into its failure, publishing `SourceFailed`.
    fn source_outcome(
        &self,
        joined: Result<(String, Result<(), SourceError>), JoinError>,
    ) -> Option<(String, SourceError)> {
        let (source, err) = match joined {
            Ok((source, Err(err))) => (source, err),
            Ok((_, Ok(()))) | Err(_) => return None,
        };
        self.publish(
            Event::new(EventKind::SourceFailed)
                .with_key(source.as_str())
                .with_reason(err.to_string()),
        );
        Some((source, err))
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_controller(Arc::clone(&self.name)));
    }
}
