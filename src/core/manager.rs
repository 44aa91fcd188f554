//! # Manager: owner of controllers, dependencies and observability.
//!
//! The [`Manager`] keeps the name registry that makes controller names unique, the
//! [`Dependencies`] injected into reconcilers, and the event [`Bus`] its controllers publish
//! to. [`Manager::start`] runs every registered controller and fans their events out to
//! the subscribers.
//!
//! ## Run
//! ```text
//! start(ctx)
//!   ├─► SubscriberSet::new(subscribers)           (one worker per subscriber)
//!   ├─► spawn "manager:listener"                  bus ─► set.emit()
//!   ├─► controller.start(run) for each, concurrently
//!   │     └─ first Err ─► run.cancel() (the others stop too)
//!   ├─► all controllers returned
//!   ├─► listener drains the bus, hands the set back
//!   └─► set.shutdown()                            (queued events delivered)
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;

use crate::core::builder::ManagerBuilder;
use crate::core::config::ManagerConfig;
use crate::core::controller::Controller;
use crate::core::registry::TaskRegistry;
use crate::core::shutdown;
use crate::error::{ControllerError, ManagerError};
use crate::events::{Bus, Event, EventKind};
use crate::reconcile::Dependencies;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Runs a set of controllers sharing dependencies and an event bus.
pub struct Manager {
    cfg: ManagerConfig,
    bus: Bus,
    deps: Dependencies,
    subscribers: Vec<Arc<dyn Subscribe>>,
    controllers: Mutex<BTreeMap<String, Arc<Controller>>>,
    tasks: TaskRegistry,
    started: AtomicBool,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("cfg", &self.cfg)
            .field("controllers", &self.controller_names())
            .field("dependencies", &self.deps)
            .finish()
    }
}

impl Manager {
    /// Manager without subscribers or dependencies.
    pub fn new(cfg: ManagerConfig) -> Arc<Self> {
        Self::builder(cfg).build()
    }

    /// Starts building a manager.
    pub fn builder(cfg: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: ManagerConfig,
        subscribers: Vec<Arc<dyn Subscribe>>,
        deps: Dependencies,
    ) -> Self {
        Self {
            bus: Bus::new(cfg.bus_capacity_clamped()),
            cfg,
            deps,
            subscribers,
            controllers: Mutex::new(BTreeMap::new()),
            tasks: TaskRegistry::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Dependencies offered to reconcilers at construction.
    pub fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    /// Event bus shared by every controller of this manager.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Registry of the manager's own tasks (event listener and subscriber workers).
    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Sorted names of registered controllers.
    pub fn controller_names(&self) -> Vec<String> {
        self.controllers().keys().cloned().collect()
    }

    /// Registered controller by name.
    pub fn controller(&self, name: &str) -> Option<Arc<Controller>> {
        self.controllers().get(name).cloned()
    }

    fn controllers(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Controller>>> {
        self.controllers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, controller: Arc<Controller>) -> Result<(), ControllerError> {
        let mut controllers = self.controllers();
        let name = controller.name();
        if controllers.contains_key(name) {
            return Err(ControllerError::DuplicateName {
                name: name.to_string(),
            });
        }
        controllers.insert(name.to_string(), controller);
        Ok(())
    }

    /// Runs every registered controller until `ctx` is cancelled or one of them fails.
    ///
    /// Controllers registered after this call are not started. Returns the first
    /// controller error; every controller has stopped and every subscriber has drained by
    /// the time this returns.
    pub async fn start(&self, ctx: CancellationToken) -> Result<(), ManagerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ManagerError::AlreadyStarted);
        }

        let set = SubscriberSet::new(&self.subscribers, &self.tasks);
        let listener_stop = CancellationToken::new();
        let listener = self.spawn_listener(set, listener_stop.clone());

        let run = ctx.child_token();
        let controllers: Vec<Arc<Controller>> = self.controllers().values().cloned().collect();
        let mut running: FuturesUnordered<_> = controllers
            .iter()
            .map(|c| {
                let run = run.clone();
                async move { (c.name(), c.start(run).await) }
            })
            .collect();

        let mut first = None;
        while let Some((name, res)) = running.next().await {
            if let Err(error) = res {
                run.cancel();
                if first.is_none() {
                    first = Some(ManagerError::Controller {
                        name: name.to_string(),
                        error,
                    });
                }
            }
        }
        drop(running);
        if first.is_none() {
            run.cancelled().await;
        }

        listener_stop.cancel();
        match listener.await {
            Ok(set) => set.shutdown().await,
            Err(e) => tracing::warn!(error = %e, "event listener ended abnormally"),
        }
        self.tasks.wait_idle().await;

        first.map_or(Ok(()), Err)
    }

    /// Runs [`start`](Self::start) until SIGINT, SIGTERM or SIGQUIT (Ctrl-C elsewhere).
    pub async fn run_until_signal(&self) -> Result<(), ManagerError> {
        let ctx = CancellationToken::new();
        let run = self.start(ctx.clone());
        tokio::pin!(run);

        tokio::select! {
            res = &mut run => res,
            sig = shutdown::wait_for_shutdown_signal() => {
                if sig.is_ok() {
                    self.bus.publish(Event::new(EventKind::ShutdownRequested));
                }
                ctx.cancel();
                let res = run.await;
                res?;
                sig.map_err(ManagerError::from)
            }
        }
    }

    /// Forwards bus events to the subscriber set until `stop`, then drains what is left.
    fn spawn_listener(
        &self,
        set: SubscriberSet,
        stop: CancellationToken,
    ) -> tokio::task::JoinHandle<SubscriberSet> {
        let mut rx = self.bus.subscribe();
        self.tasks.spawn("manager:listener", async move {
            loop {
                tokio::select! {
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "event listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => break,
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(ev) => set.emit(&ev),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            set
        })
    }
}
