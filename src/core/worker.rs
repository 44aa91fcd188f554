//! # Worker: one member of a controller's reconcile pool.
//!
//! Pulls keys from the [`WorkQueue`], runs the [`Reconciler`] and turns its outcome into
//! queue operations, publishing events to the [`Bus`] along the way.
//!
//! ## Outcome handling
//!
//! ```text
//! queue.get() ── None ──► exit (queue shut down)
//!     │
//!     Some(key) ─► publish ReconcileStarting{ attempt = requeues + 1 }
//!              ─► reconcile(ctx, key)   (panics caught)
//!                   │
//!                   ├─ Ok(requeue)          ─► add(key)                     RequeueScheduled{Immediate}
//!                   ├─ Ok(requeue_after d)  ─► forget(key), add_after(key,d) RequeueScheduled{After}
//!                   ├─ Ok(done)             ─► forget(key)
//!                   ├─ Err(Canceled)        ─► ReconcileCanceled, no requeue
//!                   └─ Err(Fail | Panicked) ─► ReconcileFailed, add_rate_limited(key)
//!                                                                            RequeueScheduled{Backoff}
//!              ─► queue.done(key)
//! ```
//!
//! ## Rules
//! - A reconcile that started is always awaited to completion; the worker only checks for
//!   shutdown between keys.
//! - `done` is called exactly once per key handed out, after the requeue decision.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::ReconcileError;
use crate::events::{Bus, Event, EventKind, RequeueSource};
use crate::queue::WorkQueue;
use crate::reconcile::{Reconciler, Request, Requeue};
use crate::subscribers::panic_message;

pub(crate) struct Worker {
    pub(crate) controller: Arc<str>,
    pub(crate) reconciler: Arc<dyn Reconciler>,
    pub(crate) queue: WorkQueue<Request>,
    pub(crate) bus: Bus,
    pub(crate) ctx: CancellationToken,
}

impl Worker {
    /// Processes keys until the queue shuts down.
    pub(crate) async fn run(self) {
        while let Some(req) = self.queue.get().await {
            self.process(&req).await;
            self.queue.done(&req);
        }
    }

    async fn process(&self, req: &Request) {
        let key: Arc<str> = req.to_string().into();
        let attempt = self.queue.num_requeues(req).saturating_add(1);
        self.publish(
            Event::new(EventKind::ReconcileStarting)
                .with_key(Arc::clone(&key))
                .with_attempt(attempt),
        );

        let fut = self.reconciler.reconcile(self.ctx.clone(), req.clone());
        let res = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => Err(ReconcileError::Panicked {
                info: panic_message(panic.as_ref()),
            }),
        };

        match res {
            Ok(action) => {
                self.publish(
                    Event::new(EventKind::ReconcileSucceeded)
                        .with_key(Arc::clone(&key))
                        .with_attempt(attempt),
                );
                match action.plan() {
                    Requeue::Immediately => {
                        self.queue.add(req.clone());
                        self.publish_requeue(&key, RequeueSource::Immediate, Duration::ZERO, None);
                    }
                    Requeue::After(delay) => {
                        self.queue.forget(req);
                        self.queue.add_after(req.clone(), delay);
                        self.publish_requeue(&key, RequeueSource::After, delay, None);
                    }
                    Requeue::Never => self.queue.forget(req),
                }
            }
            Err(e) if !e.is_retryable() => {
                self.publish(
                    Event::new(EventKind::ReconcileCanceled)
                        .with_key(key)
                        .with_attempt(attempt),
                );
            }
            Err(e) => {
                let reason = e.to_string();
                self.publish(
                    Event::new(EventKind::ReconcileFailed)
                        .with_key(Arc::clone(&key))
                        .with_attempt(attempt)
                        .with_reason(reason.as_str()),
                );
                let delay = self.queue.add_rate_limited(req.clone());
                self.publish_requeue(&key, RequeueSource::Backoff, delay, Some(&reason));
            }
        }
    }

    fn publish_requeue(
        &self,
        key: &Arc<str>,
        source: RequeueSource,
        delay: Duration,
        reason: Option<&str>,
    ) {
        let mut ev = Event::new(EventKind::RequeueScheduled)
            .with_key(Arc::clone(key))
            .with_requeue(source)
            .with_delay(delay);
        if let Some(reason) = reason {
            ev = ev.with_reason(reason);
        }
        self.publish(ev);
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_controller(Arc::clone(&self.controller)));
    }
}
