//! # SubscriberSet: per-subscriber lanes fed from the manager listener.
//!
//! Every subscriber owns a *lane*: a bounded queue plus one delivery task spawned into the
//! manager's [`TaskRegistry`]. [`SubscriberSet::emit`] never awaits; a full lane drops the
//! event for that subscriber and bumps its drop counter.
//!
//! ```text
//! listener ─► emit(&Event) ─► Arc<Event>
//!                               ├─► lane "log"    ─► on_event()
//!                               └─► lane "alerts" ─► on_event()   (full → dropped += 1)
//! ```
//!
//! Ordering holds within a lane only. A panicking subscriber is logged and keeps receiving
//! later events.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::core::TaskRegistry;
use crate::events::Event;

use super::Subscribe;

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

/// Fan-out over a fixed list of subscribers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    delivery: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Opens one lane per subscriber; delivery tasks are labelled `subscriber:{name}`.
    #[must_use]
    pub fn new(subs: &[Arc<dyn Subscribe>], tasks: &TaskRegistry) -> Self {
        let (lanes, delivery) = subs
            .iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let handle = tasks.spawn(
                    format!("subscriber:{}", sub.name()),
                    deliver(Arc::clone(sub), rx),
                );
                let lane = Lane {
                    name: sub.name(),
                    tx,
                    dropped: AtomicU64::new(0),
                };
                (lane, handle)
            })
            .unzip();
        Self { lanes, delivery }
    }

    /// Queues `event` on every lane without waiting.
    pub fn emit(&self, event: &Event) {
        let shared = Arc::new(event.clone());
        for lane in &self.lanes {
            let why = match lane.tx.try_send(Arc::clone(&shared)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "lane full",
                Err(TrySendError::Closed(_)) => "lane closed",
            };
            let total = lane.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(subscriber = lane.name, seq = event.seq, total, "event dropped: {why}");
        }
    }

    /// Events dropped so far for the subscriber called `name`.
    pub fn dropped(&self, name: &str) -> Option<u64> {
        self.lanes
            .iter()
            .find(|lane| lane.name == name)
            .map(|lane| lane.dropped.load(Ordering::Relaxed))
    }

    /// Closes every lane, then waits until queued events are delivered.
    pub async fn shutdown(self) {
        let Self { lanes, delivery } = self;
        drop(lanes);
        for handle in delivery {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "subscriber delivery task failed");
            }
        }
    }

    /// Number of subscriber lanes.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// True when the set was built without subscribers.
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}

async fn deliver(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let outcome = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await;
        if let Err(panic) = outcome {
            tracing::warn!(
                subscriber = sub.name(),
                seq = ev.seq,
                info = %panic_message(panic.as_ref()),
                "subscriber panicked"
            );
        }
    }
}

/// Text of a panic payload; `panic!` produces either `&str` or `String`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    match (payload.downcast_ref::<&str>(), payload.downcast_ref::<String>()) {
        (Some(s), _) => (*s).to_owned(),
        (None, Some(s)) => s.clone(),
        (None, None) => String::from("non-string panic payload"),
    }
}
