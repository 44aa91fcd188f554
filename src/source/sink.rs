//! # EventSink: where a source delivers events.
//!
//! ```text
//! source ── send(&WatchEvent) ──► predicates (all must admit) ──► handler.map() ──► queue.add(key)*
//! ```
//!
//! A sink is bound to one watch registration (its handler and predicates) and to the
//! controller's queue. Delivery is synchronous and never blocks on reconciles.

use std::sync::Arc;

use crate::handler::Handler;
use crate::predicate::Predicate;
use crate::queue::WorkQueue;
use crate::reconcile::Request;
use crate::source::WatchEvent;

/// Handle given to a [`Source`](crate::Source) for delivering events.
#[derive(Clone)]
pub struct EventSink {
    queue: WorkQueue<Request>,
    handler: Arc<dyn Handler>,
    predicates: Arc<[Arc<dyn Predicate>]>,
}

impl EventSink {
    pub(crate) fn new(
        queue: WorkQueue<Request>,
        handler: Arc<dyn Handler>,
        predicates: Vec<Arc<dyn Predicate>>,
    ) -> Self {
        Self {
            queue,
            handler,
            predicates: predicates.into(),
        }
    }

    /// Filters, maps and enqueues one event; returns the number of keys handed to the queue.
    ///
    /// Keys already pending are coalesced by the queue. After the controller stopped the
    /// keys are discarded.
    pub fn send(&self, event: &WatchEvent) -> usize {
        if !self.predicates.iter().all(|p| p.admit(event)) {
            return 0;
        }
        let keys = self.handler.map(event);
        let n = keys.len();
        for key in keys {
            self.queue.add(key);
        }
        n
    }

    /// True once the controller's queue is shut down.
    pub fn is_closed(&self) -> bool {
        self.queue.is_shutting_down()
    }
}
