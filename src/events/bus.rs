//! # Bus: broadcast of runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that workers, sources and the manager can
//! publish without ever blocking a reconcile.
//!
//! ## Flow
//! ```text
//! Publishers (many):                     Listener (one per Manager::start):
//!   worker-0     ──┐
//!   worker-N     ──┼──────► Bus ───────► fan-out loop ────► SubscriberSet
//!   Controller   ──┤  (broadcast chan)
//!   Manager      ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers;
//!   receivers that fall behind observe `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if nobody is subscribed at send time (e.g. a
//!   controller started without its manager).

use tokio::sync::broadcast;

use super::event::Event;

/// Shared publish side of the event stream.
///
/// Fire-and-forget: no delivery or durability guarantees. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus whose ring buffer holds `capacity` events (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event; dropped silently when nobody listens.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver that observes events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
