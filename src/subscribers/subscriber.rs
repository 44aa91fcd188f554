//! # The [`Subscribe`] extension point.
//!
//! Subscribers see every [`Event`] the manager's bus carries: controller transitions,
//! reconcile outcomes, requeue decisions and source failures. Typical uses are logging,
//! counters, or alerting on a key that keeps failing.
//!
//! Delivery is handled by [`SubscriberSet`](super::SubscriberSet): each subscriber has its
//! own bounded lane and task, so a slow or panicking subscriber never holds up reconcile
//! workers or its neighbours.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use ctrlvisor::{Event, EventKind, Subscribe};
//!
//! struct FailureAlert;
//!
//! #[async_trait]
//! impl Subscribe for FailureAlert {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::ReconcileFailed) && ev.attempt > Some(10) {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failure-alert" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives runtime events on a dedicated task, in publish order.
///
/// `on_event` should not block the executor; do blocking work on `spawn_blocking`.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Lane label in diagnostics. Defaults to the full type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Lane capacity; values below 1 are raised to 1. Events beyond it are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
