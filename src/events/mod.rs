//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** that is the crate's
//! observability sink: reconcile failures are reported here, never through `start`'s
//! return value.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`RequeueSource`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Controller` (lifecycle, source failures), workers (reconcile flow),
//!   `Manager` (shutdown requests).
//! - **Consumers**: the fan-out loop inside `Manager::start`, which forwards to the
//!   `SubscriberSet`; tests may `subscribe()` directly.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, RequeueSource};
