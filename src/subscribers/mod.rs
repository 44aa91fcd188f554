//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! worker ── publish(Event) ──► Bus ──► Manager fan-out loop ──► SubscriberSet::emit(&Event)
//!                                                                 ├──► LogWriter (tracing)
//!                                                                 └──► custom subscribers
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
