//! # Watch sources.
//!
//! A [`Source`] produces [`WatchEvent`]s and delivers them through the [`EventSink`] it
//! is handed by `Controller::start`. Every source is treated the same way, whatever its
//! transport:
//!
//! ```text
//! Controller::start()
//!   └─► registry.spawn("{controller}:source:{name}", source.start(child_token, sink))
//!
//! source.start():
//!   loop {
//!     ├─ ctx cancelled  ─► return Ok(())
//!     ├─ input ended    ─► return Ok(())
//!     ├─ event          ─► sink.send(&event)
//!     └─ broken input   ─► return Err(SourceError)   (stops the whole controller)
//!   }
//! ```
//!
//! Built-ins:
//! - [`ChannelSource`]: reads a tokio `mpsc` receiver.
//! - [`StreamSource`]: reads any `futures::Stream` of `Result<WatchEvent, E>`.

mod channel;
mod object;
mod sink;
mod stream;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;

pub use channel::ChannelSource;
pub use object::{ObjectMeta, OwnerReference, WatchEvent};
pub use sink::EventSink;
pub use stream::StreamSource;

/// Producer of watch events.
#[async_trait]
pub trait Source: Send + Sync + 'static {
    /// Name used in task labels, events and errors.
    fn name(&self) -> &str;

    /// Delivers events into `sink` until `ctx` is cancelled or the input ends.
    ///
    /// Returning `Err` is fatal: the controller stops and `start` reports the error.
    async fn start(&self, ctx: CancellationToken, sink: EventSink) -> Result<(), SourceError>;
}
