//! # ChannelSource: in-process events over a tokio `mpsc` channel.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;
use crate::source::{EventSink, Source, WatchEvent};

/// Source reading events from an `mpsc` receiver.
///
/// The receiver is consumed by the first `start`; a second start fails with
/// [`SourceError::AlreadyStarted`]. Dropping every sender ends the source cleanly.
///
/// ```rust
/// use ctrlvisor::{ChannelSource, ObjectMeta, WatchEvent};
///
/// let (tx, source) = ChannelSource::channel("pods", 16);
/// tx.try_send(WatchEvent::generic(ObjectMeta::new("default", "web-0"))).unwrap();
/// # let _ = source;
/// ```
pub struct ChannelSource {
    name: String,
    rx: Mutex<Option<mpsc::Receiver<WatchEvent>>>,
}

impl ChannelSource {
    /// Wraps an existing receiver.
    pub fn new(name: impl Into<String>, rx: mpsc::Receiver<WatchEvent>) -> Self {
        Self {
            name: name.into(),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Creates a bounded channel and returns its sender with the source.
    pub fn channel(name: impl Into<String>, capacity: usize) -> (mpsc::Sender<WatchEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(name, rx))
    }
}

#[async_trait]
impl Source for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: CancellationToken, sink: EventSink) -> Result<(), SourceError> {
        let mut rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SourceError::AlreadyStarted)?;

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Ok(()),
                ev = rx.recv() => match ev {
                    Some(ev) => {
                        sink.send(&ev);
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}
