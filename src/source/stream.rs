//! # StreamSource: events from any `futures::Stream`.
//!
//! Adapts a stream of `Result<WatchEvent, E>` (a watch API, a file tail, a test fixture).
//! The first `Err` item is reported as [`SourceError::Failed`] and ends the source.

use std::fmt::Display;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;
use crate::source::{EventSink, Source, WatchEvent};

/// Source reading a boxed stream; consumed by the first `start`.
pub struct StreamSource {
    name: String,
    stream: Mutex<Option<BoxStream<'static, Result<WatchEvent, SourceError>>>>,
}

impl StreamSource {
    /// Wraps `stream`; its errors are rendered with `Display`.
    pub fn new<S, E>(name: impl Into<String>, stream: S) -> Self
    where
        S: Stream<Item = Result<WatchEvent, E>> + Send + 'static,
        E: Display,
    {
        let stream = stream.map(|item| item.map_err(SourceError::failed)).boxed();
        Self {
            name: name.into(),
            stream: Mutex::new(Some(stream)),
        }
    }

    /// Source over an infallible list of events, ending after the last one.
    pub fn from_events(name: impl Into<String>, events: Vec<WatchEvent>) -> Self {
        Self::new(
            name,
            futures::stream::iter(events.into_iter().map(Ok::<_, SourceError>)),
        )
    }
}

#[async_trait]
impl Source for StreamSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: CancellationToken, sink: EventSink) -> Result<(), SourceError> {
        let mut stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SourceError::AlreadyStarted)?;

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Ok(()),
                item = stream.next() => match item {
                    Some(Ok(ev)) => {
                        sink.send(&ev);
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::TaskRegistry;
    use crate::handler::EnqueueRequestForObject;
    use crate::policies::BackoffPolicy;
    use crate::queue::WorkQueue;
    use crate::source::ObjectMeta;

    #[tokio::test]
    async fn first_error_ends_the_source() {
        let queue = WorkQueue::new("stream", BackoffPolicy::default(), TaskRegistry::new());
        let sink = EventSink::new(queue.clone(), Arc::new(EnqueueRequestForObject), Vec::new());
        let items = vec![
            Ok(WatchEvent::generic(ObjectMeta::new("ns", "a"))),
            Err("watch expired"),
            Ok(WatchEvent::generic(ObjectMeta::new("ns", "b"))),
        ];
        let source = StreamSource::new("stream", futures::stream::iter(items));

        let err = source.start(CancellationToken::new(), sink).await.unwrap_err();
        assert_eq!(err.to_string(), "watch expired");
        assert_eq!(queue.len(), 1);
    }
}
