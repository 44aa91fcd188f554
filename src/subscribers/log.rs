//! # LogWriter: runtime events as `tracing` records
//!
//! A subscriber that turns each [`Event`] into a structured `tracing` record. Install any
//! `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see the output.
//!
//! ## Levels
//! - `info`: controller lifecycle, shutdown requests
//! - `debug`: reconcile starting / succeeded / requeued
//! - `warn`: reconcile failed or cancelled
//! - `error`: source failed
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  ctrlvisor: controller starting controller="pods" workers=2
//! DEBUG ctrlvisor: reconcile starting controller="pods" key="default/web-0" attempt=1
//! WARN  ctrlvisor: reconcile failed controller="pods" key="default/web-0" attempt=1 err="conflict"
//! DEBUG ctrlvisor: requeue scheduled controller="pods" key="default/web-0" delay_ms=5 source=Backoff
//! INFO  ctrlvisor: controller stopped controller="pods"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let controller = e.controller.as_deref().unwrap_or("-");
        let key = e.key.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ShutdownRequested => {
                tracing::info!(target: "ctrlvisor", "shutdown requested");
            }
            EventKind::ControllerStarting => {
                tracing::info!(target: "ctrlvisor", controller, workers = e.attempt, "controller starting");
            }
            EventKind::ControllerStopping => {
                tracing::info!(target: "ctrlvisor", controller, reason, "controller stopping");
            }
            EventKind::ControllerStopped => {
                tracing::info!(target: "ctrlvisor", controller, "controller stopped");
            }
            EventKind::SourceFailed => {
                tracing::error!(target: "ctrlvisor", controller, source = key, err = reason, "source failed");
            }
            EventKind::ReconcileStarting => {
                tracing::debug!(target: "ctrlvisor", controller, key, attempt = e.attempt, "reconcile starting");
            }
            EventKind::ReconcileSucceeded => {
                tracing::debug!(target: "ctrlvisor", controller, key, attempt = e.attempt, "reconcile succeeded");
            }
            EventKind::ReconcileFailed => {
                tracing::warn!(target: "ctrlvisor", controller, key, attempt = e.attempt, err = reason, "reconcile failed");
            }
            EventKind::ReconcileCanceled => {
                tracing::warn!(target: "ctrlvisor", controller, key, "reconcile cancelled");
            }
            EventKind::RequeueScheduled => {
                tracing::debug!(
                    target: "ctrlvisor",
                    controller,
                    key,
                    delay_ms = e.delay_ms,
                    source = ?e.requeue,
                    "requeue scheduled"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
