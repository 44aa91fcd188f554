//! # Runtime events emitted by controllers and the manager.
//!
//! An [`Event`] is a flat record: which controller, which key, which attempt, and for
//! requeues how long and why. Fields that do not apply to a kind stay `None`; each
//! [`EventKind`] variant lists what it fills in.
//!
//! `seq` comes from a process-wide counter, so sorting by it recovers publish order even
//! when subscribers buffer events differently.
//!
//! ```rust
//! use std::time::Duration;
//! use ctrlvisor::{Event, EventKind, RequeueSource};
//!
//! let ev = Event::new(EventKind::RequeueScheduled)
//!     .with_controller("pods")
//!     .with_key("default/web-0")
//!     .with_delay(Duration::from_millis(40))
//!     .with_requeue(RequeueSource::Backoff);
//!
//! assert_eq!(ev.kind, EventKind::RequeueScheduled);
//! assert_eq!(ev.key.as_deref(), Some("default/web-0"));
//! assert_eq!(ev.delay_ms, Some(40));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Shutdown requested (OS signal observed by `Manager::run_until_signal`).
    ShutdownRequested,

    /// Controller entered `Running`.
    ///
    /// Sets: `controller`, `attempt` (= worker count).
    ControllerStarting,

    /// Controller entered `Stopping` (context cancelled or a source failed).
    ///
    /// Sets: `controller`, `reason` (only when a source failed).
    ControllerStopping,

    /// Every worker and source joined; controller is `Stopped`.
    ///
    /// Sets: `controller`.
    ControllerStopped,

    /// A watch source returned an error; fatal to the controller.
    ///
    /// Sets: `controller`, `key` (= source name), `reason`.
    SourceFailed,

    /// A worker dequeued a key and is calling the reconciler.
    ///
    /// Sets: `controller`, `key`, `attempt` (1 + rate-limited requeues so far).
    ReconcileStarting,

    /// Reconciler returned `Ok`.
    ///
    /// Sets: `controller`, `key`, `attempt`.
    ReconcileSucceeded,

    /// Reconciler returned a retryable error or panicked.
    ///
    /// Sets: `controller`, `key`, `attempt`, `reason`.
    ReconcileFailed,

    /// Reconciler gave up because of shutdown; the key is not requeued.
    ///
    /// Sets: `controller`, `key`, `attempt`.
    ReconcileCanceled,

    /// Key will be handed out again.
    ///
    /// Sets: `controller`, `key`, `delay_ms`, `requeue`, `reason` (backoff only).
    RequeueScheduled,
}

/// Why a key was requeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueSource {
    /// Reconciler asked for an immediate requeue.
    Immediate,
    /// Reconciler asked for a requeue after a delay.
    After,
    /// Reconciler failed; delay comes from the rate limiter.
    Backoff,
}

/// One published occurrence on the bus.
#[derive(Clone, Debug)]
pub struct Event {
    /// Publish order across the whole process.
    pub seq: u64,
    pub at: SystemTime,
    pub kind: EventKind,

    /// Name of the controller, if applicable.
    pub controller: Option<Arc<str>>,
    /// Reconcile key (or source name for source events).
    pub key: Option<Arc<str>>,
    /// 1 + rate-limited requeues of the key; worker count for `ControllerStarting`.
    pub attempt: Option<u32>,
    /// Requeue delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Why the key was requeued.
    pub requeue: Option<RequeueSource>,
    /// Human-readable reason (errors, panic payloads).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Stamps `kind` with the current time and the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: NEXT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            controller: None,
            key: None,
            attempt: None,
            delay_ms: None,
            requeue: None,
            reason: None,
        }
    }

    /// Attaches a controller name.
    #[inline]
    pub fn with_controller(mut self, name: impl Into<Arc<str>>) -> Self {
        self.controller = Some(name.into());
        self
    }

    /// Attaches a reconcile key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Stored as whole milliseconds, saturating at `u32::MAX`.
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(u32::try_from(d.as_millis()).unwrap_or(u32::MAX));
        self
    }

    /// Attaches the requeue source.
    #[inline]
    pub fn with_requeue(mut self, source: RequeueSource) -> Self {
        self.requeue = Some(source);
        self
    }

    /// Error text or panic payload.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// True for events describing a single reconcile.
    #[inline]
    pub fn is_reconcile(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ReconcileStarting
                | EventKind::ReconcileSucceeded
                | EventKind::ReconcileFailed
                | EventKind::ReconcileCanceled
                | EventKind::RequeueScheduled
        )
    }
}
