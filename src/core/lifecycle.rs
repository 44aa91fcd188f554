//! # Controller lifecycle state.
//!
//! ```text
//! Unstarted ──start()──► Running ──ctx cancelled / source failed──► Stopping ──workers joined──► Stopped
//! ```
//!
//! Transitions are monotonic; `advance` refuses to move backwards or sideways.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a [`Controller`](crate::Controller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LifecycleState {
    /// Constructed; watches may be added.
    Unstarted = 0,
    /// Sources and workers are running.
    Running = 1,
    /// No new dequeues; waiting for in-flight reconciles.
    Stopping = 2,
    /// Every controller task has finished.
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Unstarted,
            1 => LifecycleState::Running,
            2 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }

    /// Stable snake_case label.
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleState::Unstarted => "unstarted",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Atomic holder of a [`LifecycleState`].
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Unstarted as u8),
        }
    }

    pub(crate) fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves `from → to`; returns the observed state on failure.
    pub(crate) fn advance(
        &self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleState> {
        debug_assert!(to > from);
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(LifecycleState::from_u8)
    }
}
