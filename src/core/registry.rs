//! # Task registry: every background task a controller spawns.
//!
//! [`TaskRegistry`] is the only way the runtime spawns tasks. Each spawned future is
//! wrapped with a guard that removes its entry when the future completes **or is dropped**,
//! so the registry's view of "alive" never outlives the future itself.
//!
//! ## Architecture
//! ```text
//! Controller::start()
//!   ├─► registry.spawn("source:pods", ..)     ─┐
//!   ├─► registry.spawn("worker-0", ..)         ├─► live: HashMap<id, label>
//!   ├─► registry.spawn("worker-1", ..)         │   count: watch<usize>
//!   └─► queue.add_after() → registry.spawn("requeue:ns/a", ..) ─┘
//!
//! guard drop ─► live.remove(id) ─► count -= 1 ─► wait_idle() wakes at 0
//! ```
//!
//! ## Rules
//! - Registry is cheap to clone (shared `Arc`); clones observe the same set.
//! - `wait_idle()` completes once the live count reaches zero (immediately if empty).
//! - Tests assert `is_empty()` after shutdown instead of inspecting runtime internals.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Inner {
    live: Mutex<HashMap<u64, Arc<str>>>,
    count: watch::Sender<usize>,
    next_id: AtomicU64,
}

impl Inner {
    fn live(&self) -> MutexGuard<'_, HashMap<u64, Arc<str>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes its registry entry on drop.
struct LiveGuard {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        // Publish under the lock so a stale count can never overwrite a newer one.
        let mut live = self.inner.live();
        live.remove(&self.id);
        self.inner.count.send_replace(live.len());
    }
}

/// Shared registry of spawned background tasks.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<Inner>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("live", &self.snapshot())
            .finish()
    }
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (count, _rx) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                live: Mutex::new(HashMap::new()),
                count,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Spawns `fut` on the current runtime and tracks it under `label` until it finishes.
    pub fn spawn<F>(&self, label: impl Into<Arc<str>>, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut live = self.inner.live();
            live.insert(id, label.into());
            self.inner.count.send_replace(live.len());
        }

        let guard = LiveGuard {
            inner: Arc::clone(&self.inner),
            id,
        };
        tokio::spawn(async move {
            let _guard = guard;
            fut.await
        })
    }

    /// Number of tasks currently alive.
    pub fn len(&self) -> usize {
        self.inner.live().len()
    }

    /// True if no tracked task is alive.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted labels of alive tasks (duplicates kept).
    pub fn snapshot(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.inner.live().values().map(|l| l.to_string()).collect();
        labels.sort_unstable();
        labels
    }

    /// Waits until every tracked task has finished.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.count.subscribe();
        // The sender lives in `inner`, which `self` keeps alive, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
