//! # Deduplicating, rate-limited work queue.
//!
//! [`WorkQueue`] holds reconcile keys for the worker pool.
//!
//! ## Key states
//! ```text
//!             add(k)                    get()                     done(k)
//!   (absent) ───────► dirty + queued ─────────► processing ──────────────► (absent)
//!                        ▲   │ add(k): no-op            │ add(k): dirty only     │
//!                        │   └──────────────            ▼                        │
//!                        └────────────────────── done(k) with dirty: requeued ◄──┘
//! ```
//!
//! ## Rules
//! - A pending key is queued **at most once** (`add` coalesces).
//! - A key is handed to **at most one** worker at a time; re-adds while processing are
//!   parked in `dirty` and queued again on `done`.
//! - After [`shutdown`](WorkQueue::shutdown) `get` returns `None` right away, adds are
//!   ignored and pending delayed adds are abandoned.
//! - Delayed adds run as tasks in the queue's [`TaskRegistry`]; for a key waiting more than
//!   once only the earliest deadline is kept.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::TaskRegistry;
use crate::policies::BackoffPolicy;
use crate::queue::rate_limiter::RateLimiter;

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    waiting: HashMap<K, Instant>,
    limiter: RateLimiter<K>,
}

struct Shared<K> {
    name: Arc<str>,
    state: Mutex<State<K>>,
    notify: Notify,
    shutdown: CancellationToken,
    tasks: TaskRegistry,
}

/// Work queue shared by sources (producers) and workers (consumers).
///
/// Cheap to clone; clones refer to the same queue.
pub struct WorkQueue<K> {
    inner: Arc<Shared<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Creates an empty queue whose delayed adds are tracked in `tasks`.
    pub fn new(name: impl Into<Arc<str>>, backoff: BackoffPolicy, tasks: TaskRegistry) -> Self {
        Self {
            inner: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    waiting: HashMap::new(),
                    limiter: RateLimiter::new(backoff),
                }),
                notify: Notify::new(),
                shutdown: CancellationToken::new(),
                tasks,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<K>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue name (used to label delayed-add tasks).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Marks `key` as needing processing.
    pub fn add(&self, key: K) {
        if self.is_shutting_down() {
            return;
        }
        {
            let mut st = self.state();
            if !st.dirty.insert(key.clone()) || st.processing.contains(&key) {
                return;
            }
            st.queue.push_back(key);
        }
        self.inner.notify.notify_one();
    }

    /// Waits for the next key. Returns `None` once the queue is shut down.
    ///
    /// The caller **must** call [`done`](Self::done) with the key when finished.
    pub async fn get(&self) -> Option<K> {
        loop {
            if self.is_shutting_down() {
                return None;
            }
            // Registered before the queue check so an `add` in between is not missed.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut st = self.state();
                // `shutdown` cancels before it takes the lock.
                if self.is_shutting_down() {
                    return None;
                }
                if let Some(key) = st.queue.pop_front() {
                    st.dirty.remove(&key);
                    st.processing.insert(key.clone());
                    return Some(key);
                }
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = self.inner.shutdown.cancelled() => return None,
            }
        }
    }

    /// Marks `key` as processed; requeues it if it was re-added meanwhile.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut st = self.state();
            st.processing.remove(key);
            if st.dirty.contains(key) && !self.is_shutting_down() {
                st.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.inner.notify.notify_one();
        }
    }

    /// Adds `key` after `delay`. A zero delay adds immediately.
    pub fn add_after(&self, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let ready_at = Instant::now() + delay;
        {
            let mut st = self.state();
            match st.waiting.get(&key) {
                Some(existing) if *existing <= ready_at => return,
                _ => {
                    st.waiting.insert(key.clone(), ready_at);
                }
            }
        }

        let queue = self.clone();
        let token = self.inner.shutdown.clone();
        let label = format!("{}:requeue", self.inner.name);
        self.inner.tasks.spawn(label, async move {
            tokio::select! {
                _ = tokio::time::sleep_until(ready_at) => queue.fire(key, ready_at),
                _ = token.cancelled() => {}
            }
        });
    }

    /// Delayed add fired: only the timer owning the current deadline re-adds.
    fn fire(&self, key: K, ready_at: Instant) {
        let owned = {
            let mut st = self.state();
            if st.waiting.get(&key) == Some(&ready_at) {
                st.waiting.remove(&key);
                true
            } else {
                false
            }
        };
        if owned {
            self.add(key);
        }
    }

    /// Adds `key` after the rate limiter's backoff for it; returns the chosen delay.
    pub fn add_rate_limited(&self, key: K) -> Duration {
        let delay = self.state().limiter.when(&key);
        self.add_after(key, delay);
        delay
    }

    /// Resets the rate limiter's failure history for `key`.
    pub fn forget(&self, key: &K) {
        self.state().limiter.forget(key);
    }

    /// Number of rate-limited requeues of `key` since it was last forgotten.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.state().limiter.num_requeues(key)
    }

    /// Number of keys waiting to be handed out (excludes processing and delayed keys).
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    /// True if no key is waiting to be handed out.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the queue: pending `get`s return `None`, delayed adds are abandoned.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let mut st = self.state();
        st.queue.clear();
        st.dirty.clear();
        st.waiting.clear();
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> (WorkQueue<&'static str>, TaskRegistry) {
        let tasks = TaskRegistry::new();
        let q = WorkQueue::new("test", BackoffPolicy::default(), tasks.clone());
        (q, tasks)
    }

    #[tokio::test]
    async fn add_coalesces_pending_keys() {
        let (q, _) = queue();
        q.add("a");
        q.add("a");
        q.add("b");
        assert_eq!(q.len(), 2);
        assert_eq!(q.get().await, Some("a"));
        assert_eq!(q.get().await, Some("b"));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn re_add_while_processing_waits_for_done() {
        let (q, _) = queue();
        q.add("a");
        let key = q.get().await;
        assert_eq!(key, Some("a"));

        q.add("a");
        assert!(q.is_empty(), "key in flight must not be handed out twice");

        q.done(&"a");
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await, Some("a"));
    }

    #[tokio::test]
    async fn get_blocks_until_add() {
        let (q, _) = queue();
        let consumer = q.clone();
        let handle = tokio::spawn(async move { consumer.get().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        q.add("late");
        assert_eq!(handle.await.ok().flatten(), Some("late"));
    }

    #[tokio::test]
    async fn shutdown_releases_waiters_and_drops_pending() {
        let (q, _) = queue();
        let consumer = q.clone();
        let waiter = tokio::spawn(async move { consumer.get().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        q.shutdown();
        assert_eq!(waiter.await.ok().flatten(), None);

        q.add("after");
        assert_eq!(q.get().await, None);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn pending_keys_are_not_handed_out_after_shutdown() {
        let (q, _) = queue();
        q.add("a");
        q.add("b");
        q.shutdown();
        assert_eq!(q.get().await, None);
        assert!(q.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn burst_of_adds_wakes_every_parked_getter() {
        let (q, _) = queue();
        let getters: Vec<_> = (0..3)
            .map(|_| {
                let consumer = q.clone();
                tokio::spawn(async move { consumer.get().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;

        for key in ["a", "b", "c"] {
            q.add(key);
        }
        let mut got = Vec::new();
        for getter in getters {
            let key = tokio::time::timeout(Duration::from_secs(5), getter)
                .await
                .expect("every idle getter receives a key")
                .ok()
                .flatten();
            got.extend(key);
        }
        got.sort_unstable();
        assert_eq!(got, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn add_after_fires_once_delay_elapses() {
        let (q, tasks) = queue();
        q.add_after("a", Duration::from_secs(5));
        assert!(q.is_empty());
        assert_eq!(tasks.len(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        tasks.wait_idle().await;
        assert_eq!(q.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn earliest_delayed_add_wins() {
        let (q, tasks) = queue();
        q.add_after("a", Duration::from_secs(10));
        q.add_after("a", Duration::from_secs(1));
        q.add_after("a", Duration::from_secs(5));
        assert_eq!(tasks.len(), 2, "later deadline is skipped");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await, Some("a"));
        q.done(&"a");

        tokio::time::sleep(Duration::from_secs(20)).await;
        tasks.wait_idle().await;
        assert!(q.is_empty(), "superseded timer must not add again");
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_adds_are_abandoned_on_shutdown() {
        let (q, tasks) = queue();
        q.add_after("a", Duration::from_secs(60));
        q.add_after("b", Duration::from_secs(60));
        assert_eq!(tasks.len(), 2);

        q.shutdown();
        tasks.wait_idle().await;
        assert!(tasks.is_empty());
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn rate_limited_delays_grow_until_forget() {
        let (q, _) = queue();
        let d1 = q.add_rate_limited("a");
        let d2 = q.add_rate_limited("a");
        assert!(d2 > d1);
        assert_eq!(q.num_requeues(&"a"), 2);

        q.forget(&"a");
        assert_eq!(q.num_requeues(&"a"), 0);
        q.shutdown();
    }
}
