//! # Predicates: filtering events before they reach the handler.
//!
//! A watch registration may carry any number of [`Predicate`]s; an event is delivered only
//! if **every** predicate admits it. Each method defaults to `true`, so an implementation
//! overrides only the event types it cares about.
//!
//! Built-ins:
//! - [`PredicateFn`]: a closure over the event's object (the new state for updates).
//! - [`GenerationChanged`]: drops updates that did not bump `generation` (status-only writes).
//! - [`LabelSelector`]: admits objects carrying all the given labels.

use std::collections::BTreeMap;

use crate::source::{ObjectMeta, WatchEvent};

/// Per-event-type filter.
pub trait Predicate: Send + Sync + 'static {
    /// Filter for create events.
    fn create(&self, _object: &ObjectMeta) -> bool {
        true
    }

    /// Filter for update events.
    fn update(&self, _old: &ObjectMeta, _new: &ObjectMeta) -> bool {
        true
    }

    /// Filter for delete events.
    fn delete(&self, _object: &ObjectMeta) -> bool {
        true
    }

    /// Filter for generic events.
    fn generic(&self, _object: &ObjectMeta) -> bool {
        true
    }

    /// Dispatches `event` to the matching filter.
    fn admit(&self, event: &WatchEvent) -> bool {
        match event {
            WatchEvent::Create { object } => self.create(object),
            WatchEvent::Update { old, new } => self.update(old, new),
            WatchEvent::Delete { object } => self.delete(object),
            WatchEvent::Generic { object } => self.generic(object),
        }
    }
}

/// Closure-backed predicate applied to every event type.
pub struct PredicateFn<F> {
    f: F,
}

impl<F> PredicateFn<F>
where
    F: Fn(&ObjectMeta) -> bool + Send + Sync + 'static,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Predicate for PredicateFn<F>
where
    F: Fn(&ObjectMeta) -> bool + Send + Sync + 'static,
{
    fn create(&self, object: &ObjectMeta) -> bool {
        (self.f)(object)
    }

    fn update(&self, _old: &ObjectMeta, new: &ObjectMeta) -> bool {
        (self.f)(new)
    }

    fn delete(&self, object: &ObjectMeta) -> bool {
        (self.f)(object)
    }

    fn generic(&self, object: &ObjectMeta) -> bool {
        (self.f)(object)
    }
}

/// Admits updates only when `generation` changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationChanged;

impl Predicate for GenerationChanged {
    fn update(&self, old: &ObjectMeta, new: &ObjectMeta) -> bool {
        old.generation != new.generation
    }
}

/// Admits objects whose labels contain every `key=value` pair of the selector.
///
/// An empty selector matches everything.
#[derive(Debug, Clone, Default)]
pub struct LabelSelector {
    match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Empty selector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `key=value`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    /// True if `object` carries every required label.
    pub fn matches(&self, object: &ObjectMeta) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| object.labels.get(k) == Some(v))
    }
}

impl Predicate for LabelSelector {
    fn create(&self, object: &ObjectMeta) -> bool {
        self.matches(object)
    }

    // Either side matching lets a relabel away from the selector still be seen.
    fn update(&self, old: &ObjectMeta, new: &ObjectMeta) -> bool {
        self.matches(old) || self.matches(new)
    }

    fn delete(&self, object: &ObjectMeta) -> bool {
        self.matches(object)
    }

    fn generic(&self, object: &ObjectMeta) -> bool {
        self.matches(object)
    }
}
