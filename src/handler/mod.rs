//! # Handlers: mapping watch events to reconcile keys.
//!
//! A [`Handler`] is a pure function from a [`WatchEvent`] to zero or more [`Request`]s.
//! It runs inside the source's delivery path and must not block.
//!
//! | Handler | Keys produced |
//! |---------|---------------|
//! | [`EnqueueRequestForObject`] | the object itself (the new state for updates) |
//! | [`EnqueueRequestForOwner`] | owners of the object with a matching kind |
//! | [`EnqueueRequestsFromMapFunc`] | whatever the closure returns |
//!
//! For updates, the owner and map-func handlers consider both the old and the new object,
//! so a key whose relationship was just removed still gets one last reconcile.

use crate::reconcile::Request;
use crate::source::{ObjectMeta, WatchEvent};

/// Maps an event to the keys that must be reconciled.
pub trait Handler: Send + Sync + 'static {
    /// Keys to enqueue for `event`; duplicates are harmless (the queue coalesces).
    fn map(&self, event: &WatchEvent) -> Vec<Request>;
}

/// Enqueues the object the event is about.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueRequestForObject;

impl Handler for EnqueueRequestForObject {
    fn map(&self, event: &WatchEvent) -> Vec<Request> {
        vec![Request::from(event.object())]
    }
}

/// Enqueues the owners of the object whose kind matches `owner_kind`.
#[derive(Debug, Clone)]
pub struct EnqueueRequestForOwner {
    owner_kind: String,
    only_controller: bool,
}

impl EnqueueRequestForOwner {
    /// Matches every owner reference of kind `owner_kind`.
    pub fn new(owner_kind: impl Into<String>) -> Self {
        Self {
            owner_kind: owner_kind.into(),
            only_controller: false,
        }
    }

    /// Restricts matches to the managing controller reference.
    #[must_use]
    pub fn only_controller(mut self) -> Self {
        self.only_controller = true;
        self
    }

    fn owners(&self, obj: &ObjectMeta, out: &mut Vec<Request>) {
        let matching = obj
            .owner_references
            .iter()
            .filter(|o| o.kind == self.owner_kind)
            .filter(|o| !self.only_controller || o.controller);
        for owner in matching {
            push_unique(out, Request::new(obj.namespace.clone(), owner.name.clone()));
        }
    }
}

impl Handler for EnqueueRequestForOwner {
    fn map(&self, event: &WatchEvent) -> Vec<Request> {
        let mut out = Vec::new();
        for obj in objects(event) {
            self.owners(obj, &mut out);
        }
        out
    }
}

/// Enqueues the keys computed by a closure.
///
/// ```rust
/// use ctrlvisor::{EnqueueRequestsFromMapFunc, ObjectMeta, Request};
///
/// // Every object in a namespace triggers the namespace's "config" object.
/// let handler = EnqueueRequestsFromMapFunc::new(|obj: &ObjectMeta| {
///     vec![Request::new(obj.namespace.clone(), "config")]
/// });
/// # let _ = handler;
/// ```
pub struct EnqueueRequestsFromMapFunc<F> {
    f: F,
}

impl<F> EnqueueRequestsFromMapFunc<F>
where
    F: Fn(&ObjectMeta) -> Vec<Request> + Send + Sync + 'static,
{
    /// Wraps the mapping closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Handler for EnqueueRequestsFromMapFunc<F>
where
    F: Fn(&ObjectMeta) -> Vec<Request> + Send + Sync + 'static,
{
    fn map(&self, event: &WatchEvent) -> Vec<Request> {
        let mut out = Vec::new();
        for obj in objects(event) {
            for req in (self.f)(obj) {
                push_unique(&mut out, req);
            }
        }
        out
    }
}

fn objects(event: &WatchEvent) -> Vec<&ObjectMeta> {
    match event {
        WatchEvent::Update { old, new } => vec![old, new],
        other => vec![other.object()],
    }
}

fn push_unique(out: &mut Vec<Request>, req: Request) {
    if !out.contains(&req) {
        out.push(req);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::OwnerReference;

    #[test]
    fn object_handler_uses_new_state_on_update() {
        let ev = WatchEvent::Update {
            old: ObjectMeta::new("ns", "a"),
            new: ObjectMeta::new("ns", "a").with_generation(2),
        };
        assert_eq!(EnqueueRequestForObject.map(&ev), vec![Request::new("ns", "a")]);
    }

    #[test]
    fn owner_handler_filters_by_kind_and_controller() {
        let pod = ObjectMeta::new("ns", "web-abc")
            .with_owner(OwnerReference::controller("ReplicaSet", "web"))
            .with_owner(OwnerReference::new("ReplicaSet", "legacy"))
            .with_owner(OwnerReference::new("Node", "n1"));
        let ev = WatchEvent::Create { object: pod };

        let all = EnqueueRequestForOwner::new("ReplicaSet").map(&ev);
        assert_eq!(all, vec![Request::new("ns", "web"), Request::new("ns", "legacy")]);

        let ctrl = EnqueueRequestForOwner::new("ReplicaSet").only_controller().map(&ev);
        assert_eq!(ctrl, vec![Request::new("ns", "web")]);
    }

    #[test]
    fn owner_handler_sees_removed_owner_on_update() {
        let old = ObjectMeta::new("ns", "pod").with_owner(OwnerReference::new("Job", "old-job"));
        let new = ObjectMeta::new("ns", "pod").with_owner(OwnerReference::new("Job", "new-job"));
        let keys = EnqueueRequestForOwner::new("Job").map(&WatchEvent::Update { old, new });
        assert_eq!(keys, vec![Request::new("ns", "old-job"), Request::new("ns", "new-job")]);
    }

    #[test]
    fn map_func_dedups_keys() {
        let h = EnqueueRequestsFromMapFunc::new(|o: &ObjectMeta| vec![Request::new(o.namespace.clone(), "cfg")]);
        let ev = WatchEvent::Update {
            old: ObjectMeta::new("ns", "a"),
            new: ObjectMeta::new("ns", "a"),
        };
        assert_eq!(h.map(&ev), vec![Request::new("ns", "cfg")]);
        let deleted = WatchEvent::Delete {
            object: ObjectMeta::new("other", "b"),
        };
        assert_eq!(h.map(&deleted), vec![Request::new("other", "cfg")]);
    }
}
