//! # Watched objects and change events.
//!
//! [`ObjectMeta`] is the slice of an object the control loop cares about: identity,
//! generation, labels and owners. [`WatchEvent`] is what a source observes.

use std::collections::BTreeMap;

/// Reference from an object to the object that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReference {
    /// Kind of the owner (e.g. `ReplicaSet`).
    pub kind: String,
    /// Name of the owner; owners live in the same namespace as the owned object.
    pub name: String,
    /// True if the owner is the managing controller.
    pub controller: bool,
}

impl OwnerReference {
    /// Plain owner reference.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            controller: false,
        }
    }

    /// Owner reference flagged as the managing controller.
    pub fn controller(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            controller: true,
            ..Self::new(kind, name)
        }
    }
}

/// Object metadata carried by watch events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Namespace (empty for cluster-scoped objects).
    pub namespace: String,
    /// Object name.
    pub name: String,
    /// Generation of the desired state; status-only writes leave it unchanged.
    pub generation: i64,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Owners of this object.
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Creates metadata for a namespaced object.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the generation.
    #[must_use]
    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = generation;
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an owner reference.
    #[must_use]
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner_references.push(owner);
        self
    }
}

/// A change observed by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Object was created.
    Create {
        /// The new object.
        object: ObjectMeta,
    },
    /// Object was updated.
    Update {
        /// State before the update.
        old: ObjectMeta,
        /// State after the update.
        new: ObjectMeta,
    },
    /// Object was deleted.
    Delete {
        /// Last known state.
        object: ObjectMeta,
    },
    /// Anything else (external triggers, periodic resyncs).
    Generic {
        /// Object the trigger refers to.
        object: ObjectMeta,
    },
}

impl WatchEvent {
    /// Generic event for `object`.
    pub fn generic(object: ObjectMeta) -> Self {
        WatchEvent::Generic { object }
    }

    /// The object the event is about (the new state for updates).
    pub fn object(&self) -> &ObjectMeta {
        match self {
            WatchEvent::Create { object }
            | WatchEvent::Delete { object }
            | WatchEvent::Generic { object } => object,
            WatchEvent::Update { new, .. } => new,
        }
    }

    /// Stable snake_case label of the event type.
    pub fn as_label(&self) -> &'static str {
        match self {
            WatchEvent::Create { .. } => "create",
            WatchEvent::Update { .. } => "update",
            WatchEvent::Delete { .. } => "delete",
            WatchEvent::Generic { .. } => "generic",
        }
    }
}
