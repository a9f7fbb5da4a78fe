//! Remote-source interface: snapshots, event kinds, and the reference
//! contract the binding engine subscribes through.

use serde_json::Value;
use std::rc::Rc;
use thiserror::Error;

// ── Events ──────────────────────────────────────────────────────────────────

/// Event kinds a remote reference can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Value,
    ChildAdded,
    ChildRemoved,
    ChildChanged,
    ChildMoved,
}

impl EventKind {
    /// Wire name of the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Value => "value",
            EventKind::ChildAdded => "child_added",
            EventKind::ChildRemoved => "child_removed",
            EventKind::ChildChanged => "child_changed",
            EventKind::ChildMoved => "child_moved",
        }
    }
}

/// One immutable view of a remote node, delivered with an event.
///
/// Snapshots are plain data: the node's child key and its JSON value at
/// event time. A snapshot taken later does not observe later writes.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    key: String,
    value: Value,
}

impl Snapshot {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Snapshot {
            key: key.into(),
            value,
        }
    }

    /// Child key of the node this snapshot describes.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Child snapshots in the value's own field order. Empty for
    /// non-object values.
    pub fn children(&self) -> Vec<Snapshot> {
        match &self.value {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Snapshot::new(k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ── Subscription contract ───────────────────────────────────────────────────

/// Opaque unsubscribe token minted by a [`Reference`] on subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    pub fn new(raw: u64) -> Self {
        ListenerHandle(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Asynchronous cancellation notice from the remote source, e.g. a
/// permission change or a lost connection. Delivered through the cancel
/// callback a binding was created with, never as a synchronous error.
/// The engine forwards it without interpreting the payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote source cancelled: {reason}")]
pub struct RemoteCancelled {
    pub reason: String,
}

impl RemoteCancelled {
    pub fn new(reason: impl Into<String>) -> Self {
        RemoteCancelled {
            reason: reason.into(),
        }
    }
}

/// Event delivery callback. Child events carry the preceding sibling key
/// in remote order (`None` = first position); value events always pass
/// `None`.
pub type EventCallback = Box<dyn FnMut(&Snapshot, Option<&str>)>;

/// Cancellation callback, shared by every subscription of one binding.
pub type CancelCallback = Rc<dyn Fn(&RemoteCancelled)>;

/// Shared handle to a live remote reference.
pub type SourceRef = Rc<dyn Reference>;

/// Subscription surface of a remote node.
///
/// Implementations deliver events serially, one callback at a time, and
/// keep a registration live until [`Reference::off`] is called with its
/// handle or the source cancels it.
pub trait Reference {
    /// Registers `callback` for `event` and returns the handle that
    /// releases the registration.
    fn on(
        &self,
        event: EventKind,
        callback: EventCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerHandle;

    /// Releases a registration. Unknown handles are ignored.
    fn off(&self, event: EventKind, handle: ListenerHandle);
}

/// Anything `bind` accepts as a source: resolves to the reference it
/// wraps. `None` means the underlying reference is gone (a closed or
/// detached handle), which `bind` reports as an invalid source.
pub trait BindSource {
    fn resolve_ref(&self) -> Option<SourceRef>;
}

impl BindSource for SourceRef {
    fn resolve_ref(&self) -> Option<SourceRef> {
        Some(Rc::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_kind_wire_names() {
        assert_eq!(EventKind::Value.as_str(), "value");
        assert_eq!(EventKind::ChildAdded.as_str(), "child_added");
        assert_eq!(EventKind::ChildRemoved.as_str(), "child_removed");
        assert_eq!(EventKind::ChildChanged.as_str(), "child_changed");
        assert_eq!(EventKind::ChildMoved.as_str(), "child_moved");
    }

    #[test]
    fn snapshot_children_follow_field_order() {
        let snap = Snapshot::new("users", json!({"b": 1, "a": 2, "c": 3}));
        let children = snap.children();
        let keys: Vec<&str> = children.iter().map(|c| c.key()).collect();
        assert_eq!(keys, ["b", "a", "c"], "children must keep field order");
        assert_eq!(children[1].value(), &json!(2));
    }

    #[test]
    fn snapshot_children_empty_for_leaf_values() {
        assert!(Snapshot::new("n", json!(42)).children().is_empty());
        assert!(Snapshot::new("n", json!([1, 2])).children().is_empty());
        assert!(Snapshot::new("n", Value::Null).children().is_empty());
    }
}
