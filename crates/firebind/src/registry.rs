//! Lifecycle registry: which keys are bound, for which sink, to which
//! reference, with which live subscriptions.

use crate::source::{EventKind, ListenerHandle, SourceRef};
use crate::store::SinkId;
use std::collections::BTreeMap;

/// Live unsubscribe handles for one binding, keyed by event kind.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    handles: BTreeMap<EventKind, ListenerHandle>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-subscription set, the scalar-mode shape.
    pub fn single(event: EventKind, handle: ListenerHandle) -> Self {
        let mut set = Self::new();
        set.insert(event, handle);
        set
    }

    pub fn insert(&mut self, event: EventKind, handle: ListenerHandle) {
        self.handles.insert(event, handle);
    }

    pub fn get(&self, event: EventKind) -> Option<ListenerHandle> {
        self.handles.get(&event).copied()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.handles.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl IntoIterator for SubscriptionSet {
    type Item = (EventKind, ListenerHandle);
    type IntoIter = std::collections::btree_map::IntoIter<EventKind, ListenerHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.handles.into_iter()
    }
}

/// One bound key's bookkeeping. Source and subscriptions live in the same
/// entry, so neither can exist without the other.
struct BoundEntry {
    source: SourceRef,
    listeners: SubscriptionSet,
}

/// Tracks every live binding, grouped by commit sink.
///
/// Explicit and caller-owned; the orchestrator takes it by mutable
/// reference. The sink level is created lazily on first bind and dropped
/// again when its last key unbinds.
#[derive(Default)]
pub struct BindingRegistry {
    sinks: BTreeMap<SinkId, BTreeMap<String, BoundEntry>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, sink: SinkId, key: &str) -> bool {
        self.sinks
            .get(&sink)
            .map_or(false, |keys| keys.contains_key(key))
    }

    /// Bound keys of one sink, in key order.
    pub fn bound_keys(&self, sink: SinkId) -> Vec<&str> {
        self.sinks
            .get(&sink)
            .map(|keys| keys.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub(crate) fn insert(
        &mut self,
        sink: SinkId,
        key: &str,
        source: SourceRef,
        listeners: SubscriptionSet,
    ) {
        self.sinks
            .entry(sink)
            .or_default()
            .insert(key.to_owned(), BoundEntry { source, listeners });
    }

    pub(crate) fn remove(
        &mut self,
        sink: SinkId,
        key: &str,
    ) -> Option<(SourceRef, SubscriptionSet)> {
        let keys = self.sinks.get_mut(&sink)?;
        let entry = keys.remove(key)?;
        if keys.is_empty() {
            self.sinks.remove(&sink);
        }
        Some((entry.source, entry.listeners))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CancelCallback, EventCallback, Reference};
    use std::rc::Rc;

    struct NullRef;

    impl Reference for NullRef {
        fn on(
            &self,
            _event: EventKind,
            _callback: EventCallback,
            _cancel: Option<CancelCallback>,
        ) -> ListenerHandle {
            ListenerHandle::new(0)
        }

        fn off(&self, _event: EventKind, _handle: ListenerHandle) {}
    }

    fn source() -> SourceRef {
        Rc::new(NullRef)
    }

    #[test]
    fn insert_then_remove_round_trips_the_entry() {
        let mut registry = BindingRegistry::new();
        let sink = SinkId::next();
        let set = SubscriptionSet::single(EventKind::Value, ListenerHandle::new(7));
        registry.insert(sink, "profile", source(), set);

        assert!(registry.is_bound(sink, "profile"));
        let (_source, listeners) = registry.remove(sink, "profile").unwrap();
        assert_eq!(listeners.get(EventKind::Value), Some(ListenerHandle::new(7)));
        assert!(!registry.is_bound(sink, "profile"));
    }

    #[test]
    fn sink_level_is_dropped_with_its_last_key() {
        let mut registry = BindingRegistry::new();
        let sink = SinkId::next();
        registry.insert(sink, "a", source(), SubscriptionSet::new());
        registry.insert(sink, "b", source(), SubscriptionSet::new());

        registry.remove(sink, "a");
        assert!(!registry.is_empty());
        registry.remove(sink, "b");
        assert!(registry.is_empty(), "empty sink must not linger");
    }

    #[test]
    fn sinks_do_not_share_entries() {
        let mut registry = BindingRegistry::new();
        let first = SinkId::next();
        let second = SinkId::next();
        registry.insert(first, "items", source(), SubscriptionSet::new());

        assert!(registry.is_bound(first, "items"));
        assert!(!registry.is_bound(second, "items"));
        assert_eq!(registry.bound_keys(second), Vec::<&str>::new());
    }

    #[test]
    fn bound_keys_are_sorted() {
        let mut registry = BindingRegistry::new();
        let sink = SinkId::next();
        registry.insert(sink, "b", source(), SubscriptionSet::new());
        registry.insert(sink, "a", source(), SubscriptionSet::new());
        assert_eq!(registry.bound_keys(sink), ["a", "b"]);
    }

    #[test]
    fn remove_of_unbound_key_is_none() {
        let mut registry = BindingRegistry::new();
        assert!(registry.remove(SinkId::next(), "ghost").is_none());
    }
}
