//! Local store collaborator: the bindable state tree and the commit sink
//! every mutation flows through.

use crate::mutations::{apply_mutation, Mutation};
use crate::record::Record;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

// ── State tree ──────────────────────────────────────────────────────────────

/// The slot at one bound state key.
///
/// The shape is declared by the caller before binding and never changed
/// by mutations: scalar slots are whole-value replaced on each value
/// event, list slots hold the ordered mirror of the remote children.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Scalar(Value),
    List(Vec<Record>),
}

impl BoundValue {
    /// Scalar slot holding `null`, the usual pre-bind declaration.
    pub fn null() -> Self {
        BoundValue::Scalar(Value::Null)
    }

    /// Empty list slot, the pre-bind declaration for list mode.
    pub fn empty_list() -> Self {
        BoundValue::List(Vec::new())
    }

    /// The one mode predicate: list slots bind in list mode, everything
    /// else binds in scalar mode.
    pub fn is_list(&self) -> bool {
        matches!(self, BoundValue::List(_))
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            BoundValue::Scalar(v) => Some(v),
            BoundValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Record]> {
        match self {
            BoundValue::List(records) => Some(records),
            BoundValue::Scalar(_) => None,
        }
    }

    pub(crate) fn as_list_mut(&mut self) -> Option<&mut Vec<Record>> {
        match self {
            BoundValue::List(records) => Some(records),
            BoundValue::Scalar(_) => None,
        }
    }

    /// JSON projection: list slots flatten to arrays of record values.
    pub fn to_json(&self) -> Value {
        match self {
            BoundValue::Scalar(v) => v.clone(),
            BoundValue::List(records) => {
                Value::Array(records.iter().map(|r| r.value.clone()).collect())
            }
        }
    }
}

/// One store's bindable state tree: declared keys to their slots, kept
/// in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    slots: IndexMap<String, BoundValue>,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `key` with its initial shape. Binding reads the mode
    /// from this slot, so declare before binding.
    pub fn declare(&mut self, key: impl Into<String>, initial: BoundValue) {
        self.slots.insert(key.into(), initial);
    }

    /// Builder-style [`StoreState::declare`].
    pub fn with(mut self, key: impl Into<String>, initial: BoundValue) -> Self {
        self.declare(key, initial);
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&BoundValue> {
        self.slots.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut BoundValue> {
        self.slots.get_mut(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// JSON projection of the whole tree.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, slot) in &self.slots {
            map.insert(key.clone(), slot.to_json());
        }
        Value::Object(map)
    }

    /// Wraps the tree in the shared handle bindings work against.
    pub fn into_shared(self) -> SharedState {
        Rc::new(RefCell::new(self))
    }
}

/// Shared handle to one store's state tree.
pub type SharedState = Rc<RefCell<StoreState>>;

// ── Commit sink ─────────────────────────────────────────────────────────────

/// Opaque identity of one mutation destination. Bindings are grouped by
/// it in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkId(u64);

impl SinkId {
    /// Mints a process-unique identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SinkId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Destination for engine-issued mutations: one store instance.
///
/// The engine writes state exclusively through [`CommitSink::commit`].
/// Implementations route every mutation to [`apply_mutation`], usually
/// after their own bookkeeping (reactivity hooks, logging, devtools).
pub trait CommitSink {
    /// Stable identity grouping this sink's bindings.
    fn id(&self) -> SinkId;

    /// The single mutation entry point.
    fn commit(&self, mutation: Mutation);
}

/// Shared handle to a commit sink.
pub type SharedSink = Rc<dyn CommitSink>;

/// Minimal sink: applies every mutation directly, no interception.
#[derive(Debug)]
pub struct DirectSink {
    id: SinkId,
}

impl DirectSink {
    pub fn new() -> Self {
        DirectSink { id: SinkId::next() }
    }
}

impl Default for DirectSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitSink for DirectSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn commit(&self, mutation: Mutation) {
        apply_mutation(mutation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mode_predicate() {
        assert!(BoundValue::empty_list().is_list());
        assert!(!BoundValue::null().is_list());
        assert!(!BoundValue::Scalar(json!({"a": 1})).is_list());
        assert!(!BoundValue::Scalar(json!([1, 2])).is_list());
    }

    #[test]
    fn list_projection_flattens_record_values() {
        let slot = BoundValue::List(vec![
            Record::new("k1", json!({"n": 1, ".key": "k1"})),
            Record::new("k2", json!(7)),
        ]);
        assert_eq!(slot.to_json(), json!([{"n": 1, ".key": "k1"}, 7]));
    }

    #[test]
    fn state_projection_keeps_declaration_order() {
        let state = StoreState::new()
            .with("items", BoundValue::empty_list())
            .with("profile", BoundValue::null());
        let json = state.to_json();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["items", "profile"]);
        assert_eq!(json, json!({"items": [], "profile": null}));
    }

    #[test]
    fn sink_ids_are_unique() {
        let a = SinkId::next();
        let b = SinkId::next();
        assert_ne!(a, b);
    }
}
