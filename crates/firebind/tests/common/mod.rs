#![allow(dead_code)]

use firebind::{
    apply_mutation, BoundValue, CommitSink, Mutation, MutationKind, SharedSink, SharedState,
    SinkId, StoreState,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Log of committed mutation kinds, shared with the test body.
pub type KindLog = Rc<RefCell<Vec<MutationKind>>>;

/// Sink that records each committed mutation kind, then applies it.
pub struct RecordingSink {
    id: SinkId,
    log: KindLog,
}

impl RecordingSink {
    pub fn new() -> (SharedSink, KindLog) {
        let log: KindLog = Rc::new(RefCell::new(Vec::new()));
        let sink = RecordingSink {
            id: SinkId::next(),
            log: Rc::clone(&log),
        };
        (Rc::new(sink), log)
    }
}

impl CommitSink for RecordingSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn commit(&self, mutation: Mutation) {
        self.log.borrow_mut().push(mutation.kind());
        apply_mutation(mutation);
    }
}

/// Store with one list-shaped key.
pub fn list_state(key: &str) -> SharedState {
    StoreState::new()
        .with(key, BoundValue::empty_list())
        .into_shared()
}

/// Store with one scalar-shaped key.
pub fn scalar_state(key: &str) -> SharedState {
    StoreState::new().with(key, BoundValue::null()).into_shared()
}

/// Keys of the mirrored list at `key`, in order.
pub fn mirrored_keys(state: &SharedState, key: &str) -> Vec<String> {
    state
        .borrow()
        .get(key)
        .and_then(BoundValue::as_list)
        .map(|records| records.iter().map(|r| r.key.clone()).collect())
        .unwrap_or_default()
}
