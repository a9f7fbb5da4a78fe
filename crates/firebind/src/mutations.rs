//! The mutation executor: the fixed set of state mutations the engine
//! commits, and the single entry point that applies them.
//!
//! Indices arrive pre-computed from the orchestrator and are trusted.
//! The executor does no bounds or shape validation of its own; a violated
//! contract (an index out of range, a list op against a scalar slot, an
//! undeclared key) is a programming error and panics.

use crate::record::Record;
use crate::store::{BoundValue, SharedState, StoreState};

// ── Mutation types ──────────────────────────────────────────────────────────

/// Mutation kinds as plain tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    SetScalar,
    InitializeList,
    Add,
    Change,
    Move,
    Remove,
}

impl MutationKind {
    /// Namespaced label for host mutation tables and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::SetScalar => "firebind/SET_SCALAR",
            MutationKind::InitializeList => "firebind/INITIALIZE_LIST",
            MutationKind::Add => "firebind/ADD",
            MutationKind::Change => "firebind/CHANGE",
            MutationKind::Move => "firebind/MOVE",
            MutationKind::Remove => "firebind/REMOVE",
        }
    }
}

/// One state mutation, dispatched exhaustively on its tag.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOp {
    /// Replace the scalar slot wholesale with the record's value.
    SetScalar { record: Record },
    /// Reset the list slot to empty. Idempotent.
    InitializeList,
    /// Insert the record at `index`, shifting later elements right.
    Add { index: usize, record: Record },
    /// Replace the record at `index`.
    Change { index: usize, record: Record },
    /// Remove at `index`, then insert the record at `new_index`, which is
    /// already adjusted for the removal.
    Move {
        index: usize,
        new_index: usize,
        record: Record,
    },
    /// Remove at `index`, shifting later elements left.
    Remove { index: usize },
}

impl MutationOp {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationOp::SetScalar { .. } => MutationKind::SetScalar,
            MutationOp::InitializeList => MutationKind::InitializeList,
            MutationOp::Add { .. } => MutationKind::Add,
            MutationOp::Change { .. } => MutationKind::Change,
            MutationOp::Move { .. } => MutationKind::Move,
            MutationOp::Remove { .. } => MutationKind::Remove,
        }
    }
}

/// Commit payload: the target state tree, the bound key, and the op.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub state: SharedState,
    pub key: String,
    pub op: MutationOp,
}

impl Mutation {
    pub fn new(state: SharedState, key: impl Into<String>, op: MutationOp) -> Self {
        Mutation {
            state,
            key: key.into(),
            op,
        }
    }

    pub fn kind(&self) -> MutationKind {
        self.op.kind()
    }
}

// ── Application ─────────────────────────────────────────────────────────────

/// The single mutation entry point: borrows the state tree mutably and
/// applies the op in place. Synchronous, no return value.
pub fn apply_mutation(mutation: Mutation) {
    let Mutation { state, key, op } = mutation;
    let mut tree = state.borrow_mut();
    apply_to_state(&mut tree, &key, op);
}

/// Applies one op against an already-borrowed state tree. Useful for
/// sinks that hold their own borrow while intercepting commits.
pub fn apply_to_state(state: &mut StoreState, key: &str, op: MutationOp) {
    let kind = op.kind();
    match op {
        MutationOp::SetScalar { record } => {
            *slot_mut(state, key, kind) = BoundValue::Scalar(record.value);
        }
        MutationOp::InitializeList => {
            *slot_mut(state, key, kind) = BoundValue::empty_list();
        }
        MutationOp::Add { index, record } => {
            list_mut(state, key, kind).insert(index, record);
        }
        MutationOp::Change { index, record } => {
            list_mut(state, key, kind)[index] = record;
        }
        MutationOp::Move {
            index,
            new_index,
            record,
        } => {
            let list = list_mut(state, key, kind);
            list.remove(index);
            list.insert(new_index, record);
        }
        MutationOp::Remove { index } => {
            list_mut(state, key, kind).remove(index);
        }
    }
}

fn slot_mut<'a>(state: &'a mut StoreState, key: &str, kind: MutationKind) -> &'a mut BoundValue {
    match state.get_mut(key) {
        Some(slot) => slot,
        None => panic!("{} against undeclared state key '{key}'", kind.as_str()),
    }
}

fn list_mut<'a>(state: &'a mut StoreState, key: &str, kind: MutationKind) -> &'a mut Vec<Record> {
    match slot_mut(state, key, kind).as_list_mut() {
        Some(list) => list,
        None => panic!("{} against non-list state key '{key}'", kind.as_str()),
    }
}
