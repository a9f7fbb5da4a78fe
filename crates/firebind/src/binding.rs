//! The binding orchestrator: wires a remote reference to a bound state
//! key and tears the wiring down again.
//!
//! `bind` validates its inputs, picks the mode from the pre-declared
//! slot shape, subscribes the matching event kinds, and records the
//! result in the registry; `unbind` releases the recorded
//! subscriptions. Rebinding an already-bound key unbinds it first
//! within the same synchronous call, so there is no window in which
//! events are lost or delivered twice.

use crate::index::{index_for_key, insertion_index, move_target};
use crate::mutations::{Mutation, MutationOp};
use crate::record::{create_record, Record};
use crate::registry::{BindingRegistry, SubscriptionSet};
use crate::source::{BindSource, CancelCallback, EventKind, SourceRef};
use crate::store::{BoundValue, SharedSink, SharedState};
use std::rc::Rc;
use thiserror::Error;

/// Synchronous bind/unbind failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// The source did not resolve to a live remote reference.
    #[error("invalid binding source: not a live remote reference")]
    InvalidSource,
    /// The key is not declared on the state tree.
    #[error("cannot bind undefined state key '{0}'; declare it on the state first")]
    UndefinedKeyBinding(String),
    /// Unbind of a key with no active binding.
    #[error("cannot unbind '{0}': key is not bound")]
    NotBound(String),
}

/// Caller-tunable binding options.
#[derive(Clone, Default)]
pub struct BindOptions {
    /// Forwarded to every subscription the bind creates; the remote
    /// source invokes it if it cancels the registration (permission
    /// change, lost connection). The payload is passed through untouched.
    pub cancel_callback: Option<CancelCallback>,
}

/// Binds `key` to `source`: subscribes the mode's event kinds and
/// records the binding under the sink's identity.
///
/// The mode comes from the slot declared at `key`: a list slot
/// subscribes the four child event kinds after synchronously resetting
/// the list, anything else subscribes `value`. A key already bound for
/// this sink is unbound first, within the same call.
pub fn bind(
    registry: &mut BindingRegistry,
    state: &SharedState,
    sink: &SharedSink,
    key: &str,
    source: &dyn BindSource,
    options: BindOptions,
) -> Result<(), BindError> {
    let reference = source.resolve_ref().ok_or(BindError::InvalidSource)?;
    if !state.borrow().contains_key(key) {
        return Err(BindError::UndefinedKeyBinding(key.to_owned()));
    }
    if registry.is_bound(sink.id(), key) {
        unbind(registry, sink, key)?;
    }
    let list_mode = state.borrow().get(key).map_or(false, BoundValue::is_list);
    let listeners = if list_mode {
        bind_as_list(state, sink, key, &reference, &options)
    } else {
        bind_as_scalar(state, sink, key, &reference, &options)
    };
    registry.insert(sink.id(), key, reference, listeners);
    Ok(())
}

/// Releases the subscriptions recorded for `key` and forgets the
/// binding. The last mirrored value stays in state.
pub fn unbind(
    registry: &mut BindingRegistry,
    sink: &SharedSink,
    key: &str,
) -> Result<(), BindError> {
    let (reference, listeners) = registry
        .remove(sink.id(), key)
        .ok_or_else(|| BindError::NotBound(key.to_owned()))?;
    for (event, handle) in listeners {
        reference.off(event, handle);
    }
    Ok(())
}

fn bind_as_scalar(
    state: &SharedState,
    sink: &SharedSink,
    key: &str,
    reference: &SourceRef,
    options: &BindOptions,
) -> SubscriptionSet {
    let st = Rc::clone(state);
    let sk = Rc::clone(sink);
    let k = key.to_owned();
    let handle = reference.on(
        EventKind::Value,
        Box::new(move |snapshot, _prev| {
            sk.commit(Mutation::new(
                Rc::clone(&st),
                k.clone(),
                MutationOp::SetScalar {
                    record: create_record(snapshot),
                },
            ));
        }),
        options.cancel_callback.clone(),
    );
    SubscriptionSet::single(EventKind::Value, handle)
}

fn bind_as_list(
    state: &SharedState,
    sink: &SharedSink,
    key: &str,
    reference: &SourceRef,
    options: &BindOptions,
) -> SubscriptionSet {
    // Reset before any subscription exists, so the first delivered child
    // always lands in a fresh mirror.
    sink.commit(Mutation::new(
        Rc::clone(state),
        key.to_owned(),
        MutationOp::InitializeList,
    ));

    let mut listeners = SubscriptionSet::new();
    let cancel = options.cancel_callback.clone();

    let (st, sk, k) = (Rc::clone(state), Rc::clone(sink), key.to_owned());
    listeners.insert(
        EventKind::ChildAdded,
        reference.on(
            EventKind::ChildAdded,
            Box::new(move |snapshot, prev_key| {
                let record = create_record(snapshot);
                // A re-delivered add for a key already mirrored converges
                // as a content change; position stays with child_moved.
                let op = with_list(&st, &k, |records| {
                    match index_for_key(records, snapshot.key()) {
                        Some(index) => MutationOp::Change { index, record },
                        None => MutationOp::Add {
                            index: insertion_index(records, prev_key),
                            record,
                        },
                    }
                });
                sk.commit(Mutation::new(Rc::clone(&st), k.clone(), op));
            }),
            cancel.clone(),
        ),
    );

    let (st, sk, k) = (Rc::clone(state), Rc::clone(sink), key.to_owned());
    listeners.insert(
        EventKind::ChildRemoved,
        reference.on(
            EventKind::ChildRemoved,
            Box::new(move |snapshot, _prev| {
                // A removal for a key never mirrored is already satisfied.
                let found = with_list(&st, &k, |records| index_for_key(records, snapshot.key()));
                if let Some(index) = found {
                    sk.commit(Mutation::new(
                        Rc::clone(&st),
                        k.clone(),
                        MutationOp::Remove { index },
                    ));
                }
            }),
            cancel.clone(),
        ),
    );

    let (st, sk, k) = (Rc::clone(state), Rc::clone(sink), key.to_owned());
    listeners.insert(
        EventKind::ChildChanged,
        reference.on(
            EventKind::ChildChanged,
            Box::new(move |snapshot, _prev| {
                // A change without a local anchor has no safe position.
                let found = with_list(&st, &k, |records| index_for_key(records, snapshot.key()));
                if let Some(index) = found {
                    sk.commit(Mutation::new(
                        Rc::clone(&st),
                        k.clone(),
                        MutationOp::Change {
                            index,
                            record: create_record(snapshot),
                        },
                    ));
                }
            }),
            cancel.clone(),
        ),
    );

    let (st, sk, k) = (Rc::clone(state), Rc::clone(sink), key.to_owned());
    listeners.insert(
        EventKind::ChildMoved,
        reference.on(
            EventKind::ChildMoved,
            Box::new(move |snapshot, prev_key| {
                let found = with_list(&st, &k, |records| {
                    index_for_key(records, snapshot.key())
                        .map(|index| (index, move_target(records, index, prev_key)))
                });
                if let Some((index, new_index)) = found {
                    sk.commit(Mutation::new(
                        Rc::clone(&st),
                        k.clone(),
                        MutationOp::Move {
                            index,
                            new_index,
                            record: create_record(snapshot),
                        },
                    ));
                }
            }),
            cancel,
        ),
    );

    listeners
}

/// Runs `f` over the current list at `key` under a short immutable
/// borrow, released before any commit takes its own mutable borrow.
fn with_list<R>(state: &SharedState, key: &str, f: impl FnOnce(&[Record]) -> R) -> R {
    let tree = state.borrow();
    let records = tree.get(key).and_then(BoundValue::as_list).unwrap_or(&[]);
    f(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{EventCallback, ListenerHandle, Reference};
    use crate::store::{DirectSink, StoreState};

    struct Detached;

    impl BindSource for Detached {
        fn resolve_ref(&self) -> Option<SourceRef> {
            None
        }
    }

    struct InertRef;

    impl Reference for InertRef {
        fn on(
            &self,
            _event: EventKind,
            _callback: EventCallback,
            _cancel: Option<CancelCallback>,
        ) -> ListenerHandle {
            ListenerHandle::new(1)
        }

        fn off(&self, _event: EventKind, _handle: ListenerHandle) {}
    }

    fn sink() -> SharedSink {
        Rc::new(DirectSink::new())
    }

    #[test]
    fn detached_source_is_invalid() {
        let mut registry = BindingRegistry::new();
        let state = StoreState::new()
            .with("items", BoundValue::empty_list())
            .into_shared();
        let err = bind(
            &mut registry,
            &state,
            &sink(),
            "items",
            &Detached,
            BindOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, BindError::InvalidSource);
        assert!(registry.is_empty());
    }

    #[test]
    fn undeclared_key_is_rejected() {
        let mut registry = BindingRegistry::new();
        let state = StoreState::new().into_shared();
        let source: SourceRef = Rc::new(InertRef);
        let err = bind(
            &mut registry,
            &state,
            &sink(),
            "items",
            &source,
            BindOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, BindError::UndefinedKeyBinding("items".into()));
    }

    #[test]
    fn unbind_requires_a_binding() {
        let mut registry = BindingRegistry::new();
        let err = unbind(&mut registry, &sink(), "items").unwrap_err();
        assert_eq!(err, BindError::NotBound("items".into()));
    }
}
