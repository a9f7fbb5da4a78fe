//! Mirror a realtime database reference into local store state.
//!
//! The engine classifies each bound state key as scalar or list shaped,
//! subscribes to the matching remote event kinds, and maintains the
//! local mirror through a single mutation-commit entry point. Bindings
//! are tracked per commit sink and released without leaking listeners.
//!
//! # Example
//!
//! ```
//! use firebind::{
//!     bind, BindOptions, BindingRegistry, BoundValue, DirectSink, SharedSink, StoreState,
//! };
//! use firebind_memory::MemoryDb;
//! use serde_json::json;
//! use std::rc::Rc;
//!
//! let db = MemoryDb::new();
//! let items = db.reference("items");
//! items.push(json!({"title": "first"}));
//!
//! let state = StoreState::new()
//!     .with("items", BoundValue::empty_list())
//!     .into_shared();
//! let sink: SharedSink = Rc::new(DirectSink::new());
//! let mut registry = BindingRegistry::new();
//!
//! bind(&mut registry, &state, &sink, "items", &items, BindOptions::default()).unwrap();
//!
//! let json = state.borrow().to_json();
//! assert_eq!(json["items"][0]["title"], json!("first"));
//! ```

pub mod action;
pub mod binding;
pub mod index;
pub mod mutations;
pub mod record;
pub mod registry;
pub mod source;
pub mod store;

pub use action::{with_bindings, ActionContext};
pub use binding::{bind, unbind, BindError, BindOptions};
pub use index::{index_for_key, insertion_index, move_target};
pub use mutations::{apply_mutation, apply_to_state, Mutation, MutationKind, MutationOp};
pub use record::{create_record, Record, RECORD_KEY_FIELD};
pub use registry::{BindingRegistry, SubscriptionSet};
pub use source::{
    BindSource, CancelCallback, EventCallback, EventKind, ListenerHandle, Reference,
    RemoteCancelled, Snapshot, SourceRef,
};
pub use store::{BoundValue, CommitSink, DirectSink, SharedSink, SharedState, SinkId, StoreState};
