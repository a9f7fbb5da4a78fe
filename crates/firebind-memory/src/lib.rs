//! In-memory realtime database for firebind: path-addressed nodes with
//! ordered children, delivering the engine's event kinds through a FIFO
//! queue.
//!
//! Two delivery modes: [`MemoryDb::new`] flushes the queue after every
//! write, so events and subscription backfills arrive immediately;
//! [`MemoryDb::manual`] holds them until [`MemoryDb::flush`]. Either way
//! delivery is serialized: one callback at a time, in enqueue order.
//!
//! Delivery rules:
//!
//! - subscribing to `value` or `child_added` enqueues an initial
//!   backfill targeted at the new listener only (the current node value,
//!   or one `child_added` per existing child with the proper
//!   previous-key chain);
//! - broadcast events reach only listeners registered before the event
//!   was enqueued, so a late subscriber never sees an event twice
//!   (backfill covers its past);
//! - every child write also notifies `value` listeners with the updated
//!   node snapshot;
//! - [`MemoryRef::revoke`] fires each registration's cancel callback
//!   once and drops the registrations.

use firebind::{
    BindSource, CancelCallback, EventCallback, EventKind, ListenerHandle, Reference,
    RemoteCancelled, Snapshot, SourceRef,
};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

// ── Node table ──────────────────────────────────────────────────────────────

struct Listener {
    id: u64,
    reg_seq: u64,
    callback: Rc<RefCell<EventCallback>>,
    cancel: Option<CancelCallback>,
}

#[derive(Default)]
struct Node {
    children: Vec<(String, Value)>,
    scalar: Option<Value>,
    listeners: BTreeMap<EventKind, Vec<Listener>>,
}

impl Node {
    /// Current node value: the object of its children in order, or the
    /// scalar content for leaf nodes.
    fn value(&self) -> Value {
        if !self.children.is_empty() {
            let mut map = Map::new();
            for (k, v) in &self.children {
                map.insert(k.clone(), v.clone());
            }
            Value::Object(map)
        } else {
            self.scalar.clone().unwrap_or(Value::Null)
        }
    }
}

enum Delivery {
    Event {
        seq: u64,
        path: String,
        kind: EventKind,
        /// Targeted backfill for one listener; `None` broadcasts.
        only: Option<u64>,
        snapshot: Snapshot,
        prev_key: Option<String>,
    },
    Cancel {
        path: String,
        notice: RemoteCancelled,
    },
}

struct DbInner {
    nodes: BTreeMap<String, Node>,
    queue: VecDeque<Delivery>,
    auto_flush: bool,
    flushing: bool,
    next_listener: u64,
    next_seq: u64,
    next_push: u64,
}

fn key_of_path(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn enqueue(
    inner: &mut DbInner,
    path: &str,
    kind: EventKind,
    only: Option<u64>,
    snapshot: Snapshot,
    prev_key: Option<String>,
) {
    let seq = inner.next_seq;
    inner.next_seq += 1;
    inner.queue.push_back(Delivery::Event {
        seq,
        path: path.to_owned(),
        kind,
        only,
        snapshot,
        prev_key,
    });
}

fn enqueue_value(inner: &mut DbInner, path: &str, node_value: Value) {
    let snapshot = Snapshot::new(key_of_path(path).to_owned(), node_value);
    enqueue(inner, path, EventKind::Value, None, snapshot, None);
}

fn flush_queue(inner: &Rc<RefCell<DbInner>>) {
    {
        let mut guard = inner.borrow_mut();
        if guard.flushing {
            // a flush higher up the stack will drain what we enqueued
            return;
        }
        guard.flushing = true;
    }
    loop {
        let next = { inner.borrow_mut().queue.pop_front() };
        match next {
            Some(delivery) => dispatch(inner, delivery),
            None => break,
        }
    }
    inner.borrow_mut().flushing = false;
}

fn dispatch(inner: &Rc<RefCell<DbInner>>, delivery: Delivery) {
    match delivery {
        Delivery::Event {
            seq,
            path,
            kind,
            only,
            snapshot,
            prev_key,
        } => {
            // Snapshot the target callbacks first; listeners may be
            // added or removed from inside a callback.
            let targets: Vec<Rc<RefCell<EventCallback>>> = {
                let guard = inner.borrow();
                guard
                    .nodes
                    .get(&path)
                    .and_then(|node| node.listeners.get(&kind))
                    .map(|listeners| {
                        listeners
                            .iter()
                            .filter(|l| match only {
                                Some(id) => l.id == id,
                                None => l.reg_seq < seq,
                            })
                            .map(|l| Rc::clone(&l.callback))
                            .collect()
                    })
                    .unwrap_or_default()
            };
            for callback in targets {
                let mut cb = callback.borrow_mut();
                (&mut **cb)(&snapshot, prev_key.as_deref());
            }
        }
        Delivery::Cancel { path, notice } => {
            let cancels: Vec<CancelCallback> = {
                let mut guard = inner.borrow_mut();
                match guard.nodes.get_mut(&path) {
                    Some(node) => {
                        let mut collected = Vec::new();
                        for listeners in node.listeners.values_mut() {
                            for listener in listeners.drain(..) {
                                if let Some(cancel) = listener.cancel {
                                    collected.push(cancel);
                                }
                            }
                        }
                        collected
                    }
                    None => Vec::new(),
                }
            };
            for cancel in cancels {
                cancel(&notice);
            }
        }
    }
}

// ── Public handles ──────────────────────────────────────────────────────────

/// In-memory realtime database. Handles cloned out of it share one node
/// table and one delivery queue.
#[derive(Clone)]
pub struct MemoryDb {
    inner: Rc<RefCell<DbInner>>,
}

impl MemoryDb {
    /// Database that flushes deliveries after every write.
    pub fn new() -> Self {
        Self::with_mode(true)
    }

    /// Database that queues deliveries until [`MemoryDb::flush`].
    pub fn manual() -> Self {
        Self::with_mode(false)
    }

    fn with_mode(auto_flush: bool) -> Self {
        MemoryDb {
            inner: Rc::new(RefCell::new(DbInner {
                nodes: BTreeMap::new(),
                queue: VecDeque::new(),
                auto_flush,
                flushing: false,
                next_listener: 1,
                next_seq: 1,
                next_push: 1,
            })),
        }
    }

    /// Handle to the node at `path`, created lazily.
    pub fn reference(&self, path: &str) -> MemoryRef {
        self.inner
            .borrow_mut()
            .nodes
            .entry(path.to_owned())
            .or_default();
        MemoryRef {
            inner: Rc::clone(&self.inner),
            path: path.to_owned(),
        }
    }

    /// Delivers every queued event, in order.
    pub fn flush(&self) {
        flush_queue(&self.inner);
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one node: write operations plus the subscription contract
/// the binding engine consumes.
#[derive(Clone)]
pub struct MemoryRef {
    inner: Rc<RefCell<DbInner>>,
    path: String,
}

impl MemoryRef {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Node key: the last path segment.
    pub fn key(&self) -> &str {
        key_of_path(&self.path)
    }

    /// Appends a child under a generated key and returns the key.
    /// Generated keys sort in creation order.
    pub fn push(&self, value: Value) -> String {
        let key = {
            let mut guard = self.inner.borrow_mut();
            let n = guard.next_push;
            guard.next_push += 1;
            format!("k{n:06}")
        };
        self.set_child(&key, value);
        key
    }

    /// Appends a new child, or changes an existing one in place.
    pub fn set_child(&self, key: &str, value: Value) {
        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let node = inner.nodes.entry(self.path.clone()).or_default();
            let pos = node.children.iter().position(|(k, _)| k == key);
            match pos {
                Some(i) => {
                    node.children[i].1 = value.clone();
                    let prev = if i == 0 {
                        None
                    } else {
                        Some(node.children[i - 1].0.clone())
                    };
                    let node_value = node.value();
                    enqueue(
                        inner,
                        &self.path,
                        EventKind::ChildChanged,
                        None,
                        Snapshot::new(key.to_owned(), value),
                        prev,
                    );
                    enqueue_value(inner, &self.path, node_value);
                }
                None => {
                    let prev = node.children.last().map(|(k, _)| k.clone());
                    node.children.push((key.to_owned(), value.clone()));
                    let node_value = node.value();
                    enqueue(
                        inner,
                        &self.path,
                        EventKind::ChildAdded,
                        None,
                        Snapshot::new(key.to_owned(), value),
                        prev,
                    );
                    enqueue_value(inner, &self.path, node_value);
                }
            }
        }
        self.maybe_flush();
    }

    /// Inserts a new child right after `prev` (`None` puts it first).
    /// An existing key falls back to [`MemoryRef::set_child`].
    pub fn insert_after(&self, key: &str, value: Value, prev: Option<&str>) {
        let exists = {
            let guard = self.inner.borrow();
            guard
                .nodes
                .get(&self.path)
                .map_or(false, |n| n.children.iter().any(|(k, _)| k == key))
        };
        if exists {
            self.set_child(key, value);
            return;
        }
        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let node = inner.nodes.entry(self.path.clone()).or_default();
            let at = match prev {
                Some(p) => node
                    .children
                    .iter()
                    .position(|(k, _)| k == p)
                    .map(|i| i + 1)
                    .unwrap_or(0),
                None => 0,
            };
            node.children.insert(at, (key.to_owned(), value.clone()));
            let node_value = node.value();
            enqueue(
                inner,
                &self.path,
                EventKind::ChildAdded,
                None,
                Snapshot::new(key.to_owned(), value),
                prev.map(str::to_owned),
            );
            enqueue_value(inner, &self.path, node_value);
        }
        self.maybe_flush();
    }

    /// Removes a child; unknown keys are a silent no-op.
    pub fn remove_child(&self, key: &str) {
        let removed = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let node = inner.nodes.entry(self.path.clone()).or_default();
            let pos = node.children.iter().position(|(k, _)| k == key);
            match pos {
                Some(i) => {
                    let (k, v) = node.children.remove(i);
                    let node_value = node.value();
                    enqueue(
                        inner,
                        &self.path,
                        EventKind::ChildRemoved,
                        None,
                        Snapshot::new(k, v),
                        None,
                    );
                    enqueue_value(inner, &self.path, node_value);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.maybe_flush();
        }
    }

    /// Repositions a child right after `after` (`None` puts it first).
    /// The emitted event carries the new preceding sibling key.
    pub fn move_child(&self, key: &str, after: Option<&str>) {
        let moved = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let node = inner.nodes.entry(self.path.clone()).or_default();
            let pos = node.children.iter().position(|(k, _)| k == key);
            match pos {
                Some(i) => {
                    let (k, v) = node.children.remove(i);
                    let at = match after {
                        Some(p) => node
                            .children
                            .iter()
                            .position(|(ck, _)| ck == p)
                            .map(|j| j + 1)
                            .unwrap_or(0),
                        None => 0,
                    };
                    node.children.insert(at, (k.clone(), v.clone()));
                    let node_value = node.value();
                    enqueue(
                        inner,
                        &self.path,
                        EventKind::ChildMoved,
                        None,
                        Snapshot::new(k, v),
                        after.map(str::to_owned),
                    );
                    enqueue_value(inner, &self.path, node_value);
                    true
                }
                None => false,
            }
        };
        if moved {
            self.maybe_flush();
        }
    }

    /// Replaces the node wholesale and notifies value listeners. Child
    /// listeners only track the child_* operations.
    pub fn set_value(&self, value: Value) {
        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let node = inner.nodes.entry(self.path.clone()).or_default();
            match &value {
                Value::Object(map) => {
                    node.children = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    node.scalar = None;
                }
                other => {
                    node.children.clear();
                    node.scalar = Some(other.clone());
                }
            }
            let node_value = node.value();
            enqueue_value(inner, &self.path, node_value);
        }
        self.maybe_flush();
    }

    /// Enqueues a raw child event without touching stored children. Lets
    /// tests exercise stream-consistency handling in consumers.
    pub fn emit_child_event(&self, kind: EventKind, key: &str, value: Value, prev: Option<&str>) {
        {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            enqueue(
                inner,
                &self.path,
                kind,
                None,
                Snapshot::new(key.to_owned(), value),
                prev.map(str::to_owned),
            );
        }
        self.maybe_flush();
    }

    /// Cancels every subscription at this node: each registration's
    /// cancel callback fires once, then the registration is dropped.
    pub fn revoke(&self, reason: &str) {
        {
            let mut guard = self.inner.borrow_mut();
            guard.queue.push_back(Delivery::Cancel {
                path: self.path.clone(),
                notice: RemoteCancelled::new(reason),
            });
        }
        self.maybe_flush();
    }

    fn maybe_flush(&self) {
        let auto = self.inner.borrow().auto_flush;
        if auto {
            flush_queue(&self.inner);
        }
    }
}

impl Reference for MemoryRef {
    fn on(
        &self,
        event: EventKind,
        callback: EventCallback,
        cancel: Option<CancelCallback>,
    ) -> ListenerHandle {
        let handle = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let id = inner.next_listener;
            inner.next_listener += 1;
            let reg_seq = inner.next_seq;
            inner.next_seq += 1;
            let node = inner.nodes.entry(self.path.clone()).or_default();
            node.listeners.entry(event).or_default().push(Listener {
                id,
                reg_seq,
                callback: Rc::new(RefCell::new(callback)),
                cancel,
            });
            // Initial deliveries reflect the node as of this registration.
            match event {
                EventKind::Value => {
                    let node_value = node.value();
                    let snapshot = Snapshot::new(key_of_path(&self.path).to_owned(), node_value);
                    enqueue(inner, &self.path, EventKind::Value, Some(id), snapshot, None);
                }
                EventKind::ChildAdded => {
                    let node_snapshot =
                        Snapshot::new(key_of_path(&self.path).to_owned(), node.value());
                    let mut prev: Option<String> = None;
                    for child in node_snapshot.children() {
                        let next_prev = child.key().to_owned();
                        enqueue(
                            inner,
                            &self.path,
                            EventKind::ChildAdded,
                            Some(id),
                            child,
                            prev,
                        );
                        prev = Some(next_prev);
                    }
                }
                _ => {}
            }
            ListenerHandle::new(id)
        };
        self.maybe_flush();
        handle
    }

    fn off(&self, event: EventKind, handle: ListenerHandle) {
        let mut guard = self.inner.borrow_mut();
        if let Some(node) = guard.nodes.get_mut(&self.path) {
            if let Some(listeners) = node.listeners.get_mut(&event) {
                listeners.retain(|l| l.id != handle.raw());
            }
        }
    }
}

impl BindSource for MemoryRef {
    fn resolve_ref(&self) -> Option<SourceRef> {
        Some(Rc::new(self.clone()))
    }
}
