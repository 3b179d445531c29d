#![forbid(unsafe_code)]

//! Subscription node: one link in the top-down notification tree.
//!
//! # Design
//!
//! Every connected component owns one [`Subscription`]. A node attaches
//! upstream either to the store itself (the root) or to a parent node, and
//! fans out downstream to its own nested listeners. Because a child always
//! registers with its parent's registry rather than with the store directly,
//! a notification pass visits ancestors strictly before descendants: each
//! node finishes its own state handling, then relays to its children.
//!
//! The node's reaction to an upstream change is the `on_state_change` slot.
//! It is set after construction (the owner usually needs the node to exist
//! before it can build the handler) and may be swapped at any time without
//! re-subscribing; the relay closure reads the slot at call time.
//!
//! # Invariants
//!
//! 1. `try_subscribe` is idempotent: one upstream registration per node, no
//!    matter how many times it is called.
//! 2. After `try_unsubscribe`, the node holds no upstream registration and
//!    its own registry is dropped; nested handles go stale harmlessly.
//! 3. `add_nested_sub` first ensures the node itself is attached upstream,
//!    so a child subscription transitively roots the whole chain.

use std::cell::RefCell;
use std::rc::Rc;

use crate::batch::Batch;
use crate::listener::ListenerSet;
use crate::store::{Callback, ChangeSource, Unsubscribe};

enum Upstream {
    /// Root node: attach straight to the change source.
    Source(Rc<dyn Fn(Callback) -> Unsubscribe>),
    /// Nested node: attach to the parent's registry.
    Parent(Rc<Subscription>),
}

/// A node in the notification tree.
///
/// Single-threaded; construct with [`rooted`](Subscription::rooted) or
/// [`nested`](Subscription::nested) and wire the reaction with
/// [`set_on_state_change`](Subscription::set_on_state_change).
pub struct Subscription {
    upstream: Upstream,
    unsubscribe: RefCell<Option<Unsubscribe>>,
    listeners: RefCell<Option<ListenerSet>>,
    on_state_change: RefCell<Option<Callback>>,
    batch: Batch,
}

impl Subscription {
    /// A root node attached directly to `source`.
    #[must_use]
    pub fn rooted<C>(source: &Rc<C>, batch: Batch) -> Rc<Self>
    where
        C: ChangeSource + ?Sized + 'static,
    {
        let source = Rc::clone(source);
        Rc::new(Self {
            upstream: Upstream::Source(Rc::new(move |listener| source.subscribe(listener))),
            unsubscribe: RefCell::new(None),
            listeners: RefCell::new(None),
            on_state_change: RefCell::new(None),
            batch,
        })
    }

    /// A node nested under `parent`; notifications reach it only after the
    /// parent has handled them.
    #[must_use]
    pub fn nested(parent: &Rc<Subscription>, batch: Batch) -> Rc<Self> {
        Rc::new(Self {
            upstream: Upstream::Parent(Rc::clone(parent)),
            unsubscribe: RefCell::new(None),
            listeners: RefCell::new(None),
            on_state_change: RefCell::new(None),
            batch,
        })
    }

    /// Set the reaction invoked when upstream signals a change.
    ///
    /// Takes effect for the next notification; no re-subscribe happens.
    pub fn set_on_state_change(&self, callback: Callback) {
        *self.on_state_change.borrow_mut() = Some(callback);
    }

    /// Clear the reaction slot. Upstream notifications become no-ops for
    /// this node (and its subtree) until a new reaction is set.
    pub fn clear_on_state_change(&self) {
        *self.on_state_change.borrow_mut() = None;
    }

    /// Attach upstream if not already attached. Idempotent.
    pub fn try_subscribe(self: &Rc<Self>) {
        if self.unsubscribe.borrow().is_some() {
            return;
        }
        let weak = Rc::downgrade(self);
        let relay: Callback = Rc::new(move || {
            if let Some(node) = weak.upgrade() {
                node.handle_change();
            }
        });
        let unsub = match &self.upstream {
            Upstream::Source(attach) => attach(relay),
            Upstream::Parent(parent) => parent.add_nested_sub(relay),
        };
        *self.unsubscribe.borrow_mut() = Some(unsub);
        *self.listeners.borrow_mut() = Some(ListenerSet::new(self.batch.clone()));
        tracing::trace!(root = matches!(self.upstream, Upstream::Source(_)), "subscription attached");
    }

    /// Detach upstream and drop the nested registry. Idempotent.
    pub fn try_unsubscribe(&self) {
        let taken = self.unsubscribe.borrow_mut().take();
        let Some(unsub) = taken else { return };
        unsub.call();
        if let Some(listeners) = self.listeners.borrow_mut().take() {
            listeners.clear();
        }
        tracing::trace!("subscription detached");
    }

    /// Register a downstream listener, attaching this node upstream first so
    /// the chain is rooted all the way to the source.
    pub fn add_nested_sub(self: &Rc<Self>, listener: Callback) -> Unsubscribe {
        self.try_subscribe();
        match self.listeners.borrow().as_ref() {
            Some(set) => set.subscribe(listener),
            None => Unsubscribe::noop(),
        }
    }

    /// Relay the current notification to downstream listeners.
    pub fn notify_nested_subs(&self) {
        let set = self.listeners.borrow().clone();
        if let Some(set) = set {
            set.notify();
        }
    }

    /// Whether this node currently holds an upstream registration.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.unsubscribe.borrow().is_some()
    }

    /// Number of downstream listeners currently registered.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().as_ref().map_or(0, ListenerSet::len)
    }

    fn handle_change(&self) {
        // No reaction wired yet means the owner has not mounted; the
        // notification is deliberately swallowed and the owner's mount-time
        // missed-update check covers the gap.
        let reaction = self.on_state_change.borrow().clone();
        if let Some(reaction) = reaction {
            reaction();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let taken = self.unsubscribe.borrow_mut().take();
        if let Some(unsub) = taken {
            unsub.call();
        }
    }
}
