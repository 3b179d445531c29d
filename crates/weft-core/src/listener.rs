#![forbid(unsafe_code)]

//! Ordered listener registry with O(1) add and remove.
//!
//! # Design
//!
//! An arena-backed doubly-linked list: callbacks live in a slot vector with
//! explicit `first`/`last` indices and a free list, instead of raw pointers
//! between heap nodes. Each subscribe hands back an [`Unsubscribe`] that
//! unlinks its own slot in O(1), repairing the neighbor and head/tail links.
//!
//! # Invariants
//!
//! 1. Traversal from `first` via `next` visits every live listener exactly
//!    once, in subscribe order (insertion order == notification order).
//! 2. An unsubscribe handle fired twice, or after [`clear`](ListenerSet::clear),
//!    is a no-op (handle idempotency plus a generation check).
//! 3. `notify` snapshots the chain at start; mutation during the pass never
//!    skips or duplicates entries already visited or already removed.
//!
//! # Failure Modes
//!
//! - A callback that subscribes or unsubscribes reentrantly is safe: the
//!   snapshot is taken before any callback runs, so no `RefCell` borrow is
//!   held across user code.

use std::cell::RefCell;
use std::rc::Rc;

use crate::batch::Batch;
use crate::store::{Callback, Unsubscribe};

struct Slot {
    callback: Callback,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    first: Option<usize>,
    last: Option<usize>,
    len: usize,
    /// Bumped by `clear` so stale handles become no-ops.
    generation: u64,
}

impl Arena {
    fn unlink(&mut self, idx: usize) {
        let Some(slot) = self.slots.get_mut(idx).and_then(|s| s.take()) else {
            return;
        };
        match slot.next {
            Some(n) => {
                if let Some(next) = self.slots[n].as_mut() {
                    next.prev = slot.prev;
                }
            }
            None => self.last = slot.prev,
        }
        match slot.prev {
            Some(p) => {
                if let Some(prev) = self.slots[p].as_mut() {
                    prev.next = slot.next;
                }
            }
            None => self.first = slot.next,
        }
        self.free.push(idx);
        self.len -= 1;
    }
}

/// Shared handle to an ordered callback registry.
///
/// Cloning shares the underlying arena. All mutation goes through interior
/// mutability; the registry is single-threaded.
#[derive(Clone)]
pub struct ListenerSet {
    arena: Rc<RefCell<Arena>>,
    batch: Batch,
}

impl ListenerSet {
    /// An empty registry whose notifications run inside `batch`.
    #[must_use]
    pub fn new(batch: Batch) -> Self {
        Self {
            arena: Rc::new(RefCell::new(Arena::default())),
            batch,
        }
    }

    /// Append `callback` at the tail. O(1).
    ///
    /// The returned handle unlinks exactly this registration; firing it more
    /// than once, or after the registry was cleared, is a safe no-op.
    pub fn subscribe(&self, callback: Callback) -> Unsubscribe {
        let mut arena = self.arena.borrow_mut();
        let idx = match arena.free.pop() {
            Some(i) => i,
            None => {
                arena.slots.push(None);
                arena.slots.len() - 1
            }
        };
        let prev = arena.last;
        arena.slots[idx] = Some(Slot {
            callback,
            prev,
            next: None,
        });
        match prev {
            Some(p) => {
                if let Some(tail) = arena.slots[p].as_mut() {
                    tail.next = Some(idx);
                }
            }
            None => arena.first = Some(idx),
        }
        arena.last = Some(idx);
        arena.len += 1;
        let generation = arena.generation;
        drop(arena);

        let weak = Rc::downgrade(&self.arena);
        Unsubscribe::new(move || {
            let Some(arena) = weak.upgrade() else { return };
            let mut arena = arena.borrow_mut();
            if arena.generation != generation || arena.first.is_none() {
                return;
            }
            arena.unlink(idx);
        })
    }

    /// Invoke every live callback in subscribe order, inside one batch scope.
    pub fn notify(&self) {
        let callbacks = self.snapshot();
        if callbacks.is_empty() {
            return;
        }
        self.batch.run(move || {
            for callback in &callbacks {
                callback();
            }
        });
    }

    /// Ordered snapshot of the current live callbacks.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Callback> {
        let arena = self.arena.borrow();
        let mut out = Vec::with_capacity(arena.len);
        let mut cursor = arena.first;
        while let Some(idx) = cursor {
            let slot = arena.slots[idx]
                .as_ref()
                .expect("live link points at an occupied slot");
            out.push(Rc::clone(&slot.callback));
            cursor = slot.next;
        }
        out
    }

    /// Drop all listeners without per-node unlinking.
    ///
    /// Outstanding unsubscribe handles are invalidated via the generation
    /// counter rather than by touching each slot.
    pub fn clear(&self) {
        let mut arena = self.arena.borrow_mut();
        arena.slots.clear();
        arena.free.clear();
        arena.first = None;
        arena.last = None;
        arena.len = 0;
        arena.generation += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.borrow().len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
