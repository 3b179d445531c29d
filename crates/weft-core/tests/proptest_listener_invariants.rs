//! Property-based invariant tests for the weft-core listener registry.
//!
//! The registry is checked against a plain `Vec` model for **any** sequence
//! of operations:
//!
//! 1. Notification visits exactly the live listeners, in subscribe order.
//! 2. `len` always agrees with the model.
//! 3. Unsubscribe handles are idempotent; firing one twice changes nothing.
//! 4. Handles issued before a `clear` are inert afterwards, even when their
//!    slot index has been reused.

use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use weft_core::batch::Batch;
use weft_core::listener::ListenerSet;
use weft_core::store::Unsubscribe;

// ── Operations ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Subscribe,
    /// Unsubscribe the n-th handle ever issued (modulo the issued count).
    Unsubscribe(usize),
    /// Fire the same handle twice in a row.
    DoubleUnsubscribe(usize),
    Clear,
    Notify,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            4 => Just(Op::Subscribe),
            3 => (0usize..64).prop_map(Op::Unsubscribe),
            1 => (0usize..64).prop_map(Op::DoubleUnsubscribe),
            1 => Just(Op::Clear),
            2 => Just(Op::Notify),
        ],
        0..100,
    )
}

// ── Model harness ───────────────────────────────────────────────────────

struct Harness {
    set: ListenerSet,
    log: Rc<RefCell<Vec<u32>>>,
    /// Every handle ever issued, with the generation it belongs to.
    issued: Vec<(u32, u64, Unsubscribe)>,
    /// Live listeners in subscribe order, per the model.
    model: Vec<u32>,
    generation: u64,
    next_id: u32,
}

impl Harness {
    fn new() -> Self {
        Self {
            set: ListenerSet::new(Batch::noop()),
            log: Rc::new(RefCell::new(Vec::new())),
            issued: Vec::new(),
            model: Vec::new(),
            generation: 0,
            next_id: 0,
        }
    }

    fn subscribe(&mut self) {
        let id = self.next_id;
        self.next_id += 1;
        let log = Rc::clone(&self.log);
        let handle = self.set.subscribe(Rc::new(move || log.borrow_mut().push(id)));
        self.issued.push((id, self.generation, handle));
        self.model.push(id);
    }

    fn unsubscribe(&mut self, n: usize) {
        if self.issued.is_empty() {
            return;
        }
        let (id, generation, handle) = &self.issued[n % self.issued.len()];
        handle.call();
        if *generation == self.generation {
            let id = *id;
            self.model.retain(|&m| m != id);
        }
    }

    fn clear(&mut self) {
        self.set.clear();
        self.model.clear();
        self.generation += 1;
    }

    fn notified(&self) -> Vec<u32> {
        self.log.borrow_mut().clear();
        self.set.notify();
        self.log.borrow().clone()
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Model equivalence under arbitrary operation sequences
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn registry_matches_vec_model(ops in ops()) {
        let mut harness = Harness::new();
        for op in ops {
            match op {
                Op::Subscribe => harness.subscribe(),
                Op::Unsubscribe(n) => harness.unsubscribe(n),
                Op::DoubleUnsubscribe(n) => {
                    harness.unsubscribe(n);
                    harness.unsubscribe(n);
                }
                Op::Clear => harness.clear(),
                Op::Notify => {
                    let heard = harness.notified();
                    prop_assert_eq!(&heard, &harness.model,
                        "notification order diverged from the model");
                }
            }
            prop_assert_eq!(harness.set.len(), harness.model.len(),
                "live count diverged from the model");
        }

        // Final pass: whatever survived must notify in subscribe order.
        let heard = harness.notified();
        prop_assert_eq!(heard, harness.model);
    }

    /// Snapshots taken back to back are identical when nothing changed.
    #[test]
    fn notify_is_deterministic(ops in ops()) {
        let mut harness = Harness::new();
        for op in ops {
            match op {
                Op::Subscribe => harness.subscribe(),
                Op::Unsubscribe(n) | Op::DoubleUnsubscribe(n) => harness.unsubscribe(n),
                Op::Clear => harness.clear(),
                Op::Notify => {}
            }
        }
        let first = harness.notified();
        let second = harness.notified();
        prop_assert_eq!(first, second);
    }
}
