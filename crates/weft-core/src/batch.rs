#![forbid(unsafe_code)]

//! Explicit batch scope for coalescing re-render signals.
//!
//! When a notification fan-out triggers several listeners that each want to
//! schedule work with the host, the host usually prefers to fold those
//! signals into a single pass. [`Batch`] wraps the host's batching primitive
//! as an explicit value threaded through constructors; there is no global
//! mutable batch slot. The default is a no-op scope that runs the closure
//! immediately.

use std::fmt;
use std::rc::Rc;

/// A cloneable batching scope.
///
/// `Batch::noop()` runs the closure inline. `Batch::new` wraps a host
/// primitive that receives the whole notification pass as one closure.
#[derive(Clone)]
pub struct Batch(Rc<dyn Fn(&mut dyn FnMut())>);

impl Batch {
    /// A pass-through scope: the closure runs immediately, unbatched.
    #[must_use]
    pub fn noop() -> Self {
        Self(Rc::new(|f: &mut dyn FnMut()| f()))
    }

    /// Wrap a host batching primitive.
    ///
    /// The primitive must invoke the closure it is given exactly once,
    /// synchronously or at the end of its batching window.
    pub fn new(f: impl Fn(&mut dyn FnMut()) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Run `f` inside this batch scope.
    pub fn run(&self, f: impl FnOnce()) {
        let mut f = Some(f);
        (self.0)(&mut || {
            if let Some(f) = f.take() {
                f();
            }
        });
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Batch(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn noop_runs_inline() {
        let ran = Cell::new(false);
        Batch::noop().run(|| ran.set(true));
        assert!(ran.get());
    }

    #[test]
    fn custom_scope_wraps_the_pass() {
        let entered = Rc::new(Cell::new(0u32));
        let entered_in = Rc::clone(&entered);
        let batch = Batch::new(move |f| {
            entered_in.set(entered_in.get() + 1);
            f();
        });

        let ran = Cell::new(0u32);
        batch.run(|| ran.set(ran.get() + 2));

        assert_eq!(entered.get(), 1);
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn scope_that_never_calls_drops_the_closure() {
        let batch = Batch::new(|_f| {});
        let ran = Cell::new(false);
        batch.run(|| ran.set(true));
        assert!(!ran.get());
    }
}
