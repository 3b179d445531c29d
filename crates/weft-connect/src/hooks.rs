#![forbid(unsafe_code)]

//! Accessor hooks: direct reads against a context value, below the full
//! connection controller.
//!
//! [`StateWatcher`] is the subscribe/snapshot pair a host's external-store
//! primitive consumes: `subscribe` chains through the context subscription
//! so watchers obey the same top-down ordering as connected components, and
//! `poll` reports a changed selection at most once per actual change.

use std::cell::RefCell;
use std::rc::Rc;

use weft_core::store::{Callback, Store, Unsubscribe};

use crate::props::Dispatch;
use crate::provider::ContextValue;

/// The store behind a context value.
#[must_use]
pub fn use_store<S>(ctx: &ContextValue<S>) -> Rc<dyn Store<State = S>> {
    Rc::clone(&ctx.store)
}

/// A dispatch handle bound to the context's store.
#[must_use]
pub fn use_dispatch<S: Clone + 'static>(ctx: &ContextValue<S>) -> Dispatch {
    Dispatch::from_store(&ctx.store)
}

/// Selector-based state reads for one consumer.
pub struct StateWatcher<S: 'static, T> {
    ctx: ContextValue<S>,
    selector: Rc<dyn Fn(&S) -> T>,
    equal: Rc<dyn Fn(&T, &T) -> bool>,
    last: RefCell<Option<T>>,
}

impl<S: Clone + 'static, T: Clone + PartialEq + 'static> StateWatcher<S, T> {
    /// A watcher comparing selections with `PartialEq`.
    pub fn new(ctx: &ContextValue<S>, selector: impl Fn(&S) -> T + 'static) -> Self {
        Self::with_equality(ctx, selector, |a, b| a == b)
    }
}

impl<S: Clone + 'static, T: Clone + 'static> StateWatcher<S, T> {
    /// A watcher with a custom equality policy.
    pub fn with_equality(
        ctx: &ContextValue<S>,
        selector: impl Fn(&S) -> T + 'static,
        equal: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        Self {
            ctx: ctx.clone(),
            selector: Rc::new(selector),
            equal: Rc::new(equal),
            last: RefCell::new(None),
        }
    }

    /// Evaluate the selector against the current state. Prefers the
    /// server-state snapshot when the context carries one and the watcher
    /// has not observed a live value yet (hydration-style first read).
    #[must_use]
    pub fn get(&self) -> T {
        if self.last.borrow().is_none() {
            if let Some(server_state) = &self.ctx.server_state {
                return (self.selector)(&server_state());
            }
        }
        (self.selector)(&self.ctx.store.get_state())
    }

    /// Chain `listener` through the context subscription, so this watcher
    /// hears changes after every connected ancestor handled them.
    pub fn subscribe(&self, listener: Callback) -> Unsubscribe {
        self.ctx.subscription.add_nested_sub(listener)
    }

    /// The new selection if it changed since the last poll, else `None`.
    /// The first poll always reports.
    pub fn poll(&self) -> Option<T> {
        let current = (self.selector)(&self.ctx.store.get_state());
        let mut last = self.last.borrow_mut();
        let changed = match last.as_ref() {
            Some(previous) => !(self.equal)(previous, &current),
            None => true,
        };
        if changed {
            *last = Some(current.clone());
            Some(current)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use std::cell::Cell;
    use weft_core::batch::Batch;
    use weft_core::store::{Action, ReducerStore};

    #[derive(Clone, PartialEq, Debug)]
    struct AppState {
        count: i64,
        label: &'static str,
    }

    fn app_store() -> Rc<ReducerStore<AppState>> {
        ReducerStore::new(
            AppState { count: 0, label: "idle" },
            |state, action| match action.kind() {
                "inc" => AppState { count: state.count + 1, ..*state },
                "rename" => AppState { label: "busy", ..*state },
                _ => state.clone(),
            },
        )
    }

    #[test]
    fn poll_reports_each_change_once() {
        let store = app_store();
        let provider = Provider::new(Rc::clone(&store), Batch::noop());
        provider.mount();
        let ctx = provider.context();

        let watcher = StateWatcher::new(&ctx, |s: &AppState| s.count);
        assert_eq!(watcher.poll(), Some(0));
        assert_eq!(watcher.poll(), None);

        store.dispatch(Action::new("inc"));
        assert_eq!(watcher.poll(), Some(1));
        assert_eq!(watcher.poll(), None);
    }

    #[test]
    fn unselected_changes_are_invisible() {
        let store = app_store();
        let provider = Provider::new(Rc::clone(&store), Batch::noop());
        provider.mount();
        let ctx = provider.context();

        let watcher = StateWatcher::new(&ctx, |s: &AppState| s.count);
        watcher.poll();

        store.dispatch(Action::new("rename"));
        assert_eq!(watcher.poll(), None);
    }

    #[test]
    fn subscribe_chains_through_the_context_subscription() {
        let store = app_store();
        let provider = Provider::new(Rc::clone(&store), Batch::noop());
        provider.mount();
        let ctx = provider.context();

        let watcher = StateWatcher::new(&ctx, |s: &AppState| s.count);
        let heard = Rc::new(Cell::new(0u32));
        let heard_in = Rc::clone(&heard);
        let _sub = watcher.subscribe(Rc::new(move || heard_in.set(heard_in.get() + 1)));

        store.dispatch(Action::new("inc"));
        assert_eq!(heard.get(), 1);
    }

    #[test]
    fn server_state_feeds_the_first_read_only() {
        let store = app_store();
        let provider = Provider::new(Rc::clone(&store), Batch::noop())
            .with_server_state(|| AppState { count: 42, label: "server" });
        provider.mount();
        let ctx = provider.context();

        let watcher = StateWatcher::new(&ctx, |s: &AppState| s.count);
        assert_eq!(watcher.get(), 42);

        watcher.poll();
        assert_eq!(watcher.get(), 0);
    }

    #[test]
    fn use_dispatch_round_trips() {
        let store = app_store();
        let provider = Provider::new(Rc::clone(&store), Batch::noop());
        provider.mount();
        let ctx = provider.context();

        use_dispatch(&ctx).call(Action::new("inc"));
        assert_eq!(use_store(&ctx).get_state().count, 1);
    }
}
