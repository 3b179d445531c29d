#![forbid(unsafe_code)]

//! Provider: owns the root subscription and hands out the context value
//! connected components consume.
//!
//! The provider's single job after construction is relaying: its root
//! subscription's change hook is `notify_nested_subs`, so every committed
//! store transition fans out top-down through the subscription tree. Mount
//! also performs a missed-update check: a state change that landed between
//! construction and mount triggers an immediate cascade.

use std::cell::RefCell;
use std::rc::Rc;

use weft_core::batch::Batch;
use weft_core::store::Store;
use weft_core::subscription::Subscription;

/// What descendants receive from their nearest provider (or connected
/// ancestor): the store, the subscription to nest under, and an optional
/// server-side state snapshot for hydration-style first reads.
pub struct ContextValue<S> {
    pub store: Rc<dyn Store<State = S>>,
    pub subscription: Rc<Subscription>,
    pub server_state: Option<Rc<dyn Fn() -> S>>,
}

impl<S> Clone for ContextValue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
            subscription: Rc::clone(&self.subscription),
            server_state: self.server_state.clone(),
        }
    }
}

/// Root of one store's subscription tree.
pub struct Provider<S: 'static> {
    store: Rc<dyn Store<State = S>>,
    subscription: Rc<Subscription>,
    previous_state: RefCell<S>,
    server_state: Option<Rc<dyn Fn() -> S>>,
    batch: Batch,
}

impl<S: Clone + PartialEq + 'static> Provider<S> {
    pub fn new<St>(store: Rc<St>, batch: Batch) -> Self
    where
        St: Store<State = S> + 'static,
    {
        let store: Rc<dyn Store<State = S>> = store;
        let subscription = Subscription::rooted(&store, batch.clone());
        let previous_state = RefCell::new(store.get_state());
        Self {
            store,
            subscription,
            previous_state,
            server_state: None,
            batch,
        }
    }

    /// Supply a server-rendered state snapshot for hydration reads.
    #[must_use]
    pub fn with_server_state(mut self, server_state: impl Fn() -> S + 'static) -> Self {
        self.server_state = Some(Rc::new(server_state));
        self
    }

    /// Attach to the store and start relaying.
    ///
    /// Idempotent. If the state moved since construction (or since the last
    /// mount), descendants are notified immediately so nothing is missed.
    pub fn mount(&self) {
        let weak = Rc::downgrade(&self.subscription);
        self.subscription.set_on_state_change(Rc::new(move || {
            if let Some(subscription) = weak.upgrade() {
                subscription.notify_nested_subs();
            }
        }));
        self.subscription.try_subscribe();
        tracing::debug!("provider mounted");

        let current = self.store.get_state();
        let moved = *self.previous_state.borrow() != current;
        if moved {
            *self.previous_state.borrow_mut() = current;
            self.subscription.notify_nested_subs();
        }
    }

    /// The context value descendants consume.
    #[must_use]
    pub fn context(&self) -> ContextValue<S> {
        ContextValue {
            store: Rc::clone(&self.store),
            subscription: Rc::clone(&self.subscription),
            server_state: self.server_state.clone(),
        }
    }

    #[must_use]
    pub fn store(&self) -> Rc<dyn Store<State = S>> {
        Rc::clone(&self.store)
    }

    #[must_use]
    pub fn batch(&self) -> Batch {
        self.batch.clone()
    }
}

impl<S: 'static> Provider<S> {
    /// Detach from the store. Idempotent; also runs on drop.
    pub fn unmount(&self) {
        self.subscription.try_unsubscribe();
        self.subscription.clear_on_state_change();
    }
}

impl<S: 'static> Drop for Provider<S> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use weft_core::store::{Action, ReducerStore};

    fn counter_store() -> Rc<ReducerStore<i64>> {
        ReducerStore::new(0, |n, _| n + 1)
    }

    #[test]
    fn mount_relays_store_changes_to_nested_subs() {
        let store = counter_store();
        let provider = Provider::new(Rc::clone(&store), Batch::noop());
        provider.mount();

        let heard = Rc::new(Cell::new(0u32));
        let heard_in = Rc::clone(&heard);
        let ctx = provider.context();
        let _sub = ctx
            .subscription
            .add_nested_sub(Rc::new(move || heard_in.set(heard_in.get() + 1)));

        store.dispatch(Action::new("tick"));
        assert_eq!(heard.get(), 1);
    }

    #[test]
    fn state_change_before_mount_cascades_at_mount() {
        let store = counter_store();
        let provider = Provider::new(Rc::clone(&store), Batch::noop());

        let heard = Rc::new(Cell::new(0u32));
        let heard_in = Rc::clone(&heard);
        let _sub = provider
            .context()
            .subscription
            .add_nested_sub(Rc::new(move || heard_in.set(heard_in.get() + 1)));

        // The store moves while the provider is not yet relaying.
        store.dispatch(Action::new("tick"));
        assert_eq!(heard.get(), 0);

        provider.mount();
        assert_eq!(heard.get(), 1);
    }

    #[test]
    fn unmount_stops_the_relay() {
        let store = counter_store();
        let provider = Provider::new(Rc::clone(&store), Batch::noop());
        provider.mount();

        let heard = Rc::new(Cell::new(0u32));
        let heard_in = Rc::clone(&heard);
        let _sub = provider
            .context()
            .subscription
            .add_nested_sub(Rc::new(move || heard_in.set(heard_in.get() + 1)));

        store.dispatch(Action::new("tick"));
        provider.unmount();
        store.dispatch(Action::new("tick"));
        assert_eq!(heard.get(), 1);
    }

    #[test]
    fn drop_detaches_the_root_subscription() {
        let store = counter_store();
        {
            let provider = Provider::new(Rc::clone(&store), Batch::noop());
            provider.mount();
            store.dispatch(Action::new("tick"));
            assert_eq!(store.listener_count(), 1);
        }
        assert_eq!(store.listener_count(), 0);
    }
}
