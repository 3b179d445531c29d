#![forbid(unsafe_code)]

//! Connection controller: one per connected component instance.
//!
//! # Design
//!
//! The controller sits between the host's render machinery and the store.
//! It owns the memoized selector, an optional subscription node (only when
//! the component reads store state), and the bookkeeping that keeps the
//! render path and the notification path consistent: last own props, last
//! derived props, props pending from a store update, and the scheduled /
//! mounted / unsubscribed flags.
//!
//! The two paths meet in the middle:
//!
//! - render path: [`select_props`](Connector::select_props) before the host
//!   renders, [`after_render`](Connector::after_render) once it committed.
//! - notification path: [`check_for_updates`](Connector::check_for_updates),
//!   wired as the subscription's change hook by
//!   [`subscribe_updates`](Connector::subscribe_updates).
//!
//! # Invariants
//!
//! 1. A store change producing pointer-identical derived props still
//!    cascades to descendants, unless a render is already pending (the
//!    pending render's commit will cascade instead).
//! 2. A mapper error caught on the notification path is stored and
//!    re-surfaced from the render path, annotated as the probable cause.
//! 3. After the guard detaches, late notifications are deliberate no-ops.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use weft_core::batch::Batch;
use weft_core::store::{Callback, Store};
use weft_core::subscription::Subscription;

use crate::error::ConnectError;
use crate::mappers::{DispatchMapper, MergeMapper, StateMapper};
use crate::props::{Dispatch, Props};
use crate::provider::ContextValue;
use crate::selector::{EqualityPolicies, PropsSelector};

/// Configuration for one connected component.
pub struct ConnectOptions<S> {
    component: Cow<'static, str>,
    map_state: Option<StateMapper<S>>,
    map_dispatch: Option<DispatchMapper>,
    merge: MergeMapper,
    policies: EqualityPolicies<S>,
    batch: Batch,
}

impl<S: PartialEq> ConnectOptions<S> {
    /// Options with default policies and a no-op batch scope.
    pub fn new(component: impl Into<Cow<'static, str>>) -> Self {
        Self {
            component: component.into(),
            map_state: None,
            map_dispatch: None,
            merge: MergeMapper::Default,
            policies: EqualityPolicies::default(),
            batch: Batch::noop(),
        }
    }
}

impl<S> ConnectOptions<S> {
    #[must_use]
    pub fn map_state(mut self, mapper: StateMapper<S>) -> Self {
        self.map_state = Some(mapper);
        self
    }

    #[must_use]
    pub fn map_dispatch(mut self, mapper: DispatchMapper) -> Self {
        self.map_dispatch = Some(mapper);
        self
    }

    #[must_use]
    pub fn merge(mut self, merge: MergeMapper) -> Self {
        self.merge = merge;
        self
    }

    #[must_use]
    pub fn policies(mut self, policies: EqualityPolicies<S>) -> Self {
        self.policies = policies;
        self
    }

    #[must_use]
    pub fn batch(mut self, batch: Batch) -> Self {
        self.batch = batch;
        self
    }
}

/// The per-instance controller.
pub struct Connector<S: 'static> {
    component: Cow<'static, str>,
    store: Rc<dyn Store<State = S>>,
    /// Present only when the component reads store state.
    subscription: Option<Rc<Subscription>>,
    selector: PropsSelector<S>,
    last_own_props: RefCell<Props>,
    last_child_props: RefCell<Option<Rc<Props>>>,
    /// Derived props computed on the notification path, waiting for the
    /// render they triggered.
    pending_props: RefCell<Option<Rc<Props>>>,
    render_scheduled: Cell<bool>,
    mounted: Cell<bool>,
    unsubscribed: Cell<bool>,
    stored_error: RefCell<Option<ConnectError>>,
    host: RefCell<Option<Callback>>,
    store_from_props: bool,
}

impl<S> fmt::Debug for Connector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("component", &self.component)
            .field("mounted", &self.mounted.get())
            .field("unsubscribed", &self.unsubscribed.get())
            .finish_non_exhaustive()
    }
}

impl<S: Clone + 'static> Connector<S> {
    /// Build a controller from options plus the store sources available at
    /// the component's position: the ancestor context, and optionally a
    /// store passed directly to the component.
    ///
    /// A directly-passed store wins and detaches this subtree from the
    /// ancestor notification order: the subscription roots at the store
    /// itself.
    pub fn new(
        options: ConnectOptions<S>,
        ctx: Option<&ContextValue<S>>,
        store_override: Option<Rc<dyn Store<State = S>>>,
    ) -> Result<Rc<Self>, ConnectError> {
        let store_from_props = store_override.is_some();
        let store = match store_override.or_else(|| ctx.map(|c| Rc::clone(&c.store))) {
            Some(store) => store,
            None => {
                return Err(ConnectError::MissingStore {
                    component: options.component,
                });
            }
        };

        let dispatch = Dispatch::from_store(&store);
        let selector = PropsSelector::new(
            &options.component,
            dispatch,
            options.map_state,
            options.map_dispatch,
            options.merge,
            options.policies,
        );

        let subscription = if selector.uses_store_state() {
            Some(if store_from_props {
                Subscription::rooted(&store, options.batch.clone())
            } else {
                let ctx = ctx.expect("store came from context, so a context exists");
                Subscription::nested(&ctx.subscription, options.batch.clone())
            })
        } else {
            None
        };

        tracing::debug!(
            component = %options.component,
            store_from_props,
            subscribes = subscription.is_some(),
            "connector created"
        );
        Ok(Rc::new(Self {
            component: options.component,
            store,
            subscription,
            selector,
            last_own_props: RefCell::new(Props::new()),
            last_child_props: RefCell::new(None),
            pending_props: RefCell::new(None),
            render_scheduled: Cell::new(false),
            mounted: Cell::new(false),
            unsubscribed: Cell::new(true),
            stored_error: RefCell::new(None),
            host: RefCell::new(None),
            store_from_props,
        }))
    }

    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    #[must_use]
    pub fn dispatch(&self) -> Dispatch {
        Dispatch::from_store(&self.store)
    }

    /// Derived props for the render about to happen.
    ///
    /// When a store update already computed props against own props that
    /// still match, those pending props are reused; otherwise this reads
    /// the current store state and runs the selector. A failure here is
    /// annotated with any error stored on the notification path.
    pub fn select_props(&self, own_props: &Props) -> Result<Rc<Props>, ConnectError> {
        let pending = self.pending_props.borrow().clone();
        if let Some(pending) = pending {
            if self.last_own_props.borrow().shallow_eq(own_props) {
                return Ok(pending);
            }
        }
        let state = self.store.get_state();
        self.selector
            .select(state, own_props)
            .map_err(|e| e.correlated_with(self.stored_error.borrow_mut().take()))
    }

    /// Commit-phase bookkeeping, run once the host rendered `rendered`
    /// against `own_props`.
    ///
    /// Captures the inputs for the notification path, clears the scheduled
    /// flag and any stored error, and cascades to descendants when this
    /// render was triggered by a store update.
    pub fn after_render(&self, own_props: &Props, rendered: &Rc<Props>) {
        *self.last_own_props.borrow_mut() = own_props.clone();
        *self.last_child_props.borrow_mut() = Some(Rc::clone(rendered));
        self.render_scheduled.set(false);
        self.stored_error.borrow_mut().take();
        let from_store_update = self.pending_props.borrow_mut().take().is_some();
        if from_store_update {
            self.notify_nested_subs();
        }
    }

    /// Mark the component committed. Must run before
    /// [`subscribe_updates`](Connector::subscribe_updates): the missed-update
    /// check it performs is gated on the mounted flag.
    pub fn on_mount(&self) {
        self.mounted.set(true);
    }

    pub fn on_unmount(&self) {
        self.mounted.set(false);
    }

    /// Attach to the store and start relaying changes to `host_listener`
    /// (the host's "schedule a re-render" hook).
    ///
    /// Subscribes synchronously, then immediately re-checks so a store
    /// change that landed between render and subscription is not lost. For
    /// a component that never reads store state the guard is inert.
    pub fn subscribe_updates(self: &Rc<Self>, host_listener: Callback) -> ConnectionGuard<S> {
        let guard = ConnectionGuard {
            connector: Rc::clone(self),
        };
        let Some(subscription) = &self.subscription else {
            return guard;
        };

        self.unsubscribed.set(false);
        *self.host.borrow_mut() = Some(host_listener);

        let weak = Rc::downgrade(self);
        subscription.set_on_state_change(Rc::new(move || {
            if let Some(connector) = weak.upgrade() {
                connector.check_for_updates();
            }
        }));
        subscription.try_subscribe();
        self.check_for_updates();
        guard
    }

    /// The notification path: re-derive props from the current store state
    /// and decide whether the host must re-render.
    pub fn check_for_updates(&self) {
        if self.unsubscribed.get() || !self.mounted.get() {
            // Late notification after teardown or before commit.
            tracing::trace!(component = %self.component, "stale notification ignored");
            return;
        }
        let state = self.store.get_state();
        let own_props = self.last_own_props.borrow().clone();
        match self.selector.select(state, &own_props) {
            Err(e) => {
                tracing::debug!(component = %self.component, error = %e, "mapper failed during notification");
                *self.stored_error.borrow_mut() = Some(e);
                self.render_scheduled.set(true);
                self.signal_host();
            }
            Ok(next) => {
                let unchanged = self
                    .last_child_props
                    .borrow()
                    .as_ref()
                    .is_some_and(|prev| Rc::ptr_eq(prev, &next));
                if unchanged {
                    // Nothing for this component, but descendants read
                    // different slices; keep the cascade going unless a
                    // pending render will do it at commit.
                    if !self.render_scheduled.get() {
                        self.notify_nested_subs();
                    }
                } else {
                    *self.last_child_props.borrow_mut() = Some(Rc::clone(&next));
                    *self.pending_props.borrow_mut() = Some(next);
                    self.render_scheduled.set(true);
                    self.signal_host();
                }
            }
        }
    }

    /// Context for descendants: same store, this node's subscription
    /// swapped in so children notify after it. Passthrough when the store
    /// was passed directly (descendants keep the ancestor context).
    #[must_use]
    pub fn child_context(&self, parent: Option<&ContextValue<S>>) -> Option<ContextValue<S>> {
        if self.store_from_props {
            return parent.cloned();
        }
        let subscription = match &self.subscription {
            Some(subscription) => Rc::clone(subscription),
            None => Rc::clone(&parent?.subscription),
        };
        Some(ContextValue {
            store: Rc::clone(&self.store),
            subscription,
            server_state: parent.and_then(|ctx| ctx.server_state.clone()),
        })
    }

    fn notify_nested_subs(&self) {
        if let Some(subscription) = &self.subscription {
            subscription.notify_nested_subs();
        }
    }

    fn signal_host(&self) {
        let host = self.host.borrow().clone();
        if let Some(host) = host {
            host();
        }
    }

    fn teardown(&self) {
        if self.unsubscribed.replace(true) {
            return;
        }
        if let Some(subscription) = &self.subscription {
            subscription.try_unsubscribe();
            subscription.clear_on_state_change();
        }
        self.host.borrow_mut().take();
        tracing::debug!(component = %self.component, "connector detached");
    }
}

/// Live connection handle returned by
/// [`subscribe_updates`](Connector::subscribe_updates).
///
/// Dropping it detaches best-effort; calling
/// [`unsubscribe`](ConnectionGuard::unsubscribe) detaches and surfaces any
/// error that was caught on the notification path but never made it back to
/// a render.
pub struct ConnectionGuard<S: 'static> {
    connector: Rc<Connector<S>>,
}

impl<S: Clone + 'static> ConnectionGuard<S> {
    pub fn unsubscribe(&self) -> Result<(), ConnectError> {
        self.connector.teardown();
        match self.connector.stored_error.borrow_mut().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl<S: 'static> Drop for ConnectionGuard<S> {
    fn drop(&mut self) {
        if !self.connector.unsubscribed.replace(true) {
            if let Some(subscription) = &self.connector.subscription {
                subscription.try_unsubscribe();
                subscription.clear_on_state_change();
            }
            self.connector.host.borrow_mut().take();
        }
    }
}
