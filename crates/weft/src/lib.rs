#![forbid(unsafe_code)]

//! Weft public facade crate.
//!
//! Weft binds a host's view layer to an external state store: a provider
//! roots a top-down subscription tree, and each connected component derives
//! its props through a memoized selector so it re-renders only when its own
//! slice of state actually moved.
//!
//! ```
//! use std::rc::Rc;
//! use weft::prelude::*;
//!
//! let store = ReducerStore::new(0i64, |n, action| match action.kind() {
//!     "inc" => n + 1,
//!     _ => *n,
//! });
//!
//! let provider = Provider::new(Rc::clone(&store), Batch::noop());
//! provider.mount();
//! let ctx = provider.context();
//!
//! let options = ConnectOptions::new("Counter")
//!     .map_state(StateMapper::state(|n: &i64| props!("count" => *n)))
//!     .map_dispatch(DispatchMapper::action_creator("inc", |_| Action::new("inc")));
//! let connector = Connector::new(options, Some(&ctx), None)?;
//!
//! let own = Props::new();
//! let rendered = connector.select_props(&own)?;
//! connector.after_render(&own, &rendered);
//! connector.on_mount();
//! let _guard = connector.subscribe_updates(Rc::new(|| {
//!     // the host schedules a re-render here
//! }));
//!
//! // Invoking the bound action creator dispatches; the connector derives
//! // fresh props for the render that follows.
//! rendered.call("inc", &[]);
//! let next = connector.select_props(&own)?;
//! assert_eq!(next.value("count"), Some(&Value::from(1)));
//! # Ok::<(), weft::ConnectError>(())
//! ```

pub mod prelude {
    pub use weft_connect as connect;
    pub use weft_core as core;

    pub use weft_connect::{
        props, ConnectError, ConnectOptions, ConnectionGuard, Connector, Dispatch,
        DispatchMapper, EqualityPolicies, MapError, MergeMapper, Prop, Props, Provider,
        StateMapper, StateWatcher,
    };
    pub use weft_core::{Action, Batch, ReducerStore, Store, Unsubscribe, Value};
}

pub use weft_connect::{
    bind_action_creators, use_dispatch, use_store, ConnectError, ConnectOptions,
    ConnectionGuard, Connector, ContextValue, Dispatch, DispatchMapper, EqualityPolicies,
    MapError, MapperKind, MergeMapper, Prop, PropFn, Props, PropsSelector, Provider,
    StateMapper, StateWatcher,
};
pub use weft_core::{
    Action, Batch, Callback, ChangeSource, ListenerSet, ReducerStore, Store, Subscription,
    Unsubscribe, Value,
};
