#![forbid(unsafe_code)]

//! Props derivation and connection control on top of `weft-core`.
//!
//! The flow, top to bottom: a [`Provider`](provider::Provider) roots the
//! subscription tree and hands out a [`ContextValue`](provider::ContextValue);
//! each connected component builds a [`Connector`](connector::Connector)
//! from declared [mappers](mappers), which drives a memoized
//! [`PropsSelector`](selector::PropsSelector) to turn store state and own
//! props into the [`Props`](props::Props) the component renders with.
//! [`hooks`] offers the lighter selector-watcher surface for components
//! that want reads without the full pipeline.

pub mod connector;
pub mod error;
pub mod hooks;
pub mod mappers;
pub mod props;
pub mod provider;
pub mod selector;

pub use connector::{ConnectOptions, ConnectionGuard, Connector};
pub use error::{ConnectError, MapError, MapperKind};
pub use hooks::{use_dispatch, use_store, StateWatcher};
pub use mappers::{
    bind_action_creators, ActionCreator, DispatchMapper, MergeMapper, StateMapper,
};
pub use props::{Dispatch, Prop, PropFn, Props};
pub use provider::{ContextValue, Provider};
pub use selector::{EqualityPolicies, PropsSelector};
