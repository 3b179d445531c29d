#![forbid(unsafe_code)]

//! Core primitives for binding views to an external state store.
//!
//! This crate holds the store-agnostic plumbing: dynamic values and actions,
//! the [`ChangeSource`]/[`Store`] traits, an ordered listener registry, the
//! top-down subscription tree, and an explicit batch scope. Higher-level
//! props derivation and connection logic live in `weft-connect`.
//!
//! Everything here is single-threaded by contract: `Rc`, `RefCell`, and
//! `Cell` throughout, no `Send`/`Sync` bounds anywhere.

pub mod batch;
pub mod listener;
pub mod store;
pub mod subscription;

pub use batch::Batch;
pub use listener::ListenerSet;
pub use store::{Action, Callback, ChangeSource, ReducerStore, Store, Unsubscribe, Value};
pub use subscription::Subscription;
