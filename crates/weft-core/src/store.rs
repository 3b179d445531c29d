#![forbid(unsafe_code)]

//! Store-facing vocabulary: dynamic values, actions, the store traits, and a
//! minimal reducer-driven reference store.
//!
//! The binding core treats the store as an external collaborator. All it ever
//! does is read a state snapshot, dispatch actions, and register a listener
//! for committed state transitions. [`ChangeSource`] captures the listener
//! half so the subscription graph can chain to a store without knowing its
//! state type; [`Store`] adds the typed snapshot and dispatch surface.
//!
//! [`ReducerStore`] exists so tests, examples, and embedders without their
//! own container have a correct single-threaded store to hand the core. It is
//! deliberately small; production embedders are expected to bring their own.

use std::any::Any;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::batch::Batch;
use crate::listener::ListenerSet;

/// A notification callback. Cloned freely; invoked synchronously.
pub type Callback = Rc<dyn Fn()>;

/// Single-shot detach handle returned by every subscribe operation.
///
/// Calling [`call`](Unsubscribe::call) more than once is a no-op; the inner
/// closure is taken on first use.
pub struct Unsubscribe(RefCell<Option<Box<dyn FnOnce()>>>);

impl Unsubscribe {
    /// Wrap a detach closure.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(RefCell::new(Some(Box::new(f))))
    }

    /// A handle that detaches nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self(RefCell::new(None))
    }

    /// Detach. Idempotent.
    pub fn call(&self) {
        let taken = self.0.borrow_mut().take();
        if let Some(f) = taken {
            f();
        }
    }

    /// Whether the handle has already detached (or never held anything).
    #[must_use]
    pub fn is_spent(&self) -> bool {
        self.0.borrow().is_none()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("spent", &self.is_spent())
            .finish()
    }
}

/// A dynamic value carried by props and action payloads.
///
/// Equality follows `Object.is`-style "alike" semantics: scalars compare by
/// value (with `NaN` alike `NaN`), shared values compare by pointer identity.
#[derive(Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Rc<str>),
    /// An opaque shared value, compared by identity.
    Shared(Rc<dyn Any>),
}

impl Value {
    /// Wrap an arbitrary value as an identity-compared shared value.
    pub fn shared<T: Any>(value: T) -> Self {
        Self::Shared(Rc::new(value))
    }

    /// `Object.is`-style comparison.
    #[must_use]
    pub fn alike(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Shared(a), Value::Shared(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Downcast a shared value.
    #[must_use]
    pub fn downcast<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Shared(rc) => rc.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.alike(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("Unit"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Rc::from(s.as_str()))
    }
}

/// A plain action record: a kind tag plus an optional payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    pub kind: Cow<'static, str>,
    pub payload: Value,
}

impl Action {
    /// An action with no payload.
    pub fn new(kind: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: kind.into(),
            payload: Value::Unit,
        }
    }

    /// An action carrying a payload.
    pub fn with_payload(kind: impl Into<Cow<'static, str>>, payload: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// Anything that can notify listeners after committed state transitions.
///
/// Object-safe on purpose: the subscription graph chains through
/// `ChangeSource` without knowing the state type.
pub trait ChangeSource {
    /// Register `listener` to fire after every committed transition.
    fn subscribe(&self, listener: Callback) -> Unsubscribe;
}

/// The full store surface the binding core consumes.
///
/// This core never mutates state; it reads snapshots and reacts to
/// externally signaled changes. `dispatch` passes the action back through
/// per the usual store contract.
pub trait Store: ChangeSource {
    type State: Clone + 'static;

    /// Synchronous state snapshot.
    fn get_state(&self) -> Self::State;

    /// Trigger a state transition; returns the action unchanged.
    fn dispatch(&self, action: Action) -> Action;
}

/// Minimal single-threaded reducer store.
///
/// State transitions are pure: `reducer(&state, &action)` produces the next
/// state, which is committed before listeners fire. Dispatching from inside
/// a reducer is a contract violation and panics.
pub struct ReducerStore<S> {
    state: RefCell<S>,
    reducer: Box<dyn Fn(&S, &Action) -> S>,
    listeners: ListenerSet,
    dispatching: Cell<bool>,
}

impl<S: Clone + 'static> ReducerStore<S> {
    pub fn new(initial: S, reducer: impl Fn(&S, &Action) -> S + 'static) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(initial),
            reducer: Box::new(reducer),
            listeners: ListenerSet::new(Batch::noop()),
            dispatching: Cell::new(false),
        })
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<S: Clone + 'static> ChangeSource for ReducerStore<S> {
    fn subscribe(&self, listener: Callback) -> Unsubscribe {
        self.listeners.subscribe(listener)
    }
}

impl<S: Clone + 'static> Store for ReducerStore<S> {
    type State = S;

    fn get_state(&self) -> S {
        self.state.borrow().clone()
    }

    fn dispatch(&self, action: Action) -> Action {
        assert!(
            !self.dispatching.get(),
            "reducers may not dispatch actions"
        );
        self.dispatching.set(true);
        let next = (self.reducer)(&self.state.borrow(), &action);
        self.dispatching.set(false);
        *self.state.borrow_mut() = next;
        self.listeners.notify();
        action
    }
}
