#![forbid(unsafe_code)]

//! Dynamic props: the key-value bags flowing through the derivation
//! pipeline.
//!
//! A [`Props`] map carries three kinds of entries: plain [`Value`]s, the raw
//! [`Dispatch`] handle, and bound callable props (closures that usually
//! dispatch an action when invoked). Equality is shallow and key-wise:
//! values compare alike, callables compare by pointer identity. That policy
//! is what the memoization layer leans on, so it lives here next to the
//! types it judges.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use weft_core::store::{Action, Store, Value};

/// The dispatch half of a store, detached from the state type.
///
/// Cloneable; clones compare equal by pointer identity.
#[derive(Clone)]
pub struct Dispatch(Rc<dyn Fn(Action) -> Action>);

impl Dispatch {
    pub fn new(f: impl Fn(Action) -> Action + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// A dispatch handle bound to `store`.
    pub fn from_store<St>(store: &Rc<St>) -> Self
    where
        St: Store + ?Sized + 'static,
    {
        let store = Rc::clone(store);
        Self(Rc::new(move |action| store.dispatch(action)))
    }

    /// Dispatch `action`; returns it per the store contract.
    pub fn call(&self, action: Action) -> Action {
        (self.0)(action)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Dispatch) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dispatch(..)")
    }
}

/// A bound callable prop. Usually dispatches internally and hands the
/// dispatched action back.
pub type PropFn = Rc<dyn Fn(&[Value]) -> Action>;

/// One entry in a props map.
#[derive(Clone)]
pub enum Prop {
    Value(Value),
    Dispatch(Dispatch),
    Func(PropFn),
}

impl PartialEq for Prop {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Prop::Value(a), Prop::Value(b)) => a.alike(b),
            (Prop::Dispatch(a), Prop::Dispatch(b)) => a.ptr_eq(b),
            (Prop::Func(a), Prop::Func(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Value(v) => write!(f, "{v:?}"),
            Prop::Dispatch(_) => f.write_str("Dispatch(..)"),
            Prop::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl From<Value> for Prop {
    fn from(v: Value) -> Self {
        Prop::Value(v)
    }
}

impl From<Dispatch> for Prop {
    fn from(d: Dispatch) -> Self {
        Prop::Dispatch(d)
    }
}

macro_rules! prop_from_scalar {
    ($($ty:ty),+) => {$(
        impl From<$ty> for Prop {
            fn from(v: $ty) -> Self {
                Prop::Value(Value::from(v))
            }
        }
    )+};
}

prop_from_scalar!((), bool, i32, i64, f64, &str, String);

/// Shallow key-value props map.
#[derive(Clone, Default, PartialEq)]
pub struct Props {
    map: AHashMap<Cow<'static, str>, Prop>,
}

impl Props {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<Cow<'static, str>>, prop: impl Into<Prop>) {
        self.map.insert(key.into(), prop.into());
    }

    /// Builder-style [`set`](Props::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<Cow<'static, str>>, prop: impl Into<Prop>) -> Self {
        self.set(key, prop);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Prop> {
        self.map.get(key)
    }

    /// The plain value under `key`, if the entry is one.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.map.get(key) {
            Some(Prop::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// The dispatch handle under `key`, if the entry is one.
    #[must_use]
    pub fn dispatch(&self, key: &str) -> Option<&Dispatch> {
        match self.map.get(key) {
            Some(Prop::Dispatch(d)) => Some(d),
            _ => None,
        }
    }

    /// Invoke the callable prop under `key`. `None` when the entry is
    /// missing or not callable.
    pub fn call(&self, key: &str, args: &[Value]) -> Option<Action> {
        match self.map.get(key) {
            Some(Prop::Func(f)) => Some(f(args)),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Prop)> {
        self.map.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// Key-wise shallow equality: same keys, entry-wise [`Prop`] equality.
    #[must_use]
    pub fn shallow_eq(&self, other: &Props) -> bool {
        self.map.len() == other.map.len()
            && self
                .map
                .iter()
                .all(|(k, v)| other.map.get(k).is_some_and(|o| o == v))
    }

    /// The default merge: one map with later-wins precedence
    /// own < state < dispatch.
    #[must_use]
    pub fn merged(own: &Props, state: &Props, dispatch: &Props) -> Props {
        let mut map = AHashMap::with_capacity(own.len() + state.len() + dispatch.len());
        for source in [own, state, dispatch] {
            for (k, v) in &source.map {
                map.insert(k.clone(), v.clone());
            }
        }
        Props { map }
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.map.iter()).finish()
    }
}

/// Build a [`Props`] map from `key => value` pairs.
#[macro_export]
macro_rules! props {
    () => { $crate::props::Props::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::props::Props::new();
        $( map.set($key, $value); )+
        map
    }};
}
