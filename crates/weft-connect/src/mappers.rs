#![forbid(unsafe_code)]

//! Mapper normalization: the declared forms a caller hands to `connect`,
//! and the resolved forms the selector actually runs.
//!
//! # Design
//!
//! Each mapper is declared as an explicit tagged variant rather than sniffed
//! from a function's arity. The declared form carries everything the
//! selector needs to resolve it exactly once, on first invocation, into a
//! ready shape: a uniform `(input, own_props) -> Result<Props, _>` call plus
//! a `depends_on_own_props` flag. Factories get their one chance to resolve
//! here; a factory that yields another factory is a configuration error.
//!
//! Argument-shape mistakes are unrepresentable by construction; only
//! *results* (factory chains, mapper failures) remain runtime errors.

use std::borrow::Cow;
use std::rc::Rc;

use weft_core::store::{Action, Value};

use crate::error::MapError;
use crate::props::{Dispatch, Prop, Props};

/// An unbound action creator: arguments in, action out.
pub type ActionCreator = Rc<dyn Fn(&[Value]) -> Action>;

/// Declared state-to-props mapper.
pub enum StateMapper<S> {
    /// Reads state only; own-props changes never re-run it.
    State(Rc<dyn Fn(&S) -> Result<Props, MapError>>),
    /// Reads state and own props; re-runs on either changing.
    StateAndProps(Rc<dyn Fn(&S, &Props) -> Result<Props, MapError>>),
    /// Resolved once, on first invocation, into one of the above.
    Factory(Rc<dyn Fn(&S, &Props) -> Result<StateMapper<S>, MapError>>),
}

impl<S> Clone for StateMapper<S> {
    fn clone(&self) -> Self {
        match self {
            Self::State(f) => Self::State(Rc::clone(f)),
            Self::StateAndProps(f) => Self::StateAndProps(Rc::clone(f)),
            Self::Factory(f) => Self::Factory(Rc::clone(f)),
        }
    }
}

impl<S> StateMapper<S> {
    pub fn state(f: impl Fn(&S) -> Props + 'static) -> Self {
        Self::State(Rc::new(move |state| Ok(f(state))))
    }

    pub fn state_and_props(f: impl Fn(&S, &Props) -> Props + 'static) -> Self {
        Self::StateAndProps(Rc::new(move |state, own| Ok(f(state, own))))
    }

    pub fn try_state(f: impl Fn(&S) -> Result<Props, MapError> + 'static) -> Self {
        Self::State(Rc::new(f))
    }

    pub fn try_state_and_props(
        f: impl Fn(&S, &Props) -> Result<Props, MapError> + 'static,
    ) -> Self {
        Self::StateAndProps(Rc::new(f))
    }

    pub fn factory(f: impl Fn(&S, &Props) -> Result<StateMapper<S>, MapError> + 'static) -> Self {
        Self::Factory(Rc::new(f))
    }
}

/// Declared dispatch-to-props mapper.
#[derive(Clone)]
pub enum DispatchMapper {
    /// Reads the dispatch handle only; computed once.
    Dispatch(Rc<dyn Fn(&Dispatch) -> Result<Props, MapError>>),
    /// Reads dispatch and own props; re-runs when own props change.
    DispatchAndProps(Rc<dyn Fn(&Dispatch, &Props) -> Result<Props, MapError>>),
    /// A named map of action creators, each bound through dispatch once.
    ActionCreators(Vec<(Cow<'static, str>, ActionCreator)>),
    /// Resolved once, on first invocation, into one of the above.
    Factory(Rc<dyn Fn(&Dispatch, &Props) -> Result<DispatchMapper, MapError>>),
}

impl DispatchMapper {
    pub fn dispatch(f: impl Fn(&Dispatch) -> Props + 'static) -> Self {
        Self::Dispatch(Rc::new(move |dispatch| Ok(f(dispatch))))
    }

    pub fn dispatch_and_props(f: impl Fn(&Dispatch, &Props) -> Props + 'static) -> Self {
        Self::DispatchAndProps(Rc::new(move |dispatch, own| Ok(f(dispatch, own))))
    }

    pub fn try_dispatch(f: impl Fn(&Dispatch) -> Result<Props, MapError> + 'static) -> Self {
        Self::Dispatch(Rc::new(f))
    }

    pub fn action_creators(
        creators: impl IntoIterator<Item = (Cow<'static, str>, ActionCreator)>,
    ) -> Self {
        Self::ActionCreators(creators.into_iter().collect())
    }

    /// A single named creator.
    pub fn action_creator(
        name: impl Into<Cow<'static, str>>,
        creator: impl Fn(&[Value]) -> Action + 'static,
    ) -> Self {
        Self::ActionCreators(vec![(name.into(), Rc::new(creator))])
    }

    pub fn factory(
        f: impl Fn(&Dispatch, &Props) -> Result<DispatchMapper, MapError> + 'static,
    ) -> Self {
        Self::Factory(Rc::new(f))
    }
}

/// Declared merge step for own, state, and dispatch props.
#[derive(Clone, Default)]
pub enum MergeMapper {
    /// Shallow merge with later-wins precedence own < state < dispatch.
    #[default]
    Default,
    /// User merge; its result is memoized against shallow equality so an
    /// equal result keeps the previous allocation's identity.
    Custom(Rc<dyn Fn(&Props, &Props, &Props) -> Result<Props, MapError>>),
}

impl MergeMapper {
    pub fn custom(f: impl Fn(&Props, &Props, &Props) -> Props + 'static) -> Self {
        Self::Custom(Rc::new(move |own, state, dispatch| {
            Ok(f(own, state, dispatch))
        }))
    }

    pub fn try_custom(
        f: impl Fn(&Props, &Props, &Props) -> Result<Props, MapError> + 'static,
    ) -> Self {
        Self::Custom(Rc::new(f))
    }
}

/// Bind each creator through `dispatch`: invoking the resulting prop
/// dispatches the created action and returns it.
#[must_use]
pub fn bind_action_creators(
    creators: &[(Cow<'static, str>, ActionCreator)],
    dispatch: &Dispatch,
) -> Props {
    let mut props = Props::new();
    for (name, creator) in creators {
        let creator = Rc::clone(creator);
        let dispatch = dispatch.clone();
        props.set(
            name.clone(),
            Prop::Func(Rc::new(move |args| dispatch.call(creator(args)))),
        );
    }
    props
}

/// Resolution failure, before the selector knows which component it serves.
pub(crate) enum SlotError {
    Map(MapError),
    FactoryChain,
}

impl From<MapError> for SlotError {
    fn from(e: MapError) -> Self {
        SlotError::Map(e)
    }
}

pub(crate) struct Ready<S> {
    call: Rc<dyn Fn(&S, &Props) -> Result<Props, MapError>>,
    pub depends_on_own_props: bool,
}

/// A mapper slot: declared until first use, ready afterwards. Never
/// re-resolved.
pub(crate) enum StateSlot<S> {
    Pending(StateMapper<S>),
    Ready(Ready<S>),
}

impl<S: 'static> StateSlot<S> {
    /// A slot that always yields `props`, ignoring its inputs.
    pub fn constant(props: Props) -> Self {
        StateSlot::Ready(Ready {
            call: Rc::new(move |_, _| Ok(props.clone())),
            depends_on_own_props: false,
        })
    }

    pub fn call(&mut self, state: &S, own: &Props) -> Result<Props, SlotError> {
        if let StateSlot::Pending(declared) = &*self {
            let resolved = match declared.clone() {
                StateMapper::Factory(f) => match f(state, own)? {
                    StateMapper::Factory(_) => return Err(SlotError::FactoryChain),
                    resolved => resolved,
                },
                direct => direct,
            };
            *self = StateSlot::Ready(match resolved {
                StateMapper::State(f) => Ready {
                    call: Rc::new(move |state, _| f(state)),
                    depends_on_own_props: false,
                },
                StateMapper::StateAndProps(f) => Ready {
                    call: Rc::new(move |state, own| f(state, own)),
                    depends_on_own_props: true,
                },
                StateMapper::Factory(_) => unreachable!("factory chain rejected above"),
            });
        }
        let StateSlot::Ready(ready) = self else {
            unreachable!("slot resolved above")
        };
        Ok((ready.call)(state, own)?)
    }

    pub fn depends_on_own_props(&self) -> bool {
        match self {
            StateSlot::Pending(StateMapper::State(_)) => false,
            StateSlot::Pending(_) => true,
            StateSlot::Ready(ready) => ready.depends_on_own_props,
        }
    }
}

pub(crate) enum DispatchSlot {
    Pending(DispatchMapper),
    Ready(ReadyDispatch),
}

pub(crate) struct ReadyDispatch {
    call: Rc<dyn Fn(&Dispatch, &Props) -> Result<Props, MapError>>,
    pub depends_on_own_props: bool,
}

impl DispatchSlot {
    pub fn constant(props: Props) -> Self {
        DispatchSlot::Ready(ReadyDispatch {
            call: Rc::new(move |_, _| Ok(props.clone())),
            depends_on_own_props: false,
        })
    }

    pub fn call(&mut self, dispatch: &Dispatch, own: &Props) -> Result<Props, SlotError> {
        if let DispatchSlot::Pending(declared) = &*self {
            let resolved = match declared.clone() {
                DispatchMapper::Factory(f) => match f(dispatch, own)? {
                    DispatchMapper::Factory(_) => return Err(SlotError::FactoryChain),
                    resolved => resolved,
                },
                direct => direct,
            };
            *self = DispatchSlot::Ready(match resolved {
                DispatchMapper::Dispatch(f) => ReadyDispatch {
                    call: Rc::new(move |dispatch, _| f(dispatch)),
                    depends_on_own_props: false,
                },
                DispatchMapper::DispatchAndProps(f) => ReadyDispatch {
                    call: Rc::new(move |dispatch, own| f(dispatch, own)),
                    depends_on_own_props: true,
                },
                DispatchMapper::ActionCreators(creators) => {
                    // Bound once; the Func identities must stay stable so
                    // shallow equality can recognize unchanged props.
                    let bound = bind_action_creators(&creators, dispatch);
                    ReadyDispatch {
                        call: Rc::new(move |_, _| Ok(bound.clone())),
                        depends_on_own_props: false,
                    }
                }
                DispatchMapper::Factory(_) => unreachable!("factory chain rejected above"),
            });
        }
        let DispatchSlot::Ready(ready) = self else {
            unreachable!("slot resolved above")
        };
        Ok((ready.call)(dispatch, own)?)
    }

    pub fn depends_on_own_props(&self) -> bool {
        match self {
            DispatchSlot::Pending(DispatchMapper::DispatchAndProps(_) | DispatchMapper::Factory(_)) => {
                true
            }
            DispatchSlot::Pending(_) => false,
            DispatchSlot::Ready(ready) => ready.depends_on_own_props,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;
    use std::cell::Cell;
    use weft_core::store::{ReducerStore, Store};

    #[test]
    fn factory_resolves_once() {
        let resolutions = Rc::new(Cell::new(0u32));
        let resolutions_in = Rc::clone(&resolutions);
        let mut slot = StateSlot::Pending(StateMapper::factory(move |_: &i64, _| {
            resolutions_in.set(resolutions_in.get() + 1);
            Ok(StateMapper::state(|n: &i64| props!("count" => *n)))
        }));

        let own = Props::new();
        for state in [1i64, 2, 3] {
            let out = slot.call(&state, &own).ok().expect("mapper succeeds");
            assert_eq!(out.value("count"), Some(&weft_core::Value::from(state)));
        }
        assert_eq!(resolutions.get(), 1);
        assert!(!slot.depends_on_own_props());
    }

    #[test]
    fn factory_chain_is_a_configuration_error() {
        let mut slot: StateSlot<i64> = StateSlot::Pending(StateMapper::factory(|_, _| {
            Ok(StateMapper::factory(|_, _| {
                Ok(StateMapper::state(|_| Props::new()))
            }))
        }));
        assert!(matches!(
            slot.call(&0, &Props::new()),
            Err(SlotError::FactoryChain)
        ));
    }

    #[test]
    fn bound_creator_dispatches_the_created_action() {
        let store = ReducerStore::new(0i64, |n, action| match action.kind() {
            "add" => n + action.payload.as_int().unwrap_or(0),
            _ => *n,
        });
        let dispatch = Dispatch::from_store(&store);

        let mut slot = DispatchSlot::Pending(DispatchMapper::action_creator("add", |args| {
            Action::with_payload("add", args.first().cloned().unwrap_or(Value::Unit))
        }));
        let bound = slot
            .call(&dispatch, &Props::new())
            .ok()
            .expect("binding succeeds");

        let returned = bound.call("add", &[Value::from(5)]).expect("callable prop");
        assert_eq!(returned.kind(), "add");
        assert_eq!(store.get_state(), 5);
    }

    #[test]
    fn bound_creators_keep_their_identity_across_calls() {
        let mut slot = DispatchSlot::Pending(DispatchMapper::action_creator("tick", |_| {
            Action::new("tick")
        }));
        let dispatch = Dispatch::new(|a| a);

        let first = slot.call(&dispatch, &Props::new()).ok().expect("binds");
        let second = slot.call(&dispatch, &Props::new()).ok().expect("binds");
        assert!(first.shallow_eq(&second));
    }
}
