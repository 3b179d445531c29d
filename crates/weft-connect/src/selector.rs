#![forbid(unsafe_code)]

//! Memoized props selector: state + own props in, merged props out, with
//! the minimum of mapper re-runs.
//!
//! # Design
//!
//! The selector owns the three resolved mapper slots, the dispatch handle,
//! and a cache of its last inputs and outputs. After the first call it
//! classifies every invocation into one of four branches (props changed,
//! state changed, both, neither) and re-runs only the mappers whose inputs
//! that branch invalidated, honoring each slot's `depends_on_own_props`
//! flag. An unchanged outcome returns the previous `Rc<Props>` allocation
//! itself, so callers can detect "nothing to do" by pointer identity.
//!
//! # Invariants
//!
//! 1. Mapper factories resolve exactly once across the selector's lifetime.
//! 2. `select` with inputs equal under the configured policies returns a
//!    pointer-identical `Rc<Props>`.
//! 3. On error the cache is dropped; the next call recomputes from scratch.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{ConnectError, MapperKind};
use crate::mappers::{
    DispatchMapper, DispatchSlot, MergeMapper, SlotError, StateMapper, StateSlot,
};
use crate::props::{Dispatch, Prop, Props};

/// Pluggable equality policies driving the memoization branches.
///
/// `are_states_equal` receives both own-props generations as well, for
/// policies that treat state equality as contingent on props.
pub struct EqualityPolicies<S> {
    pub are_states_equal: Rc<dyn Fn(&S, &S, &Props, &Props) -> bool>,
    pub are_own_props_equal: Rc<dyn Fn(&Props, &Props) -> bool>,
    pub are_state_props_equal: Rc<dyn Fn(&Props, &Props) -> bool>,
    pub are_merged_props_equal: Rc<dyn Fn(&Props, &Props) -> bool>,
}

impl<S> Clone for EqualityPolicies<S> {
    fn clone(&self) -> Self {
        Self {
            are_states_equal: Rc::clone(&self.are_states_equal),
            are_own_props_equal: Rc::clone(&self.are_own_props_equal),
            are_state_props_equal: Rc::clone(&self.are_state_props_equal),
            are_merged_props_equal: Rc::clone(&self.are_merged_props_equal),
        }
    }
}

impl<S: PartialEq> Default for EqualityPolicies<S> {
    /// `PartialEq` on state snapshots, shallow key-wise equality on props.
    fn default() -> Self {
        Self {
            are_states_equal: Rc::new(|next, prev, _, _| next == prev),
            are_own_props_equal: Rc::new(Props::shallow_eq),
            are_state_props_equal: Rc::new(Props::shallow_eq),
            are_merged_props_equal: Rc::new(Props::shallow_eq),
        }
    }
}

struct Cache<S> {
    state: S,
    own_props: Props,
    state_props: Props,
    dispatch_props: Props,
    merged: Rc<Props>,
}

/// The derivation pipeline for one connected component.
pub struct PropsSelector<S> {
    component: Rc<str>,
    dispatch: Dispatch,
    state_slot: RefCell<StateSlot<S>>,
    dispatch_slot: RefCell<DispatchSlot>,
    merge: MergeMapper,
    policies: EqualityPolicies<S>,
    cache: RefCell<Option<Cache<S>>>,
    uses_store_state: bool,
}

impl<S: Clone + 'static> PropsSelector<S> {
    /// Build a selector for `component`.
    ///
    /// An absent state mapper yields constant empty state props and marks
    /// the selector as independent of store state, which lets the owner
    /// skip store subscription entirely. An absent dispatch mapper yields
    /// the single `"dispatch"` prop.
    #[must_use]
    pub fn new(
        component: &str,
        dispatch: Dispatch,
        map_state: Option<StateMapper<S>>,
        map_dispatch: Option<DispatchMapper>,
        merge: MergeMapper,
        policies: EqualityPolicies<S>,
    ) -> Self {
        let uses_store_state = map_state.is_some();
        let state_slot = match map_state {
            Some(mapper) => StateSlot::Pending(mapper),
            None => StateSlot::constant(Props::new()),
        };
        let dispatch_slot = match map_dispatch {
            Some(mapper) => DispatchSlot::Pending(mapper),
            None => DispatchSlot::constant(
                Props::new().with("dispatch", Prop::Dispatch(dispatch.clone())),
            ),
        };
        Self {
            component: Rc::from(component),
            dispatch,
            state_slot: RefCell::new(state_slot),
            dispatch_slot: RefCell::new(dispatch_slot),
            merge,
            policies,
            cache: RefCell::new(None),
            uses_store_state,
        }
    }

    /// Whether the derived props read store state at all.
    #[must_use]
    pub fn uses_store_state(&self) -> bool {
        self.uses_store_state
    }

    /// Derive merged props for `(next_state, next_own_props)`.
    ///
    /// Returns the previous allocation, pointer-identical, when the
    /// configured policies judge the inputs unchanged.
    pub fn select(&self, next_state: S, next_own_props: &Props) -> Result<Rc<Props>, ConnectError> {
        let result = self.select_inner(next_state, next_own_props);
        if result.is_err() {
            // Full recompute on the next call; a half-updated cache must
            // not feed the memoization branches.
            self.cache.borrow_mut().take();
        }
        result
    }

    fn select_inner(
        &self,
        next_state: S,
        next_own_props: &Props,
    ) -> Result<Rc<Props>, ConnectError> {
        let cached = self.cache.borrow_mut().take();
        let Some(cache) = cached else {
            return self.first_call(next_state, next_own_props);
        };

        let props_changed = !(self.policies.are_own_props_equal)(next_own_props, &cache.own_props);
        let state_changed = !(self.policies.are_states_equal)(
            &next_state,
            &cache.state,
            next_own_props,
            &cache.own_props,
        );
        tracing::trace!(
            component = %self.component,
            props_changed,
            state_changed,
            "selector pass"
        );

        let merged = match (props_changed, state_changed) {
            (false, false) => {
                let merged = Rc::clone(&cache.merged);
                *self.cache.borrow_mut() = Some(cache);
                return Ok(merged);
            }
            (true, true) => self.new_props_and_state(next_state, next_own_props, cache)?,
            (true, false) => self.new_props(next_state, next_own_props, cache)?,
            (false, true) => self.new_state(next_state, next_own_props, cache)?,
        };
        Ok(merged)
    }

    fn first_call(&self, state: S, own_props: &Props) -> Result<Rc<Props>, ConnectError> {
        let state_props = self.run_state_mapper(&state, own_props)?;
        let dispatch_props = self.run_dispatch_mapper(own_props)?;
        let merged = self.run_merge(own_props, &state_props, &dispatch_props, None)?;
        *self.cache.borrow_mut() = Some(Cache {
            state,
            own_props: own_props.clone(),
            state_props,
            dispatch_props,
            merged: Rc::clone(&merged),
        });
        Ok(merged)
    }

    /// Both inputs moved: state props always re-run; dispatch props only if
    /// they read own props; merge unconditionally.
    fn new_props_and_state(
        &self,
        state: S,
        own_props: &Props,
        mut cache: Cache<S>,
    ) -> Result<Rc<Props>, ConnectError> {
        cache.state_props = self.run_state_mapper(&state, own_props)?;
        if self.dispatch_slot.borrow().depends_on_own_props() {
            cache.dispatch_props = self.run_dispatch_mapper(own_props)?;
        }
        self.finish(state, own_props, cache)
    }

    /// Own props moved, state did not: each mapper re-runs only if it reads
    /// own props; merge unconditionally (it always sees own props).
    fn new_props(
        &self,
        state: S,
        own_props: &Props,
        mut cache: Cache<S>,
    ) -> Result<Rc<Props>, ConnectError> {
        if self.state_slot.borrow().depends_on_own_props() {
            cache.state_props = self.run_state_mapper(&state, own_props)?;
        }
        if self.dispatch_slot.borrow().depends_on_own_props() {
            cache.dispatch_props = self.run_dispatch_mapper(own_props)?;
        }
        self.finish(state, own_props, cache)
    }

    /// State moved, own props did not: state props re-run, and the merge
    /// runs only when the resulting state props actually differ.
    fn new_state(
        &self,
        state: S,
        own_props: &Props,
        mut cache: Cache<S>,
    ) -> Result<Rc<Props>, ConnectError> {
        let next_state_props = self.run_state_mapper(&state, own_props)?;
        let changed = !(self.policies.are_state_props_equal)(&next_state_props, &cache.state_props);
        cache.state_props = next_state_props;
        if !changed {
            cache.state = state;
            cache.own_props = own_props.clone();
            let merged = Rc::clone(&cache.merged);
            *self.cache.borrow_mut() = Some(cache);
            return Ok(merged);
        }
        self.finish(state, own_props, cache)
    }

    fn finish(
        &self,
        state: S,
        own_props: &Props,
        mut cache: Cache<S>,
    ) -> Result<Rc<Props>, ConnectError> {
        let merged = self.run_merge(
            own_props,
            &cache.state_props,
            &cache.dispatch_props,
            Some(&cache.merged),
        )?;
        cache.state = state;
        cache.own_props = own_props.clone();
        cache.merged = merged;
        let merged = Rc::clone(&cache.merged);
        *self.cache.borrow_mut() = Some(cache);
        Ok(merged)
    }

    fn run_state_mapper(&self, state: &S, own_props: &Props) -> Result<Props, ConnectError> {
        self.state_slot
            .borrow_mut()
            .call(state, own_props)
            .map_err(|e| self.lift(MapperKind::State, e))
    }

    fn run_dispatch_mapper(&self, own_props: &Props) -> Result<Props, ConnectError> {
        self.dispatch_slot
            .borrow_mut()
            .call(&self.dispatch, own_props)
            .map_err(|e| self.lift(MapperKind::Dispatch, e))
    }

    /// The merge step. A custom merge is memoized: when its output equals
    /// the previous merged props under `are_merged_props_equal`, the
    /// previous allocation is returned unchanged so pointer identity keeps
    /// meaning "nothing new". The default merge skips that check; its
    /// output changes iff an input did.
    fn run_merge(
        &self,
        own_props: &Props,
        state_props: &Props,
        dispatch_props: &Props,
        previous: Option<&Rc<Props>>,
    ) -> Result<Rc<Props>, ConnectError> {
        match &self.merge {
            MergeMapper::Default => Ok(Rc::new(Props::merged(
                own_props,
                state_props,
                dispatch_props,
            ))),
            MergeMapper::Custom(f) => {
                let next = f(own_props, state_props, dispatch_props)
                    .map_err(|e| self.lift(MapperKind::Merge, SlotError::Map(e)))?;
                if let Some(previous) = previous {
                    if (self.policies.are_merged_props_equal)(&next, previous) {
                        return Ok(Rc::clone(previous));
                    }
                }
                Ok(Rc::new(next))
            }
        }
    }

    fn lift(&self, mapper: MapperKind, e: SlotError) -> ConnectError {
        let component = self.component.to_string().into();
        match e {
            SlotError::Map(source) => ConnectError::MapperFailed {
                component,
                mapper,
                source,
            },
            SlotError::FactoryChain => ConnectError::InvalidMapperResult { component, mapper },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapError;
    use crate::props;
    use std::cell::Cell;

    #[derive(Clone, PartialEq, Debug)]
    struct AppState {
        count: i64,
        label: &'static str,
    }

    fn selector_with_counts(
        state_runs: &Rc<Cell<u32>>,
    ) -> PropsSelector<AppState> {
        let state_runs = Rc::clone(state_runs);
        PropsSelector::new(
            "Probe",
            Dispatch::new(|a| a),
            Some(StateMapper::state(move |s: &AppState| {
                state_runs.set(state_runs.get() + 1);
                props!("count" => s.count)
            })),
            None,
            MergeMapper::Default,
            EqualityPolicies::default(),
        )
    }

    #[test]
    fn unchanged_inputs_return_the_same_allocation() {
        let runs = Rc::new(Cell::new(0));
        let selector = selector_with_counts(&runs);
        let state = AppState { count: 1, label: "a" };
        let own = props!("id" => 7);

        let first = selector.select(state.clone(), &own).expect("selects");
        let second = selector.select(state, &own).expect("selects");

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn own_props_change_skips_state_mapper_without_depends_flag() {
        let runs = Rc::new(Cell::new(0));
        let selector = selector_with_counts(&runs);
        let state = AppState { count: 1, label: "a" };

        let first = selector
            .select(state.clone(), &props!("id" => 1))
            .expect("selects");
        let second = selector
            .select(state, &props!("id" => 2))
            .expect("selects");

        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(second.value("id"), Some(&weft_core::Value::from(2)));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn state_change_with_equal_state_props_keeps_identity() {
        let runs = Rc::new(Cell::new(0));
        let selector = selector_with_counts(&runs);
        let own = Props::new();

        let first = selector
            .select(AppState { count: 1, label: "a" }, &own)
            .expect("selects");
        // The label moves but the derived props do not.
        let second = selector
            .select(AppState { count: 1, label: "b" }, &own)
            .expect("selects");

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn absent_dispatch_mapper_yields_the_dispatch_prop() {
        let selector: PropsSelector<i64> = PropsSelector::new(
            "Probe",
            Dispatch::new(|a| a),
            Some(StateMapper::state(|n: &i64| props!("count" => *n))),
            None,
            MergeMapper::Default,
            EqualityPolicies::default(),
        );
        let out = selector.select(3, &Props::new()).expect("selects");
        assert!(out.dispatch("dispatch").is_some());
        assert_eq!(out.value("count"), Some(&weft_core::Value::from(3)));
    }

    #[test]
    fn absent_state_mapper_marks_selector_state_independent() {
        let selector: PropsSelector<i64> = PropsSelector::new(
            "Static",
            Dispatch::new(|a| a),
            None,
            None,
            MergeMapper::Default,
            EqualityPolicies::default(),
        );
        assert!(!selector.uses_store_state());

        let out = selector.select(1, &Props::new()).expect("selects");
        assert_eq!(out.len(), 1);
        assert!(out.dispatch("dispatch").is_some());
    }

    #[test]
    fn custom_merge_memo_keeps_previous_identity_for_equal_output() {
        let merges = Rc::new(Cell::new(0u32));
        let merges_in = Rc::clone(&merges);
        let selector: PropsSelector<AppState> = PropsSelector::new(
            "Probe",
            Dispatch::new(|a| a),
            Some(StateMapper::state(|s: &AppState| {
                props!("count" => s.count, "parity" => s.count % 2)
            })),
            None,
            MergeMapper::custom(move |own, state, _dispatch| {
                merges_in.set(merges_in.get() + 1);
                let mut out = own.clone();
                if let Some(parity) = state.value("parity") {
                    out.set("parity", parity.clone());
                }
                out
            }),
            EqualityPolicies::default(),
        );
        let own = Props::new();

        let first = selector
            .select(AppState { count: 1, label: "a" }, &own)
            .expect("selects");
        // State props differ (count moved) but the merge output does not.
        let second = selector
            .select(AppState { count: 3, label: "a" }, &own)
            .expect("selects");

        assert_eq!(merges.get(), 2);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn error_drops_the_cache_and_recovers_on_next_call() {
        let fail = Rc::new(Cell::new(false));
        let fail_in = Rc::clone(&fail);
        let selector: PropsSelector<i64> = PropsSelector::new(
            "Flaky",
            Dispatch::new(|a| a),
            Some(StateMapper::try_state(move |n: &i64| {
                if fail_in.get() {
                    Err(MapError::new("transient"))
                } else {
                    Ok(props!("count" => *n))
                }
            })),
            None,
            MergeMapper::Default,
            EqualityPolicies::default(),
        );

        selector.select(1, &Props::new()).expect("selects");

        fail.set(true);
        let err = selector.select(2, &Props::new()).expect_err("fails");
        assert!(matches!(err, ConnectError::MapperFailed { mapper: MapperKind::State, .. }));

        fail.set(false);
        let out = selector.select(2, &Props::new()).expect("recovers");
        assert_eq!(out.value("count"), Some(&weft_core::Value::from(2)));
    }
}
