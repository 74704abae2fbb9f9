//! Typed simulation state and the type-erased records the timeline keeps.
//!
//! A [`CellType`] says how its effects combine, how an effect changes the
//! state, and how the state evolves while time passes. A cell is one
//! instance of a cell type bound to an initial state and to the topic
//! whose events it interprets. Cells are allocated during initialization
//! and live for the whole run.

use core::any::Any;
use core::fmt;
use core::marker::PhantomData;

use orrery_types::{Duration, MapperError, SerializedValue};

use crate::effect::{EffectTrait, Projection};
use crate::graph::EventGraph;
use crate::topic::{Event, Topic};

/// Behaviour shared by every cell of one kind.
pub trait CellType: Send + Sync + 'static {
    /// The state held by the cell.
    type State: Send + Sync + 'static;

    /// The effects the cell reacts to.
    type Effect: 'static;

    /// How effects combine.
    fn effect_trait(&self) -> &dyn EffectTrait<Self::Effect>;

    /// An independent copy of `state`, so forked branches never alias.
    fn duplicate(&self, state: &Self::State) -> Self::State;

    /// Apply an effect to the state.
    fn apply(&self, state: &mut Self::State, effect: &Self::Effect);

    /// Advance the state by `elapsed` simulated time. Must leave the value
    /// unchanged when `elapsed` is zero.
    fn step(&self, state: &mut Self::State, elapsed: Duration);

    /// Serialized form of the state.
    fn serialize(&self, state: &Self::State) -> SerializedValue;

    /// Rebuild a state from its serialized form.
    fn deserialize(&self, value: &SerializedValue) -> Result<Self::State, MapperError>;
}

/// Typed handle to an allocated cell holding state `S`.
pub struct CellId<S> {
    index: usize,
    _state: PhantomData<fn() -> S>,
}

impl<S> CellId<S> {
    pub(crate) const fn new(index: usize) -> Self {
        Self {
            index,
            _state: PhantomData,
        }
    }

    /// Position of the cell in allocation order.
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl<S> Clone for CellId<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for CellId<S> {}

impl<S> fmt::Debug for CellId<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CellId").field(&self.index).finish()
    }
}

/// Boxed cell state as stored by the timeline.
pub(crate) type AnyState = dyn Any + Send + Sync;

/// Type-erased view of an allocated cell.
pub(crate) trait CellRecord: Send + Sync {
    fn initial_state(&self) -> Box<AnyState>;
    fn duplicate(&self, state: &AnyState) -> Option<Box<AnyState>>;
    fn step(&self, state: &mut AnyState, elapsed: Duration);
    fn react_event(&self, state: &mut AnyState, event: &Event);
    fn react_graph(&self, state: &mut AnyState, graph: &EventGraph<Event>);
    fn serialize(&self, state: &AnyState) -> Option<SerializedValue>;
}

/// A cell type bound to its initial state and event interpreter.
pub(crate) struct AllocatedCell<C: CellType, Ev> {
    cell_type: C,
    initial: C::State,
    topic: Topic<Ev>,
    interpreter: Box<dyn Fn(&Ev) -> C::Effect + Send + Sync>,
}

impl<C: CellType, Ev> AllocatedCell<C, Ev> {
    pub(crate) fn new(
        cell_type: C,
        initial: C::State,
        topic: Topic<Ev>,
        interpreter: Box<dyn Fn(&Ev) -> C::Effect + Send + Sync>,
    ) -> Self {
        Self {
            cell_type,
            initial,
            topic,
            interpreter,
        }
    }
}

impl<C: CellType, Ev: 'static> EffectTrait<C::Effect> for AllocatedCell<C, Ev> {
    fn empty(&self) -> C::Effect {
        self.cell_type.effect_trait().empty()
    }

    fn sequentially(&self, prefix: &C::Effect, suffix: &C::Effect) -> C::Effect {
        self.cell_type.effect_trait().sequentially(prefix, suffix)
    }

    fn concurrently(&self, left: &C::Effect, right: &C::Effect) -> C::Effect {
        self.cell_type.effect_trait().concurrently(left, right)
    }
}

impl<C: CellType, Ev: 'static> Projection<Event, C::Effect> for AllocatedCell<C, Ev> {
    fn atom(&self, event: &Event) -> C::Effect {
        event
            .extract(&self.topic)
            .map_or_else(|| self.empty(), |payload| (self.interpreter)(payload))
    }
}

impl<C: CellType, Ev: 'static> CellRecord for AllocatedCell<C, Ev> {
    fn initial_state(&self) -> Box<AnyState> {
        Box::new(self.cell_type.duplicate(&self.initial))
    }

    fn duplicate(&self, state: &AnyState) -> Option<Box<AnyState>> {
        let state = state.downcast_ref::<C::State>()?;
        Some(Box::new(self.cell_type.duplicate(state)))
    }

    fn step(&self, state: &mut AnyState, elapsed: Duration) {
        if elapsed.is_zero() {
            return;
        }
        if let Some(state) = state.downcast_mut::<C::State>() {
            self.cell_type.step(state, elapsed);
        }
    }

    fn react_event(&self, state: &mut AnyState, event: &Event) {
        if event.topic() != self.topic.id() {
            return;
        }
        if let Some(state) = state.downcast_mut::<C::State>() {
            let effect = self.atom(event);
            self.cell_type.apply(state, &effect);
        }
    }

    fn react_graph(&self, state: &mut AnyState, graph: &EventGraph<Event>) {
        let topic = self.topic.id();
        if !graph.any(&|event: &Event| event.topic() == topic) {
            return;
        }
        if let Some(state) = state.downcast_mut::<C::State>() {
            let effect = graph.project(self);
            self.cell_type.apply(state, &effect);
        }
    }

    fn serialize(&self, state: &AnyState) -> Option<SerializedValue> {
        state
            .downcast_ref::<C::State>()
            .map(|state| self.cell_type.serialize(state))
    }
}
