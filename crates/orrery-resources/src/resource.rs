//! Resources: read-only views that turn cell state into dynamics.
//!
//! A resource is evaluated against a [`Querier`], so it can read cells at a
//! fixed history node but can never emit events. Evaluating a resource twice
//! at the same node always gives the same answer.

use std::sync::Arc;

use orrery_timeline::{CellId, Querier, TimelineError};

use crate::dynamics::{DelimitedDynamics, Dynamics};

/// A named, queryable, time-varying value.
pub trait Resource<D>: Send + Sync {
    /// The dynamics holding at the querier's node.
    fn get_dynamics(&self, querier: &Querier<'_>) -> Result<DelimitedDynamics<D>, TimelineError>;
}

impl<D, F> Resource<D> for F
where
    F: Fn(&Querier<'_>) -> Result<DelimitedDynamics<D>, TimelineError> + Send + Sync,
{
    fn get_dynamics(&self, querier: &Querier<'_>) -> Result<DelimitedDynamics<D>, TimelineError> {
        self(querier)
    }
}

/// Shared handle to a resource.
pub type SharedResource<D> = Arc<dyn Resource<D>>;

/// A resource whose dynamics never change.
pub fn constant<D: Dynamics>(dynamics: D) -> SharedResource<D> {
    Arc::new(move |_: &Querier<'_>| -> Result<_, TimelineError> {
        Ok(DelimitedDynamics::persistent(dynamics.clone()))
    })
}

/// A resource derived from the state of one cell. The dynamics persist until
/// the next event touches the cell.
pub fn from_cell<S, D, F>(cell: CellId<S>, derive: F) -> SharedResource<D>
where
    S: Send + Sync + 'static,
    D: 'static,
    F: Fn(&S) -> D + Send + Sync + 'static,
{
    Arc::new(move |querier: &Querier<'_>| -> Result<_, TimelineError> {
        let state = querier.get(&cell)?;
        Ok(DelimitedDynamics::persistent(derive(&state)))
    })
}

/// Apply `f` to the dynamics of `resource`.
pub fn map<D, E, F>(resource: SharedResource<D>, f: F) -> SharedResource<E>
where
    D: 'static,
    E: 'static,
    F: Fn(D) -> E + Send + Sync + 'static,
{
    Arc::new(move |querier: &Querier<'_>| -> Result<_, TimelineError> {
        Ok(resource.get_dynamics(querier)?.map(&f))
    })
}

/// Combine two resources pointwise. The result expires when either input
/// does.
pub fn combine<A, B, E, F>(left: SharedResource<A>, right: SharedResource<B>, f: F) -> SharedResource<E>
where
    A: 'static,
    B: 'static,
    E: 'static,
    F: Fn(A, B) -> E + Send + Sync + 'static,
{
    Arc::new(move |querier: &Querier<'_>| -> Result<_, TimelineError> {
        let a = left.get_dynamics(querier)?;
        let b = right.get_dynamics(querier)?;
        Ok(a.combine(b, &f))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use orrery_timeline::{Accumulator, AccumulatorEffect, AccumulatorState, Event, Timeline, Topic};
    use orrery_types::Duration;

    use super::*;
    use crate::dynamics::{Expiry, RealDynamics};

    #[test]
    fn cell_resource_tracks_the_querier_node() {
        let mut timeline = Timeline::new();
        let topic: Topic<AccumulatorEffect> = Topic::new();
        let cell = timeline.allocate(
            AccumulatorState { value: 1.0, rate: 0.5 },
            Accumulator,
            |effect: &AccumulatorEffect| *effect,
            topic,
        );
        let level = from_cell(cell, |s: &AccumulatorState| RealDynamics::linear(s.value, s.rate));
        let doubled = map(Arc::clone(&level), |d: RealDynamics| d.scaled_by(2.0));
        let total = combine(level, constant(RealDynamics::constant(10.0)), RealDynamics::plus);

        let later = timeline.wait(timeline.origin(), Duration::of(4, Duration::SECOND)).unwrap();
        let later = timeline.emit(later, Event::new(&topic, AccumulatorEffect::add_value(1.0))).unwrap();
        let q = timeline.querier(later);

        assert_eq!(doubled.get_dynamics(&q).unwrap().dynamics, RealDynamics::linear(8.0, 1.0));
        let sum = total.get_dynamics(&q).unwrap();
        assert_eq!(sum.dynamics.extract(), 14.0);
        assert_eq!(sum.expiry, Expiry::NEVER);
    }
}
