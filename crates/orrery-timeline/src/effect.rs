//! The algebra that combines effects.
//!
//! An [`EffectTrait`] describes how effects of one type compose:
//!
//! - `empty()` is a two-sided identity for both combinators.
//! - `sequentially(a, b)` means "a happened, then b happened" and need not
//!   commute.
//! - `concurrently(a, b)` combines effects with no causal order between
//!   them. It must commute and should associate. When two concurrent
//!   effects cannot be merged without losing information, the result must
//!   record a conflict instead of picking a winner.
//!
//! A [`Projection`] adds the rule that turns a single event into an effect,
//! which is everything needed to evaluate an
//! [`EventGraph`](crate::graph::EventGraph).

/// Combination rules for effects of type `E`.
pub trait EffectTrait<E>: Send + Sync {
    /// The effect of nothing happening.
    fn empty(&self) -> E;

    /// The effect of `prefix` followed by `suffix`.
    fn sequentially(&self, prefix: &E, suffix: &E) -> E;

    /// The effect of `left` and `right` with no order between them.
    fn concurrently(&self, left: &E, right: &E) -> E;
}

/// An [`EffectTrait`] that can also interpret individual events.
pub trait Projection<Ev, E>: EffectTrait<E> {
    /// The effect of a single event.
    fn atom(&self, event: &Ev) -> E;
}

/// Effect algebra for integer deltas: both combinators add.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumEffectTrait;

impl EffectTrait<i64> for SumEffectTrait {
    fn empty(&self) -> i64 {
        0
    }

    fn sequentially(&self, prefix: &i64, suffix: &i64) -> i64 {
        prefix.saturating_add(*suffix)
    }

    fn concurrently(&self, left: &i64, right: &i64) -> i64 {
        left.saturating_add(*right)
    }
}

/// Effect algebra that keeps every event. Sequential lists keep their
/// order. Two non-empty concurrent lists are merged into ascending order,
/// since nothing orders the branches themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectEffectTrait;

impl<T: Clone + Ord + Send + Sync> EffectTrait<Vec<T>> for CollectEffectTrait {
    fn empty(&self) -> Vec<T> {
        Vec::new()
    }

    fn sequentially(&self, prefix: &Vec<T>, suffix: &Vec<T>) -> Vec<T> {
        prefix.iter().chain(suffix).cloned().collect()
    }

    fn concurrently(&self, left: &Vec<T>, right: &Vec<T>) -> Vec<T> {
        if left.is_empty() {
            return right.clone();
        }
        if right.is_empty() {
            return left.clone();
        }
        let mut merged: Vec<T> = left.iter().chain(right).cloned().collect();
        merged.sort();
        merged
    }
}
