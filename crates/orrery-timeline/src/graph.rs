//! Series-parallel graphs of events.
//!
//! An [`EventGraph`] records the causal history produced while tasks run:
//! events composed in sequence (`a; b`) or with no order between them
//! (`a | b`). A graph is turned into an effect by folding it through an
//! [`EffectTrait`] bottom-up, substituting each atom with its effect.
//!
//! Graphs should be built through the smart constructors
//! ([`EventGraph::sequentially`], [`EventGraph::concurrently`]), which drop
//! empty operands so that `Empty` only ever appears as a whole graph.

use core::fmt;
use core::marker::PhantomData;

use crate::effect::{EffectTrait, Projection};

/// A tree of sequentially- and concurrently-composed events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum EventGraph<E> {
    /// No events.
    #[default]
    Empty,
    /// A single event.
    Atom(E),
    /// `prefix` happened, then `suffix` happened.
    Sequentially(Box<EventGraph<E>>, Box<EventGraph<E>>),
    /// `left` and `right` happened with no order between them.
    Concurrently(Box<EventGraph<E>>, Box<EventGraph<E>>),
}

impl<E> EventGraph<E> {
    /// The empty graph.
    pub const fn empty() -> Self {
        Self::Empty
    }

    /// A graph with one event.
    pub const fn atom(event: E) -> Self {
        Self::Atom(event)
    }

    /// Sequential composition, dropping empty operands.
    #[must_use]
    pub fn sequentially(prefix: Self, suffix: Self) -> Self {
        match (prefix, suffix) {
            (Self::Empty, other) | (other, Self::Empty) => other,
            (prefix, suffix) => Self::Sequentially(Box::new(prefix), Box::new(suffix)),
        }
    }

    /// Concurrent composition, dropping empty operands.
    #[must_use]
    pub fn concurrently(left: Self, right: Self) -> Self {
        match (left, right) {
            (Self::Empty, other) | (other, Self::Empty) => other,
            (left, right) => Self::Concurrently(Box::new(left), Box::new(right)),
        }
    }

    /// Sequential composition of many segments, in order.
    pub fn sequentially_all<I: IntoIterator<Item = Self>>(segments: I) -> Self {
        segments.into_iter().fold(Self::Empty, Self::sequentially)
    }

    /// Concurrent composition of many branches.
    pub fn concurrently_all<I: IntoIterator<Item = Self>>(branches: I) -> Self {
        branches.into_iter().fold(Self::Empty, Self::concurrently)
    }

    /// Whether the graph holds no events.
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Fold the graph through `effects`, substituting each atom.
    pub fn evaluate<F, T, S>(&self, effects: &T, substitution: &S) -> F
    where
        T: EffectTrait<F> + ?Sized,
        S: Fn(&E) -> F,
    {
        match self {
            Self::Empty => effects.empty(),
            Self::Atom(event) => substitution(event),
            Self::Sequentially(prefix, suffix) => effects.sequentially(
                &prefix.evaluate(effects, substitution),
                &suffix.evaluate(effects, substitution),
            ),
            Self::Concurrently(left, right) => effects.concurrently(
                &left.evaluate(effects, substitution),
                &right.evaluate(effects, substitution),
            ),
        }
    }

    /// Fold the graph through a projection.
    pub fn project<F, P>(&self, projection: &P) -> F
    where
        P: Projection<E, F> + ?Sized,
    {
        self.evaluate(projection, &|event: &E| projection.atom(event))
    }

    /// Whether any event satisfies `predicate`.
    pub fn any<P: Fn(&E) -> bool>(&self, predicate: &P) -> bool {
        match self {
            Self::Empty => false,
            Self::Atom(event) => predicate(event),
            Self::Sequentially(a, b) | Self::Concurrently(a, b) => {
                a.any(predicate) || b.any(predicate)
            }
        }
    }

    /// Number of events in the graph.
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Atom(_) => 1,
            Self::Sequentially(a, b) | Self::Concurrently(a, b) => a.len().saturating_add(b.len()),
        }
    }

    /// Apply `f` to every event, keeping the structure.
    pub fn map<F, M: Fn(&E) -> F>(&self, f: &M) -> EventGraph<F> {
        match self {
            Self::Empty => EventGraph::Empty,
            Self::Atom(event) => EventGraph::Atom(f(event)),
            Self::Sequentially(a, b) => EventGraph::sequentially(a.map(f), b.map(f)),
            Self::Concurrently(a, b) => EventGraph::concurrently(a.map(f), b.map(f)),
        }
    }

    /// Visit the top-level segments of a sequence, flattening nested
    /// sequential nodes and skipping empties.
    pub(crate) fn sequence_parts(&self) -> Vec<&Self> {
        self.collect_parts(|g| match g {
            Self::Sequentially(a, b) => Some((a.as_ref(), b.as_ref())),
            _ => None,
        })
    }

    /// Visit the top-level branches of a concurrent node, flattening nested
    /// concurrent nodes and skipping empties.
    pub(crate) fn concurrent_parts(&self) -> Vec<&Self> {
        self.collect_parts(|g| match g {
            Self::Concurrently(a, b) => Some((a.as_ref(), b.as_ref())),
            _ => None,
        })
    }

    fn collect_parts<'a>(&'a self, split: impl Fn(&'a Self) -> Option<(&'a Self, &'a Self)>) -> Vec<&'a Self> {
        let mut parts = Vec::new();
        let mut stack = vec![self];
        while let Some(graph) = stack.pop() {
            if graph.is_empty() {
                continue;
            }
            match split(graph) {
                Some((first, second)) => {
                    stack.push(second);
                    stack.push(first);
                }
                None => parts.push(graph),
            }
        }
        parts
    }
}

impl<E: Clone> EventGraph<E> {
    /// Keep only events satisfying `keep`, collapsing nodes that become
    /// empty.
    #[must_use]
    pub fn filter<P: Fn(&E) -> bool>(&self, keep: &P) -> Self {
        match self {
            Self::Empty => Self::Empty,
            Self::Atom(event) => {
                if keep(event) {
                    self.clone()
                } else {
                    Self::Empty
                }
            }
            Self::Sequentially(a, b) => Self::sequentially(a.filter(keep), b.filter(keep)),
            Self::Concurrently(a, b) => Self::concurrently(a.filter(keep), b.filter(keep)),
        }
    }
}

impl<E: Clone + PartialEq> EventGraph<E> {
    /// Remove every occurrence of `event`.
    #[must_use]
    pub fn remove(&self, event: &E) -> Self {
        self.filter(&|e: &E| e != event)
    }
}

// ----------------------------------------------------------------------
// Display
// ----------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    Top,
    InSequence,
    InConcurrence,
}

impl<E: fmt::Display> EventGraph<E> {
    fn write_at(&self, f: &mut fmt::Formatter<'_>, position: Position) -> fmt::Result {
        let (parts, separator, needs_parens) = match self {
            Self::Empty => return Ok(()),
            Self::Atom(event) => return write!(f, "{event}"),
            Self::Sequentially(..) => (
                self.sequence_parts(),
                "; ",
                position == Position::InConcurrence,
            ),
            Self::Concurrently(..) => (
                self.concurrent_parts(),
                " | ",
                position == Position::InSequence,
            ),
        };
        let inner = if matches!(self, Self::Sequentially(..)) {
            Position::InSequence
        } else {
            Position::InConcurrence
        };

        if needs_parens {
            write!(f, "(")?;
        }
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                write!(f, "{separator}")?;
            }
            part.write_at(f, inner)?;
        }
        if needs_parens {
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Renders `a; b` for sequence and `a | b` for concurrency, with nested
/// groupings of the other kind parenthesized. Associativity is normalized,
/// so `(a; b); c` and `a; (b; c)` render identically.
impl<E: fmt::Display> fmt::Display for EventGraph<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_at(f, Position::Top)
    }
}

// ----------------------------------------------------------------------
// Identity algebra
// ----------------------------------------------------------------------

/// Effect algebra whose effects are event graphs themselves. Evaluating a
/// graph through it rebuilds the graph.
pub struct IdentityTrait<E> {
    _events: PhantomData<fn() -> E>,
}

impl<E> IdentityTrait<E> {
    /// Create the identity algebra.
    pub const fn new() -> Self {
        Self {
            _events: PhantomData,
        }
    }
}

impl<E> Default for IdentityTrait<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> EffectTrait<EventGraph<E>> for IdentityTrait<E> {
    fn empty(&self) -> EventGraph<E> {
        EventGraph::Empty
    }

    fn sequentially(&self, prefix: &EventGraph<E>, suffix: &EventGraph<E>) -> EventGraph<E> {
        EventGraph::sequentially(prefix.clone(), suffix.clone())
    }

    fn concurrently(&self, left: &EventGraph<E>, right: &EventGraph<E>) -> EventGraph<E> {
        EventGraph::concurrently(left.clone(), right.clone())
    }
}

impl<E: Clone> Projection<E, EventGraph<E>> for IdentityTrait<E> {
    fn atom(&self, event: &E) -> EventGraph<E> {
        EventGraph::Atom(event.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::CollectEffectTrait;

    fn a(s: &str) -> EventGraph<String> {
        EventGraph::atom(s.to_owned())
    }

    #[test]
    fn smart_constructors_drop_empty() {
        let g = EventGraph::sequentially(EventGraph::empty(), a("x"));
        assert_eq!(g, a("x"));
        let g = EventGraph::concurrently(a("x"), EventGraph::empty());
        assert_eq!(g, a("x"));
        assert!(EventGraph::<String>::sequentially_all(Vec::new()).is_empty());
    }

    #[test]
    fn display_normalizes_associativity() {
        let left = EventGraph::sequentially(EventGraph::sequentially(a("a"), a("b")), a("c"));
        let right = EventGraph::sequentially(a("a"), EventGraph::sequentially(a("b"), a("c")));
        assert_eq!(left.to_string(), "a; b; c");
        assert_eq!(left.to_string(), right.to_string());

        let mixed = EventGraph::sequentially(a("a"), EventGraph::concurrently(a("b"), a("c")));
        assert_eq!(mixed.to_string(), "a; (b | c)");
        let mixed = EventGraph::concurrently(EventGraph::sequentially(a("a"), a("b")), a("c"));
        assert_eq!(mixed.to_string(), "(a; b) | c");
    }

    #[test]
    fn evaluate_collects_in_sequence_order() {
        let g = EventGraph::sequentially_all([a("1"), a("2"), a("3")]);
        let collected: Vec<String> = g.evaluate(&CollectEffectTrait, &|e: &String| vec![e.clone()]);
        assert_eq!(collected, vec!["1", "2", "3"]);
    }

    #[test]
    fn identity_projection_rebuilds_graph() {
        let g = EventGraph::sequentially(a("a"), EventGraph::concurrently(a("b"), a("c")));
        let rebuilt = g.project(&IdentityTrait::new());
        assert_eq!(rebuilt, g);
    }

    #[test]
    fn filter_and_remove_collapse_nodes() {
        let g = EventGraph::sequentially(a("a"), EventGraph::concurrently(a("b"), a("c")));
        assert_eq!(g.remove(&"b".to_owned()).to_string(), "a; c");
        assert!(g.filter(&|_: &String| false).is_empty());
        assert_eq!(g.len(), 3);
        assert!(g.any(&|e: &String| e == "c"));
    }
}
