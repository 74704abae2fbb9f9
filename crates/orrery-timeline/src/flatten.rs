//! Linear encoding of event graphs for persistence.
//!
//! [`flatten`] turns a graph into a list of `(CausalTime, event)` pairs and
//! [`unflatten`] rebuilds it. The encoding only covers *fanout* graphs: no
//! event may have an unmerged concurrent node in its causal past, so
//! concurrency can only appear as the final segment of any sequence.
//! Graphs produced by a single engine commit always have this shape.
//!
//! A causal time is a dotted path. Within a sequence the n-th event is
//! numbered `n`. A fan-out in position `n` numbers its `b`-th branch
//! `n.b`, and the events of that branch continue the path, so `3.2.1` is
//! the first event of the second branch of the fan-out that follows two
//! sequential events.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::EventGraph;

/// Errors produced by [`flatten`] and [`unflatten`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlattenError {
    /// A concurrent node is followed by further events in the same
    /// sequence.
    #[error("graph is not a fanout: concurrent branches at {position} are followed by more events")]
    NotFanout {
        /// Causal time of the offending concurrent node.
        position: CausalTime,
    },

    /// A causal time string could not be parsed.
    #[error("malformed causal time: {text:?}")]
    Malformed {
        /// The rejected text.
        text: String,
    },

    /// Two entries claim the same position.
    #[error("duplicate causal time {position}")]
    DuplicatePosition {
        /// The contested position.
        position: CausalTime,
    },

    /// A sequence or fan-out skips a position.
    #[error("missing causal time {position}")]
    MissingPosition {
        /// The first absent position.
        position: CausalTime,
    },
}

/// Dotted path locating an event inside a flattened graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CausalTime(Vec<usize>);

impl CausalTime {
    /// Path components, each at least 1.
    pub fn components(&self) -> &[usize] {
        &self.0
    }

    fn child(&self, components: &[usize]) -> Self {
        let mut path = self.0.clone();
        path.extend_from_slice(components);
        Self(path)
    }
}

impl fmt::Display for CausalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

impl FromStr for CausalTime {
    type Err = FlattenError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let malformed = || FlattenError::Malformed {
            text: text.to_owned(),
        };
        let path = text
            .split('.')
            .map(|part| part.parse::<usize>().ok().filter(|n| *n > 0))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(malformed)?;
        Ok(Self(path))
    }
}

impl TryFrom<String> for CausalTime {
    type Error = FlattenError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<CausalTime> for String {
    fn from(time: CausalTime) -> Self {
        time.to_string()
    }
}

// ----------------------------------------------------------------------
// Flatten
// ----------------------------------------------------------------------

/// Linearize a fanout graph into `(causal time, event)` pairs in
/// depth-first order.
pub fn flatten<E: Clone>(graph: &EventGraph<E>) -> Result<Vec<(CausalTime, E)>, FlattenError> {
    let mut out = Vec::with_capacity(graph.len());
    flatten_into(graph, &CausalTime(Vec::new()), &mut out)?;
    Ok(out)
}

fn flatten_into<E: Clone>(
    graph: &EventGraph<E>,
    prefix: &CausalTime,
    out: &mut Vec<(CausalTime, E)>,
) -> Result<(), FlattenError> {
    let parts = graph.sequence_parts();
    let count = parts.len();
    for (index, part) in parts.into_iter().enumerate() {
        let position = index.saturating_add(1);
        match part {
            EventGraph::Atom(event) => out.push((prefix.child(&[position]), event.clone())),
            EventGraph::Concurrently(..) => {
                if position != count {
                    return Err(FlattenError::NotFanout {
                        position: prefix.child(&[position]),
                    });
                }
                for (branch, subgraph) in part.concurrent_parts().into_iter().enumerate() {
                    flatten_into(subgraph, &prefix.child(&[position, branch.saturating_add(1)]), out)?;
                }
            }
            // `sequence_parts` never yields these.
            EventGraph::Empty | EventGraph::Sequentially(..) => {}
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Unflatten
// ----------------------------------------------------------------------

enum Slot<E> {
    Atom(E),
    Fanout(BTreeMap<usize, Trie<E>>),
}

struct Trie<E> {
    slots: BTreeMap<usize, Slot<E>>,
}

impl<E> Default for Trie<E> {
    fn default() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }
}

impl<E> Trie<E> {
    fn insert(&mut self, path: &[usize], event: E, time: &CausalTime) -> Result<(), FlattenError> {
        let duplicate = || FlattenError::DuplicatePosition {
            position: time.clone(),
        };
        match path {
            [] | [_, _] => Err(FlattenError::Malformed {
                text: time.to_string(),
            }),
            [position] => {
                if self.slots.contains_key(position) {
                    return Err(duplicate());
                }
                self.slots.insert(*position, Slot::Atom(event));
                Ok(())
            }
            [position, branch, rest @ ..] => {
                let slot = self
                    .slots
                    .entry(*position)
                    .or_insert_with(|| Slot::Fanout(BTreeMap::new()));
                match slot {
                    Slot::Atom(_) => Err(duplicate()),
                    Slot::Fanout(branches) => branches.entry(*branch).or_default().insert(rest, event, time),
                }
            }
        }
    }

    fn build(self, prefix: &CausalTime) -> Result<EventGraph<E>, FlattenError> {
        let count = self.slots.len();
        let mut segments = Vec::with_capacity(count);
        for (expected, (position, slot)) in (1..).zip(self.slots) {
            if position != expected {
                return Err(FlattenError::MissingPosition {
                    position: prefix.child(&[expected]),
                });
            }
            match slot {
                Slot::Atom(event) => segments.push(EventGraph::atom(event)),
                Slot::Fanout(branches) => {
                    if position != count {
                        return Err(FlattenError::NotFanout {
                            position: prefix.child(&[position]),
                        });
                    }
                    let mut built = Vec::with_capacity(branches.len());
                    for (expected_branch, (branch, trie)) in (1..).zip(branches) {
                        if branch != expected_branch {
                            return Err(FlattenError::MissingPosition {
                                position: prefix.child(&[position, expected_branch]),
                            });
                        }
                        built.push(trie.build(&prefix.child(&[position, branch]))?);
                    }
                    segments.push(EventGraph::concurrently_all(built));
                }
            }
        }
        Ok(EventGraph::sequentially_all(segments))
    }
}

/// Rebuild a graph from flattened entries, in any order.
///
/// For every fanout graph `g`, `unflatten(flatten(g)?)` displays
/// identically to `g`.
pub fn unflatten<E, I>(entries: I) -> Result<EventGraph<E>, FlattenError>
where
    I: IntoIterator<Item = (CausalTime, E)>,
{
    let mut root = Trie::default();
    for (time, event) in entries {
        root.insert(time.components(), event, &time)?;
    }
    root.build(&CausalTime(Vec::new()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn a(s: &str) -> EventGraph<String> {
        EventGraph::atom(s.to_owned())
    }

    fn times(entries: &[(CausalTime, String)]) -> Vec<String> {
        entries.iter().map(|(t, e)| format!("{t}={e}")).collect()
    }

    #[test]
    fn flatten_numbers_fanout_branches() {
        let g = EventGraph::sequentially_all([
            a("a"),
            a("b"),
            EventGraph::concurrently(a("c"), EventGraph::sequentially(a("d"), a("e"))),
        ]);
        let flat = flatten(&g).unwrap();
        assert_eq!(times(&flat), vec!["1=a", "2=b", "3.1.1=c", "3.2.1=d", "3.2.2=e"]);
    }

    #[test]
    fn flatten_rejects_non_fanout() {
        let g = EventGraph::sequentially(EventGraph::concurrently(a("a"), a("b")), a("c"));
        assert_eq!(
            flatten(&g).unwrap_err(),
            FlattenError::NotFanout {
                position: "1".parse().unwrap()
            }
        );
    }

    #[test]
    fn unflatten_is_left_inverse() {
        let g = EventGraph::sequentially_all([
            a("a"),
            EventGraph::concurrently_all([
                a("b"),
                EventGraph::sequentially(a("c"), EventGraph::concurrently(a("d"), a("e"))),
                a("f"),
            ]),
        ]);
        let mut flat = flatten(&g).unwrap();
        flat.reverse();
        let back = unflatten(flat).unwrap();
        assert_eq!(back.to_string(), g.to_string());
    }

    #[test]
    fn unflatten_reports_gaps_and_duplicates() {
        let gap = vec![("1".parse().unwrap(), "a".to_owned()), ("3".parse().unwrap(), "b".to_owned())];
        assert!(matches!(unflatten(gap), Err(FlattenError::MissingPosition { .. })));

        let dup = vec![("1".parse().unwrap(), "a".to_owned()), ("1".parse().unwrap(), "b".to_owned())];
        assert!(matches!(unflatten(dup), Err(FlattenError::DuplicatePosition { .. })));

        let fanout_then_atom = vec![
            ("1.1.1".parse().unwrap(), "a".to_owned()),
            ("2".parse().unwrap(), "b".to_owned()),
        ];
        assert!(matches!(unflatten(fanout_then_atom), Err(FlattenError::NotFanout { .. })));
    }

    #[test]
    fn causal_time_parsing() {
        assert_eq!("3.2.1".parse::<CausalTime>().unwrap().components(), &[3, 2, 1]);
        assert!("3..1".parse::<CausalTime>().is_err());
        assert!("0".parse::<CausalTime>().is_err());
        assert_eq!(serde_json::to_string(&"1.2.1".parse::<CausalTime>().unwrap()).unwrap(), "\"1.2.1\"");
    }
}
