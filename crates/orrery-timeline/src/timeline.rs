//! The branching history of a simulation run.
//!
//! A [`Timeline`] is an append-only arena of nodes. Every node except the
//! origin has a parent and the delta that leads from the parent to it:
//!
//! - `Wait(d)` advances every cell by `d` of simulated time.
//! - `Emit(event)` is one event emitted by a running task. Emit nodes are
//!   the private, in-progress history of a task during an engine step;
//!   several tasks branching from the same node form a tree.
//! - `Commit(graph)` applies a whole event graph at once. The engine
//!   commits the tree of emit nodes built during a step as one graph.
//!
//! Nodes never change once created, so the state of a cell at a node is
//! a pure function of the node. States are computed by walking back to
//! the nearest memoized ancestor and replaying the deltas forward; results
//! are memoized in a side table keyed by `(cell, node)`.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use orrery_types::{Duration, SerializedValue};
use tracing::debug;

use crate::cell::{AllocatedCell, AnyState, CellId, CellRecord, CellType};
use crate::error::TimelineError;
use crate::graph::EventGraph;
use crate::topic::{Event, Topic};

/// Identity of a node in a [`Timeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in creation order.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

enum Delta {
    Origin,
    Wait(Duration),
    Emit(Event),
    Commit(EventGraph<Event>),
}

struct Node {
    parent: Option<NodeId>,
    delta: Delta,
}

type StateMemo = HashMap<(usize, NodeId), Arc<AnyState>>;

/// Append-only arena of history nodes plus the cells whose state they
/// determine.
pub struct Timeline {
    cells: Vec<Arc<dyn CellRecord>>,
    nodes: Vec<Node>,
    memo: Mutex<StateMemo>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline {
    /// A timeline holding only the origin node and no cells.
    pub fn new() -> Self {
        Self {
            cells: Vec::new(),
            nodes: vec![Node {
                parent: None,
                delta: Delta::Origin,
            }],
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// The initial node.
    pub const fn origin(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the origin exists from construction.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of allocated cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Allocate a cell holding `initial`, interpreting events on `topic`
    /// through `interpreter`.
    pub fn allocate<C, Ev, F>(
        &mut self,
        initial: C::State,
        cell_type: C,
        interpreter: F,
        topic: Topic<Ev>,
    ) -> CellId<C::State>
    where
        C: CellType,
        Ev: Send + Sync + 'static,
        F: Fn(&Ev) -> C::Effect + Send + Sync + 'static,
    {
        let index = self.cells.len();
        self.cells.push(Arc::new(AllocatedCell::new(
            cell_type,
            initial,
            topic,
            Box::new(interpreter),
        )));
        debug!(cell = index, topic = %topic.id(), "Allocated cell");
        CellId::new(index)
    }

    fn node(&self, id: NodeId) -> Result<&Node, TimelineError> {
        self.nodes.get(id.0).ok_or(TimelineError::UnknownNode { node: id })
    }

    fn push(&mut self, parent: NodeId, delta: Delta) -> Result<NodeId, TimelineError> {
        self.node(parent)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            delta,
        });
        Ok(id)
    }

    /// Extend `parent` by one emitted event.
    pub fn emit(&mut self, parent: NodeId, event: Event) -> Result<NodeId, TimelineError> {
        self.push(parent, Delta::Emit(event))
    }

    /// Extend `parent` by elapsed time. A zero wait returns `parent`.
    pub fn wait(&mut self, parent: NodeId, elapsed: Duration) -> Result<NodeId, TimelineError> {
        if elapsed.is_zero() {
            self.node(parent)?;
            return Ok(parent);
        }
        self.push(parent, Delta::Wait(elapsed))
    }

    /// Extend `parent` by a whole event graph. An empty graph returns
    /// `parent`.
    pub fn commit(&mut self, parent: NodeId, graph: EventGraph<Event>) -> Result<NodeId, TimelineError> {
        if graph.is_empty() {
            self.node(parent)?;
            return Ok(parent);
        }
        self.push(parent, Delta::Commit(graph))
    }

    /// Parent of `node`, if any.
    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>, TimelineError> {
        Ok(self.node(node)?.parent)
    }

    /// The event graph formed by every emit node created after `base` that
    /// descends from `base` through emit nodes only.
    ///
    /// Emits along one path are sequential; paths that fork at a node are
    /// concurrent. The result always satisfies the fanout shape required by
    /// [`crate::flatten()`].
    pub fn graph_since(&self, base: NodeId) -> Result<EventGraph<Event>, TimelineError> {
        self.node(base)?;
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut included = std::collections::HashSet::from([base]);
        for (index, node) in self.nodes.iter().enumerate().skip(base.0.saturating_add(1)) {
            if let (Delta::Emit(_), Some(parent)) = (&node.delta, node.parent) {
                if included.contains(&parent) {
                    let id = NodeId(index);
                    included.insert(id);
                    children.entry(parent).or_default().push(id);
                }
            }
        }
        Ok(self.subtree_graph(base, &children))
    }

    fn subtree_graph(&self, root: NodeId, children: &HashMap<NodeId, Vec<NodeId>>) -> EventGraph<Event> {
        let Some(kids) = children.get(&root) else {
            return EventGraph::Empty;
        };
        EventGraph::concurrently_all(kids.iter().map(|&kid| {
            let atom = match self.nodes.get(kid.0).map(|n| &n.delta) {
                Some(Delta::Emit(event)) => EventGraph::atom(event.clone()),
                _ => EventGraph::Empty,
            };
            EventGraph::sequentially(atom, self.subtree_graph(kid, children))
        }))
    }

    // ------------------------------------------------------------------
    // Cell queries
    // ------------------------------------------------------------------

    fn record(&self, index: usize) -> Result<&Arc<dyn CellRecord>, TimelineError> {
        self.cells.get(index).ok_or(TimelineError::UnknownCell { index })
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, StateMemo> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_at(&self, index: usize, node: NodeId) -> Result<Arc<AnyState>, TimelineError> {
        let record = self.record(index)?;
        let mismatch = || TimelineError::StateTypeMismatch { index };

        // Walk back to the nearest memoized ancestor (or the origin).
        let mut pending = Vec::new();
        let mut cursor = node;
        let mut state = loop {
            if let Some(found) = self.memo().get(&(index, cursor)) {
                if cursor == node {
                    return Ok(Arc::clone(found));
                }
                break record.duplicate(&**found).ok_or_else(mismatch)?;
            }
            match self.node(cursor)?.parent {
                Some(parent) => {
                    pending.push(cursor);
                    cursor = parent;
                }
                None => break record.initial_state(),
            }
        };

        // Replay forward, memoizing committed (non-emit) nodes on the way.
        for &id in pending.iter().rev() {
            let delta = &self.node(id)?.delta;
            match delta {
                Delta::Origin => {}
                Delta::Wait(elapsed) => record.step(&mut *state, *elapsed),
                Delta::Emit(event) => record.react_event(&mut *state, event),
                Delta::Commit(graph) => record.react_graph(&mut *state, graph),
            }
            if id != node && !matches!(delta, Delta::Emit(_)) {
                let snapshot = record.duplicate(&*state).ok_or_else(mismatch)?;
                self.memo().insert((index, id), Arc::from(snapshot));
            }
        }

        let state: Arc<AnyState> = Arc::from(state);
        self.memo().insert((index, node), Arc::clone(&state));
        Ok(state)
    }

    /// Value of `cell` at `node`.
    pub fn get<S: Send + Sync + 'static>(&self, node: NodeId, cell: &CellId<S>) -> Result<S, TimelineError> {
        let index = cell.index();
        let state = self.state_at(index, node)?;
        let copy = self
            .record(index)?
            .duplicate(&*state)
            .ok_or(TimelineError::StateTypeMismatch { index })?;
        copy.downcast::<S>()
            .map(|boxed| *boxed)
            .map_err(|_state| TimelineError::StateTypeMismatch { index })
    }

    /// Serialized value of the cell at position `index` at `node`.
    pub fn serialize_cell(&self, node: NodeId, index: usize) -> Result<SerializedValue, TimelineError> {
        let state = self.state_at(index, node)?;
        self.record(index)?
            .serialize(&*state)
            .ok_or(TimelineError::StateTypeMismatch { index })
    }

    /// A read-only view of the timeline at `node`.
    pub const fn querier(&self, node: NodeId) -> Querier<'_> {
        Querier { timeline: self, node }
    }

    /// Render the path from the origin to `tip`, one delta per line, with
    /// events labeled by `label`.
    pub fn debug_trace(&self, tip: NodeId, label: &dyn Fn(&Event) -> String) -> Result<String, TimelineError> {
        let mut path = Vec::new();
        let mut cursor = Some(tip);
        while let Some(id) = cursor {
            let node = self.node(id)?;
            path.push((id, node));
            cursor = node.parent;
        }

        let mut out = String::new();
        for (id, node) in path.iter().rev() {
            let line = match &node.delta {
                Delta::Origin => "origin".to_owned(),
                Delta::Wait(elapsed) => format!("wait {elapsed}"),
                Delta::Emit(event) => format!("emit {}", label(event)),
                Delta::Commit(graph) => format!("commit {}", graph.map(&|e: &Event| label(e))),
            };
            let _ = writeln!(out, "{id}: {line}");
        }
        Ok(out)
    }
}

// ----------------------------------------------------------------------
// Querier
// ----------------------------------------------------------------------

/// Read-only access to cell state at a fixed node.
///
/// This is the only context resource and condition code receives, so
/// evaluating a resource can never emit events or spawn work.
#[derive(Clone, Copy)]
pub struct Querier<'a> {
    timeline: &'a Timeline,
    node: NodeId,
}

impl<'a> Querier<'a> {
    /// The node this querier reads at.
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// The underlying timeline.
    pub const fn timeline(&self) -> &'a Timeline {
        self.timeline
    }

    /// Value of `cell` at this querier's node.
    pub fn get<S: Send + Sync + 'static>(&self, cell: &CellId<S>) -> Result<S, TimelineError> {
        self.timeline.get(self.node, cell)
    }
}

impl core::fmt::Debug for Querier<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Querier").field("node", &self.node).finish_non_exhaustive()
    }
}
