//! Error types for timeline queries.

use crate::timeline::NodeId;

/// Errors that can occur while extending or querying a timeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
    /// The node does not exist in this timeline.
    #[error("unknown timeline node {node}")]
    UnknownNode {
        /// The missing node.
        node: NodeId,
    },

    /// No cell was allocated at this index.
    #[error("no cell allocated at index {index}")]
    UnknownCell {
        /// The requested index.
        index: usize,
    },

    /// The cell's state is not of the requested type.
    #[error("cell {index} does not hold the requested state type")]
    StateTypeMismatch {
        /// Index of the cell.
        index: usize,
    },
}
