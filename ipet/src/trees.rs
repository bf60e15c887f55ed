//! Trees derived from a [`DirectedGraph`](crate::graph::DirectedGraph).
//!
//! The [`DepthFirstTree`] numbers a graph in pre- and post-order and
//! classifies its edges, the [`LoopNestingTree`] uses the back edges found
//! that way to organise loop headers by containment.

pub mod depth_first;
pub mod loop_nests;

pub use depth_first::{DepthFirstTree, DfsEdgeType};
pub use loop_nests::{LoopNestingTree, TreeNode};
use thiserror::Error;

use crate::graph::{GraphError, VertexId};

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TreeError {
    /// Thrown when the requested root is not a vertex of the graph.
    #[error("Root {0} is not a vertex of the graph")]
    InvalidRoot(VertexId),

    /// Thrown when some vertices cannot be reached from the root. This means
    /// the graph is malformed.
    #[error("Vertices {vertices:?} are unreachable from root {root}")]
    UnreachableVertices { root: VertexId, vertices: Vec<VertexId> },

    /// Thrown when a query names a vertex the tree does not contain.
    #[error("Vertex {0} is not in the tree")]
    NotFound(VertexId),

    #[error("Graph error")]
    Graph(#[from] GraphError),
}

#[cfg(test)]
mod test;
