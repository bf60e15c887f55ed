//! Depth-first numbering and edge classification.
//!
//! The traversal keeps an explicit work stack rather than recursing, so the
//! depth of the graph is not bounded by the call stack. The numbering is the
//! one a recursive traversal produces: a vertex is given its post-order
//! index only once every one of its tree children is finished.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::{Result, TreeError};
use crate::graph::{DirectedGraph, VertexId};

/// The classification of an edge relative to a [`DepthFirstTree`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DfsEdgeType {
    TreeEdge,
    BackEdge,
    CrossForwardEdge,
}

#[derive(Debug, Clone)]
pub struct DepthFirstTree {
    root: VertexId,
    pre: HashMap<VertexId, usize>,
    post: HashMap<VertexId, usize>,
    pre_to_vertex: Vec<VertexId>,
    post_to_vertex: Vec<VertexId>,
    parent: HashMap<VertexId, VertexId>,
    back_edges: HashMap<VertexId, Vec<VertexId>>,
    unreached: Vec<VertexId>,
    height: usize,
}

/// One suspended call of the recursive formulation.
struct Frame {
    vertex: VertexId,
    next_successor: usize,
    depth: usize,
}

impl DepthFirstTree {
    /// Builds the tree and requires every vertex to be reachable from `root`.
    pub fn new(graph: &DirectedGraph, root: VertexId) -> Result<Self> {
        let tree = Self::partial(graph, root)?;
        if !tree.unreached.is_empty() {
            return Err(TreeError::UnreachableVertices {
                root,
                vertices: tree.unreached,
            });
        }
        Ok(tree)
    }

    /// Builds the tree, leaving vertices that cannot be reached from `root`
    /// with pre- and post-order index 0. They are listed by
    /// [`unreached`](Self::unreached).
    pub fn partial(graph: &DirectedGraph, root: VertexId) -> Result<Self> {
        if !graph.has_vertex(root) {
            return Err(TreeError::InvalidRoot(root));
        }
        debug!("Depth-first search of {} from root {}", graph.name(), root);

        let mut tree = Self {
            root,
            pre: graph.vertices().map(|v| (v.id(), 0)).collect(),
            post: graph.vertices().map(|v| (v.id(), 0)).collect(),
            pre_to_vertex: Vec::with_capacity(graph.number_of_vertices()),
            post_to_vertex: Vec::with_capacity(graph.number_of_vertices()),
            parent: HashMap::new(),
            back_edges: graph.vertices().map(|v| (v.id(), Vec::new())).collect(),
            unreached: Vec::new(),
            height: 0,
        };

        tree.visit(root);
        let mut stack = vec![Frame {
            vertex: root,
            next_successor: 0,
            depth: 1,
        }];

        while let Some(frame) = stack.last_mut() {
            let vertex = frame.vertex;
            let successors = graph.vertex(vertex)?.successors();

            if frame.next_successor == successors.len() {
                // Every successor is done, finish this vertex.
                tree.height = tree.height.max(frame.depth);
                let post_id = tree.post_to_vertex.len() + 1;
                tree.post.insert(vertex, post_id);
                tree.post_to_vertex.push(vertex);
                trace!("Finished {} (post-order = {})", vertex, post_id);
                stack.pop();
                continue;
            }

            let edge = graph.edge(successors[frame.next_successor])?;
            frame.next_successor += 1;
            let depth = frame.depth;
            let successor = edge.destination();

            if tree.pre[&successor] == 0 {
                tree.parent.insert(successor, vertex);
                tree.visit(successor);
                stack.push(Frame {
                    vertex: successor,
                    next_successor: 0,
                    depth: depth + 1,
                });
            } else if tree.pre[&vertex] < tree.pre[&successor] {
                // Forward edge into an already finished subtree.
            } else if tree.post[&successor] == 0 {
                trace!("Back edge {} -> {}", vertex, successor);
                let targets = tree.back_edges.entry(vertex).or_default();
                if !targets.contains(&successor) {
                    targets.push(successor);
                }
            }
        }

        tree.unreached = graph
            .vertices()
            .map(|v| v.id())
            .filter(|id| tree.pre[id] == 0)
            .collect();
        if !tree.unreached.is_empty() {
            debug!(
                "Vertices {:?} are unreachable from {}",
                tree.unreached, root
            );
        }

        Ok(tree)
    }

    fn visit(&mut self, vertex: VertexId) {
        let pre_id = self.pre_to_vertex.len() + 1;
        trace!("Visiting {} (pre-order = {})", vertex, pre_id);
        self.pre.insert(vertex, pre_id);
        self.pre_to_vertex.push(vertex);
    }

    pub fn root(&self) -> VertexId {
        self.root
    }

    /// Pre-order index of `vertex`, 1-based. Unreached vertices have index 0.
    pub fn pre_id(&self, vertex: VertexId) -> Result<usize> {
        self.pre
            .get(&vertex)
            .copied()
            .ok_or(TreeError::NotFound(vertex))
    }

    /// Post-order index of `vertex`, 1-based. Unreached vertices have index 0.
    pub fn post_id(&self, vertex: VertexId) -> Result<usize> {
        self.post
            .get(&vertex)
            .copied()
            .ok_or(TreeError::NotFound(vertex))
    }

    pub fn pre_vertex(&self, pre_id: usize) -> Option<VertexId> {
        pre_id
            .checked_sub(1)
            .and_then(|index| self.pre_to_vertex.get(index))
            .copied()
    }

    pub fn post_vertex(&self, post_id: usize) -> Option<VertexId> {
        post_id
            .checked_sub(1)
            .and_then(|index| self.post_to_vertex.get(index))
            .copied()
    }

    /// Reached vertices in pre-order.
    pub fn pre_order(&self) -> &[VertexId] {
        &self.pre_to_vertex
    }

    /// Reached vertices in post-order.
    pub fn post_order(&self) -> &[VertexId] {
        &self.post_to_vertex
    }

    /// The tree parent of `vertex`, `None` for the root and unreached vertices.
    pub fn parent(&self, vertex: VertexId) -> Option<VertexId> {
        self.parent.get(&vertex).copied()
    }

    /// The DFS ancestors `vertex` has a back edge to, in discovery order.
    pub fn back_edge_targets(&self, vertex: VertexId) -> &[VertexId] {
        self.back_edges
            .get(&vertex)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Sources of back edges into `header`, in pre-order.
    pub fn back_edge_sources(&self, header: VertexId) -> Vec<VertexId> {
        self.pre_to_vertex
            .iter()
            .copied()
            .filter(|source| self.back_edge_targets(*source).contains(&header))
            .collect()
    }

    /// Whether `ancestor` is `vertex` or one of its ancestors in the tree.
    pub fn is_ancestor(&self, ancestor: VertexId, vertex: VertexId) -> bool {
        match (
            self.pre.get(&ancestor),
            self.post.get(&ancestor),
            self.pre.get(&vertex),
            self.post.get(&vertex),
        ) {
            (Some(&pre_a), Some(&post_a), Some(&pre_v), Some(&post_v)) => {
                pre_a != 0 && pre_v != 0 && pre_a <= pre_v && post_v <= post_a
            }
            _ => false,
        }
    }

    pub fn unreached(&self) -> &[VertexId] {
        &self.unreached
    }

    /// Number of vertices on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Classifies the edge `source -> destination`.
    pub fn edge_type(&self, source: VertexId, destination: VertexId) -> DfsEdgeType {
        if destination != self.root && self.parent(destination) == Some(source) {
            DfsEdgeType::TreeEdge
        } else if self.back_edge_targets(source).contains(&destination) {
            DfsEdgeType::BackEdge
        } else {
            DfsEdgeType::CrossForwardEdge
        }
    }
}
