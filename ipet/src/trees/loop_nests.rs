//! The loop nesting tree (LNT) of a flow graph.
//!
//! ## Construction
//!
//! Every target of a back edge in the [`DepthFirstTree`] rooted at the
//! graph's entry is a loop header. Headers are processed in post-order so
//! that inner loops are found before the loops enclosing them; the body of
//! each loop is collected by walking predecessors backwards from the sources
//! of its back edges, and once found it is collapsed into its header.
//!
//! The root of the tree is the header that stands for the whole subprogram.
//! It is the entry vertex, at level 0, whether or not the graph closes the
//! entry into a loop.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace, warn};

use super::{DepthFirstTree, Result, TreeError};
use crate::graph::{DirectedGraph, EdgeKind, VertexId};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HeaderNode {
    id: VertexId,
    parent: Option<VertexId>,
    level: usize,
    self_loop: bool,
    proper_ancestors: Vec<VertexId>,
    back_edge_sources: Vec<VertexId>,
    body: Vec<VertexId>,
}

impl HeaderNode {
    pub fn id(&self) -> VertexId {
        self.id
    }

    /// The enclosing header, `None` for the root.
    pub fn parent(&self) -> Option<VertexId> {
        self.parent
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn is_self_loop(&self) -> bool {
        self.self_loop
    }

    /// Enclosing headers, innermost first, ending with the root.
    pub fn proper_ancestors(&self) -> &[VertexId] {
        &self.proper_ancestors
    }

    pub fn back_edge_sources(&self) -> &[VertexId] {
        &self.back_edge_sources
    }

    /// Vertices directly nested in this loop, inner headers included, in
    /// graph order.
    pub fn body(&self) -> &[VertexId] {
        &self.body
    }
}

/// A vertex of the loop nesting tree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TreeNode {
    Ordinary {
        id: VertexId,
        parent: VertexId,
        level: usize,
    },
    Header(HeaderNode),
}

impl TreeNode {
    pub fn id(&self) -> VertexId {
        match self {
            Self::Ordinary { id, .. } => *id,
            Self::Header(header) => header.id,
        }
    }

    pub fn parent(&self) -> Option<VertexId> {
        match self {
            Self::Ordinary { parent, .. } => Some(*parent),
            Self::Header(header) => header.parent,
        }
    }

    pub fn level(&self) -> usize {
        match self {
            Self::Ordinary { level, .. } => *level,
            Self::Header(header) => header.level,
        }
    }

    pub fn as_header(&self) -> Option<&HeaderNode> {
        match self {
            Self::Header(header) => Some(header),
            Self::Ordinary { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopNestingTree {
    root: VertexId,
    nodes: HashMap<VertexId, TreeNode>,
    levels: Vec<Vec<VertexId>>,
}

impl LoopNestingTree {
    /// Builds the tree of `graph`, rooted at its designated entry vertex.
    pub fn new(graph: &DirectedGraph) -> Result<Self> {
        let entry = graph.entry()?;
        let dfs = DepthFirstTree::new(graph, entry)?;
        Self::from_depth_first_tree(graph, &dfs)
    }

    /// Builds the tree from an existing depth-first tree of `graph`. The
    /// depth-first tree must have reached every vertex.
    pub fn from_depth_first_tree(graph: &DirectedGraph, dfs: &DepthFirstTree) -> Result<Self> {
        if !dfs.unreached().is_empty() {
            return Err(TreeError::UnreachableVertices {
                root: dfs.root(),
                vertices: dfs.unreached().to_vec(),
            });
        }
        let root = dfs.root();
        debug!("Building loop nesting tree of {} rooted at {}", graph.name(), root);

        let mut sources: HashMap<VertexId, Vec<VertexId>> = HashMap::new();
        for &vertex in dfs.pre_order() {
            for &target in dfs.back_edge_targets(vertex) {
                sources.entry(target).or_default().push(vertex);
            }
        }

        // Maps a collapsed vertex to the header it was collapsed into.
        let mut loop_parent: HashMap<VertexId, VertexId> = HashMap::new();
        let find = |loop_parent: &HashMap<VertexId, VertexId>, mut vertex: VertexId| {
            while let Some(&parent) = loop_parent.get(&vertex) {
                vertex = parent;
            }
            vertex
        };

        let mut self_loops = HashSet::new();
        for &header in dfs.post_order() {
            let Some(header_sources) = sources.get(&header) else {
                continue;
            };

            let mut body = HashSet::new();
            let mut work: Vec<VertexId> = header_sources
                .iter()
                .map(|source| find(&loop_parent, *source))
                .filter(|source| *source != header)
                .collect();

            while let Some(vertex) = work.pop() {
                if !body.insert(vertex) {
                    continue;
                }
                for edge in graph.predecessor_edges(vertex)? {
                    let predecessor = edge.source();
                    if dfs.back_edge_targets(predecessor).contains(&vertex) {
                        // Iterations of an inner loop, already collapsed.
                        continue;
                    }
                    let predecessor = find(&loop_parent, predecessor);
                    if predecessor == header || body.contains(&predecessor) {
                        continue;
                    }
                    if !dfs.is_ancestor(header, predecessor) {
                        warn!(
                            "Loop with header {} is irreducible: {} enters it at {}",
                            header, predecessor, vertex
                        );
                        continue;
                    }
                    work.push(predecessor);
                }
            }

            if body.is_empty() {
                trace!("Header {} is a self loop", header);
                self_loops.insert(header);
            }
            debug!("Found header {} with {} collapsed vertices", header, body.len());
            for vertex in body {
                loop_parent.insert(vertex, header);
            }
        }

        for vertex in graph.vertices() {
            if vertex.id() != root && !loop_parent.contains_key(&vertex.id()) {
                loop_parent.insert(vertex.id(), root);
            }
        }

        // Parents are DFS ancestors, so pre-order visits them first.
        let mut levels_of: HashMap<VertexId, usize> = HashMap::new();
        let mut ancestors_of: HashMap<VertexId, Vec<VertexId>> = HashMap::new();
        levels_of.insert(root, 0);
        ancestors_of.insert(root, Vec::new());
        for &vertex in dfs.pre_order() {
            if vertex == root {
                continue;
            }
            let parent = loop_parent[&vertex];
            levels_of.insert(vertex, levels_of[&parent] + 1);
            if sources.contains_key(&vertex) {
                let mut ancestors = vec![parent];
                ancestors.extend(ancestors_of[&parent].iter().copied());
                ancestors_of.insert(vertex, ancestors);
            }
        }

        let mut bodies: HashMap<VertexId, Vec<VertexId>> = HashMap::new();
        let mut levels: Vec<Vec<VertexId>> = Vec::new();
        for vertex in graph.vertices() {
            let id = vertex.id();
            if let Some(parent) = loop_parent.get(&id) {
                bodies.entry(*parent).or_default().push(id);
            }
            let level = levels_of[&id];
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(id);
        }

        let mut nodes = HashMap::new();
        for vertex in graph.vertices() {
            let id = vertex.id();
            let node = if id == root || sources.contains_key(&id) {
                TreeNode::Header(HeaderNode {
                    id,
                    parent: loop_parent.get(&id).copied(),
                    level: levels_of[&id],
                    self_loop: self_loops.contains(&id),
                    proper_ancestors: ancestors_of.remove(&id).unwrap_or_default(),
                    back_edge_sources: sources.get(&id).cloned().unwrap_or_default(),
                    body: bodies.remove(&id).unwrap_or_default(),
                })
            } else {
                TreeNode::Ordinary {
                    id,
                    parent: loop_parent[&id],
                    level: levels_of[&id],
                }
            };
            nodes.insert(id, node);
        }

        Ok(Self {
            root,
            nodes,
            levels,
        })
    }

    pub fn root(&self) -> VertexId {
        self.root
    }

    /// Number of levels in the tree.
    pub fn height(&self) -> usize {
        self.levels.len()
    }

    pub fn node(&self, vertex: VertexId) -> Result<&TreeNode> {
        self.nodes.get(&vertex).ok_or(TreeError::NotFound(vertex))
    }

    pub fn header(&self, vertex: VertexId) -> Result<&HeaderNode> {
        self.node(vertex)?
            .as_header()
            .ok_or(TreeError::NotFound(vertex))
    }

    pub fn is_loop_header(&self, vertex: VertexId) -> bool {
        matches!(self.nodes.get(&vertex), Some(TreeNode::Header(_)))
    }

    pub fn is_self_loop(&self, vertex: VertexId) -> bool {
        matches!(self.nodes.get(&vertex), Some(TreeNode::Header(header)) if header.self_loop)
    }

    pub fn level(&self, vertex: VertexId) -> Result<usize> {
        Ok(self.node(vertex)?.level())
    }

    pub fn parent(&self, vertex: VertexId) -> Option<VertexId> {
        self.nodes.get(&vertex).and_then(TreeNode::parent)
    }

    /// Headers strictly enclosing `header`, innermost first. The root
    /// encloses every other header and closes the list.
    pub fn proper_ancestors(&self, header: VertexId) -> Result<&[VertexId]> {
        Ok(self.header(header)?.proper_ancestors())
    }

    /// The vertices at `level`, in graph order.
    pub fn level_iter(&self, level: usize) -> impl Iterator<Item = &TreeNode> {
        self.levels
            .get(level)
            .into_iter()
            .flatten()
            .map(move |id| &self.nodes[id])
    }

    /// Every header, deepest level first.
    pub fn headers_innermost_first(&self) -> Vec<&HeaderNode> {
        (0..self.height())
            .rev()
            .flat_map(|level| self.level_iter(level))
            .filter_map(TreeNode::as_header)
            .collect()
    }

    /// Every header, root first.
    pub fn headers_outermost_first(&self) -> Vec<&HeaderNode> {
        (0..self.height())
            .flat_map(|level| self.level_iter(level))
            .filter_map(TreeNode::as_header)
            .collect()
    }

    /// Whether `vertex` lies in the loop of `header`, nested loops included.
    pub fn contains(&self, header: VertexId, vertex: VertexId) -> bool {
        let mut current = Some(vertex);
        while let Some(id) = current {
            if id == header {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// The innermost header whose loop contains `vertex`.
    pub fn innermost_header(&self, vertex: VertexId) -> Option<VertexId> {
        if self.is_loop_header(vertex) {
            Some(vertex)
        } else {
            self.parent(vertex)
        }
    }

    /// Tags the [`Trace`](EdgeKind::Trace) edges of `graph` with their loop
    /// role: edges closing a loop become iteration edges, edges reaching a
    /// header from outside its loop entry edges and edges leaving a loop exit
    /// edges of the innermost loop they leave. Other kinds are left alone.
    ///
    /// Returns the number of retagged edges.
    pub fn tag_loop_edges(&self, graph: &mut DirectedGraph) -> Result<usize> {
        let mut tags = Vec::new();
        for edge in graph.edges() {
            if edge.kind() != &EdgeKind::Trace {
                continue;
            }
            let (source, destination) = (edge.source(), edge.destination());

            let tag = if self.is_loop_header(destination) && self.contains(destination, source) {
                Some(EdgeKind::iteration(destination))
            } else if self.is_loop_header(destination) && destination != self.root {
                Some(EdgeKind::Entry(destination))
            } else {
                self.innermost_header(source)
                    .filter(|header| *header != self.root && !self.contains(*header, destination))
                    .map(EdgeKind::Exit)
            };

            if let Some(tag) = tag {
                trace!("Tagging edge {} as {}", edge.id(), tag);
                tags.push((edge.id(), tag));
            }
        }

        let retagged = tags.len();
        for (edge, tag) in tags {
            graph.set_edge_kind(edge, tag)?;
        }
        Ok(retagged)
    }
}
