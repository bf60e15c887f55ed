//! Defines the directed graph every program representation is built on.
//!
//! Both control-flow graphs and instrumentation-point graphs (IPGs) are
//! stored as a [`DirectedGraph`]. Vertices and edges carry stable integer
//! identifiers chosen by whoever constructs the graph, and every iteration
//! order exposed here is insertion order so that models built from a graph
//! are reproducible.

use std::{
    collections::{BTreeSet, HashMap},
    fmt::Display,
};

use thiserror::Error;
use tracing::trace;

use crate::database::SubprogramId;

pub type VertexId = u32;
pub type EdgeId = u32;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum GraphError {
    /// Thrown when a vertex or edge is added with an identifier that is
    /// already in use.
    #[error("Duplicate {kind} identifier {id}")]
    DuplicateIdentifier { kind: &'static str, id: u32 },

    /// Thrown when a lookup names a vertex or edge the graph does not have.
    #[error("No {kind} with identifier {id}")]
    NotFound { kind: &'static str, id: u32 },

    /// Thrown when an operation needs the designated entry vertex but none
    /// has been set.
    #[error("The graph has no designated entry vertex")]
    MissingEntry,
}

/// The role an edge plays in the timing model.
///
/// Loop related tags carry the header(s) they belong to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum EdgeKind {
    /// A measured transition, timed from the database.
    Trace,
    /// A structural edge with no execution time.
    Ghost,
    /// An edge standing in for a call of `callee` whose body was inlined.
    Inlined { callee: SubprogramId },
    /// An edge that starts a new iteration of every header in the set.
    Iteration(BTreeSet<VertexId>),
    /// An edge entering the loop of the header.
    Entry(VertexId),
    /// An edge leaving the loop of the header.
    Exit(VertexId),
}

impl EdgeKind {
    /// Convenience constructor for an iteration edge of a single header.
    pub fn iteration(header: VertexId) -> Self {
        Self::Iteration(BTreeSet::from([header]))
    }

    pub fn is_loop_role(&self) -> bool {
        matches!(self, Self::Iteration(_) | Self::Entry(_) | Self::Exit(_))
    }
}

impl Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Ghost => write!(f, "ghost"),
            Self::Inlined { callee } => write!(f, "inlined({callee})"),
            Self::Iteration(headers) => write!(f, "iteration{headers:?}"),
            Self::Entry(header) => write!(f, "entry({header})"),
            Self::Exit(header) => write!(f, "exit({header})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vertex {
    id: VertexId,
    successors: Vec<EdgeId>,
    predecessors: Vec<EdgeId>,
}

impl Vertex {
    fn new(id: VertexId) -> Self {
        Self {
            id,
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    /// Outgoing edges in insertion order.
    pub fn successors(&self) -> &[EdgeId] {
        &self.successors
    }

    /// Incoming edges in insertion order.
    pub fn predecessors(&self) -> &[EdgeId] {
        &self.predecessors
    }

    pub fn has_successors(&self) -> bool {
        !self.successors.is_empty()
    }

    pub fn has_predecessors(&self) -> bool {
        !self.predecessors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    id: EdgeId,
    source: VertexId,
    destination: VertexId,
    kind: EdgeKind,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn source(&self) -> VertexId {
        self.source
    }

    pub fn destination(&self) -> VertexId {
        self.destination
    }

    pub fn kind(&self) -> &EdgeKind {
        &self.kind
    }
}

/// A directed graph with identifier based lookup.
///
/// Self loops and parallel edges are allowed, the graph may (and usually
/// does) contain cycles.
#[derive(Debug, Clone, Default)]
pub struct DirectedGraph {
    name: String,
    vertices: Vec<Vertex>,
    vertex_index: HashMap<VertexId, usize>,
    edges: Vec<Edge>,
    edge_index: HashMap<EdgeId, usize>,
    entry: Option<VertexId>,
}

impl DirectedGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_vertex(&mut self, id: VertexId) -> Result<()> {
        if self.vertex_index.contains_key(&id) {
            return Err(GraphError::DuplicateIdentifier { kind: "vertex", id });
        }
        trace!("Adding vertex {} to {}", id, self.name);
        self.vertex_index.insert(id, self.vertices.len());
        self.vertices.push(Vertex::new(id));
        Ok(())
    }

    pub fn add_edge(
        &mut self,
        id: EdgeId,
        source: VertexId,
        destination: VertexId,
        kind: EdgeKind,
    ) -> Result<()> {
        if self.edge_index.contains_key(&id) {
            return Err(GraphError::DuplicateIdentifier { kind: "edge", id });
        }
        let source_index = self.index_of(source)?;
        let destination_index = self.index_of(destination)?;

        trace!(
            "Adding edge {} ({} -> {}, {}) to {}",
            id,
            source,
            destination,
            kind,
            self.name
        );
        self.edge_index.insert(id, self.edges.len());
        self.edges.push(Edge {
            id,
            source,
            destination,
            kind,
        });
        self.vertices[source_index].successors.push(id);
        self.vertices[destination_index].predecessors.push(id);
        Ok(())
    }

    /// Retags an existing edge.
    pub fn set_edge_kind(&mut self, id: EdgeId, kind: EdgeKind) -> Result<()> {
        let index = *self
            .edge_index
            .get(&id)
            .ok_or(GraphError::NotFound { kind: "edge", id })?;
        self.edges[index].kind = kind;
        Ok(())
    }

    pub fn vertex(&self, id: VertexId) -> Result<&Vertex> {
        Ok(&self.vertices[self.index_of(id)?])
    }

    pub fn edge(&self, id: EdgeId) -> Result<&Edge> {
        match self.edge_index.get(&id) {
            Some(index) => Ok(&self.edges[*index]),
            None => Err(GraphError::NotFound { kind: "edge", id }),
        }
    }

    pub fn has_vertex(&self, id: VertexId) -> bool {
        self.vertex_index.contains_key(&id)
    }

    /// Vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.iter()
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Successor edges of `id` in insertion order.
    pub fn successor_edges(&self, id: VertexId) -> Result<impl Iterator<Item = &Edge>> {
        let vertex = self.vertex(id)?;
        Ok(vertex
            .successors
            .iter()
            .map(move |edge| &self.edges[self.edge_index[edge]]))
    }

    /// Predecessor edges of `id` in insertion order.
    pub fn predecessor_edges(&self, id: VertexId) -> Result<impl Iterator<Item = &Edge>> {
        let vertex = self.vertex(id)?;
        Ok(vertex
            .predecessors
            .iter()
            .map(move |edge| &self.edges[self.edge_index[edge]]))
    }

    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn number_of_edges(&self) -> usize {
        self.edges.len()
    }

    /// Designates the entry vertex of the graph.
    pub fn set_entry(&mut self, id: VertexId) -> Result<()> {
        self.index_of(id)?;
        self.entry = Some(id);
        Ok(())
    }

    pub fn entry(&self) -> Result<VertexId> {
        self.entry.ok_or(GraphError::MissingEntry)
    }

    fn index_of(&self, id: VertexId) -> Result<usize> {
        self.vertex_index
            .get(&id)
            .copied()
            .ok_or(GraphError::NotFound { kind: "vertex", id })
    }
}

/// Hands out fresh identifiers while a graph is being built.
///
/// One allocator is scoped to one construction and dropped afterwards, so
/// identifiers are never shared between unrelated builds.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdAllocator {
    pub fn starting_at(first: u32) -> Self {
        Self { next: first }
    }

    pub fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Moves the allocator past `id` if it has not been handed out yet.
    pub fn reserve(&mut self, id: u32) {
        self.next = self.next.max(id.saturating_add(1));
    }
}

#[cfg(test)]
mod test;
