//! Builds and solves the IPET model of a subprogram.
//!
//! Construction runs in three phases:
//!
//! 1. **Partition**: the loop related edges of the graph are sorted per
//!    header into back (iteration), entry and exit edges, and the chain of
//!    enclosing headers is computed for every header.
//! 2. **Emit**: one non-negative integer column per edge, a flow
//!    conservation row per vertex with both predecessors and successors,
//!    loop bound rows relative to the enclosing loops and the objective.
//! 3. **Solve**: the model is handed to an [`IlpSolver`]. Anything but an
//!    optimum is reported as [`IpetError::Solution`].
//!
//! The model only reads the graph, the loop nesting tree and the database.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    io::Write,
};

use colored::Colorize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    database::{Database, DatabaseError, SubprogramId},
    graph::{DirectedGraph, EdgeId, EdgeKind, GraphError, VertexId},
    ilp::{
        lp_format,
        ColumnId,
        Comparison,
        Direction,
        IlpError,
        IlpProblem,
        IlpSolver,
        Row,
        RowGroup,
        SolveStatus,
    },
    program::Subprogram,
    run_config::RunConfig,
    trees::{LoopNestingTree, TreeError},
};

pub mod capacity;

pub use capacity::CapacityModelBuilder;

pub type Result<T> = std::result::Result<T, IpetError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IpetError {
    /// Thrown when a loop bound has to be expressed relative to a loop that
    /// has neither entry nor exit edges.
    #[error("Loop {ancestor} has no entry or exit edges to bound header {header} against")]
    MalformedLoopStructure {
        header: VertexId,
        ancestor: VertexId,
    },

    /// Thrown when the solver does not find an optimum.
    #[error("No optimal solution: {0}")]
    Solution(SolveStatus),

    /// Thrown when an edge is tagged with a header the loop nesting tree
    /// does not know.
    #[error("Edge {edge} is tagged with {header}, which is not a loop header")]
    UnknownHeader { edge: EdgeId, header: VertexId },

    /// Thrown when the WCET of an inlined subprogram has not been supplied.
    #[error("No WCET supplied for subprogram {callee} inlined at edge {edge}")]
    MissingInlinedWcet { edge: EdgeId, callee: SubprogramId },

    #[error("Edge {0} has no column in the model")]
    UnknownEdge(EdgeId),

    #[error("Graph error")]
    Graph(#[from] GraphError),

    #[error("Loop nesting tree error")]
    Tree(#[from] TreeError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("ILP error")]
    Ilp(#[from] IlpError),
}

/// The loop related edges of every header and the headers enclosing it.
#[derive(Debug, Clone, Default)]
pub struct LoopPartition {
    back_edges: HashMap<VertexId, Vec<EdgeId>>,
    entry_edges: HashMap<VertexId, Vec<EdgeId>>,
    exit_edges: HashMap<VertexId, Vec<EdgeId>>,
    ancestors: HashMap<VertexId, Vec<VertexId>>,
}

impl LoopPartition {
    /// Partitions the tagged edges of `graph` over the headers of `lnt`.
    pub fn new(graph: &DirectedGraph, lnt: &LoopNestingTree) -> Result<Self> {
        let mut partition = Self::default();

        for header in lnt.headers_outermost_first() {
            let id = header.id();
            partition.back_edges.insert(id, Vec::new());
            partition.entry_edges.insert(id, Vec::new());
            partition.exit_edges.insert(id, Vec::new());

            let mut chain = vec![id];
            if let Some(parent) = header.parent() {
                chain.extend(partition.ancestors(parent));
            }
            partition.ancestors.insert(id, chain);
        }

        for vertex in graph.vertices() {
            for edge in graph.successor_edges(vertex.id())? {
                let id = edge.id();
                match edge.kind() {
                    EdgeKind::Iteration(headers) => {
                        for header in headers {
                            Self::push(&mut partition.back_edges, id, *header)?;
                        }
                    }
                    EdgeKind::Entry(header) => Self::push(&mut partition.entry_edges, id, *header)?,
                    EdgeKind::Exit(header) => Self::push(&mut partition.exit_edges, id, *header)?,
                    EdgeKind::Trace | EdgeKind::Ghost | EdgeKind::Inlined { .. } => {}
                }
            }
        }

        Ok(partition)
    }

    fn push(
        lists: &mut HashMap<VertexId, Vec<EdgeId>>,
        edge: EdgeId,
        header: VertexId,
    ) -> Result<()> {
        lists
            .get_mut(&header)
            .ok_or(IpetError::UnknownHeader { edge, header })?
            .push(edge);
        Ok(())
    }

    pub fn back_edges(&self, header: VertexId) -> &[EdgeId] {
        self.back_edges
            .get(&header)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn entry_edges(&self, header: VertexId) -> &[EdgeId] {
        self.entry_edges
            .get(&header)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn exit_edges(&self, header: VertexId) -> &[EdgeId] {
        self.exit_edges
            .get(&header)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `header` followed by every header enclosing it, innermost first.
    pub fn ancestors(&self, header: VertexId) -> Vec<VertexId> {
        self.ancestors.get(&header).cloned().unwrap_or_default()
    }
}

/// Builds the [`IpetModel`] of a subprogram from its loop bounds.
pub struct IpetModelBuilder<'a> {
    graph: &'a DirectedGraph,
    lnt: &'a LoopNestingTree,
    database: &'a Database,
    subprogram: SubprogramId,
    inlined_wcets: Option<&'a HashMap<SubprogramId, u64>>,
    loop_constraint_level: u32,
}

impl<'a> IpetModelBuilder<'a> {
    pub fn new(subprogram: &'a Subprogram, database: &'a Database) -> Self {
        Self::from_parts(
            subprogram.graph(),
            subprogram.lnt(),
            database,
            subprogram.id(),
        )
    }

    pub fn from_parts(
        graph: &'a DirectedGraph,
        lnt: &'a LoopNestingTree,
        database: &'a Database,
        subprogram: SubprogramId,
    ) -> Self {
        Self {
            graph,
            lnt,
            database,
            subprogram,
            inlined_wcets: None,
            loop_constraint_level: u32::MAX,
        }
    }

    /// WCETs of the subprograms inlined into this one.
    pub fn with_inlined_wcets(mut self, wcets: &'a HashMap<SubprogramId, u64>) -> Self {
        self.inlined_wcets = Some(wcets);
        self
    }

    pub fn with_loop_constraint_level(mut self, level: u32) -> Self {
        self.loop_constraint_level = level;
        self
    }

    pub fn with_config(self, cfg: &RunConfig) -> Self {
        self.with_loop_constraint_level(cfg.loop_constraint_level)
    }

    pub fn build(&self) -> Result<IpetModel> {
        debug!("Building IPET model of {}", self.graph.name());

        debug!("Partitioning edges into loop categories");
        let partition = LoopPartition::new(self.graph, self.lnt)?;

        let mut model = IpetModel::with_columns(self.graph)?;
        debug!("Adding flow constraints");
        model.add_flow_constraints(self.graph)?;
        debug!("Adding loop constraints");
        self.add_loop_constraints(&mut model, &partition)?;
        debug!("Adding objective function");
        self.add_objective(&mut model)?;

        Ok(model)
    }

    fn add_loop_constraints(&self, model: &mut IpetModel, partition: &LoopPartition) -> Result<()> {
        let entry = self.graph.entry()?;

        for header in self.lnt.headers_innermost_first() {
            let id = header.id();
            let back_edges = partition.back_edges(id);
            if back_edges.is_empty() {
                trace!("Header {} has no back edges", id);
                continue;
            }

            if id == entry {
                // At most one iteration per execution.
                if let [edge] = back_edges {
                    model.set_upper_bound(*edge, 1)?;
                } else {
                    let row = model
                        .row(Comparison::LessOrEqual, 1.0, back_edges, 1.0)?
                        .with_group(RowGroup::Loop)
                        .with_comment(format!("Header {id}"));
                    model.problem.add_row(row)?;
                }
                continue;
            }

            if header.is_self_loop() {
                // At most one iteration per entry.
                let relevant = if !partition.entry_edges(id).is_empty() {
                    partition.entry_edges(id)
                } else if !partition.exit_edges(id).is_empty() {
                    partition.exit_edges(id)
                } else {
                    return Err(IpetError::MalformedLoopStructure {
                        header: id,
                        ancestor: id,
                    });
                };
                debug!("Adding constraint on self loop {}", id);
                let mut row = model
                    .row(Comparison::LessOrEqual, 0.0, back_edges, 1.0)?
                    .with_group(RowGroup::Loop)
                    .with_comment(format!("Self loop {id}"));
                for edge in relevant {
                    row = row.with_term(model.column(*edge)?, -1.0);
                }
                model.problem.add_row(row)?;
                continue;
            }

            for ancestor in partition.ancestors(id) {
                if ancestor == entry {
                    continue;
                }
                let parent = self
                    .lnt
                    .parent(ancestor)
                    .ok_or(IpetError::MalformedLoopStructure {
                        header: id,
                        ancestor,
                    })?;
                let difference = header.level() - self.lnt.level(parent)?;
                if difference as u64 > u64::from(self.loop_constraint_level) {
                    trace!(
                        "Skipping bound of {} relative to {} (level difference {})",
                        id,
                        parent,
                        difference
                    );
                    continue;
                }

                let bound = self.database.loop_bound(self.subprogram, id, parent)?;
                debug!(
                    "Adding constraint on loop {} relative to loop {}. Bound = {}",
                    id, parent, bound
                );

                let relevant = if !partition.entry_edges(ancestor).is_empty() {
                    partition.entry_edges(ancestor)
                } else if !partition.exit_edges(ancestor).is_empty() {
                    partition.exit_edges(ancestor)
                } else {
                    return Err(IpetError::MalformedLoopStructure {
                        header: id,
                        ancestor,
                    });
                };

                let mut row = model
                    .row(Comparison::LessOrEqual, 0.0, back_edges, 1.0)?
                    .with_group(RowGroup::Loop)
                    .with_comment(format!("Header {id} with respect to {parent}"));
                for edge in relevant {
                    row = row.with_term(model.column(*edge)?, -(bound as f64));
                }
                model.problem.add_row(row)?;
            }
        }
        Ok(())
    }

    fn add_objective(&self, model: &mut IpetModel) -> Result<()> {
        for index in 0..model.column_to_edge.len() {
            let id = model.column_to_edge[index];
            let edge = self.graph.edge(id)?;
            let wcet = match edge.kind() {
                EdgeKind::Ghost => 0,
                EdgeKind::Trace => self.database.unit_wcet(self.subprogram, id)?,
                EdgeKind::Inlined { callee } => self
                    .inlined_wcets
                    .and_then(|wcets| wcets.get(callee))
                    .copied()
                    .ok_or(IpetError::MissingInlinedWcet {
                        edge: id,
                        callee: *callee,
                    })?,
                EdgeKind::Iteration(_) | EdgeKind::Entry(_) | EdgeKind::Exit(_) => {
                    match self.database.unit_wcet(self.subprogram, id) {
                        Ok(wcet) => wcet,
                        Err(DatabaseError::MissingData { .. }) => 0,
                        Err(error) => return Err(error.into()),
                    }
                }
            };
            trace!("WCET(edge_{}) = {}", id, wcet);
            model.problem.set_objective(index + 1, wcet as f64)?;
        }
        Ok(())
    }
}

/// An ILP with one column per edge of a graph.
#[derive(Debug, Clone)]
pub struct IpetModel {
    problem: IlpProblem,
    edge_to_column: HashMap<EdgeId, ColumnId>,
    column_to_edge: Vec<EdgeId>,
}

impl IpetModel {
    /// Adds a non-negative integer column for every edge, in vertex order
    /// and successor order within a vertex.
    pub(crate) fn with_columns(graph: &DirectedGraph) -> Result<Self> {
        let mut model = Self {
            problem: IlpProblem::new(graph.name(), Direction::Maximise),
            edge_to_column: HashMap::with_capacity(graph.number_of_edges()),
            column_to_edge: Vec::with_capacity(graph.number_of_edges()),
        };
        for vertex in graph.vertices() {
            for edge in graph.successor_edges(vertex.id())? {
                let column = model
                    .problem
                    .add_column(format!("edge_{}", edge.id()), true);
                model.edge_to_column.insert(edge.id(), column);
                model.column_to_edge.push(edge.id());
            }
        }
        Ok(model)
    }

    /// Flow into a vertex equals flow out of it, for every vertex that has
    /// both.
    pub(crate) fn add_flow_constraints(&mut self, graph: &DirectedGraph) -> Result<()> {
        for vertex in graph.vertices() {
            if !(vertex.has_predecessors() && vertex.has_successors()) {
                continue;
            }
            let mut row = self
                .row(Comparison::Equal, 0.0, vertex.successors(), 1.0)?
                .with_group(RowGroup::Flow)
                .with_comment(format!("Vertex {}", vertex.id()));
            for edge in vertex.predecessors() {
                row = row.with_term(self.column(*edge)?, -1.0);
            }
            self.problem.add_row(row)?;
        }
        Ok(())
    }

    /// A row with every edge of `edges` at `coefficient`.
    pub(crate) fn row(
        &self,
        comparison: Comparison,
        rhs: f64,
        edges: &[EdgeId],
        coefficient: f64,
    ) -> Result<Row> {
        let mut row = Row::new(comparison, rhs);
        for edge in edges {
            row = row.with_term(self.column(*edge)?, coefficient);
        }
        Ok(row)
    }

    pub fn problem(&self) -> &IlpProblem {
        &self.problem
    }

    pub fn column(&self, edge: EdgeId) -> Result<ColumnId> {
        self.edge_to_column
            .get(&edge)
            .copied()
            .ok_or(IpetError::UnknownEdge(edge))
    }

    pub fn edge(&self, column: ColumnId) -> Option<EdgeId> {
        column
            .checked_sub(1)
            .and_then(|index| self.column_to_edge.get(index))
            .copied()
    }

    /// Edges in column order.
    pub fn edges(&self) -> &[EdgeId] {
        &self.column_to_edge
    }

    /// Caps the execution count of `edge`.
    pub fn set_upper_bound(&mut self, edge: EdgeId, count: u64) -> Result<()> {
        let column = self.column(edge)?;
        trace!("Count(edge_{}) <= {}", edge, count);
        self.problem.set_upper_bound(column, count as f64)?;
        Ok(())
    }

    /// Forces `edge` to execute at least `count` times.
    pub fn set_lower_bound(&mut self, edge: EdgeId, count: u64) -> Result<()> {
        let column = self.column(edge)?;
        trace!("Count(edge_{}) >= {}", edge, count);
        self.problem.set_lower_bound(column, count as f64)?;
        Ok(())
    }

    pub fn to_lp_string(&self) -> String {
        lp_format::to_lp_string(&self.problem)
    }

    pub fn write_lp(&self, out: &mut impl Write) -> std::io::Result<()> {
        lp_format::write(&self.problem, out)
    }

    pub fn solve(&self, solver: &impl IlpSolver) -> Result<WcetSolution> {
        debug!("Solving linear program of {}", self.problem.name());
        let solution = solver.solve(&self.problem).map_err(|status| {
            debug!("Problem with the ILP model: {}", status);
            IpetError::Solution(status)
        })?;
        debug!("Optimal solution found {}", solution.objective());

        let execution_counts = self
            .column_to_edge
            .iter()
            .zip(solution.values())
            .map(|(edge, value)| Ok((*edge, to_integer(*value)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(WcetSolution {
            wcet: to_integer(solution.objective())?,
            execution_counts,
        })
    }
}

/// Rounds a solver value to the nearest integer, failing when it is not
/// finite or does not fit in a `u64`.
fn to_integer(value: f64) -> Result<u64> {
    let rounded = value.round();
    if !rounded.is_finite() || rounded >= u64::MAX as f64 {
        debug!("Solver value {} does not fit in a u64", value);
        return Err(IpetError::Solution(SolveStatus::NumericalFailure));
    }
    Ok(rounded.max(0.0) as u64)
}

/// The WCET of a subprogram and the execution count of every edge on the
/// path that attains it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WcetSolution {
    wcet: u64,
    execution_counts: BTreeMap<EdgeId, u64>,
}

impl WcetSolution {
    pub fn wcet(&self) -> u64 {
        self.wcet
    }

    pub fn execution_count(&self, edge: EdgeId) -> Option<u64> {
        self.execution_counts.get(&edge).copied()
    }

    pub fn execution_counts(&self) -> &BTreeMap<EdgeId, u64> {
        &self.execution_counts
    }
}

impl Display for WcetSolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} {}", "WCET:".bold(), self.wcet.to_string().green())?;
        for (edge, count) in &self.execution_counts {
            writeln!(f, "  edge_{edge}: {count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test;
