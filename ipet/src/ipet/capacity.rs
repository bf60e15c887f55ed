//! IPET model bounded by observed execution counts instead of loop bounds.
//!
//! The entry vertex executes at most once. Back edges are capped at the
//! number of times they were seen in the trace. When all constraints are
//! requested every observed edge is capped instead.

use tracing::{debug, trace};

use super::{IpetModel, Result};
use crate::{
    database::{DatabaseError, TraceDatabase},
    graph::{DirectedGraph, EdgeKind},
    ilp::{Comparison, RowGroup},
    run_config::RunConfig,
    trees::{DepthFirstTree, DfsEdgeType},
};

pub struct CapacityModelBuilder<'a> {
    graph: &'a DirectedGraph,
    database: &'a TraceDatabase,
    all_constraints: bool,
}

impl<'a> CapacityModelBuilder<'a> {
    pub fn new(graph: &'a DirectedGraph, database: &'a TraceDatabase) -> Self {
        Self {
            graph,
            database,
            all_constraints: false,
        }
    }

    pub fn with_all_constraints(mut self, all_constraints: bool) -> Self {
        self.all_constraints = all_constraints;
        self
    }

    pub fn with_config(self, cfg: &RunConfig) -> Self {
        self.with_all_constraints(cfg.all_constraints)
    }

    pub fn build(&self) -> Result<IpetModel> {
        debug!("Building capacity constrained model of {}", self.graph.name());

        let mut model = IpetModel::with_columns(self.graph)?;
        model.add_flow_constraints(self.graph)?;
        self.add_capacity_constraints(&mut model)?;
        self.add_objective(&mut model)?;

        Ok(model)
    }

    fn add_capacity_constraints(&self, model: &mut IpetModel) -> Result<()> {
        let entry = self.graph.entry()?;

        let entry_vertex = self.graph.vertex(entry)?;
        if entry_vertex.has_successors() {
            let row = model
                .row(Comparison::LessOrEqual, 1.0, entry_vertex.successors(), 1.0)?
                .with_group(RowGroup::Capacity)
                .with_comment(format!("Entry vertex {entry}"));
            model.problem.add_row(row)?;
        }

        let dfs = if self.all_constraints {
            None
        } else {
            Some(DepthFirstTree::new(self.graph, entry)?)
        };

        for vertex in self.graph.vertices().filter(|v| v.id() != entry) {
            for edge in self.graph.successor_edges(vertex.id())? {
                if matches!(edge.kind(), EdgeKind::Ghost) {
                    continue;
                }
                let count = match &dfs {
                    Some(dfs)
                        if dfs.edge_type(edge.source(), edge.destination())
                            == DfsEdgeType::BackEdge =>
                    {
                        self.database.edge_count(edge.id())?
                    }
                    Some(_) => continue,
                    None => match self.database.edge_count(edge.id()) {
                        Ok(count) => count,
                        Err(DatabaseError::MissingData { .. }) => {
                            trace!("Edge {} was never observed", edge.id());
                            continue;
                        }
                        Err(error) => return Err(error.into()),
                    },
                };
                model.set_upper_bound(edge.id(), count)?;
            }
        }
        Ok(())
    }

    fn add_objective(&self, model: &mut IpetModel) -> Result<()> {
        for index in 0..model.column_to_edge.len() {
            let id = model.column_to_edge[index];
            let wcet = match self.graph.edge(id)?.kind() {
                EdgeKind::Ghost => 0,
                EdgeKind::Trace => self.database.edge_wcet(id)?,
                _ => match self.database.edge_wcet(id) {
                    Ok(wcet) => wcet,
                    Err(DatabaseError::MissingData { .. }) => 0,
                    Err(error) => return Err(error.into()),
                },
            };
            trace!("WCET(edge_{}) = {}", id, wcet);
            model.problem.set_objective(index + 1, wcet as f64)?;
        }
        Ok(())
    }
}
