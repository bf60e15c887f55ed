//! Timing and loop bound data keyed by structural identifiers.
//!
//! A [`Database`] holds, per subprogram, the WCET of every unit of
//! computation (a vertex or an edge, depending on the graph being timed),
//! the bound of every loop header relative to each of its proper ancestors
//! in the loop nesting tree and some auxiliary data gathered while tracing.
//!
//! Data is written one subprogram at a time with [`Database::insert`] and is
//! read only afterwards. Lookups never default: a missing entry is reported
//! as [`DatabaseError::MissingData`].

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt::Display,
};

use thiserror::Error;
use tracing::debug;

use crate::{
    graph::{EdgeId, VertexId},
    trees::TreeError,
};

pub mod synthetic;

pub type SubprogramId = u32;
pub type UnitId = u32;

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// The piece of data a lookup asked for.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DataItem {
    Subprogram,
    UnitWcet(UnitId),
    LoopBound {
        header: VertexId,
        ancestor: VertexId,
    },
    ObservedPaths(UnitId),
    EdgeWcet(EdgeId),
    EdgeCount(EdgeId),
}

impl Display for DataItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subprogram => write!(f, "subprogram data"),
            Self::UnitWcet(unit) => write!(f, "WCET of unit {unit}"),
            Self::LoopBound { header, ancestor } => {
                write!(f, "bound of header {header} relative to {ancestor}")
            }
            Self::ObservedPaths(unit) => write!(f, "observed paths through unit {unit}"),
            Self::EdgeWcet(edge) => write!(f, "WCET of edge {edge}"),
            Self::EdgeCount(edge) => write!(f, "execution count of edge {edge}"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DatabaseError {
    /// Thrown when a lookup misses.
    #[error("Missing {item} for subprogram {subprogram}")]
    MissingData {
        subprogram: SubprogramId,
        item: DataItem,
    },

    /// Thrown when data for a subprogram is inserted a second time.
    #[error("Data for subprogram {0} has already been inserted")]
    DuplicateSubprogram(SubprogramId),

    #[error("Loop nesting tree error")]
    Tree(#[from] TreeError),
}

/// Everything the database knows about one subprogram.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SubprogramData {
    unit_wcets: HashMap<UnitId, u64>,
    loop_bounds: HashMap<VertexId, HashMap<VertexId, u64>>,
    observed_paths: HashMap<UnitId, HashSet<UnitId>>,
    tests: u64,
    met: u64,
}

impl SubprogramData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit_wcet(mut self, unit: UnitId, wcet: u64) -> Self {
        self.set_unit_wcet(unit, wcet);
        self
    }

    /// Sets the maximum number of iterations of `header` per execution of
    /// `ancestor`.
    pub fn with_loop_bound(mut self, header: VertexId, ancestor: VertexId, bound: u64) -> Self {
        self.set_loop_bound(header, ancestor, bound);
        self
    }

    /// Records the units observed on the executions that went through `unit`.
    pub fn with_observed_paths(
        mut self,
        unit: UnitId,
        observed: impl IntoIterator<Item = UnitId>,
    ) -> Self {
        self.observed_paths
            .entry(unit)
            .or_default()
            .extend(observed);
        self
    }

    pub fn with_tests(mut self, tests: u64) -> Self {
        self.tests = tests;
        self
    }

    pub fn with_met(mut self, met: u64) -> Self {
        self.met = met;
        self
    }

    pub fn set_unit_wcet(&mut self, unit: UnitId, wcet: u64) {
        self.unit_wcets.insert(unit, wcet);
    }

    pub fn set_loop_bound(&mut self, header: VertexId, ancestor: VertexId, bound: u64) {
        self.loop_bounds
            .entry(header)
            .or_default()
            .insert(ancestor, bound);
    }

    pub fn number_of_units(&self) -> usize {
        self.unit_wcets.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Database {
    subprograms: HashMap<SubprogramId, SubprogramData>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the complete data set of `subprogram`.
    pub fn insert(&mut self, subprogram: SubprogramId, data: SubprogramData) -> Result<()> {
        if self.subprograms.contains_key(&subprogram) {
            return Err(DatabaseError::DuplicateSubprogram(subprogram));
        }
        debug!(
            "Inserting data for subprogram {} ({} units, {} headers)",
            subprogram,
            data.unit_wcets.len(),
            data.loop_bounds.len()
        );
        self.subprograms.insert(subprogram, data);
        Ok(())
    }

    pub fn contains(&self, subprogram: SubprogramId) -> bool {
        self.subprograms.contains_key(&subprogram)
    }

    pub fn subprogram(&self, subprogram: SubprogramId) -> Result<&SubprogramData> {
        self.subprograms
            .get(&subprogram)
            .ok_or(DatabaseError::MissingData {
                subprogram,
                item: DataItem::Subprogram,
            })
    }

    pub fn unit_wcet(&self, subprogram: SubprogramId, unit: UnitId) -> Result<u64> {
        self.subprogram(subprogram)?
            .unit_wcets
            .get(&unit)
            .copied()
            .ok_or(DatabaseError::MissingData {
                subprogram,
                item: DataItem::UnitWcet(unit),
            })
    }

    /// Maximum number of iterations of `header` per execution of `ancestor`.
    pub fn loop_bound(
        &self,
        subprogram: SubprogramId,
        header: VertexId,
        ancestor: VertexId,
    ) -> Result<u64> {
        self.subprogram(subprogram)?
            .loop_bounds
            .get(&header)
            .and_then(|bounds| bounds.get(&ancestor))
            .copied()
            .ok_or(DatabaseError::MissingData {
                subprogram,
                item: DataItem::LoopBound { header, ancestor },
            })
    }

    /// Units with timing data that were never observed together with `unit`.
    pub fn infeasible_units(
        &self,
        subprogram: SubprogramId,
        unit: UnitId,
    ) -> Result<BTreeSet<UnitId>> {
        let data = self.subprogram(subprogram)?;
        let observed = data
            .observed_paths
            .get(&unit)
            .ok_or(DatabaseError::MissingData {
                subprogram,
                item: DataItem::ObservedPaths(unit),
            })?;
        Ok(data
            .unit_wcets
            .keys()
            .filter(|id| !observed.contains(id))
            .copied()
            .collect())
    }

    /// Number of units that have a non-zero WCET.
    pub fn units_covered(&self, subprogram: SubprogramId) -> Result<usize> {
        Ok(self
            .subprogram(subprogram)?
            .unit_wcets
            .values()
            .filter(|wcet| **wcet != 0)
            .count())
    }

    pub fn is_covered(&self, subprogram: SubprogramId, unit: UnitId) -> Result<bool> {
        Ok(self.unit_wcet(subprogram, unit)? > 0)
    }

    /// Number of tests run against `subprogram`.
    pub fn tests(&self, subprogram: SubprogramId) -> Result<u64> {
        Ok(self.subprogram(subprogram)?.tests)
    }

    /// Maximum measured execution time of `subprogram`.
    pub fn met(&self, subprogram: SubprogramId) -> Result<u64> {
        Ok(self.subprogram(subprogram)?.met)
    }
}

/// Per-edge timing and execution counts parsed straight from a trace, with
/// no program structure attached.
///
/// Used by the capacity-constrained model, which bounds every edge by the
/// number of times it was observed instead of by loop bounds.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TraceDatabase {
    edge_wcets: HashMap<EdgeId, u64>,
    edge_counts: HashMap<EdgeId, u64>,
    tests: u64,
}

impl TraceDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge(mut self, edge: EdgeId, wcet: u64, count: u64) -> Self {
        self.edge_wcets.insert(edge, wcet);
        self.edge_counts.insert(edge, count);
        self
    }

    pub fn with_tests(mut self, tests: u64) -> Self {
        self.tests = tests;
        self
    }

    pub fn edge_wcet(&self, edge: EdgeId) -> Result<u64> {
        self.edge_wcets
            .get(&edge)
            .copied()
            .ok_or(DatabaseError::MissingData {
                subprogram: 0,
                item: DataItem::EdgeWcet(edge),
            })
    }

    /// Number of times `edge` was observed in the trace.
    pub fn edge_count(&self, edge: EdgeId) -> Result<u64> {
        self.edge_counts
            .get(&edge)
            .copied()
            .ok_or(DatabaseError::MissingData {
                subprogram: 0,
                item: DataItem::EdgeCount(edge),
            })
    }

    pub fn tests(&self) -> u64 {
        self.tests
    }
}
