//! Synthetic timing and loop bound data.
//!
//! Only meant to exercise the model builder when no trace data is at hand.
//! Production data is built explicitly through
//! [`SubprogramData`](super::SubprogramData) and is never mixed with what
//! this generator produces.

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, trace};

use super::{Database, Result, SubprogramData};
use crate::{
    graph::DirectedGraph,
    program::{Program, Subprogram},
    trees::LoopNestingTree,
};

/// Which units of a graph receive a WCET.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum TimingUnit {
    /// Instrumentation-point graphs time their edges.
    #[default]
    Edges,
    /// Control-flow graphs time their basic blocks.
    Vertices,
}

#[derive(Debug, Clone)]
pub struct SyntheticData {
    rng: Option<StdRng>,
    units: TimingUnit,
    bound_ceiling: u64,
}

impl SyntheticData {
    /// Every unit takes 1 time unit and loop bounds follow the nesting
    /// depth, see [`fixed_bound`].
    pub fn fixed() -> Self {
        Self {
            rng: None,
            units: TimingUnit::default(),
            bound_ceiling: i32::MAX as u64,
        }
    }

    /// Random non-zero timings and bounds, reproducible from `seed`.
    pub fn random(seed: u64) -> Self {
        Self {
            rng: Some(StdRng::seed_from_u64(seed)),
            ..Self::fixed()
        }
    }

    pub fn with_units(mut self, units: TimingUnit) -> Self {
        self.units = units;
        self
    }

    /// Largest bound the random mode hands out.
    pub fn with_bound_ceiling(mut self, ceiling: u64) -> Self {
        self.bound_ceiling = ceiling.max(1);
        self
    }

    /// Generates data for every subprogram of `program` and inserts it into
    /// `database`.
    pub fn populate(&mut self, program: &Program, database: &mut Database) -> Result<()> {
        for subprogram in program.subprograms() {
            let data = self.generate(subprogram)?;
            database.insert(subprogram.id(), data)?;
        }
        Ok(())
    }

    pub fn generate(&mut self, subprogram: &Subprogram) -> Result<SubprogramData> {
        debug!("Generating data for {}", subprogram.name());
        self.generate_for_graph(subprogram.graph(), subprogram.lnt())
    }

    pub fn generate_for_graph(
        &mut self,
        graph: &DirectedGraph,
        lnt: &LoopNestingTree,
    ) -> Result<SubprogramData> {
        let mut data = SubprogramData::new();

        let units: Vec<u32> = match self.units {
            TimingUnit::Edges => graph.edges().map(|e| e.id()).collect(),
            TimingUnit::Vertices => graph.vertices().map(|v| v.id()).collect(),
        };
        for unit in units {
            let wcet = match &mut self.rng {
                Some(rng) => rng.gen_range(1..=i64::MAX as u64),
                None => 1,
            };
            data.set_unit_wcet(unit, wcet);
        }

        for header in lnt.headers_innermost_first() {
            for &ancestor in header.proper_ancestors() {
                let difference = (header.level() - lnt.level(ancestor)?) as u32;
                let bound = match &mut self.rng {
                    Some(rng) => rng.gen_range(1..=self.bound_ceiling),
                    None => fixed_bound(difference),
                };
                trace!(
                    "Bound of {} relative to {} = {} (level difference {})",
                    header.id(),
                    ancestor,
                    bound,
                    difference
                );
                data.set_loop_bound(header.id(), ancestor, bound);
            }
        }

        Ok(data)
    }
}

/// `floor(10^difference / 2) - difference`, at least 1.
pub fn fixed_bound(level_difference: u32) -> u64 {
    (10u64.saturating_pow(level_difference) / 2)
        .saturating_sub(level_difference as u64)
        .max(1)
}
