//! Computes the WCET of every subprogram of a program.
//!
//! Subprograms are visited callees first so that the WCET of an inlined
//! subprogram is known by the time its caller is modelled. A subprogram
//! whose model cannot be built or solved is recorded as a
//! [`CalculationFailure`] and the run carries on with the rest.

use std::{
    collections::HashMap,
    fs,
    io::{BufWriter, Write},
    path::PathBuf,
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    database::{Database, SubprogramId, TraceDatabase},
    graph::DirectedGraph,
    ilp::{BranchAndBound, IlpSolver},
    ipet::{CapacityModelBuilder, IpetError, IpetModel, IpetModelBuilder, WcetSolution},
    program::{Program, ProgramError, Subprogram},
    run_config::RunConfig,
};

#[derive(Debug, Error)]
#[error("WCET calculation of {name} failed")]
pub struct CalculationFailure {
    pub subprogram: SubprogramId,
    pub name: String,
    #[source]
    pub error: IpetError,
    /// Listing of the model, when one was built and written.
    pub model: Option<PathBuf>,
}

pub struct CalculationEngine<'a, S: IlpSolver = BranchAndBound> {
    program: &'a Program,
    database: &'a Database,
    cfg: RunConfig,
    solver: S,
    wcets: HashMap<SubprogramId, u64>,
    solutions: HashMap<SubprogramId, WcetSolution>,
    failures: Vec<CalculationFailure>,
}

impl<'a> CalculationEngine<'a> {
    /// An engine solving with the branch and bound solver `cfg` describes.
    pub fn new(program: &'a Program, database: &'a Database, cfg: RunConfig) -> Self {
        let solver = cfg.solver();
        Self::with_solver(program, database, cfg, solver)
    }
}

impl<'a, S: IlpSolver> CalculationEngine<'a, S> {
    pub fn with_solver(
        program: &'a Program,
        database: &'a Database,
        cfg: RunConfig,
        solver: S,
    ) -> Self {
        Self {
            program,
            database,
            cfg,
            solver,
            wcets: HashMap::new(),
            solutions: HashMap::new(),
            failures: Vec::new(),
        }
    }

    /// Computes every subprogram. Fails only when no bottom-up order
    /// exists; per subprogram errors end up in [`failures`](Self::failures).
    pub fn run(&mut self) -> Result<(), ProgramError> {
        let program = self.program;
        let order = program.bottom_up_order()?;
        info!("Computing the WCET of {} subprograms", order.len());

        for id in order {
            let subprogram = program.subprogram(id)?;
            match self.compute(subprogram) {
                Ok(solution) => {
                    info!("WCET({}) = {}", subprogram.name(), solution.wcet());
                    self.wcets.insert(id, solution.wcet());
                    self.solutions.insert(id, solution);
                }
                Err(failure) => {
                    warn!("{}: {}", failure, failure.error);
                    self.failures.push(failure);
                }
            }
        }
        Ok(())
    }

    fn compute(&self, subprogram: &Subprogram) -> Result<WcetSolution, CalculationFailure> {
        let failure = |error: IpetError, model: Option<PathBuf>| CalculationFailure {
            subprogram: subprogram.id(),
            name: subprogram.name().to_owned(),
            error,
            model,
        };

        let model = IpetModelBuilder::new(subprogram, self.database)
            .with_inlined_wcets(&self.wcets)
            .with_config(&self.cfg)
            .build()
            .map_err(|error| failure(error, None))?;
        let tests = self.database.tests(subprogram.id()).unwrap_or_default();
        let listing = self.persist(&model, subprogram.name(), tests);

        model
            .solve(&self.solver)
            .map_err(|error| failure(error, listing))
    }

    /// WCET of a single graph bounded by the execution counts observed in
    /// `trace` instead of by loop bounds.
    pub fn compute_from_trace(
        &self,
        graph: &DirectedGraph,
        trace: &TraceDatabase,
    ) -> Result<WcetSolution, IpetError> {
        let model = CapacityModelBuilder::new(graph, trace)
            .with_config(&self.cfg)
            .build()?;
        self.persist(&model, graph.name(), trace.tests());
        let solution = model.solve(&self.solver)?;
        info!("WCET({}) = {}", graph.name(), solution.wcet());
        Ok(solution)
    }

    /// Writes the listing of `model` to the configured directory as
    /// `<name>.lp<tests>`.
    fn persist(&self, model: &IpetModel, name: &str, tests: u64) -> Option<PathBuf> {
        let directory = self.cfg.ilp_directory.as_ref()?;
        let path = directory.join(format!("{name}.lp{tests}"));

        let written = fs::create_dir_all(directory)
            .and_then(|_| fs::File::create(&path))
            .and_then(|file| {
                let mut out = BufWriter::new(file);
                model.write_lp(&mut out)?;
                out.flush()
            });
        match written {
            Ok(()) => {
                debug!("Wrote model to {}", path.display());
                Some(path)
            }
            Err(error) => {
                warn!("Unable to write model to {}: {}", path.display(), error);
                None
            }
        }
    }

    pub fn wcet(&self, subprogram: SubprogramId) -> Option<u64> {
        self.wcets.get(&subprogram).copied()
    }

    pub fn solution(&self, subprogram: SubprogramId) -> Option<&WcetSolution> {
        self.solutions.get(&subprogram)
    }

    /// WCETs of every subprogram computed so far.
    pub fn wcets(&self) -> &HashMap<SubprogramId, u64> {
        &self.wcets
    }

    pub fn failures(&self) -> &[CalculationFailure] {
        &self.failures
    }

    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }
}
