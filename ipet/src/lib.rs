//! Worst-case execution time (WCET) calculation by implicit path
//! enumeration (IPET).
//!
//! A subprogram is a [`DirectedGraph`](graph::DirectedGraph) whose edges
//! carry timing units. Its loops are found with a
//! [`LoopNestingTree`](trees::LoopNestingTree), bounded with the data in a
//! [`Database`](database::Database), and the longest path is found by
//! solving an integer linear program over edge execution counts.
//!
//! ```ignore
//! let subprogram = Subprogram::with_loop_tags(1, "main", graph)?;
//! let solution = IpetModelBuilder::new(&subprogram, &database)
//!     .build()?
//!     .solve(&BranchAndBound::new())?;
//! println!("{solution}");
//! ```

pub mod database;
pub mod engine;
pub mod graph;
pub mod ilp;
pub mod ipet;
pub mod program;
pub mod run_config;
pub mod trees;

use thiserror::Error;

pub mod prelude {
    pub use crate::database::{Database, SubprogramData, TraceDatabase};
    pub use crate::engine::{CalculationEngine, CalculationFailure};
    pub use crate::graph::{DirectedGraph, EdgeId, EdgeKind, IdAllocator, VertexId};
    pub use crate::ilp::{BranchAndBound, IlpSolver, Simplex};
    pub use crate::ipet::{CapacityModelBuilder, IpetModel, IpetModelBuilder, WcetSolution};
    pub use crate::program::{Program, Subprogram};
    pub use crate::run_config::RunConfig;
    pub use crate::WcetError;
}

pub type Result<T> = std::result::Result<T, WcetError>;

#[derive(Debug, Error)]
pub enum WcetError {
    #[error("Graph error")]
    Graph(#[from] graph::GraphError),

    #[error("Tree error")]
    Tree(#[from] trees::TreeError),

    #[error("Database error")]
    Database(#[from] database::DatabaseError),

    #[error("ILP error")]
    Ilp(#[from] ilp::IlpError),

    #[error("Model listing error")]
    LpFormat(#[from] ilp::lp_format::LpFormatError),

    #[error("IPET error")]
    Ipet(#[from] ipet::IpetError),

    #[error("Program error")]
    Program(#[from] program::ProgramError),

    #[error("Configuration error")]
    Config(#[from] run_config::ConfigError),
}
