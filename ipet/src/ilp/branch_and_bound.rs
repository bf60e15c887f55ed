//! Depth-first branch and bound over the [`Simplex`] relaxation.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{Direction, IlpProblem, IlpSolution, IlpSolver, Simplex, SolveStatus, TOLERANCE};

#[derive(Debug, Clone)]
pub struct BranchAndBound {
    simplex: Simplex,
    max_nodes: usize,
    timeout: Option<Duration>,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self {
            simplex: Simplex::default(),
            max_nodes: 100_000,
            timeout: None,
        }
    }
}

/// A subproblem: the root problem with tightened column bounds.
struct Node {
    lower: Vec<f64>,
    upper: Vec<Option<f64>>,
}

impl BranchAndBound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of relaxations solved before giving up with
    /// [`SolveStatus::NodeLimit`].
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Wall clock budget, checked between nodes.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_simplex(mut self, simplex: Simplex) -> Self {
        self.simplex = simplex;
        self
    }
}

impl IlpSolver for BranchAndBound {
    fn solve(&self, problem: &IlpProblem) -> Result<IlpSolution, SolveStatus> {
        let start = Instant::now();
        let sense = match problem.direction() {
            Direction::Maximise => 1.0,
            Direction::Minimise => -1.0,
        };

        let mut stack = vec![Node {
            lower: problem.columns().iter().map(|c| c.lower()).collect(),
            upper: problem.columns().iter().map(|c| c.upper()).collect(),
        }];
        let mut incumbent: Option<IlpSolution> = None;
        let mut nodes = 0;

        while let Some(node) = stack.pop() {
            if self.timeout.is_some_and(|timeout| start.elapsed() > timeout) {
                debug!("Branch and bound timed out after {} nodes", nodes);
                return Err(SolveStatus::Timeout);
            }
            nodes += 1;
            if nodes > self.max_nodes {
                debug!("Branch and bound gave up after {} nodes", self.max_nodes);
                return Err(SolveStatus::NodeLimit);
            }

            let relaxed = match self.simplex.solve_with_bounds(problem, &node.lower, &node.upper) {
                Ok(relaxed) => relaxed,
                Err(SolveStatus::Infeasible) => continue,
                Err(status) => return Err(status),
            };
            if let Some(best) = &incumbent {
                if sense * relaxed.objective() <= sense * best.objective() + TOLERANCE {
                    trace!("Pruned node with bound {}", relaxed.objective());
                    continue;
                }
            }

            let fractional = problem
                .columns()
                .iter()
                .zip(relaxed.values())
                .position(|(column, value)| {
                    column.is_integer() && (value - value.round()).abs() > TOLERANCE
                });

            match fractional {
                Some(index) => {
                    let value = relaxed.values()[index];
                    trace!("Branching on column {} = {}", index + 1, value);

                    let mut down = Node {
                        lower: node.lower.clone(),
                        upper: node.upper.clone(),
                    };
                    down.upper[index] = Some(value.floor());
                    let mut up = node;
                    up.lower[index] = value.ceil();

                    // The up branch is explored first.
                    stack.push(down);
                    stack.push(up);
                }
                None => {
                    let values: Vec<f64> = problem
                        .columns()
                        .iter()
                        .zip(relaxed.values())
                        .map(|(column, value)| {
                            if column.is_integer() {
                                value.round()
                            } else {
                                *value
                            }
                        })
                        .collect();
                    let objective = problem.objective_value(&values);
                    debug!("New incumbent with objective {}", objective);
                    incumbent = Some(IlpSolution::new(objective, values));
                }
            }
        }

        debug!("Branch and bound finished after {} nodes", nodes);
        incumbent.ok_or(SolveStatus::Infeasible)
    }
}
