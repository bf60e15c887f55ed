//! Dense two-phase primal simplex.
//!
//! Solves the linear relaxation of an [`IlpProblem`], ignoring integrality.
//!
//! ## Algorithm
//!
//! 1. Shift every column by its lower bound so all variables are
//!    non-negative, and turn upper bounds into rows.
//! 2. Make every right-hand side non-negative, then add a slack for `<=`,
//!    a surplus and an artificial variable for `>=` and an artificial
//!    variable for `=`.
//! 3. Phase 1 minimises the sum of the artificial variables. A positive
//!    optimum means the problem is infeasible.
//! 4. Phase 2 optimises the real objective with the artificial variables
//!    barred from the basis.
//!
//! Entering and leaving variables are chosen by Bland's rule, which rules
//! out cycling on degenerate problems.

use tracing::trace;

use super::{Comparison, Direction, IlpProblem, IlpSolution, IlpSolver, SolveStatus};

const EPSILON: f64 = 1e-9;
const FEASIBILITY_TOLERANCE: f64 = 1e-7;

#[derive(Debug, Clone, Copy)]
pub struct Simplex {
    max_iterations: usize,
}

impl Default for Simplex {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
        }
    }
}

impl Simplex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pivots allowed per phase before giving up with
    /// [`SolveStatus::NumericalFailure`].
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Solves the relaxation of `problem` with the column bounds replaced by
    /// `lower` and `upper` (index 0 holds column 1).
    pub fn solve_with_bounds(
        &self,
        problem: &IlpProblem,
        lower: &[f64],
        upper: &[Option<f64>],
    ) -> Result<IlpSolution, SolveStatus> {
        let columns = problem.number_of_columns();
        if lower
            .iter()
            .zip(upper)
            .any(|(lower, upper)| upper.is_some_and(|upper| upper + EPSILON < *lower))
        {
            return Err(SolveStatus::Infeasible);
        }

        let mut tableau = Tableau::new(problem, lower, upper);
        trace!(
            "Simplex tableau with {} rows and {} variables",
            tableau.rows.len(),
            tableau.width
        );

        // Phase 1.
        if tableau.artificial_start < tableau.width {
            tableau.load_phase_one_objective();
            match tableau.iterate(tableau.width, self.max_iterations) {
                Ok(()) => {}
                Err(SolveStatus::Unbounded) => return Err(SolveStatus::NumericalFailure),
                Err(status) => return Err(status),
            }
            if tableau.objective_value() < -FEASIBILITY_TOLERANCE {
                return Err(SolveStatus::Infeasible);
            }
            tableau.drive_out_artificials();
        }

        // Phase 2.
        let sense = match problem.direction() {
            Direction::Maximise => 1.0,
            Direction::Minimise => -1.0,
        };
        let costs: Vec<f64> = problem
            .columns()
            .iter()
            .map(|column| sense * column.objective())
            .collect();
        tableau.load_objective(&costs);
        tableau.iterate(tableau.artificial_start, self.max_iterations)?;

        let mut values = lower.to_vec();
        for (row, basic) in tableau.basic.iter().enumerate() {
            if *basic < columns {
                values[*basic] += tableau.rows[row][tableau.width];
            }
        }
        let objective = problem.objective_value(&values);
        trace!("Relaxation optimum {}", objective);
        Ok(IlpSolution::new(objective, values))
    }
}

impl IlpSolver for Simplex {
    fn solve(&self, problem: &IlpProblem) -> Result<IlpSolution, SolveStatus> {
        let lower: Vec<f64> = problem.columns().iter().map(|c| c.lower()).collect();
        let upper: Vec<Option<f64>> = problem.columns().iter().map(|c| c.upper()).collect();
        self.solve_with_bounds(problem, &lower, &upper)
    }
}

/// `rows[i]` holds the coefficients of every variable followed by the
/// right-hand side. `objective` holds the reduced costs, its last entry is
/// the objective value of the current basis.
struct Tableau {
    rows: Vec<Vec<f64>>,
    objective: Vec<f64>,
    basic: Vec<usize>,
    width: usize,
    artificial_start: usize,
}

impl Tableau {
    fn new(problem: &IlpProblem, lower: &[f64], upper: &[Option<f64>]) -> Self {
        let columns = problem.number_of_columns();

        let mut constraints: Vec<(Vec<f64>, Comparison, f64)> = Vec::new();
        for row in problem.rows() {
            let mut coefficients = vec![0.0; columns];
            let mut rhs = row.rhs();
            for (column, coefficient) in row.terms() {
                coefficients[column - 1] += coefficient;
                rhs -= coefficient * lower[column - 1];
            }
            constraints.push((coefficients, row.comparison(), rhs));
        }
        for (index, bound) in upper.iter().enumerate() {
            if let Some(bound) = bound {
                let mut coefficients = vec![0.0; columns];
                coefficients[index] = 1.0;
                constraints.push((coefficients, Comparison::LessOrEqual, bound - lower[index]));
            }
        }

        for (coefficients, comparison, rhs) in &mut constraints {
            if *rhs < 0.0 {
                coefficients.iter_mut().for_each(|c| *c = -*c);
                *rhs = -*rhs;
                *comparison = comparison.flipped();
            }
        }

        let slacks = constraints
            .iter()
            .filter(|(_, comparison, _)| *comparison != Comparison::Equal)
            .count();
        let artificials = constraints
            .iter()
            .filter(|(_, comparison, _)| *comparison != Comparison::LessOrEqual)
            .count();
        let artificial_start = columns + slacks;
        let width = artificial_start + artificials;

        let mut rows = Vec::with_capacity(constraints.len());
        let mut basic = Vec::with_capacity(constraints.len());
        let (mut next_slack, mut next_artificial) = (columns, artificial_start);
        for (coefficients, comparison, rhs) in constraints {
            let mut row = coefficients;
            row.resize(width + 1, 0.0);
            row[width] = rhs;
            match comparison {
                Comparison::LessOrEqual => {
                    row[next_slack] = 1.0;
                    basic.push(next_slack);
                    next_slack += 1;
                }
                Comparison::GreaterOrEqual => {
                    row[next_slack] = -1.0;
                    next_slack += 1;
                    row[next_artificial] = 1.0;
                    basic.push(next_artificial);
                    next_artificial += 1;
                }
                Comparison::Equal => {
                    row[next_artificial] = 1.0;
                    basic.push(next_artificial);
                    next_artificial += 1;
                }
            }
            rows.push(row);
        }

        Self {
            rows,
            objective: vec![0.0; width + 1],
            basic,
            width,
            artificial_start,
        }
    }

    fn objective_value(&self) -> f64 {
        self.objective[self.width]
    }

    /// Maximise the negated sum of the artificial variables.
    fn load_phase_one_objective(&mut self) {
        let mut costs = vec![0.0; self.width];
        for cost in &mut costs[self.artificial_start..] {
            *cost = -1.0;
        }
        self.load_objective(&costs);
    }

    /// Loads the reduced costs of maximising `costs` (missing entries are 0)
    /// for the current basis.
    fn load_objective(&mut self, costs: &[f64]) {
        let cost = |variable: usize| costs.get(variable).copied().unwrap_or(0.0);

        self.objective = vec![0.0; self.width + 1];
        for (variable, reduced) in self.objective.iter_mut().take(self.width).enumerate() {
            *reduced = -cost(variable);
        }
        for (row, basic) in self.rows.iter().zip(&self.basic) {
            let basic_cost = cost(*basic);
            if basic_cost != 0.0 {
                for (reduced, value) in self.objective.iter_mut().zip(row) {
                    *reduced += basic_cost * value;
                }
            }
        }
    }

    /// Pivots until no variable below `allowed` improves the objective.
    fn iterate(&mut self, allowed: usize, max_iterations: usize) -> Result<(), SolveStatus> {
        for _ in 0..max_iterations {
            let Some(entering) = (0..allowed).find(|column| self.objective[*column] < -EPSILON)
            else {
                return Ok(());
            };

            let mut leaving: Option<(usize, f64)> = None;
            for (index, row) in self.rows.iter().enumerate() {
                let coefficient = row[entering];
                if coefficient <= EPSILON {
                    continue;
                }
                let ratio = row[self.width] / coefficient;
                leaving = match leaving {
                    None => Some((index, ratio)),
                    Some((best, best_ratio)) => {
                        if ratio < best_ratio - EPSILON
                            || (ratio <= best_ratio + EPSILON
                                && self.basic[index] < self.basic[best])
                        {
                            Some((index, ratio))
                        } else {
                            Some((best, best_ratio))
                        }
                    }
                };
            }

            let Some((leaving, _)) = leaving else {
                return Err(SolveStatus::Unbounded);
            };
            self.pivot(leaving, entering);
        }
        Err(SolveStatus::NumericalFailure)
    }

    fn pivot(&mut self, pivot_row: usize, pivot_column: usize) {
        let pivot = self.rows[pivot_row][pivot_column];
        for value in &mut self.rows[pivot_row] {
            *value /= pivot;
        }
        let pivot_values = self.rows[pivot_row].clone();

        let eliminate = |target: &mut Vec<f64>| {
            let factor = target[pivot_column];
            if factor == 0.0 {
                return;
            }
            for (value, pivot_value) in target.iter_mut().zip(&pivot_values) {
                *value -= factor * pivot_value;
                if value.abs() < EPSILON * EPSILON {
                    *value = 0.0;
                }
            }
        };

        for (index, row) in self.rows.iter_mut().enumerate() {
            if index != pivot_row {
                eliminate(row);
            }
        }
        eliminate(&mut self.objective);
        self.basic[pivot_row] = pivot_column;
    }

    /// Replaces artificial variables still in the basis (at value zero) by
    /// real ones where possible. Rows where that fails are redundant and
    /// keep their artificial variable, which can never re-enter.
    fn drive_out_artificials(&mut self) {
        for row in 0..self.rows.len() {
            if self.basic[row] < self.artificial_start {
                continue;
            }
            if let Some(column) =
                (0..self.artificial_start).find(|column| self.rows[row][*column].abs() > EPSILON)
            {
                self.pivot(row, column);
            }
        }
    }
}
