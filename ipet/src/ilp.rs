//! Integer linear programs and the solvers that optimise them.
//!
//! An [`IlpProblem`] is a set of bounded columns (the variables, numbered
//! from 1) and rows (linear constraints) together with a linear objective.
//! Any [`IlpSolver`] can optimise it; [`BranchAndBound`] is the solver
//! shipped with the crate.

use std::fmt::Display;

use thiserror::Error;

pub mod branch_and_bound;
pub mod lp_format;
pub mod simplex;

pub use branch_and_bound::BranchAndBound;
pub use simplex::Simplex;

/// Index of a column, starting at 1.
pub type ColumnId = usize;

pub type Result<T> = std::result::Result<T, IlpError>;

/// Tolerance used when comparing values against rows and bounds.
pub const TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IlpError {
    #[error("No column {0} in the problem")]
    UnknownColumn(ColumnId),

    /// Thrown when a lower bound exceeds the upper bound of a column.
    #[error("Column {column} has lower bound {lower} above upper bound {upper}")]
    InvalidBounds {
        column: ColumnId,
        lower: f64,
        upper: f64,
    },
}

/// The outcome of a solve that did not reach an optimum.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum SolveStatus {
    #[error("the problem is infeasible")]
    Infeasible,

    #[error("the problem is unbounded")]
    Unbounded,

    #[error("numerical failure")]
    NumericalFailure,

    #[error("branch and bound node limit reached")]
    NodeLimit,

    #[error("solve timed out")]
    Timeout,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Direction {
    Maximise,
    Minimise,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Comparison {
    LessOrEqual,
    Equal,
    GreaterOrEqual,
}

impl Comparison {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::LessOrEqual => lhs <= rhs + TOLERANCE,
            Self::Equal => (lhs - rhs).abs() <= TOLERANCE,
            Self::GreaterOrEqual => lhs + TOLERANCE >= rhs,
        }
    }

    /// The comparison obtained by multiplying both sides with -1.
    pub fn flipped(&self) -> Self {
        match self {
            Self::LessOrEqual => Self::GreaterOrEqual,
            Self::Equal => Self::Equal,
            Self::GreaterOrEqual => Self::LessOrEqual,
        }
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LessOrEqual => write!(f, "<="),
            Self::Equal => write!(f, "="),
            Self::GreaterOrEqual => write!(f, ">="),
        }
    }
}

/// What a row expresses. Only used to group rows when they are listed.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum RowGroup {
    Flow,
    Loop,
    Capacity,
    #[default]
    Other,
}

impl Display for RowGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flow => write!(f, "Flow constraints"),
            Self::Loop => write!(f, "Loop constraints"),
            Self::Capacity => write!(f, "Capacity constraints"),
            Self::Other => write!(f, "Other constraints"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    lower: f64,
    upper: Option<f64>,
    integer: bool,
    objective: f64,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> Option<f64> {
        self.upper
    }

    pub fn is_integer(&self) -> bool {
        self.integer
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }
}

/// A linear constraint `sum(coefficient * column) <comparison> rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    terms: Vec<(ColumnId, f64)>,
    comparison: Comparison,
    rhs: f64,
    group: RowGroup,
    comment: Option<String>,
}

impl Row {
    pub fn new(comparison: Comparison, rhs: f64) -> Self {
        Self {
            terms: Vec::new(),
            comparison,
            rhs,
            group: RowGroup::default(),
            comment: None,
        }
    }

    pub fn with_term(mut self, column: ColumnId, coefficient: f64) -> Self {
        self.terms.push((column, coefficient));
        self
    }

    pub fn with_terms(mut self, terms: impl IntoIterator<Item = (ColumnId, f64)>) -> Self {
        self.terms.extend(terms);
        self
    }

    pub fn with_group(mut self, group: RowGroup) -> Self {
        self.group = group;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Terms as given. A column may appear more than once, its coefficients
    /// add up.
    pub fn terms(&self) -> &[(ColumnId, f64)] {
        &self.terms
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    pub fn group(&self) -> RowGroup {
        self.group
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Left-hand side evaluated at `values` (index 0 holds column 1).
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(column, coefficient)| coefficient * values.get(column - 1).copied().unwrap_or(0.0))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IlpProblem {
    name: String,
    direction: Direction,
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl IlpProblem {
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    /// Adds a non-negative column with no upper bound and a zero objective
    /// coefficient.
    pub fn add_column(&mut self, name: impl Into<String>, integer: bool) -> ColumnId {
        self.columns.push(Column {
            name: name.into(),
            lower: 0.0,
            upper: None,
            integer,
            objective: 0.0,
        });
        self.columns.len()
    }

    pub fn column(&self, column: ColumnId) -> Result<&Column> {
        column
            .checked_sub(1)
            .and_then(|index| self.columns.get(index))
            .ok_or(IlpError::UnknownColumn(column))
    }

    fn column_mut(&mut self, column: ColumnId) -> Result<&mut Column> {
        column
            .checked_sub(1)
            .and_then(|index| self.columns.get_mut(index))
            .ok_or(IlpError::UnknownColumn(column))
    }

    /// Looks a column up by name.
    pub fn column_by_name(&self, name: &str) -> Option<ColumnId> {
        self.columns
            .iter()
            .position(|column| column.name == name)
            .map(|index| index + 1)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn number_of_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn set_objective(&mut self, column: ColumnId, coefficient: f64) -> Result<()> {
        self.column_mut(column)?.objective = coefficient;
        Ok(())
    }

    pub fn set_integer(&mut self, column: ColumnId, integer: bool) -> Result<()> {
        self.column_mut(column)?.integer = integer;
        Ok(())
    }

    pub fn set_upper_bound(&mut self, column: ColumnId, upper: f64) -> Result<()> {
        let entry = self.column_mut(column)?;
        if upper < entry.lower {
            return Err(IlpError::InvalidBounds {
                column,
                lower: entry.lower,
                upper,
            });
        }
        entry.upper = Some(upper);
        Ok(())
    }

    pub fn set_lower_bound(&mut self, column: ColumnId, lower: f64) -> Result<()> {
        let entry = self.column_mut(column)?;
        if let Some(upper) = entry.upper.filter(|upper| lower > *upper) {
            return Err(IlpError::InvalidBounds {
                column,
                lower,
                upper,
            });
        }
        entry.lower = lower;
        Ok(())
    }

    pub fn add_row(&mut self, row: Row) -> Result<()> {
        for (column, _) in &row.terms {
            self.column(*column)?;
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(values)
            .map(|(column, value)| column.objective * value)
            .sum()
    }

    /// Whether `values` (index 0 holds column 1) satisfies every bound,
    /// integrality requirement and row.
    pub fn is_satisfied_by(&self, values: &[f64]) -> bool {
        if values.len() != self.columns.len() {
            return false;
        }
        let bounds_hold = self.columns.iter().zip(values).all(|(column, value)| {
            *value + TOLERANCE >= column.lower
                && column.upper.map_or(true, |upper| *value <= upper + TOLERANCE)
                && (!column.integer || (value - value.round()).abs() <= TOLERANCE)
        });
        bounds_hold
            && self
                .rows
                .iter()
                .all(|row| row.comparison.holds(row.activity(values), row.rhs))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IlpSolution {
    objective: f64,
    values: Vec<f64>,
}

impl IlpSolution {
    pub fn new(objective: f64, values: Vec<f64>) -> Self {
        Self { objective, values }
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Column values, index 0 holds column 1.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, column: ColumnId) -> Option<f64> {
        column
            .checked_sub(1)
            .and_then(|index| self.values.get(index))
            .copied()
    }
}

/// Something that can optimise an [`IlpProblem`].
pub trait IlpSolver {
    /// Returns an optimal assignment, or the reason there is none.
    fn solve(&self, problem: &IlpProblem) -> std::result::Result<IlpSolution, SolveStatus>;
}
