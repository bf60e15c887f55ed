//! Plain text listing of an [`IlpProblem`].
//!
//! The listing follows the lp_solve LP format closely enough to be solved
//! offline:
//!
//! ```text
//! // Objective function
//! max: 1 edge_1 + 1 edge_2 + 0 edge_3;
//!
//! // Flow constraints
//! // Vertex 2
//! edge_2 = edge_1 + edge_3;
//!
//! // Loop constraints
//! // Header 2
//! edge_3 <= 5 edge_1;
//!
//! // Bounds
//! edge_1 <= 1;
//!
//! // Integer constraints
//! int edge_1, edge_2, edge_3;
//! ```
//!
//! Every statement ends with `;`. Terms with a positive coefficient are
//! written on the left-hand side, the others are moved to the right.
//! [`parse`] reads such a listing back. A constraint on a single column is
//! read as a bound on that column, as lp_solve does.

use std::{fmt::Write as _, io::Write};

use regex::Regex;
use thiserror::Error;
use tracing::trace;

use super::{ColumnId, Comparison, Direction, IlpError, IlpProblem, Row, RowGroup};

pub type Result<T> = std::result::Result<T, LpFormatError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LpFormatError {
    /// Thrown when a statement is neither an objective, a constraint nor an
    /// integer declaration.
    #[error("Unable to parse statement: {0}")]
    InvalidStatement(String),

    #[error("Unable to parse term '{0}'")]
    InvalidTerm(String),

    #[error("The listing has no objective function")]
    MissingObjective,

    /// Thrown when text follows the last `;`.
    #[error("Unterminated statement: {0}")]
    Unterminated(String),

    #[error("Invalid problem")]
    Problem(#[from] IlpError),

    #[error("Invalid pattern")]
    Regex(#[from] regex::Error),
}

/// Writes `problem` as a listing.
pub fn write(problem: &IlpProblem, out: &mut impl Write) -> std::io::Result<()> {
    out.write_all(to_lp_string(problem).as_bytes())
}

pub fn to_lp_string(problem: &IlpProblem) -> String {
    let mut listing = String::new();
    // Writing into a String cannot fail.
    let _ = write_listing(problem, &mut listing);
    listing
}

fn write_listing(problem: &IlpProblem, out: &mut String) -> std::fmt::Result {
    let name = |column: usize| {
        problem
            .column(column)
            .map(|c| c.name().to_owned())
            .unwrap_or_else(|_| format!("C{column}"))
    };

    writeln!(out, "// Objective function")?;
    let direction = match problem.direction() {
        Direction::Maximise => "max",
        Direction::Minimise => "min",
    };
    let objective: Vec<String> = problem
        .columns()
        .iter()
        .map(|column| format!("{} {}", column.objective(), column.name()))
        .collect();
    if objective.is_empty() {
        writeln!(out, "{direction}: ;")?;
    } else {
        writeln!(out, "{direction}: {};", objective.join(" + "))?;
    }

    let mut group = None;
    for row in problem.rows() {
        if group != Some(row.group()) {
            group = Some(row.group());
            writeln!(out)?;
            writeln!(out, "// {}", row.group())?;
        }
        if let Some(comment) = row.comment() {
            writeln!(out, "// {comment}")?;
        }

        let mut left = Vec::new();
        let mut right = Vec::new();
        for (column, coefficient) in row.terms() {
            if *coefficient >= 0.0 {
                left.push(term(*coefficient, &name(*column)));
            } else {
                right.push(term(-coefficient, &name(*column)));
            }
        }
        if row.rhs() != 0.0 || right.is_empty() {
            right.push(format!("{}", row.rhs()));
        }
        if left.is_empty() {
            left.push("0".to_owned());
        }
        writeln!(
            out,
            "{} {} {};",
            left.join(" + "),
            row.comparison(),
            right.join(" + ")
        )?;
    }

    let bounded: Vec<_> = problem
        .columns()
        .iter()
        .filter(|column| column.lower() != 0.0 || column.upper().is_some())
        .collect();
    if !bounded.is_empty() {
        writeln!(out)?;
        writeln!(out, "// Bounds")?;
        for column in bounded {
            if column.lower() != 0.0 {
                writeln!(out, "{} >= {};", column.name(), column.lower())?;
            }
            if let Some(upper) = column.upper() {
                writeln!(out, "{} <= {};", column.name(), upper)?;
            }
        }
    }

    let integers: Vec<&str> = problem
        .columns()
        .iter()
        .filter(|column| column.is_integer())
        .map(|column| column.name())
        .collect();
    if !integers.is_empty() {
        writeln!(out)?;
        writeln!(out, "// Integer constraints")?;
        writeln!(out, "int {};", integers.join(", "))?;
    }
    Ok(())
}

fn term(coefficient: f64, name: &str) -> String {
    if coefficient == 1.0 {
        name.to_owned()
    } else {
        format!("{coefficient} {name}")
    }
}

/// One side of a statement: named terms and the sum of the constants.
#[derive(Debug, Default)]
struct Side {
    terms: Vec<(String, f64)>,
    constant: f64,
}

struct Parser {
    objective: Regex,
    integers: Regex,
    constraint: Regex,
    term: Regex,
}

impl Parser {
    fn new() -> Result<Self> {
        Ok(Self {
            objective: Regex::new(r"^(?i)(max|min|maximi[sz]e|minimi[sz]e)\s*:\s*(.*)$")?,
            integers: Regex::new(r"^(?i)int\s+(.*)$")?,
            constraint: Regex::new(r"^(.*?)(<=|>=|=<|=>|<|>|=)(.*)$")?,
            term: Regex::new(concat!(
                r"^([+-])?\s*",
                r"([0-9]*\.?[0-9]+(?:[eE][+-]?[0-9]+)?)?\s*\*?\s*",
                r"([A-Za-z_][A-Za-z0-9_\[\]\.]*(?:-[A-Za-z0-9_\[\]\.]+)*)?\s*",
            ))?,
        })
    }

    /// Splits `expression` into signed terms. A `-` between two name
    /// characters belongs to the name, so `a - b` is a difference and `a-b`
    /// a single column.
    fn side(&self, expression: &str) -> Result<Side> {
        let mut side = Side::default();
        let mut rest = expression.trim();
        let mut first = true;
        while !rest.is_empty() {
            let invalid = || LpFormatError::InvalidTerm(offending_term(rest));
            let captures = self.term.captures(rest).ok_or_else(invalid)?;
            if captures.get(1).is_none() && !first {
                return Err(invalid());
            }
            let sign = match captures.get(1) {
                Some(sign) if sign.as_str() == "-" => -1.0,
                _ => 1.0,
            };
            let number = match captures.get(2) {
                Some(number) => number.as_str().parse::<f64>().map_err(|_| invalid())?,
                None => 1.0,
            };
            match captures.get(3) {
                Some(name) => side.terms.push((name.as_str().to_owned(), sign * number)),
                None if captures.get(2).is_some() => side.constant += sign * number,
                None => return Err(invalid()),
            }
            rest = &rest[captures.get(0).map_or(0, |m| m.end())..];
            first = false;
        }
        Ok(side)
    }
}

/// The text of the term at the start of `rest`, without its sign.
fn offending_term(rest: &str) -> String {
    rest.trim_start_matches(['+', '-'])
        .split(['+', '-'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_owned()
}

/// Reads a listing produced by [`write`] (or written by hand in the same
/// subset of the LP format).
///
/// Columns are numbered in order of first appearance. Comment lines naming
/// a constraint group set the group of the rows that follow, other comment
/// lines become the comment of the next row.
pub fn parse(listing: &str) -> Result<IlpProblem> {
    let parser = Parser::new()?;
    let mut problem = IlpProblem::new("parsed", Direction::Maximise);
    let mut has_objective = false;
    let mut group = RowGroup::Other;
    let mut comment: Option<String> = None;
    let mut statement = String::new();

    for line in listing.lines() {
        let line = line.trim();
        if let Some(text) = line.strip_prefix("//") {
            let text = text.trim();
            match text {
                "Flow constraints" => group = RowGroup::Flow,
                "Loop constraints" => group = RowGroup::Loop,
                "Capacity constraints" => group = RowGroup::Capacity,
                "Other constraints" | "Bounds" | "Objective function" | "Integer constraints" => {
                    group = RowGroup::Other
                }
                _ => comment = Some(text.to_owned()),
            }
            continue;
        }
        statement.push(' ');
        statement.push_str(line);

        while let Some(end) = statement.find(';') {
            let current = statement[..end].trim().to_owned();
            statement = statement[end + 1..].to_owned();
            if current.is_empty() {
                continue;
            }
            trace!("Parsing statement '{}'", current);

            if let Some(captures) = parser.objective.captures(&current) {
                let direction = if captures[1].to_lowercase().starts_with("min") {
                    Direction::Minimise
                } else {
                    Direction::Maximise
                };
                problem.set_direction(direction);
                let side = parser.side(&captures[2])?;
                for (name, coefficient) in side.terms {
                    let column = column_of(&mut problem, &name);
                    let previous = problem.column(column)?.objective();
                    problem.set_objective(column, previous + coefficient)?;
                }
                has_objective = true;
            } else if let Some(captures) = parser.integers.captures(&current) {
                for name in captures[1].split([',', ' ']).filter(|n| !n.is_empty()) {
                    let column = column_of(&mut problem, name);
                    problem.set_integer(column, true)?;
                }
            } else if let Some(captures) = parser.constraint.captures(&current) {
                let left = parser.side(&captures[1])?;
                let right = parser.side(&captures[3])?;
                let comparison = match &captures[2] {
                    "<=" | "=<" | "<" => Comparison::LessOrEqual,
                    ">=" | "=>" | ">" => Comparison::GreaterOrEqual,
                    _ => Comparison::Equal,
                };

                let mut terms = Vec::new();
                for (name, coefficient) in left.terms {
                    terms.push((column_of(&mut problem, &name), coefficient));
                }
                for (name, coefficient) in right.terms {
                    terms.push((column_of(&mut problem, &name), -coefficient));
                }
                let rhs = right.constant - left.constant;

                if let [(column, coefficient)] = *terms.as_slice() {
                    if coefficient == 0.0 {
                        return Err(LpFormatError::InvalidStatement(current));
                    }
                    let bound = rhs / coefficient;
                    let comparison = if coefficient < 0.0 {
                        comparison.flipped()
                    } else {
                        comparison
                    };
                    match comparison {
                        Comparison::LessOrEqual => problem.set_upper_bound(column, bound)?,
                        Comparison::GreaterOrEqual => problem.set_lower_bound(column, bound)?,
                        Comparison::Equal => {
                            problem.set_lower_bound(column, bound)?;
                            problem.set_upper_bound(column, bound)?;
                        }
                    }
                    comment = None;
                    continue;
                }

                let mut row = Row::new(comparison, rhs)
                    .with_terms(terms)
                    .with_group(group);
                if let Some(comment) = comment.take() {
                    row = row.with_comment(comment);
                }
                problem.add_row(row)?;
            } else {
                return Err(LpFormatError::InvalidStatement(current));
            }
        }
    }

    if !statement.trim().is_empty() {
        return Err(LpFormatError::Unterminated(statement.trim().to_owned()));
    }
    if !has_objective {
        return Err(LpFormatError::MissingObjective);
    }
    Ok(problem)
}

fn column_of(problem: &mut IlpProblem, name: &str) -> ColumnId {
    match problem.column_by_name(name) {
        Some(column) => column,
        None => problem.add_column(name, false),
    }
}
