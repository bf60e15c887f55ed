//! Settings of a WCET calculation.

use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;
use tracing::debug;

use crate::ilp::BranchAndBound;

pub const LOOP_CONSTRAINT_LEVEL: &str = "IPET_LOOP_CONSTRAINT_LEVEL";
pub const ALL_CONSTRAINTS: &str = "IPET_ALL_CONSTRAINTS";
pub const ILP_DIRECTORY: &str = "IPET_ILP_DIRECTORY";
pub const MAX_BRANCH_NODES: &str = "IPET_MAX_BRANCH_NODES";
pub const SOLVE_TIMEOUT_MS: &str = "IPET_SOLVE_TIMEOUT_MS";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigError {
    /// Thrown when a variable holds something that cannot be parsed.
    #[error("Invalid value '{value}' for {variable}")]
    InvalidValue {
        variable: &'static str,
        value: String,
    },

    /// Thrown when the loop constraint level is set to 0.
    #[error("The loop constraint level must be positive")]
    ZeroLoopConstraintLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Largest difference in nesting level between a header and the loop a
    /// bound is relative to. Bounds relative to loops further out are not
    /// emitted.
    pub loop_constraint_level: u32,

    /// In the capacity-constrained model, cap every edge at its observed
    /// count instead of only the back edges.
    pub all_constraints: bool,

    /// Where models are listed. Nothing is written when `None`.
    pub ilp_directory: Option<PathBuf>,

    pub max_branch_nodes: usize,

    /// Wall clock budget of a single solve.
    pub solve_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            loop_constraint_level: u32::MAX,
            all_constraints: false,
            ilp_directory: None,
            max_branch_nodes: 100_000,
            solve_timeout: None,
        }
    }
}

impl RunConfig {
    /// Reads the configuration from the environment. Unset variables keep
    /// their default.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|variable| env::var(variable).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(level) = parse(&lookup, LOOP_CONSTRAINT_LEVEL)? {
            if level == 0 {
                return Err(ConfigError::ZeroLoopConstraintLevel);
            }
            cfg.loop_constraint_level = level;
        }
        if let Some(value) = lookup(ALL_CONSTRAINTS) {
            cfg.all_constraints = match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        variable: ALL_CONSTRAINTS,
                        value,
                    })
                }
            };
        }
        if let Some(directory) = lookup(ILP_DIRECTORY).filter(|d| !d.trim().is_empty()) {
            cfg.ilp_directory = Some(PathBuf::from(directory));
        }
        if let Some(nodes) = parse(&lookup, MAX_BRANCH_NODES)? {
            cfg.max_branch_nodes = nodes;
        }
        if let Some(millis) = parse(&lookup, SOLVE_TIMEOUT_MS)? {
            cfg.solve_timeout = Some(Duration::from_millis(millis));
        }

        debug!("Run configuration: {:?}", cfg);
        Ok(cfg)
    }

    /// The solver these settings describe.
    pub fn solver(&self) -> BranchAndBound {
        BranchAndBound::new()
            .with_max_nodes(self.max_branch_nodes)
            .with_timeout(self.solve_timeout)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &'static str,
) -> Result<Option<T>> {
    match lookup(variable) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::InvalidValue { variable, value }),
        },
    }
}
