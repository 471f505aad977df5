//! Solver interfaces, and errors raised while solving

pub mod clarabel;

use thiserror::Error;

use crate::optimize::problem::{Problem, ProblemError};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// A backend able to solve a linear [`Problem`]
pub trait Solver {
    /// Solve the problem, returning a solution with its status
    ///
    /// Infeasibility is reported through [`ProblemSolution::status`], an `Err` is only
    /// returned when the problem could not be handed to the backend at all.
    fn solve(&self, problem: &Problem) -> Result<ProblemSolution, SolverError>;
}

/// Errors raised while building or solving an optimization problem
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("No feasible solution exists")]
    Infeasible,
    #[error("The objective is unbounded")]
    Unbounded,
    #[error("Solver stopped without an optimal solution ({0:?})")]
    NotSolved(OptimizationStatus),
    #[error("The model has no objective")]
    NoObjective,
    #[error("Reaction {0} is not in the model")]
    UnknownReaction(String),
    #[error("Invalid optimization problem")]
    InvalidProblem(#[from] ProblemError),
}

impl SolverError {
    /// Convert a non-optimal status into the matching error
    pub(crate) fn from_status(status: OptimizationStatus) -> Self {
        match status {
            OptimizationStatus::Infeasible => SolverError::Infeasible,
            OptimizationStatus::Unbounded => SolverError::Unbounded,
            other => SolverError::NotSolved(other),
        }
    }
}
