//! Provides interface to backend solvers

use crate::optimize::problem::Problem;
use crate::optimize::ProblemSolution;
use std::fmt::Debug;
use thiserror::Error;

pub mod clarabel;

pub use clarabel::ClarabelSolver;

/// Options applied to a single solve call
#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    /// Wall-clock limit for the solve in seconds; None means unlimited
    ///
    /// A solve that runs out of time reports [`crate::optimize::OptimizationStatus::SolverHalted`].
    pub time_limit: Option<f64>,
    /// Whether the backend should print its own progress output
    pub verbose: bool,
}

/// Trait for structs implementing a solver backend interface
///
/// # Note
/// The solver can fail to find a solution without having an error, for example
/// if the problem is inconsistent then the solver will return a ProblemSolution
/// with an Infeasible OptimizationStatus
pub trait Solver: Debug {
    /// Solve the given problem, rebuilding the backend representation
    fn solve(
        &mut self,
        problem: &Problem,
        options: &SolveOptions,
    ) -> Result<ProblemSolution, SolverError>;
}

/// Possible solver error states
#[derive(Error, Debug, Clone)]
pub enum SolverError {
    /// The problem could not be translated into the backend's input format
    #[error("Could not build the backend problem: {message}")]
    Setup { message: String },
}
