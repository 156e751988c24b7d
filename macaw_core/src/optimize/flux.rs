//! LP primitives shared by the flux-based checks: per-reaction flux ranges,
//! can-carry-flux queries, and the blocked set of a constrained model
//!
//! Solver-local conditions are absorbed here per the error policy: an
//! infeasible or numerically failed solve counts as a flux of zero for the
//! reaction being probed, an unbounded solve counts as an infinite flux, and
//! only timeouts and cancellation propagate as errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::Reaction;
use crate::optimize::problem::{ObjectiveSense, Problem, ProblemError};
use crate::optimize::solvers::{ClarabelSolver, SolveOptions, Solver, SolverError};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Flag polled between LP solves to abandon a run early
pub type CancelFlag = Arc<AtomicBool>;

/// Options threaded through the flux primitives
#[derive(Debug, Clone)]
pub struct FluxOptions {
    /// Optima within this distance of zero are rounded to zero
    pub zero_threshold: f64,
    /// Absolute deadline shared by every solve in the call
    pub deadline: Option<Instant>,
    /// Cooperative cancellation flag
    pub cancel: Option<CancelFlag>,
    /// Worker count for the per-reaction fan-out
    pub threads: usize,
}

impl Default for FluxOptions {
    fn default() -> Self {
        FluxOptions {
            zero_threshold: crate::CONFIGURATION.read().unwrap().zero_threshold,
            deadline: None,
            cancel: None,
            threads: 1,
        }
    }
}

/// Errors from the flux primitives
#[derive(Error, Debug)]
pub enum FluxError {
    /// An LP solve exceeded its wall-clock budget
    #[error("LP solve exceeded its time budget")]
    Timeout,
    /// The run was cancelled through the cancel flag
    #[error("flux computation was cancelled")]
    Cancelled,
    #[error(transparent)]
    Problem(#[from] ProblemError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Extract the net flux of a reaction from a solution's variable values
pub fn net_flux(solution: &ProblemSolution, reaction: &Reaction) -> Option<f64> {
    let values = solution.variable_values.as_ref()?;
    let forward = values.get(&reaction.get_forward_id())?;
    let reverse = values.get(&reaction.get_reverse_id())?;
    Some(forward - reverse)
}

fn check_interrupts(options: &FluxOptions) -> Result<Option<f64>, FluxError> {
    if let Some(cancel) = &options.cancel {
        if cancel.load(Ordering::Relaxed) {
            return Err(FluxError::Cancelled);
        }
    }
    match options.deadline {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                Err(FluxError::Timeout)
            } else {
                Ok(Some(remaining.as_secs_f64()))
            }
        }
        None => Ok(None),
    }
}

/// Optimize the net flux of one reaction in one direction
///
/// Returns the optimum with near-zero values rounded to zero, +/- infinity
/// for unbounded problems, and zero for infeasible or numerically failed
/// solves.
pub fn optimize_net_flux(
    problem: &mut Problem,
    solver: &mut ClarabelSolver,
    reaction: &Reaction,
    sense: ObjectiveSense,
    options: &FluxOptions,
) -> Result<f64, FluxError> {
    let time_limit = check_interrupts(options)?;
    problem.set_net_flux_objective(reaction, sense)?;
    let solve_options = SolveOptions {
        time_limit,
        verbose: false,
    };
    let solution = solver.solve(problem, &solve_options)?;
    let value = match solution.status {
        OptimizationStatus::Optimal | OptimizationStatus::AlmostOptimal => {
            solution.objective_value.unwrap_or(0.)
        }
        OptimizationStatus::Unbounded => match sense {
            ObjectiveSense::Maximize => f64::INFINITY,
            ObjectiveSense::Minimize => f64::NEG_INFINITY,
        },
        OptimizationStatus::Infeasible => {
            debug!("problem infeasible while probing {}", reaction.id);
            0.
        }
        OptimizationStatus::SolverHalted => return Err(FluxError::Timeout),
        OptimizationStatus::NumericalError | OptimizationStatus::Unoptimized => {
            warn!(
                "numerical trouble while probing {}; treating the flux as zero",
                reaction.id
            );
            0.
        }
    };
    if value.abs() < options.zero_threshold {
        Ok(0.)
    } else {
        Ok(value)
    }
}

/// The minimum and maximum net flux a reaction can carry
pub fn flux_range(
    problem: &mut Problem,
    solver: &mut ClarabelSolver,
    reaction: &Reaction,
    options: &FluxOptions,
) -> Result<(f64, f64), FluxError> {
    let maximum = optimize_net_flux(problem, solver, reaction, ObjectiveSense::Maximize, options)?;
    let minimum = optimize_net_flux(problem, solver, reaction, ObjectiveSense::Minimize, options)?;
    Ok((minimum, maximum))
}

/// Whether a reaction can carry any flux at all under the model's constraints
pub fn can_carry_flux(
    problem: &mut Problem,
    solver: &mut ClarabelSolver,
    reaction: &Reaction,
    options: &FluxOptions,
) -> Result<bool, FluxError> {
    let maximum =
        optimize_net_flux(problem, solver, reaction, ObjectiveSense::Maximize, options)?;
    if maximum.abs() >= options.zero_threshold {
        return Ok(true);
    }
    let minimum =
        optimize_net_flux(problem, solver, reaction, ObjectiveSense::Minimize, options)?;
    Ok(minimum.abs() >= options.zero_threshold)
}

/// Determine the minimum and maximum flux value for each listed reaction
///
/// Work is split across a dedicated worker pool; each worker owns an
/// independent copy of the problem (shared-nothing, like every other
/// fan-out in this crate). Results are keyed by reaction id in the order
/// the ids were given.
pub fn flux_variability(
    model: &Model,
    reaction_ids: &[String],
    options: &FluxOptions,
) -> Result<IndexMap<String, (f64, f64)>, FluxError> {
    if reaction_ids.is_empty() {
        return Ok(IndexMap::new());
    }
    let template = Problem::from_model(model)?;
    let threads = options.threads.max(1).min(reaction_ids.len());
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let chunk_size = reaction_ids.len().div_ceil(threads);
    let chunk_results: Vec<Result<Vec<(String, (f64, f64))>, FluxError>> = pool.install(|| {
        reaction_ids
            .par_chunks(chunk_size)
            .map(|chunk| {
                let mut problem = template.clone();
                let mut solver = ClarabelSolver::new();
                let mut ranges = Vec::with_capacity(chunk.len());
                for rxn_id in chunk {
                    let reaction = model
                        .reactions
                        .get(rxn_id)
                        .ok_or(ProblemError::NonExistentVariable)?;
                    let range = flux_range(&mut problem, &mut solver, reaction, options)?;
                    ranges.push((rxn_id.clone(), range));
                }
                Ok(ranges)
            })
            .collect()
    });
    let mut results = IndexMap::with_capacity(reaction_ids.len());
    for chunk in chunk_results {
        for (rxn_id, range) in chunk? {
            results.insert(rxn_id, range);
        }
    }
    Ok(results)
}

/// Ids of the reactions whose flux range collapsed to zero
pub fn blocked_reactions(ranges: &IndexMap<String, (f64, f64)>) -> IndexSet<String> {
    ranges
        .iter()
        .filter(|(_, (minimum, maximum))| *minimum == 0. && *maximum == 0.)
        .map(|(id, _)| id.clone())
        .collect()
}
