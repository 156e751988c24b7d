//! The consistency checks and the pathway synthesis that fuses their outputs
//!
//! Each check takes a read-only model and a [`TestConfig`] and emits a verdict
//! per reaction plus a set of edges naming what it flagged; `run_all_tests`
//! drives all five in dependency order and labels connected components of the
//! combined edge set as pathways.

pub mod config;
pub mod dead_end;
pub mod dilution;
pub mod diphosphate;
pub mod duplicate;
pub mod graph;
pub mod loops;
pub mod report;

pub use config::{TestConfig, TestConfigBuilder};
pub use dead_end::{dead_end_test, DeadEndOutcome, DeadEndVerdict};
pub use dilution::{dilution_test, DilutionOutcome, DilutionVerdict};
pub use diphosphate::{diphosphate_test, DiphosphateVerdict};
pub use duplicate::{duplicate_test, DuplicateOutcome, DuplicateVerdict};
pub use graph::{form_pathways, Edge, EdgeSet, Node};
pub use loops::{loop_test, LoopOutcome, LoopVerdict};
pub use report::{run_all_tests, ReactionResult, ResultsTable};

use crate::metabolic_model::model::ModelError;
use crate::optimize::flux::FluxError;
use thiserror::Error;

/// Errors that surface from a check run
///
/// Solver-local conditions (infeasible, unbounded, numerical) never show up
/// here; they are folded into verdicts. What remains is structurally invalid
/// input, cancellation, and loop-test timeouts.
#[derive(Error, Debug)]
pub enum MacawError {
    #[error(transparent)]
    InvalidModel(#[from] ModelError),
    #[error(transparent)]
    Flux(#[from] FluxError),
    #[error("failed to write results: {0}")]
    Csv(#[from] csv::Error),
}
