//! Thermodynamically infeasible cycle detection
//!
//! Phase 1 seals the model off from the outside world (all exchanges pinned
//! to zero, maintenance-style positive lower bounds relaxed) and asks every
//! internal reaction whether it can still carry flux; anything that can is
//! running in a loop that feeds itself. Phase 2 samples the remaining flux
//! space and connects flagged reactions whose sampled fluxes move together
//! and that share at least one metabolite, so that separate loops end up in
//! separate pathways.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use log::info;

use crate::checks::config::TestConfig;
use crate::checks::graph::{Edge, EdgeSet};
use crate::checks::MacawError;
use crate::metabolic_model::model::Model;
use crate::optimize::flux::{flux_variability, FluxOptions};
use crate::optimize::sampling::sample_fluxes;

/// Verdict of the loop test for one reaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopVerdict {
    Ok,
    InLoop,
}

impl LoopVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, LoopVerdict::Ok)
    }
}

impl fmt::Display for LoopVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopVerdict::Ok => write!(f, "ok"),
            LoopVerdict::InLoop => write!(f, "in loop"),
        }
    }
}

/// Everything the loop test reports
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Verdict per reaction, in model order
    pub verdicts: IndexMap<String, LoopVerdict>,
    /// Reaction-reaction edges between correlated members of the same loop
    pub edges: EdgeSet,
}

/// Find reactions that can sustain flux with every exchange closed
pub fn loop_test(model: &Model, config: &TestConfig) -> Result<LoopOutcome, MacawError> {
    if config.verbose > 0 {
        info!("starting loop test");
    }
    let mut working = model.cloned();
    // an objective is unlikely to be feasible with no exchange fluxes
    working.clear_objective();
    let rxn_ids: Vec<String> = working.reactions.keys().cloned().collect();
    for rxn_id in &rxn_ids {
        let reaction = &working.reactions[rxn_id];
        if reaction.is_exchange() {
            working.set_bounds(rxn_id, 0., 0.)?;
        } else if reaction.lower_bound > 0. {
            // positive lower bounds are usually ATP maintenance; they make a
            // sealed model infeasible and hide the loops
            let upper = reaction.upper_bound;
            working.set_bounds(rxn_id, 0., upper)?;
        }
    }
    let internal_ids: Vec<String> = working
        .reactions
        .values()
        .filter(|r| !r.is_exchange())
        .map(|r| r.id.clone())
        .collect();
    let flux_options = FluxOptions {
        zero_threshold: config.zero_threshold,
        deadline: None,
        cancel: config.cancel.clone(),
        threads: config.threads,
    };
    let ranges = flux_variability(&working, &internal_ids, &flux_options)?;
    let mut verdicts: IndexMap<String, LoopVerdict> = IndexMap::new();
    for rxn_id in model.reactions.keys() {
        let verdict = match ranges.get(rxn_id) {
            Some((minimum, maximum)) if *minimum != 0. || *maximum != 0. => LoopVerdict::InLoop,
            _ => LoopVerdict::Ok,
        };
        verdicts.insert(rxn_id.clone(), verdict);
    }
    let in_loop: IndexSet<String> = verdicts
        .iter()
        .filter(|(_, verdict)| **verdict == LoopVerdict::InLoop)
        .map(|(rxn_id, _)| rxn_id.clone())
        .collect();
    if config.verbose > 0 {
        info!(
            "loop test: {} reactions are involved in infinite loops",
            in_loop.len()
        );
    }
    if in_loop.is_empty() {
        return Ok(LoopOutcome {
            verdicts,
            edges: EdgeSet::new(),
        });
    }

    // phase 2: pin everything outside the loops to zero and sample what's left
    for rxn_id in &rxn_ids {
        if !in_loop.contains(rxn_id) {
            working.set_bounds(rxn_id, 0., 0.)?;
        }
    }
    let samples = sample_fluxes(
        &working,
        config.flux_samples,
        config.sample_seed,
        config.zero_threshold,
    )?;
    let columns: IndexMap<&String, Vec<f64>> = in_loop
        .iter()
        .filter_map(|rxn_id| samples.column(rxn_id).map(|column| (rxn_id, column)))
        .collect();
    let mut edges = EdgeSet::new();
    let flagged: Vec<&String> = in_loop.iter().collect();
    for (position, first) in flagged.iter().enumerate() {
        for second in &flagged[position + 1..] {
            if !share_a_metabolite(model, first, second) {
                continue;
            }
            let (Some(xs), Some(ys)) = (columns.get(*first), columns.get(*second)) else {
                continue;
            };
            match pearson(xs, ys) {
                Some(correlation) if correlation.abs() >= config.corr_threshold => {
                    edges.insert(Edge::reaction_pair(first, second));
                }
                _ => {}
            }
        }
    }
    Ok(LoopOutcome { verdicts, edges })
}

/// Whether two reactions have any metabolite in common
fn share_a_metabolite(model: &Model, first: &str, second: &str) -> bool {
    let (Some(r1), Some(r2)) = (model.reactions.get(first), model.reactions.get(second)) else {
        return false;
    };
    r1.metabolites
        .iter()
        .any(|(met, coef)| *coef != 0. && r2.metabolites.get(met).is_some_and(|c| *c != 0.))
}

/// Pearson correlation of two equal-length samples; None when either side
/// has no variance
fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.is_empty() {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut covariance = 0.;
    let mut variance_x = 0.;
    let mut variance_y = 0.;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        variance_x += dx * dx;
        variance_y += dy * dy;
    }
    if variance_x <= f64::EPSILON || variance_y <= f64::EPSILON {
        return None;
    }
    Some(covariance / (variance_x.sqrt() * variance_y.sqrt()))
}
