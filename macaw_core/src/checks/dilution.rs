//! Per-metabolite dilution experiments
//!
//! A metabolite that is only ever recycled never needs a net source, which
//! makes it "free" to FBA. Tying a synthetic sink flux to the total flux
//! through the metabolite's reactions exposes that: if everything touching
//! the metabolite dies once a tiny fraction of it has to be replaced, nothing
//! was actually producing it.
//!
//! Each experiment clones the prepared model, adds the sink and its coupling
//! constraint, and probes every participating reaction in both directions.
//! Experiments are independent and run on a worker pool; each one lives
//! under a wall-clock budget with a bounded number of retries, after which
//! its reactions are conservatively flagged.

use std::fmt;
use std::time::{Duration, Instant};

use indexmap::{IndexMap, IndexSet};
use log::{info, warn};
use rayon::prelude::*;

use crate::checks::config::TestConfig;
use crate::checks::dead_end::{dead_end_test, DeadEndOutcome};
use crate::checks::graph::{Edge, EdgeSet};
use crate::checks::MacawError;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::ReactionBuilder;
use crate::optimize::flux::{
    blocked_reactions, flux_range, flux_variability, FluxError, FluxOptions,
};
use crate::optimize::problem::{ConstraintTerm, Problem};
use crate::optimize::solvers::ClarabelSolver;
use crate::CONFIGURATION;

/// Verdict of the dilution test for one reaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DilutionVerdict {
    Ok,
    /// Carried no flux even before any dilution constraint was imposed
    AlwaysBlocked,
    /// Feasible without dilution, infeasible under at least one constraint
    BlockedByDilution,
    /// Infeasible without dilution, feasible under at least one constraint
    UnblockedByDilution,
}

impl DilutionVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, DilutionVerdict::Ok)
    }
}

impl fmt::Display for DilutionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DilutionVerdict::Ok => write!(f, "ok"),
            DilutionVerdict::AlwaysBlocked => write!(f, "always blocked"),
            DilutionVerdict::BlockedByDilution => write!(f, "blocked by dilution"),
            DilutionVerdict::UnblockedByDilution => write!(f, "unblocked by dilution"),
        }
    }
}

/// Everything the dilution test reports
#[derive(Debug, Clone)]
pub struct DilutionOutcome {
    /// Verdict per reaction, in model order
    pub verdicts: IndexMap<String, DilutionVerdict>,
    /// Bipartite edges from each blocked reaction to the metabolites whose
    /// dilution blocked it
    pub edges: EdgeSet,
}

/// The per-metabolite result collected from a worker
struct MetExperiment {
    met_id: String,
    /// Whether each probed reaction was blocked under this dilution
    blocked: IndexMap<String, bool>,
}

/// Find the reactions that stop carrying flux once dilution is imposed
pub fn dilution_test(
    model: &Model,
    dead_ends: Option<&DeadEndOutcome>,
    config: &TestConfig,
) -> Result<DilutionOutcome, MacawError> {
    let computed;
    let dead_ends = match dead_ends {
        Some(outcome) => outcome,
        None => {
            info!("no dead-end results were provided to the dilution test; running it first");
            computed = dead_end_test(model, config);
            &computed
        }
    };
    let mut working = model.cloned();
    working.clear_objective();
    // reactions the dead-end test flagged can't reach steady state anyway,
    // and adding dilution sinks sometimes opens them back up, which balloons
    // the solution space and the runtime
    for (rxn_id, verdict) in &dead_ends.verdicts {
        if !verdict.is_ok() {
            working.set_bounds(rxn_id, 0., 0.)?;
        }
    }
    if let Some(media) = &config.media_mets {
        if !media.is_empty() {
            apply_media_bounds(&mut working, media, config);
        }
    }
    if config.verbose > 1 {
        info!("finding flux ranges for all reactions before imposing dilution");
    }
    let all_ids: Vec<String> = working.reactions.keys().cloned().collect();
    let flux_options = FluxOptions {
        zero_threshold: config.zero_threshold,
        deadline: None,
        cancel: config.cancel.clone(),
        threads: config.threads,
    };
    let before = flux_variability(&working, &all_ids, &flux_options)?;
    let blocked_before = blocked_reactions(&before);
    tighten_reversible_bounds(&mut working, &before, config);
    let synthetic = add_leakage_reactions(&mut working, config);

    if config.verbose > 0 {
        info!("starting dilution test");
    }
    let mets = mets_to_dilute(&working, config);
    let participation = working.metabolite_reactions();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads.max(1))
        .build()
        .map_err(FluxError::from)?;
    let experiments: Vec<Result<MetExperiment, FluxError>> = pool.install(|| {
        mets.par_iter()
            .map(|met_id| {
                run_with_retries(&working, met_id, &participation, &synthetic, config)
            })
            .collect()
    });

    let mut verdicts: IndexMap<String, DilutionVerdict> = model
        .reactions
        .keys()
        .map(|rxn_id| {
            let verdict = if blocked_before.contains(rxn_id) {
                DilutionVerdict::AlwaysBlocked
            } else {
                DilutionVerdict::Ok
            };
            (rxn_id.clone(), verdict)
        })
        .collect();
    let mut edges = EdgeSet::new();
    for experiment in experiments {
        let experiment = experiment?;
        for (rxn_id, is_blocked) in &experiment.blocked {
            if *is_blocked {
                if !blocked_before.contains(rxn_id) {
                    if let Some(verdict) = verdicts.get_mut(rxn_id) {
                        *verdict = DilutionVerdict::BlockedByDilution;
                    }
                    edges.insert(Edge::metabolite_reaction(&experiment.met_id, rxn_id));
                }
            } else if blocked_before.contains(rxn_id) {
                if let Some(verdict) = verdicts.get_mut(rxn_id) {
                    if *verdict != DilutionVerdict::UnblockedByDilution {
                        info!(
                            "reaction {} was blocked without dilution but feasible under \
                             the dilution constraint for {}",
                            rxn_id, experiment.met_id
                        );
                        *verdict = DilutionVerdict::UnblockedByDilution;
                    }
                }
            }
        }
    }
    if config.verbose > 0 {
        let blocked = verdicts
            .values()
            .filter(|v| **v == DilutionVerdict::BlockedByDilution)
            .count();
        info!(
            "dilution test: {} reactions are blocked by one or more dilution constraints",
            blocked
        );
    }
    Ok(DilutionOutcome { verdicts, edges })
}

/// Open uptake for the media metabolites and close it for everything else
fn apply_media_bounds(working: &mut Model, media: &[String], config: &TestConfig) {
    let uptake_bound = CONFIGURATION.read().unwrap().lower_bound;
    let exchange_ids = working.exchange_ids();
    let mut opened = 0;
    for rxn_id in exchange_ids {
        let met_id = match working.reactions[&rxn_id]
            .metabolites
            .iter()
            .find(|(_, coef)| **coef != 0.)
        {
            Some((met_id, _)) => met_id.clone(),
            None => continue,
        };
        let name_matches = working
            .metabolites
            .get(&met_id)
            .and_then(|m| m.name.as_deref())
            .map(|name| media.iter().any(|m| m == name))
            .unwrap_or(false);
        let in_media = media.iter().any(|m| *m == met_id) || name_matches;
        if let Some(rxn) = working.reactions.get_mut(&rxn_id) {
            let new_lower = if in_media { uptake_bound } else { 0. };
            rxn.lower_bound = new_lower.min(rxn.upper_bound);
            if in_media {
                opened += 1;
            }
        }
    }
    if config.verbose > 0 {
        info!(
            "adjusted exchange bounds so that only {} metabolites can be consumed",
            opened
        );
    }
}

/// Clamp every reversible non-exchange reaction to its feasible net-flux range
///
/// The coupling constraints see forward + reverse, which can exceed |net
/// flux| arbitrarily for a reversible reaction; pinning the bounds to the
/// actual range limits how much, without any non-linear constraints.
fn tighten_reversible_bounds(
    working: &mut Model,
    ranges: &IndexMap<String, (f64, f64)>,
    config: &TestConfig,
) {
    let round3 = |x: f64| (x * 1000.).round() / 1000.;
    let rxn_ids: Vec<String> = working.reactions.keys().cloned().collect();
    for rxn_id in rxn_ids {
        let reaction = &working.reactions[&rxn_id];
        if !reaction.reversible() || reaction.is_exchange() {
            continue;
        }
        let (minimum, maximum) = match ranges.get(&rxn_id) {
            Some(range) => *range,
            None => continue,
        };
        let (current_lower, current_upper) = (reaction.lower_bound, reaction.upper_bound);
        let (new_lower, new_upper) = if minimum == 0. && maximum == 0. {
            (0., 0.)
        } else if minimum >= 0. && maximum > 0. {
            (0., current_upper)
        } else if minimum < 0. && maximum <= 0. {
            (current_lower, 0.)
        } else {
            let lower = if minimum.is_finite() {
                round3(minimum)
            } else {
                current_lower
            };
            let upper = if maximum.is_finite() {
                round3(maximum)
            } else {
                current_upper
            };
            (lower.min(upper), upper)
        };
        if let Some(reaction) = working.reactions.get_mut(&rxn_id) {
            reaction.lower_bound = new_lower;
            reaction.upper_bound = new_upper;
        }
    }
    if config.verbose > 1 {
        info!("clamped reversible reactions to their feasible flux ranges");
    }
}

/// Let metabolites that represent the same compound in different compartments
/// trickle across the boundary independently of any antiport scheme
///
/// Without this, a dilution constraint on the imported half of an antiport
/// pair starves the cycle and spuriously blocks it. Returns the ids of the
/// added reactions so they stay out of the verdicts.
fn add_leakage_reactions(working: &mut Model, config: &TestConfig) -> IndexSet<String> {
    let mut added: IndexSet<String> = IndexSet::new();
    if config.leak_flux == 0. {
        return added;
    }
    let participation = working.metabolite_reactions();
    let mut by_name: IndexMap<String, Vec<String>> = IndexMap::new();
    for met in working.metabolites.values() {
        if met.name.is_some() {
            by_name
                .entry(met.bare_name())
                .or_default()
                .push(met.id.clone());
        }
    }
    for (name, met_ids) in &by_name {
        if met_ids.len() < 2 {
            continue;
        }
        for (position, first) in met_ids.iter().enumerate() {
            for second in &met_ids[position + 1..] {
                let shares_a_reaction = participation
                    .get(first)
                    .into_iter()
                    .flatten()
                    .any(|rxn_id| {
                        participation
                            .get(second)
                            .is_some_and(|rxns| rxns.contains(rxn_id))
                    });
                if !shares_a_reaction {
                    continue;
                }
                let leak_id = format!("{}--{}_leakage", first, second);
                working.add_reaction(
                    ReactionBuilder::default()
                        .id(leak_id.clone())
                        .name(Some(format!("{} Leakage", name)))
                        .metabolites(IndexMap::from([
                            (first.clone(), -1.),
                            (second.clone(), 1.),
                        ]))
                        .lower_bound(-config.leak_flux)
                        .upper_bound(config.leak_flux)
                        .build()
                        .expect("leakage reactions always have an id"),
                );
                added.insert(leak_id);
            }
        }
    }
    if config.verbose > 0 && !added.is_empty() {
        info!(
            "added {} leakage reactions between same-named metabolites in different compartments",
            added.len()
        );
    }
    added
}

/// The metabolites whose dilution constraints get tested
fn mets_to_dilute(working: &Model, config: &TestConfig) -> Vec<String> {
    match &config.mets_to_dilute {
        Some(requested) => {
            let mut mets = Vec::new();
            for met_id in requested {
                if working.metabolites.contains_key(met_id) {
                    mets.push(met_id.clone());
                } else {
                    warn!("metabolite {} is not in the model; not diluting it", met_id);
                }
            }
            mets
        }
        None => {
            // tRNAs and cytochromes rarely come with biosynthesis pathways,
            // so their dilution constraints block half the model for free
            let skip = ["trna", "cytochrome"];
            working
                .metabolites
                .values()
                .filter(|met| {
                    let id = met.id.to_lowercase();
                    let name = met.name.as_deref().unwrap_or("").to_lowercase();
                    skip.iter().all(|s| !id.contains(s) && !name.contains(s))
                })
                .map(|met| met.id.clone())
                .collect()
        }
    }
}

/// Run one metabolite's experiment under the watchdog
fn run_with_retries(
    working: &Model,
    met_id: &str,
    participation: &IndexMap<String, Vec<String>>,
    synthetic: &IndexSet<String>,
    config: &TestConfig,
) -> Result<MetExperiment, FluxError> {
    let probe_ids: Vec<String> = participation
        .get(met_id)
        .into_iter()
        .flatten()
        .filter(|rxn_id| !synthetic.contains(*rxn_id))
        .cloned()
        .collect();
    for attempt in 1..=config.max_attempts.max(1) {
        let deadline = Instant::now() + Duration::from_secs_f64(config.timeout.max(0.));
        match run_once(working, met_id, &probe_ids, config, deadline) {
            Ok(blocked) => {
                return Ok(MetExperiment {
                    met_id: met_id.to_string(),
                    blocked,
                })
            }
            Err(FluxError::Cancelled) => return Err(FluxError::Cancelled),
            Err(FluxError::Timeout) => {
                if config.verbose > 1 {
                    warn!(
                        "dilution experiment for {} exceeded {}s (attempt {}/{})",
                        met_id, config.timeout, attempt, config.max_attempts
                    );
                }
            }
            Err(error) => {
                if config.verbose > 1 {
                    warn!(
                        "dilution experiment for {} failed (attempt {}/{}): {}",
                        met_id, attempt, config.max_attempts, error
                    );
                }
            }
        }
    }
    warn!(
        "giving up on the dilution experiment for {}; conservatively flagging its {} reactions",
        met_id,
        probe_ids.len()
    );
    Ok(MetExperiment {
        met_id: met_id.to_string(),
        blocked: probe_ids.into_iter().map(|rxn_id| (rxn_id, true)).collect(),
    })
}

/// One dilution experiment: add the sink and the coupling constraint, then
/// probe every participating reaction in both directions
fn run_once(
    working: &Model,
    met_id: &str,
    probe_ids: &[String],
    config: &TestConfig,
    deadline: Instant,
) -> Result<IndexMap<String, bool>, FluxError> {
    let dilution_factor = CONFIGURATION.read().unwrap().dilution_factor;
    let mut experiment = working.cloned();
    let dilution_id = format!("{}_dilution", met_id);
    experiment.add_reaction(
        ReactionBuilder::default()
            .id(dilution_id.clone())
            .metabolites(IndexMap::from([(met_id.to_string(), -1.)]))
            .lower_bound(0.)
            .upper_bound(f64::INFINITY)
            .build()
            .expect("dilution reactions always have an id"),
    );
    let mut problem = Problem::from_model(&experiment)?;
    // flux(dilution) must equal 1/dilution_factor of the summed split fluxes
    // through every other reaction the metabolite participates in
    let mut terms: Vec<ConstraintTerm> = Vec::new();
    for reaction in experiment.reactions.values() {
        let participates = reaction
            .metabolites
            .get(met_id)
            .is_some_and(|coef| *coef != 0.);
        if !participates {
            continue;
        }
        let weight = if reaction.id == dilution_id {
            -dilution_factor
        } else {
            1.
        };
        terms.push(ConstraintTerm {
            variable: reaction.get_forward_id(),
            coefficient: weight,
        });
        terms.push(ConstraintTerm {
            variable: reaction.get_reverse_id(),
            coefficient: if reaction.id == dilution_id {
                dilution_factor
            } else {
                1.
            },
        });
    }
    problem.add_equality_constraint(&format!("{}_dilution_constraint", met_id), terms, 0.)?;

    let options = FluxOptions {
        zero_threshold: config.zero_threshold,
        deadline: Some(deadline),
        cancel: config.cancel.clone(),
        threads: 1,
    };
    let mut solver = ClarabelSolver::new();
    let mut blocked = IndexMap::with_capacity(probe_ids.len());
    for rxn_id in probe_ids {
        let reaction = match experiment.reactions.get(rxn_id) {
            Some(reaction) => reaction,
            None => continue,
        };
        let (minimum, maximum) = flux_range(&mut problem, &mut solver, reaction, &options)?;
        blocked.insert(rxn_id.clone(), minimum == 0. && maximum == 0.);
    }
    Ok(blocked)
}
