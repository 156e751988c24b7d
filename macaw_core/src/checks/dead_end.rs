//! Structural dead-end search over the stoichiometric bipartite graph
//!
//! No LPs are involved: a metabolite whose remaining reactions can only ever
//! produce it or only ever consume it can never reach steady state, so every
//! reaction that needs it is structurally blocked. Killing those reactions
//! can strand further metabolites, so the walk keeps going until nothing
//! changes. Reversible reactions that are the lone remaining escape route for
//! a one-sided metabolite get restricted to the single feasible direction and
//! reported as such.

use std::collections::VecDeque;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use log::info;

use crate::checks::config::TestConfig;
use crate::checks::graph::{Edge, EdgeSet};
use crate::metabolic_model::model::Model;

/// Verdict of the dead-end test for one reaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadEndVerdict {
    Ok,
    /// Reversible, but dead-ends leave only the forward direction feasible
    OnlyForwards,
    /// Reversible, but dead-ends leave only the backward direction feasible
    OnlyBackwards,
    /// Structurally blocked; lists the dead-end metabolites it participates in
    DeadEnd(Vec<String>),
}

impl DeadEndVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, DeadEndVerdict::Ok)
    }
}

impl fmt::Display for DeadEndVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadEndVerdict::Ok => write!(f, "ok"),
            DeadEndVerdict::OnlyForwards => write!(f, "only when going forwards"),
            DeadEndVerdict::OnlyBackwards => write!(f, "only when going backwards"),
            DeadEndVerdict::DeadEnd(mets) => write!(f, "{}", mets.join(";")),
        }
    }
}

/// Everything the dead-end test reports
#[derive(Debug, Clone)]
pub struct DeadEndOutcome {
    /// Verdict per reaction, in model order
    pub verdicts: IndexMap<String, DeadEndVerdict>,
    /// Bipartite metabolite-reaction edges for every flagged reaction
    pub edges: EdgeSet,
    /// The metabolites found to be dead ends
    pub dead_metabolites: IndexSet<String>,
}

/// Find all structurally blocked reactions and one-way reversible reactions
pub fn dead_end_test(model: &Model, config: &TestConfig) -> DeadEndOutcome {
    let mut working = model.cloned();
    let participation = working.metabolite_reactions();

    let mut dead_mets: IndexSet<String> = IndexSet::new();
    let mut dead_rxns: IndexSet<String> = IndexSet::new();
    let mut forwards_only: IndexSet<String> = IndexSet::new();
    let mut backwards_only: IndexSet<String> = IndexSet::new();
    let mut edges = EdgeSet::new();

    let mut queue: VecDeque<String> = working.metabolites.keys().cloned().collect();
    while let Some(met_id) = queue.pop_front() {
        if dead_mets.contains(&met_id) {
            continue;
        }
        let live_ids: Vec<String> = participation
            .get(&met_id)
            .map(|rxns| {
                rxns.iter()
                    .filter(|id| !dead_rxns.contains(*id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if live_ids.len() < 2 {
            // 0 or 1 remaining reactions can never balance the metabolite
            dead_mets.insert(met_id);
            if let [only] = live_ids.as_slice() {
                dead_rxns.insert(only.clone());
                enqueue_neighbors(&working, only, &dead_mets, &mut queue);
            }
            continue;
        }
        let reversible_ids: Vec<String> = live_ids
            .iter()
            .filter(|id| working.reactions[*id].reversible())
            .cloned()
            .collect();
        let irreversible_ids: Vec<&String> = live_ids
            .iter()
            .filter(|id| !working.reactions[*id].reversible())
            .collect();
        let all_produce = irreversible_ids
            .iter()
            .all(|id| working.reactions[*id].product_ids().contains(&met_id.as_str()));
        let all_consume = irreversible_ids
            .iter()
            .all(|id| working.reactions[*id].reactant_ids().contains(&met_id.as_str()));
        if reversible_ids.is_empty() && (all_produce || all_consume) {
            // strictly one-sided: the metabolite and everything touching it die
            dead_mets.insert(met_id);
            for rxn_id in &live_ids {
                dead_rxns.insert(rxn_id.clone());
            }
            for rxn_id in &live_ids {
                enqueue_neighbors(&working, rxn_id, &dead_mets, &mut queue);
            }
        } else if reversible_ids.len() == 1 && (all_produce || all_consume) {
            // exactly one reversible escape route; it must run in the
            // direction that balances the metabolite
            let rxn_id = reversible_ids[0].clone();
            let consumes_as_written = working.reactions[&rxn_id].metabolites[&met_id] < 0.;
            // with only producers the route must consume, with only
            // consumers it must produce
            let forward_feasible = if all_produce {
                consumes_as_written
            } else {
                !consumes_as_written
            };
            if let Some(rxn) = working.reactions.get_mut(&rxn_id) {
                if forward_feasible {
                    rxn.lower_bound = 0.;
                    forwards_only.insert(rxn_id.clone());
                } else {
                    rxn.upper_bound = 0.;
                    backwards_only.insert(rxn_id.clone());
                }
            }
            edges.insert(Edge::metabolite_reaction(&met_id, &rxn_id));
            enqueue_neighbors(&working, &rxn_id, &dead_mets, &mut queue);
        }
    }

    let mut verdicts: IndexMap<String, DeadEndVerdict> = IndexMap::new();
    for reaction in model.reactions.values() {
        let verdict = if dead_rxns.contains(&reaction.id) {
            let mets: Vec<String> = reaction
                .metabolites
                .iter()
                .filter(|(met_id, coef)| **coef != 0. && dead_mets.contains(*met_id))
                .map(|(met_id, _)| met_id.clone())
                .collect();
            for met_id in &mets {
                edges.insert(Edge::metabolite_reaction(met_id, &reaction.id));
            }
            DeadEndVerdict::DeadEnd(mets)
        } else if forwards_only.contains(&reaction.id) {
            DeadEndVerdict::OnlyForwards
        } else if backwards_only.contains(&reaction.id) {
            DeadEndVerdict::OnlyBackwards
        } else {
            DeadEndVerdict::Ok
        };
        verdicts.insert(reaction.id.clone(), verdict);
    }

    if config.verbose > 0 {
        let one_way = forwards_only.len() + backwards_only.len()
            - forwards_only.iter().filter(|id| dead_rxns.contains(*id)).count()
            - backwards_only.iter().filter(|id| dead_rxns.contains(*id)).count();
        info!(
            "dead-end test: {} dead-end metabolites, {} blocked reactions, \
             {} reversible reactions restricted to one direction",
            dead_mets.len(),
            dead_rxns.len(),
            one_way
        );
    }

    DeadEndOutcome {
        verdicts,
        edges,
        dead_metabolites: dead_mets,
    }
}

/// Queue the other metabolites of a reaction for (re-)checking
fn enqueue_neighbors(
    model: &Model,
    rxn_id: &str,
    dead_mets: &IndexSet<String>,
    queue: &mut VecDeque<String>,
) {
    if let Some(reaction) = model.reactions.get(rxn_id) {
        for (met_id, coef) in &reaction.metabolites {
            if *coef != 0. && !dead_mets.contains(met_id) {
                queue.push_back(met_id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use crate::metabolic_model::reaction::ReactionBuilder;
    use indexmap::IndexMap;

    fn add_met(model: &mut Model, id: &str) {
        model.add_metabolite(
            MetaboliteBuilder::default()
                .id(id.to_string())
                .build()
                .unwrap(),
        );
    }

    fn add_rxn(model: &mut Model, id: &str, stoich: &[(&str, f64)], lb: f64, ub: f64) {
        model.add_reaction(
            ReactionBuilder::default()
                .id(id.to_string())
                .metabolites(
                    stoich
                        .iter()
                        .map(|(m, c)| (m.to_string(), *c))
                        .collect::<IndexMap<String, f64>>(),
                )
                .lower_bound(lb)
                .upper_bound(ub)
                .build()
                .unwrap(),
        );
    }

    /// an irreversible chain a -> b -> c -> d with no exchanges
    fn chain_model() -> Model {
        let mut model = Model::new_empty();
        for met in ["a", "b", "c", "d"] {
            add_met(&mut model, met);
        }
        add_rxn(&mut model, "r1", &[("a", -1.), ("b", 1.)], 0., 1000.);
        add_rxn(&mut model, "r2", &[("b", -1.), ("c", 1.)], 0., 1000.);
        add_rxn(&mut model, "r3", &[("c", -1.), ("d", 1.)], 0., 1000.);
        model
    }

    #[test]
    fn linear_chain_is_entirely_dead() {
        let outcome = dead_end_test(&chain_model(), &TestConfig::default());
        assert_eq!(
            outcome.verdicts["r1"],
            DeadEndVerdict::DeadEnd(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            outcome.verdicts["r2"],
            DeadEndVerdict::DeadEnd(vec!["b".to_string(), "c".to_string()])
        );
        assert_eq!(
            outcome.verdicts["r3"],
            DeadEndVerdict::DeadEnd(vec!["c".to_string(), "d".to_string()])
        );
        // both endpoints of the chain are reported
        assert!(outcome.dead_metabolites.contains("a"));
        assert!(outcome.dead_metabolites.contains("d"));
        assert_eq!(outcome.edges.len(), 6);
        assert!(outcome.edges.contains(&Edge::metabolite_reaction("a", "r1")));
        assert!(outcome.edges.contains(&Edge::metabolite_reaction("d", "r3")));
    }

    #[test]
    fn verdicts_render_the_documented_strings() {
        assert_eq!(DeadEndVerdict::Ok.to_string(), "ok");
        assert_eq!(
            DeadEndVerdict::OnlyForwards.to_string(),
            "only when going forwards"
        );
        assert_eq!(
            DeadEndVerdict::OnlyBackwards.to_string(),
            "only when going backwards"
        );
        assert_eq!(
            DeadEndVerdict::DeadEnd(vec!["a".to_string(), "b".to_string()]).to_string(),
            "a;b"
        );
    }

    #[test]
    fn healthy_cycle_with_exchanges_is_ok() {
        let mut model = Model::new_empty();
        for met in ["a", "b"] {
            add_met(&mut model, met);
        }
        add_rxn(&mut model, "ex_a", &[("a", 1.)], -1000., 1000.);
        add_rxn(&mut model, "r1", &[("a", -1.), ("b", 1.)], -1000., 1000.);
        add_rxn(&mut model, "ex_b", &[("b", -1.)], -1000., 1000.);
        let outcome = dead_end_test(&model, &TestConfig::default());
        assert!(outcome.verdicts.values().all(|v| v.is_ok()));
        assert!(outcome.edges.is_empty());
        assert!(outcome.dead_metabolites.is_empty());
    }

    #[test]
    fn lone_reversible_consumer_of_a_produced_metabolite_goes_forward_only() {
        let mut model = Model::new_empty();
        for met in ["m", "p"] {
            add_met(&mut model, met);
        }
        // m can only be produced, so the reversible r can only consume it
        add_rxn(&mut model, "src", &[("m", 1.)], 0., 1000.);
        add_rxn(&mut model, "r", &[("m", -1.), ("p", 1.)], -1000., 1000.);
        add_rxn(&mut model, "sink", &[("p", -1.)], 0., 1000.);
        let outcome = dead_end_test(&model, &TestConfig::default());
        assert_eq!(outcome.verdicts["r"], DeadEndVerdict::OnlyForwards);
        assert_eq!(outcome.verdicts["src"], DeadEndVerdict::Ok);
        assert!(outcome.edges.contains(&Edge::metabolite_reaction("m", "r")));
    }

    #[test]
    fn lone_reversible_producer_written_backwards_goes_backward_only() {
        let mut model = Model::new_empty();
        for met in ["m", "p"] {
            add_met(&mut model, met);
        }
        add_rxn(&mut model, "src", &[("m", 1.)], 0., 1000.);
        // m is a written product, so consuming it means running backwards
        add_rxn(&mut model, "r", &[("p", -1.), ("m", 1.)], -1000., 1000.);
        add_rxn(&mut model, "sink_p", &[("p", -1.)], 0., 1000.);
        let outcome = dead_end_test(&model, &TestConfig::default());
        assert_eq!(outcome.verdicts["r"], DeadEndVerdict::OnlyBackwards);
        assert!(outcome.edges.contains(&Edge::metabolite_reaction("m", "r")));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let model = chain_model();
        let config = TestConfig::default();
        let first = dead_end_test(&model, &config);
        let second = dead_end_test(&model, &config);
        assert_eq!(first.verdicts, second.verdicts);
        assert_eq!(first.edges, second.edges);
    }

    #[test]
    fn removing_a_reaction_never_revives_a_dead_end() {
        let mut model = chain_model();
        let before = dead_end_test(&model, &TestConfig::default());
        model.reactions.shift_remove("r2");
        let after = dead_end_test(&model, &TestConfig::default());
        for met in &before.dead_metabolites {
            assert!(after.dead_metabolites.contains(met));
        }
    }

    #[test]
    fn balanced_reversible_reaction_keeps_its_metabolite_alive() {
        let mut model = Model::new_empty();
        for met in ["m", "x", "y"] {
            add_met(&mut model, met);
        }
        add_rxn(&mut model, "up", &[("x", 1.)], -1000., 1000.);
        add_rxn(&mut model, "use_x", &[("x", -1.), ("m", 1.)], 0., 1000.);
        add_rxn(&mut model, "consume", &[("m", -1.), ("y", 1.)], 0., 1000.);
        add_rxn(&mut model, "out", &[("y", -1.)], -1000., 1000.);
        let before = dead_end_test(&model, &TestConfig::default());
        assert!(!before.dead_metabolites.contains("m"));
        // a reversible reaction that can both produce and consume m cannot
        // make m a dead end
        add_rxn(&mut model, "shuttle", &[("m", -1.), ("x", 1.)], -1000., 1000.);
        let after = dead_end_test(&model, &TestConfig::default());
        assert!(!after.dead_metabolites.contains("m"));
    }
}
