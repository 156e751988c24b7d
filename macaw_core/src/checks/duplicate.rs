//! Four equivalence classifications over reaction signatures
//!
//! Reactions are bucketed by hashable canonical signatures (exact
//! stoichiometry, flip-invariant orientation, sign pattern, and
//! redox-stripped remainder) and every bucket of two or more turns into
//! symmetric verdict lists plus reaction-reaction edges. Coefficients are
//! compared exactly, never against a threshold; LP rounding noise has no
//! business here.

use std::collections::HashMap;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use log::warn;
use ordered_float::OrderedFloat;

use crate::checks::config::TestConfig;
use crate::checks::graph::{Edge, EdgeSet};
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::Reaction;

/// Verdict of one duplicate classification for one reaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateVerdict {
    Ok,
    /// Ids of the other members of the reaction's equivalence class
    Duplicates(Vec<String>),
}

impl DuplicateVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, DuplicateVerdict::Ok)
    }
}

impl fmt::Display for DuplicateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateVerdict::Ok => write!(f, "ok"),
            DuplicateVerdict::Duplicates(ids) => write!(f, "{}", ids.join(";")),
        }
    }
}

/// The four verdict columns and the combined edge list
#[derive(Debug, Clone)]
pub struct DuplicateOutcome {
    pub exact: IndexMap<String, DuplicateVerdict>,
    pub directions: IndexMap<String, DuplicateVerdict>,
    pub coefficients: IndexMap<String, DuplicateVerdict>,
    pub redox: IndexMap<String, DuplicateVerdict>,
    pub edges: EdgeSet,
}

type Coefficient = OrderedFloat<f64>;

/// Signed stoichiometry plus the permitted directions; equality here means
/// the reactions are interchangeable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExactSignature {
    stoichiometry: Vec<(String, Coefficient)>,
    forward: bool,
    backward: bool,
}

/// The two sides as unsigned multisets, ordered so that flipping a reaction
/// end-for-end yields the same signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OrientationSignature {
    near: Vec<(String, Coefficient)>,
    far: Vec<(String, Coefficient)>,
}

fn exact_signature(reaction: &Reaction) -> ExactSignature {
    let mut stoichiometry: Vec<(String, Coefficient)> = reaction
        .metabolites
        .iter()
        .filter(|(_, coef)| **coef != 0.)
        .map(|(met, coef)| (met.clone(), OrderedFloat(*coef)))
        .collect();
    stoichiometry.sort();
    ExactSignature {
        stoichiometry,
        forward: reaction.upper_bound > 0.,
        backward: reaction.lower_bound < 0.,
    }
}

fn orientation_signature<'a, I>(stoichiometry: I) -> OrientationSignature
where
    I: Iterator<Item = (&'a String, &'a f64)>,
{
    let mut reactants: Vec<(String, Coefficient)> = Vec::new();
    let mut products: Vec<(String, Coefficient)> = Vec::new();
    for (met, coef) in stoichiometry {
        if *coef < 0. {
            reactants.push((met.clone(), OrderedFloat(-coef)));
        } else if *coef > 0. {
            products.push((met.clone(), OrderedFloat(*coef)));
        }
    }
    reactants.sort();
    products.sort();
    if products < reactants {
        OrientationSignature {
            near: products,
            far: reactants,
        }
    } else {
        OrientationSignature {
            near: reactants,
            far: products,
        }
    }
}

/// Participating metabolite ids with the side each sits on
fn sign_signature(reaction: &Reaction) -> Vec<(String, bool)> {
    let mut signs: Vec<(String, bool)> = reaction
        .metabolites
        .iter()
        .filter(|(_, coef)| **coef != 0.)
        .map(|(met, coef)| (met.clone(), *coef > 0.))
        .collect();
    signs.sort();
    signs
}

/// Find sets of reactions that may be duplicates of each other
pub fn duplicate_test(model: &Model, config: &TestConfig) -> DuplicateOutcome {
    let reactions: Vec<&Reaction> = model.reactions.values().collect();
    let exact_signatures: Vec<ExactSignature> =
        reactions.iter().map(|r| exact_signature(r)).collect();

    let mut exact_partners: Vec<Vec<usize>> = vec![Vec::new(); reactions.len()];
    let mut direction_partners: Vec<Vec<usize>> = vec![Vec::new(); reactions.len()];
    let mut coefficient_partners: Vec<Vec<usize>> = vec![Vec::new(); reactions.len()];
    let mut redox_partners: Vec<Vec<usize>> = vec![Vec::new(); reactions.len()];

    // exact: identical signed stoichiometry and identical direction flags
    let mut exact_groups: HashMap<&ExactSignature, Vec<usize>> = HashMap::new();
    for (index, signature) in exact_signatures.iter().enumerate() {
        exact_groups.entry(signature).or_default().push(index);
    }
    for group in exact_groups.values() {
        record_pairs(group, &mut exact_partners, |_, _| true);
    }

    // directions: same flip-invariant shape, different exact signature
    let mut orientation_groups: HashMap<OrientationSignature, Vec<usize>> = HashMap::new();
    for (index, reaction) in reactions.iter().enumerate() {
        orientation_groups
            .entry(orientation_signature(reaction.metabolites.iter()))
            .or_default()
            .push(index);
    }
    for group in orientation_groups.values() {
        record_pairs(group, &mut direction_partners, |i, j| {
            exact_signatures[i] != exact_signatures[j]
        });
    }

    // coefficients: same metabolites on the same sides, different magnitudes
    let mut sign_groups: HashMap<Vec<(String, bool)>, Vec<usize>> = HashMap::new();
    for (index, reaction) in reactions.iter().enumerate() {
        sign_groups
            .entry(sign_signature(reaction))
            .or_default()
            .push(index);
    }
    for group in sign_groups.values() {
        record_pairs(group, &mut coefficient_partners, |i, j| {
            exact_signatures[i].stoichiometry != exact_signatures[j].stoichiometry
        });
    }

    // redox: same chemistry after stripping one redox pair and the protons
    if let Some((carriers, pair_members)) = resolve_redox_carriers(model, config) {
        let mut remainder_groups: HashMap<OrientationSignature, Vec<usize>> = HashMap::new();
        let mut used_pairs: Vec<IndexSet<usize>> = vec![IndexSet::new(); reactions.len()];
        for (index, reaction) in reactions.iter().enumerate() {
            for (pair_index, (oxidized, reduced)) in pair_members.iter().enumerate() {
                let has_both = reaction.metabolites.get(oxidized).is_some_and(|c| *c != 0.)
                    && reaction.metabolites.get(reduced).is_some_and(|c| *c != 0.);
                if has_both {
                    used_pairs[index].insert(pair_index);
                }
            }
            if used_pairs[index].is_empty() {
                continue;
            }
            let remainder: Vec<(&String, &f64)> = reaction
                .metabolites
                .iter()
                .filter(|(met, coef)| **coef != 0. && !carriers.contains(*met))
                .collect();
            if remainder.is_empty() {
                // two carriers reacting with each other or a transport
                // between compartments; entirely realistic
                continue;
            }
            remainder_groups
                .entry(orientation_signature(
                    remainder.into_iter().map(|(m, c)| (m, c)),
                ))
                .or_default()
                .push(index);
        }
        for group in remainder_groups.values() {
            record_pairs(group, &mut redox_partners, |i, j| {
                used_pairs[i] != used_pairs[j]
            });
        }
    }

    // one edge per flagged pair, assembled in reaction order so repeated runs
    // build the same graph
    let mut edges = EdgeSet::new();
    for (index, reaction) in reactions.iter().enumerate() {
        let mut partners: Vec<usize> = Vec::new();
        for column in [
            &exact_partners[index],
            &direction_partners[index],
            &coefficient_partners[index],
            &redox_partners[index],
        ] {
            partners.extend(column.iter().copied());
        }
        partners.sort_unstable();
        partners.dedup();
        for other in partners {
            if other > index {
                edges.insert(Edge::reaction_pair(&reaction.id, &reactions[other].id));
            }
        }
    }

    DuplicateOutcome {
        exact: verdict_column(&reactions, &exact_partners),
        directions: verdict_column(&reactions, &direction_partners),
        coefficients: verdict_column(&reactions, &coefficient_partners),
        redox: verdict_column(&reactions, &redox_partners),
        edges,
    }
}

/// Record every qualifying pair of a bucket in both members' partner lists
fn record_pairs<F>(group: &[usize], partners: &mut [Vec<usize>], qualifies: F)
where
    F: Fn(usize, usize) -> bool,
{
    for (position, &i) in group.iter().enumerate() {
        for &j in &group[position + 1..] {
            if qualifies(i, j) {
                partners[i].push(j);
                partners[j].push(i);
            }
        }
    }
}

fn verdict_column(
    reactions: &[&Reaction],
    partners: &[Vec<usize>],
) -> IndexMap<String, DuplicateVerdict> {
    reactions
        .iter()
        .enumerate()
        .map(|(index, reaction)| {
            let verdict = if partners[index].is_empty() {
                DuplicateVerdict::Ok
            } else {
                let mut ids: Vec<usize> = partners[index].clone();
                ids.sort_unstable();
                DuplicateVerdict::Duplicates(
                    ids.into_iter().map(|j| reactions[j].id.clone()).collect(),
                )
            };
            (reaction.id.clone(), verdict)
        })
        .collect()
}

/// Validate the redox configuration against the model
///
/// Returns the full carrier id set (pair members plus protons) and the
/// resolved pairs, or None when the classification has to be skipped, in
/// which case every redox verdict stays "ok".
fn resolve_redox_carriers(
    model: &Model,
    config: &TestConfig,
) -> Option<(IndexSet<String>, Vec<(String, String)>)> {
    if config.redox_pairs.is_empty() && config.proton_ids.is_empty() {
        return None;
    }
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (oxidized, reduced) in &config.redox_pairs {
        if !model.metabolites.contains_key(oxidized) || !model.metabolites.contains_key(reduced) {
            warn!(
                "redox pair ({}, {}) names a metabolite that is not in the model; skipping the pair",
                oxidized, reduced
            );
            continue;
        }
        pairs.push((oxidized.clone(), reduced.clone()));
    }
    let mut protons: Vec<String> = Vec::new();
    for proton in &config.proton_ids {
        if model.metabolites.contains_key(proton) {
            protons.push(proton.clone());
        } else {
            warn!("proton id {} is not in the model; skipping it", proton);
        }
    }
    if pairs.len() < 2 || protons.is_empty() {
        warn!(
            "the redox duplicate classification needs at least two redox pairs and one proton id; \
             every redox verdict will be \"ok\""
        );
        return None;
    }
    let mut carriers: IndexSet<String> = IndexSet::new();
    for (oxidized, reduced) in &pairs {
        carriers.insert(oxidized.clone());
        carriers.insert(reduced.clone());
    }
    for proton in &protons {
        carriers.insert(proton.clone());
    }
    Some((carriers, pairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::config::TestConfigBuilder;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use crate::metabolic_model::reaction::ReactionBuilder;

    fn model_with(reactions: &[(&str, &[(&str, f64)], f64, f64)]) -> Model {
        let mut model = Model::new_empty();
        let mut mets: IndexSet<String> = IndexSet::new();
        for (_, stoich, _, _) in reactions {
            for (met, _) in *stoich {
                mets.insert(met.to_string());
            }
        }
        for met in mets {
            model.add_metabolite(MetaboliteBuilder::default().id(met).build().unwrap());
        }
        for (id, stoich, lb, ub) in reactions {
            model.add_reaction(
                ReactionBuilder::default()
                    .id(id.to_string())
                    .metabolites(
                        stoich
                            .iter()
                            .map(|(m, c)| (m.to_string(), *c))
                            .collect::<IndexMap<String, f64>>(),
                    )
                    .lower_bound(*lb)
                    .upper_bound(*ub)
                    .build()
                    .unwrap(),
            );
        }
        model
    }

    #[test]
    fn identical_reactions_are_exact_duplicates_only() {
        let model = model_with(&[
            ("r1", &[("a", -1.), ("b", -1.), ("c", 1.)], 0., 1000.),
            ("r2", &[("a", -1.), ("b", -1.), ("c", 1.)], 0., 1000.),
        ]);
        let outcome = duplicate_test(&model, &TestConfig::default());
        assert_eq!(
            outcome.exact["r1"],
            DuplicateVerdict::Duplicates(vec!["r2".to_string()])
        );
        assert_eq!(
            outcome.exact["r2"],
            DuplicateVerdict::Duplicates(vec!["r1".to_string()])
        );
        assert!(outcome.directions["r1"].is_ok());
        assert!(outcome.coefficients["r1"].is_ok());
        assert!(outcome.redox["r1"].is_ok());
        assert_eq!(outcome.edges.len(), 1);
        assert!(outcome.edges.contains(&Edge::reaction_pair("r1", "r2")));
    }

    #[test]
    fn opposite_direction_is_a_direction_duplicate() {
        let model = model_with(&[
            ("fwd", &[("a", -1.), ("b", 1.)], 0., 1000.),
            ("bwd", &[("b", -1.), ("a", 1.)], 0., 1000.),
        ]);
        let outcome = duplicate_test(&model, &TestConfig::default());
        assert_eq!(
            outcome.directions["fwd"],
            DuplicateVerdict::Duplicates(vec!["bwd".to_string()])
        );
        assert!(outcome.exact["fwd"].is_ok());
        // the sides differ, so the sign pattern differs too
        assert!(outcome.coefficients["fwd"].is_ok());
    }

    #[test]
    fn differing_reversibility_is_a_direction_duplicate() {
        let model = model_with(&[
            ("irrev", &[("a", -1.), ("b", 1.)], 0., 1000.),
            ("rev", &[("a", -1.), ("b", 1.)], -1000., 1000.),
        ]);
        let outcome = duplicate_test(&model, &TestConfig::default());
        assert_eq!(
            outcome.directions["irrev"],
            DuplicateVerdict::Duplicates(vec!["rev".to_string()])
        );
        assert!(outcome.exact["irrev"].is_ok());
        assert!(outcome.coefficients["irrev"].is_ok());
    }

    #[test]
    fn differing_magnitudes_are_coefficient_duplicates() {
        let model = model_with(&[
            ("single", &[("a", -1.), ("b", 1.)], 0., 1000.),
            ("double", &[("a", -2.), ("b", 1.)], 0., 1000.),
        ]);
        let outcome = duplicate_test(&model, &TestConfig::default());
        assert_eq!(
            outcome.coefficients["single"],
            DuplicateVerdict::Duplicates(vec!["double".to_string()])
        );
        assert!(outcome.exact["single"].is_ok());
        assert!(outcome.directions["single"].is_ok());
    }

    #[test]
    fn different_carriers_same_chemistry_are_redox_duplicates() {
        let model = model_with(&[
            (
                "nad_version",
                &[("x", -1.), ("nad", -1.), ("y", 1.), ("nadh", 1.), ("h", 1.)],
                0.,
                1000.,
            ),
            (
                "nadp_version",
                &[("x", -1.), ("nadp", -1.), ("y", 1.), ("nadph", 1.), ("h", 1.)],
                0.,
                1000.,
            ),
        ]);
        let config = TestConfigBuilder::default()
            .redox_pairs(vec![
                ("nad".to_string(), "nadh".to_string()),
                ("nadp".to_string(), "nadph".to_string()),
            ])
            .proton_ids(vec!["h".to_string()])
            .build()
            .unwrap();
        let outcome = duplicate_test(&model, &config);
        assert_eq!(
            outcome.redox["nad_version"],
            DuplicateVerdict::Duplicates(vec!["nadp_version".to_string()])
        );
        assert_eq!(
            outcome.redox["nadp_version"],
            DuplicateVerdict::Duplicates(vec!["nad_version".to_string()])
        );
        assert!(outcome.exact["nad_version"].is_ok());
        assert!(outcome.directions["nad_version"].is_ok());
        assert!(outcome.coefficients["nad_version"].is_ok());
        assert_eq!(outcome.edges.len(), 1);
    }

    #[test]
    fn carrier_only_reactions_are_not_redox_duplicates() {
        // transhydrogenase-style reactions whose remainder is empty
        let model = model_with(&[
            (
                "tx1",
                &[("nad", -1.), ("nadph", -1.), ("nadh", 1.), ("nadp", 1.)],
                0.,
                1000.,
            ),
            (
                "tx2",
                &[("nad", -1.), ("nadph", -1.), ("nadh", 1.), ("nadp", 1.), ("h", 0.)],
                0.,
                1000.,
            ),
        ]);
        let config = TestConfigBuilder::default()
            .redox_pairs(vec![
                ("nad".to_string(), "nadh".to_string()),
                ("nadp".to_string(), "nadph".to_string()),
            ])
            .proton_ids(vec!["h".to_string()])
            .build()
            .unwrap();
        let outcome = duplicate_test(&model, &config);
        assert!(outcome.redox["tx1"].is_ok());
        assert!(outcome.redox["tx2"].is_ok());
    }

    #[test]
    fn missing_redox_configuration_skips_the_classification() {
        let model = model_with(&[
            ("r1", &[("a", -1.), ("b", 1.)], 0., 1000.),
            ("r2", &[("a", -1.), ("b", 1.)], 0., 1000.),
        ]);
        let config = TestConfigBuilder::default()
            // one pair and no protons is not enough
            .redox_pairs(vec![("a".to_string(), "b".to_string())])
            .build()
            .unwrap();
        let outcome = duplicate_test(&model, &config);
        assert!(outcome.redox.values().all(|v| v.is_ok()));
        // the other classifications still run
        assert!(!outcome.exact["r1"].is_ok());
    }

    #[test]
    fn every_listed_duplicate_lists_back() {
        let model = model_with(&[
            ("r1", &[("a", -1.), ("b", 1.)], 0., 1000.),
            ("r2", &[("a", -1.), ("b", 1.)], 0., 1000.),
            ("r3", &[("a", -1.), ("b", 1.)], 0., 1000.),
            ("r4", &[("a", -2.), ("b", 1.)], 0., 1000.),
        ]);
        let outcome = duplicate_test(&model, &TestConfig::default());
        for column in [&outcome.exact, &outcome.directions, &outcome.coefficients] {
            for (rxn_id, verdict) in column {
                if let DuplicateVerdict::Duplicates(others) = verdict {
                    for other in others {
                        match &column[other] {
                            DuplicateVerdict::Duplicates(back) => {
                                assert!(back.contains(rxn_id))
                            }
                            DuplicateVerdict::Ok => {
                                panic!("{} lists {} but not vice versa", rxn_id, other)
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn repeated_runs_are_identical() {
        let model = model_with(&[
            ("r1", &[("a", -1.), ("b", 1.)], 0., 1000.),
            ("r2", &[("a", -1.), ("b", 1.)], 0., 1000.),
            ("r3", &[("b", -1.), ("a", 1.)], 0., 1000.),
        ]);
        let config = TestConfig::default();
        let first = duplicate_test(&model, &config);
        let second = duplicate_test(&model, &config);
        assert_eq!(first.exact, second.exact);
        assert_eq!(first.directions, second.directions);
        assert_eq!(first.coefficients, second.coefficients);
        assert_eq!(first.redox, second.redox);
        assert_eq!(first.edges, second.edges);
    }
}
