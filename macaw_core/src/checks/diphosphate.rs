//! Rule-based reversibility flag on reactions touching pyrophosphate
//!
//! Hydrolysis of a diphosphate group is close to reversible on paper, but
//! cells keep highly active diphosphatases around precisely to drag the
//! reaction toward hydrolysis. A steady-state model without thermodynamic
//! constraints will happily run such reactions backwards to conjure ATP out
//! of nowhere, so reversible reactions that release diphosphate are flagged.

use std::fmt;

use indexmap::IndexMap;
use log::{info, warn};

use crate::checks::config::TestConfig;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::Reaction;

/// Verdict of the diphosphate test for one reaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiphosphateVerdict {
    Ok,
    ShouldBeIrreversible,
    ShouldBeFlippedAndMadeIrreversible,
}

impl DiphosphateVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, DiphosphateVerdict::Ok)
    }
}

impl fmt::Display for DiphosphateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiphosphateVerdict::Ok => write!(f, "ok"),
            DiphosphateVerdict::ShouldBeIrreversible => write!(f, "should be irreversible"),
            DiphosphateVerdict::ShouldBeFlippedAndMadeIrreversible => {
                write!(f, "should be flipped and made irreversible")
            }
        }
    }
}

/// Flag suspiciously reversible reactions that involve diphosphate
///
/// Contributes no edges. When either metabolite id list is missing the test
/// cannot run; every verdict is "ok" and a warning is logged.
pub fn diphosphate_test(
    model: &Model,
    config: &TestConfig,
) -> IndexMap<String, DiphosphateVerdict> {
    if config.ppi_ids.is_empty() || config.pi_ids.is_empty() {
        if !config.ppi_ids.is_empty() || !config.pi_ids.is_empty() {
            warn!(
                "the diphosphate test needs both the diphosphate and the monophosphate \
                 metabolite ids; every verdict will be \"ok\""
            );
        }
        return model
            .reactions
            .keys()
            .map(|id| (id.clone(), DiphosphateVerdict::Ok))
            .collect();
    }
    let verdicts: IndexMap<String, DiphosphateVerdict> = model
        .reactions
        .values()
        .map(|reaction| (reaction.id.clone(), classify(reaction, config)))
        .collect();
    if config.verbose > 0 {
        let flagged = verdicts.values().filter(|v| !v.is_ok()).count();
        info!(
            "diphosphate test: {} suspiciously reversible reactions involve diphosphate",
            flagged
        );
    }
    verdicts
}

fn classify(reaction: &Reaction, config: &TestConfig) -> DiphosphateVerdict {
    // exchange reactions cross the system boundary and are judged elsewhere
    if reaction.is_exchange() || !reaction.reversible() {
        return DiphosphateVerdict::Ok;
    }
    // reactions that involve both diphosphate and monophosphate are probably
    // diphosphatase or antiport reactions
    let involves_pi = reaction
        .metabolites
        .iter()
        .any(|(met, coef)| *coef != 0. && config.pi_ids.contains(met));
    if involves_pi {
        return DiphosphateVerdict::Ok;
    }
    let ppi_product = reaction
        .metabolites
        .iter()
        .any(|(met, coef)| *coef > 0. && config.ppi_ids.contains(met));
    let ppi_reactant = reaction
        .metabolites
        .iter()
        .any(|(met, coef)| *coef < 0. && config.ppi_ids.contains(met));
    if pure_diphosphate_transport(reaction, config) {
        return DiphosphateVerdict::Ok;
    }
    if ppi_product {
        DiphosphateVerdict::ShouldBeIrreversible
    } else if ppi_reactant {
        DiphosphateVerdict::ShouldBeFlippedAndMadeIrreversible
    } else {
        DiphosphateVerdict::Ok
    }
}

/// Whether the non-zero stoichiometry is just diphosphate moving between
/// compartments
fn pure_diphosphate_transport(reaction: &Reaction, config: &TestConfig) -> bool {
    let participants: Vec<(&String, &f64)> = reaction
        .metabolites
        .iter()
        .filter(|(_, coef)| **coef != 0.)
        .collect();
    participants.len() == 2
        && participants
            .iter()
            .all(|(met, _)| config.ppi_ids.contains(*met))
        && participants.iter().any(|(_, coef)| **coef < 0.)
        && participants.iter().any(|(_, coef)| **coef > 0.)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::config::TestConfigBuilder;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use crate::metabolic_model::reaction::ReactionBuilder;
    use indexmap::IndexSet;

    fn config_with_phosphates() -> TestConfig {
        TestConfigBuilder::default()
            .ppi_ids(vec!["ppi_c".to_string(), "ppi_m".to_string()])
            .pi_ids(vec!["pi_c".to_string()])
            .build()
            .unwrap()
    }

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
    fn reversible_diphosphate_producer_is_flagged() {
        // ATP <-> AMP + PPi
        let model = model_with(&[(
            "r",
            &[("atp_c", -1.), ("amp_c", 1.), ("ppi_c", 1.)],
            -1000.,
            1000.,
        )]);
        let verdicts = diphosphate_test(&model, &config_with_phosphates());
        assert_eq!(verdicts["r"], DiphosphateVerdict::ShouldBeIrreversible);
    }

    #[test]
    fn reversible_diphosphate_consumer_should_be_flipped() {
        let model = model_with(&[(
            "r",
            &[("ppi_c", -1.), ("amp_c", -1.), ("atp_c", 1.)],
            -1000.,
            1000.,
        )]);
        let verdicts = diphosphate_test(&model, &config_with_phosphates());
        assert_eq!(
            verdicts["r"],
            DiphosphateVerdict::ShouldBeFlippedAndMadeIrreversible
        );
    }

    #[test]
    fn irreversible_reactions_pass() {
        let model = model_with(&[(
            "r",
            &[("atp_c", -1.), ("amp_c", 1.), ("ppi_c", 1.)],
            0.,
            1000.,
        )]);
        let verdicts = diphosphate_test(&model, &config_with_phosphates());
        assert!(verdicts["r"].is_ok());
    }

    #[test]
    fn diphosphatase_reactions_pass() {
        // PPi + H2O -> 2 Pi involves monophosphate, so it's the fix, not the bug
        let model = model_with(&[(
            "r",
            &[("ppi_c", -1.), ("h2o_c", -1.), ("pi_c", 2.)],
            -1000.,
            1000.,
        )]);
        let verdicts = diphosphate_test(&model, &config_with_phosphates());
        assert!(verdicts["r"].is_ok());
    }

    #[test]
    fn compartment_transport_passes() {
        let model = model_with(&[(
            "r",
            &[("ppi_c", -1.), ("ppi_m", 1.)],
            -1000.,
            1000.,
        )]);
        let verdicts = diphosphate_test(&model, &config_with_phosphates());
        assert!(verdicts["r"].is_ok());
    }

    #[test]
    fn exchange_reactions_pass() {
        let model = model_with(&[("ex_ppi", &[("ppi_c", -1.)], -1000., 1000.)]);
        let verdicts = diphosphate_test(&model, &config_with_phosphates());
        assert!(verdicts["ex_ppi"].is_ok());
    }

    #[test]
    fn missing_id_lists_mean_every_verdict_is_ok() {
        let model = model_with(&[(
            "r",
            &[("atp_c", -1.), ("amp_c", 1.), ("ppi_c", 1.)],
            -1000.,
            1000.,
        )]);
        let partial = TestConfigBuilder::default()
            .ppi_ids(vec!["ppi_c".to_string()])
            .build()
            .unwrap();
        let verdicts = diphosphate_test(&model, &partial);
        assert!(verdicts.values().all(|v| v.is_ok()));
    }
}
