//! Human-readable reaction equation rendering for the results table

use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::Reaction;

/// Render an equation like "glc + atp --> g6p + adp"
///
/// `use_names` swaps metabolite ids for display names; `add_suffixes`
/// appends compartment tags (" [c]" to names, "_[c]" to ids) so that the
/// same compound in different compartments stays distinguishable.
pub(crate) fn reaction_equation(
    reaction: &Reaction,
    model: &Model,
    use_names: bool,
    add_suffixes: bool,
) -> String {
    let mut reactants: Vec<String> = Vec::new();
    let mut products: Vec<String> = Vec::new();
    for (met_id, coefficient) in &reaction.metabolites {
        if *coefficient == 0. {
            continue;
        }
        let token = metabolite_token(met_id, model, use_names, add_suffixes);
        let magnitude = coefficient.abs();
        let term = if magnitude == 1. {
            token
        } else {
            format!("{} {}", format_coefficient(magnitude), token)
        };
        if *coefficient < 0. {
            reactants.push(term);
        } else {
            products.push(term);
        }
    }
    let arrow = if reaction.reversible() {
        "<=>"
    } else if reaction.upper_bound > 0. {
        "-->"
    } else if reaction.lower_bound < 0. {
        "<--"
    } else {
        "-->"
    };
    format!("{} {} {}", reactants.join(" + "), arrow, products.join(" + "))
        .trim()
        .to_string()
}

fn metabolite_token(met_id: &str, model: &Model, use_names: bool, add_suffixes: bool) -> String {
    let metabolite = model.metabolites.get(met_id);
    let base = if use_names {
        metabolite
            .map(|m| m.display_name().to_string())
            .unwrap_or_else(|| met_id.to_string())
    } else {
        met_id.to_string()
    };
    if !add_suffixes {
        return base;
    }
    match metabolite.and_then(|m| m.compartment.as_deref()) {
        Some(compartment) => {
            let suffix = if use_names {
                format!(" [{}]", compartment)
            } else {
                format!("_[{}]", compartment)
            };
            if base.ends_with(&suffix) {
                base
            } else {
                format!("{}{}", base, suffix)
            }
        }
        None => base,
    }
}

fn format_coefficient(magnitude: f64) -> String {
    if magnitude.fract() == 0. {
        format!("{}", magnitude as i64)
    } else {
        format!("{}", magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use crate::metabolic_model::reaction::ReactionBuilder;
    use indexmap::IndexMap;

    fn sample_model() -> Model {
        let mut model = Model::new_empty();
        for (id, name, compartment) in [
            ("glc_c", "glucose", "c"),
            ("atp_c", "ATP", "c"),
            ("g6p_c", "glucose-6-phosphate", "c"),
        ] {
            model.add_metabolite(
                MetaboliteBuilder::default()
                    .id(id.to_string())
                    .name(Some(name.to_string()))
                    .compartment(Some(compartment.to_string()))
                    .build()
                    .unwrap(),
            );
        }
        model.add_reaction(
            ReactionBuilder::default()
                .id("hex".to_string())
                .metabolites(IndexMap::from([
                    ("glc_c".to_string(), -1.),
                    ("atp_c".to_string(), -2.),
                    ("g6p_c".to_string(), 1.),
                ]))
                .lower_bound(0.)
                .upper_bound(1000.)
                .build()
                .unwrap(),
        );
        model
    }

    #[test]
    fn ids_and_integer_coefficients() {
        let model = sample_model();
        let equation = reaction_equation(&model.reactions["hex"], &model, false, false);
        assert_eq!(equation, "glc_c + 2 atp_c --> g6p_c");
    }

    #[test]
    fn names_with_compartment_suffixes() {
        let model = sample_model();
        let equation = reaction_equation(&model.reactions["hex"], &model, true, true);
        assert_eq!(equation, "glucose [c] + 2 ATP [c] --> glucose-6-phosphate [c]");
    }

    #[test]
    fn reversible_arrow() {
        let mut model = sample_model();
        model.set_bounds("hex", -1000., 1000.).unwrap();
        let equation = reaction_equation(&model.reactions["hex"], &model, false, false);
        assert!(equation.contains("<=>"));
    }

    #[test]
    fn exchange_reaction_has_an_empty_side() {
        let mut model = sample_model();
        model.add_reaction(
            ReactionBuilder::default()
                .id("ex_glc".to_string())
                .metabolites(IndexMap::from([("glc_c".to_string(), -1.)]))
                .lower_bound(0.)
                .upper_bound(1000.)
                .build()
                .unwrap(),
        );
        let equation = reaction_equation(&model.reactions["ex_glc"], &model, false, false);
        assert_eq!(equation, "glc_c -->");
    }
}
