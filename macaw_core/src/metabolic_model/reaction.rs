//! This module provides a struct for representing reactions
use crate::configuration::CONFIGURATION;
use crate::utils::hashing::hash_as_hex_string;
use derive_builder::Builder;
use indexmap::IndexMap;

/// Represents a reaction in the metabolic model
#[derive(Builder, Debug, Clone)]
pub struct Reaction {
    /// Used to identify the reaction
    pub id: String,
    /// Metabolite stoichiometry of the reaction
    ///
    /// Negative coefficients are reactants, positive coefficients are products
    #[builder(default = "IndexMap::new()")]
    pub metabolites: IndexMap<String, f64>,
    /// Human-readable reaction name
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Gene or enzyme annotation associated with the reaction
    #[builder(default = "None")]
    pub genes: Option<String>,
    /// Lower flux bound
    #[builder(default = "CONFIGURATION.read().unwrap().lower_bound")]
    pub lower_bound: f64,
    /// Upper flux bound
    #[builder(default = "CONFIGURATION.read().unwrap().upper_bound")]
    pub upper_bound: f64,
    /// Reaction subsystem
    #[builder(default = "None")]
    pub subsystem: Option<String>,
}

impl Reaction {
    /// Whether the reaction can carry flux in both directions
    pub fn reversible(&self) -> bool {
        self.lower_bound < 0. && self.upper_bound > 0.
    }

    /// Whether the reaction is an exchange reaction
    ///
    /// Exchange reactions have exactly one participating metabolite and model
    /// import/export across the system boundary. The flag is derived from the
    /// stoichiometry, never stored.
    pub fn is_exchange(&self) -> bool {
        self.metabolites.values().filter(|c| **c != 0.).count() == 1
    }

    /// Whether the bounds only permit flux opposite the written direction
    fn runs_backwards(&self) -> bool {
        self.upper_bound <= 0. && self.lower_bound < 0.
    }

    /// Ids of the metabolites consumed when the reaction runs in its only
    /// permitted direction (or as written, for reversible reactions)
    pub fn reactant_ids(&self) -> Vec<&str> {
        let backwards = self.runs_backwards();
        self.metabolites
            .iter()
            .filter(|(_, coef)| **coef != 0. && ((**coef < 0.) != backwards))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Ids of the metabolites produced when the reaction runs in its only
    /// permitted direction (or as written, for reversible reactions)
    pub fn product_ids(&self) -> Vec<&str> {
        let backwards = self.runs_backwards();
        self.metabolites
            .iter()
            .filter(|(_, coef)| **coef != 0. && ((**coef > 0.) != backwards))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// The signs a metabolite's rate of change can take across the reaction's
    /// permitted directions: +1 when the metabolite can be produced, -1 when
    /// it can be consumed
    pub fn production_signs(&self, met_id: &str) -> Vec<i8> {
        let coef = match self.metabolites.get(met_id) {
            Some(c) if *c != 0. => *c,
            _ => return Vec::new(),
        };
        let mut signs = Vec::new();
        if self.upper_bound > 0. {
            signs.push(if coef > 0. { 1 } else { -1 });
        }
        if self.lower_bound < 0. {
            signs.push(if coef > 0. { -1 } else { 1 });
        }
        signs
    }

    /// Determine the id to be associated with the forward reaction in the
    /// optimization problem
    ///
    /// # Note:
    /// The forward id is "{reaction_id}_forward"
    pub fn get_forward_id(&self) -> String {
        format!("{}_forward", &self.id)
    }

    /// Determine the id to be associated with the reverse reaction in the
    /// optimization problem
    ///
    /// # Note:
    /// The reverse id is "{reaction_id}_reverse_{hexidecimal hash of reaction_id}"
    pub fn get_reverse_id(&self) -> String {
        format!("{}_reverse_{}", &self.id, hash_as_hex_string(&self.id))
    }

    /// Determine the upper bound of the variable associated with the forward reaction
    pub(crate) fn get_forward_upper_bound(&self) -> f64 {
        if self.upper_bound > 0. {
            self.upper_bound
        } else {
            0.
        }
    }

    /// Determine the lower bound of the variable associated with the forward reaction
    pub(crate) fn get_forward_lower_bound(&self) -> f64 {
        if self.lower_bound > 0. {
            self.lower_bound
        } else {
            0.
        }
    }

    /// Determine the upper bound of the variable associated with the reverse reaction
    pub(crate) fn get_reverse_upper_bound(&self) -> f64 {
        if self.lower_bound < 0. {
            -self.lower_bound
        } else {
            0.
        }
    }

    /// Determine the lower bound of the variable associated with the reverse reaction
    pub(crate) fn get_reverse_lower_bound(&self) -> f64 {
        if self.upper_bound < 0. {
            -self.upper_bound
        } else {
            0.
        }
    }
}
