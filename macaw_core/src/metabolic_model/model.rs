//! This module provides the Model struct for representing an entire metabolic model
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::reaction::Reaction;

use indexmap::IndexMap;
use thiserror::Error;

/// Represents a Genome Scale Metabolic Model
#[derive(Clone, Debug, Default)]
pub struct Model {
    /// Map of reaction ids to Reaction objects
    pub reactions: IndexMap<String, Reaction>,
    /// Map of metabolite ids to Metabolite objects
    pub metabolites: IndexMap<String, Metabolite>,
    /// Map of reaction ids to objective function coefficients
    pub objective: IndexMap<String, f64>,
    /// Id associated with the Model
    pub id: Option<String>,
    /// Compartments in the model
    ///
    /// An IndexMap<String, String> of {short name: long name}
    pub compartments: Option<IndexMap<String, String>>,
}

impl Model {
    pub fn new_empty() -> Self {
        Model::default()
    }

    /// Add a reaction to the model
    pub fn add_reaction(&mut self, reaction: Reaction) {
        let id = reaction.id.clone();
        self.reactions.insert(id, reaction);
    }

    /// Add a metabolite to the model
    pub fn add_metabolite(&mut self, metabolite: Metabolite) {
        let id = metabolite.id.clone();
        self.metabolites.insert(id, metabolite);
    }

    /// Return an independent working copy of the model
    ///
    /// Every check mutates a working copy (bounds, added reactions and
    /// constraints) and discards it afterwards; the original model is never
    /// touched.
    pub fn cloned(&self) -> Model {
        self.clone()
    }

    /// Check the structural invariants of the model
    ///
    /// Every metabolite referenced by a reaction must be registered, bounds
    /// must satisfy lb <= ub, and every objective coefficient must refer to a
    /// registered reaction.
    pub fn validate(&self) -> Result<(), ModelError> {
        for reaction in self.reactions.values() {
            if reaction.lower_bound > reaction.upper_bound {
                return Err(ModelError::InvalidBounds {
                    reaction: reaction.id.clone(),
                    lower_bound: reaction.lower_bound,
                    upper_bound: reaction.upper_bound,
                });
            }
            for met_id in reaction.metabolites.keys() {
                if !self.metabolites.contains_key(met_id) {
                    return Err(ModelError::UnknownMetabolite {
                        reaction: reaction.id.clone(),
                        metabolite: met_id.clone(),
                    });
                }
            }
        }
        for rxn_id in self.objective.keys() {
            if !self.reactions.contains_key(rxn_id) {
                return Err(ModelError::UnknownObjectiveReaction {
                    reaction: rxn_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Update the bounds of a reaction
    pub fn set_bounds(&mut self, reaction_id: &str, lb: f64, ub: f64) -> Result<(), ModelError> {
        if lb > ub {
            return Err(ModelError::InvalidBounds {
                reaction: reaction_id.to_string(),
                lower_bound: lb,
                upper_bound: ub,
            });
        }
        match self.reactions.get_mut(reaction_id) {
            Some(reaction) => {
                reaction.lower_bound = lb;
                reaction.upper_bound = ub;
                Ok(())
            }
            None => Err(ModelError::UnknownReaction {
                reaction: reaction_id.to_string(),
            }),
        }
    }

    /// Remove all objective coefficients from the model
    pub fn clear_objective(&mut self) {
        self.objective.clear();
    }

    /// Ids of all exchange reactions (exactly one participating metabolite)
    pub fn exchange_ids(&self) -> Vec<String> {
        self.reactions
            .values()
            .filter(|r| r.is_exchange())
            .map(|r| r.id.clone())
            .collect()
    }

    /// Map of metabolite id to the ids of every reaction it participates in
    /// with non-zero stoichiometry
    pub fn metabolite_reactions(&self) -> IndexMap<String, Vec<String>> {
        let mut participation: IndexMap<String, Vec<String>> = self
            .metabolites
            .keys()
            .map(|m| (m.clone(), Vec::new()))
            .collect();
        for reaction in self.reactions.values() {
            for (met_id, coef) in &reaction.metabolites {
                if *coef != 0. {
                    participation
                        .entry(met_id.clone())
                        .or_default()
                        .push(reaction.id.clone());
                }
            }
        }
        participation
    }
}

/// Errors from structurally invalid models
///
/// These are fatal and surface to the caller, unlike solver-local conditions
/// which the checks absorb into verdicts.
#[derive(Error, Debug, Clone)]
pub enum ModelError {
    /// A reaction references a metabolite that is not in the model
    #[error("Reaction {reaction} references unknown metabolite {metabolite}")]
    UnknownMetabolite { reaction: String, metabolite: String },
    /// A reaction has lower_bound > upper_bound
    #[error("Reaction {reaction} has inconsistent bounds [{lower_bound}, {upper_bound}]")]
    InvalidBounds {
        reaction: String,
        lower_bound: f64,
        upper_bound: f64,
    },
    /// An operation referenced a reaction that is not in the model
    #[error("No reaction with id {reaction} in the model")]
    UnknownReaction { reaction: String },
    /// The objective references a reaction that is not in the model
    #[error("Objective references unknown reaction {reaction}")]
    UnknownObjectiveReaction { reaction: String },
}
