//! Provides struct representing an optimization problem
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::Reaction;
use indexmap::IndexMap;
use thiserror::Error;

/// A linear optimization problem over the fluxes of a metabolic model
///
/// Every reaction is represented by a non-negative forward and a non-negative
/// reverse variable so that the sum of the two is usable as |flux| in linear
/// constraints; the net flux of a reaction is forward - reverse. Mass balance
/// contributes one equality constraint per metabolite.
#[derive(Debug, Clone)]
pub struct Problem {
    /// Variables of the optimization problem
    variables: IndexMap<String, Variable>,
    /// Constraints of the optimization problem
    constraints: IndexMap<String, Constraint>,
    /// Linear objective coefficients, keyed by variable id
    objective: IndexMap<String, f64>,
    /// Whether the objective is maximized or minimized
    sense: ObjectiveSense,
}

/// A variable in an optimization problem
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Index of the variable's column in the solver matrices
    pub index: usize,
}

/// Represents a linear constraint in an optimization problem
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Represents an equality constraint, where `terms` = `equals`
    Equality {
        terms: Vec<ConstraintTerm>,
        equals: f64,
    },
    /// Represents an inequality constraint, `lower_bound` <= `terms` <= `upper_bound`
    Inequality {
        terms: Vec<ConstraintTerm>,
        lower_bound: f64,
        upper_bound: f64,
    },
}

/// Represents a single term in a constraint, specifically the multiplication
/// of the variable by the coefficient
#[derive(Debug, Clone)]
pub struct ConstraintTerm {
    pub variable: String,
    pub coefficient: f64,
}

/// Whether the objective is maximized or minimized
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ObjectiveSense {
    Maximize,
    Minimize,
}

impl Problem {
    /// Create a new, empty problem
    pub fn new(sense: ObjectiveSense) -> Self {
        Problem {
            variables: IndexMap::new(),
            constraints: IndexMap::new(),
            objective: IndexMap::new(),
            sense,
        }
    }

    /// Build the flux polytope of a model: split variables for every reaction
    /// plus one mass-balance equality per metabolite
    ///
    /// The model's objective coefficients (if any) are translated into net
    /// flux terms on the corresponding variable pairs.
    pub fn from_model(model: &Model) -> Result<Self, ProblemError> {
        let mut problem = Problem::new(ObjectiveSense::Maximize);
        for reaction in model.reactions.values() {
            problem.add_variable(
                &reaction.get_forward_id(),
                reaction.get_forward_lower_bound(),
                reaction.get_forward_upper_bound(),
            )?;
            problem.add_variable(
                &reaction.get_reverse_id(),
                reaction.get_reverse_lower_bound(),
                reaction.get_reverse_upper_bound(),
            )?;
        }
        // one steady-state constraint per metabolite
        let mut balance: IndexMap<&str, Vec<ConstraintTerm>> = model
            .metabolites
            .keys()
            .map(|m| (m.as_str(), Vec::new()))
            .collect();
        for reaction in model.reactions.values() {
            for (met_id, coef) in &reaction.metabolites {
                if *coef == 0. {
                    continue;
                }
                let terms = balance.entry(met_id.as_str()).or_default();
                terms.push(ConstraintTerm {
                    variable: reaction.get_forward_id(),
                    coefficient: *coef,
                });
                terms.push(ConstraintTerm {
                    variable: reaction.get_reverse_id(),
                    coefficient: -coef,
                });
            }
        }
        for (met_id, terms) in balance {
            if terms.is_empty() {
                continue;
            }
            problem.add_equality_constraint(&format!("{}_mass_balance", met_id), terms, 0.)?;
        }
        for (rxn_id, coefficient) in &model.objective {
            let reaction = model
                .reactions
                .get(rxn_id)
                .ok_or_else(|| ProblemError::NonExistentVariable)?;
            problem.set_objective_coefficient(&reaction.get_forward_id(), *coefficient)?;
            problem.set_objective_coefficient(&reaction.get_reverse_id(), -coefficient)?;
        }
        Ok(problem)
    }

    /// Add a variable to the optimization problem
    pub fn add_variable(
        &mut self,
        id: &str,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        if self.variables.contains_key(id) {
            return Err(ProblemError::VariableIdAlreadyExists);
        }
        if lower_bound > upper_bound {
            return Err(ProblemError::InvalidVariableBounds);
        }
        let index = self.variables.len();
        self.variables.insert(
            id.to_string(),
            Variable {
                id: id.to_string(),
                lower_bound,
                upper_bound,
                index,
            },
        );
        Ok(())
    }

    /// Update the bounds of a variable
    pub fn update_variable_bounds(
        &mut self,
        id: &str,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        if lower_bound > upper_bound {
            return Err(ProblemError::InvalidVariableBounds);
        }
        match self.variables.get_mut(id) {
            Some(var) => {
                var.lower_bound = lower_bound;
                var.upper_bound = upper_bound;
                Ok(())
            }
            None => Err(ProblemError::NonExistentVariable),
        }
    }

    /// Add an equality constraint to the problem
    pub fn add_equality_constraint(
        &mut self,
        id: &str,
        terms: Vec<ConstraintTerm>,
        equals: f64,
    ) -> Result<(), ProblemError> {
        self.validate_constraint(id, &terms)?;
        self.constraints
            .insert(id.to_string(), Constraint::Equality { terms, equals });
        Ok(())
    }

    /// Add an inequality constraint to the problem
    pub fn add_inequality_constraint(
        &mut self,
        id: &str,
        terms: Vec<ConstraintTerm>,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Result<(), ProblemError> {
        if lower_bound > upper_bound {
            return Err(ProblemError::InvalidConstraintBounds);
        }
        self.validate_constraint(id, &terms)?;
        self.constraints.insert(
            id.to_string(),
            Constraint::Inequality {
                terms,
                lower_bound,
                upper_bound,
            },
        );
        Ok(())
    }

    /// Set the objective coefficient of a single variable
    pub fn set_objective_coefficient(
        &mut self,
        variable_id: &str,
        coefficient: f64,
    ) -> Result<(), ProblemError> {
        if !self.variables.contains_key(variable_id) {
            return Err(ProblemError::NonExistentVariablesInObjective);
        }
        self.objective.insert(variable_id.to_string(), coefficient);
        Ok(())
    }

    /// Replace the objective with the net flux of a single reaction
    ///
    /// Combined with the objective sense this is what the flux primitives use
    /// to maximize +v_r and -v_r.
    pub fn set_net_flux_objective(
        &mut self,
        reaction: &Reaction,
        sense: ObjectiveSense,
    ) -> Result<(), ProblemError> {
        self.objective.clear();
        self.set_objective_coefficient(&reaction.get_forward_id(), 1.)?;
        self.set_objective_coefficient(&reaction.get_reverse_id(), -1.)?;
        self.sense = sense;
        Ok(())
    }

    /// Remove all terms from the objective
    pub fn clear_objective(&mut self) {
        self.objective.clear();
    }

    /// Update the objective sense of the problem
    pub fn update_objective_sense(&mut self, sense: ObjectiveSense) {
        self.sense = sense;
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    pub fn variables(&self) -> &IndexMap<String, Variable> {
        &self.variables
    }

    pub fn constraints(&self) -> &IndexMap<String, Constraint> {
        &self.constraints
    }

    pub fn objective(&self) -> &IndexMap<String, f64> {
        &self.objective
    }

    /// Check that a constraint to be added is valid to add to this Problem
    fn validate_constraint(
        &self,
        id: &str,
        terms: &[ConstraintTerm],
    ) -> Result<(), ProblemError> {
        if self.constraints.contains_key(id) {
            return Err(ProblemError::ConstraintAlreadyExists);
        }
        for term in terms {
            if !self.variables.contains_key(&term.variable) {
                return Err(ProblemError::NonExistentVariablesInConstraint);
            }
        }
        Ok(())
    }
}

/// Errors associated with the Problem
#[derive(Error, Debug, Clone)]
pub enum ProblemError {
    /// Error when trying to add a variable with the same id as an existing variable
    #[error("Tried to add a variable with the same id as an existing variable")]
    VariableIdAlreadyExists,
    /// Error when trying to add variable with invalid bounds
    #[error("Tried to add a variable with lower_bound>upper_bound")]
    InvalidVariableBounds,
    /// Error when trying to add a constraint with the same id as an existing constraint
    #[error("Tried to add a constraint with the same id as an existing constraint")]
    ConstraintAlreadyExists,
    /// Error when trying to add a constraint with invalid bounds
    #[error("Tried to add an inequality constraint with lower_bound > upper_bound")]
    InvalidConstraintBounds,
    /// Error when trying to add a constraint that contains variables not in the model
    #[error("Tried to add a constraint with variables not in the model")]
    NonExistentVariablesInConstraint,
    /// Error when trying to add an objective term which includes variables not in the model
    #[error("Tried adding an objective term with variables not in the model")]
    NonExistentVariablesInObjective,
    /// Error when trying to perform an update on a variable that doesn't exist
    #[error("Tried to access a variable that doesn't exist")]
    NonExistentVariable,
}
