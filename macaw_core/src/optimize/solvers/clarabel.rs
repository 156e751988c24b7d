//! Implements a solver interface for Clarabel
use clarabel::algebra::CscMatrix;
use clarabel::solver::SupportedConeT::{NonnegativeConeT, ZeroConeT};
use clarabel::solver::{DefaultSettings, DefaultSolver, IPSolver, SolverStatus, SupportedConeT};
use indexmap::IndexMap;

use crate::optimize::problem::{Constraint, ConstraintTerm, ObjectiveSense, Problem};
use crate::optimize::solvers::{SolveOptions, Solver, SolverError};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Solver backend to interface with Clarabel
///
/// #### Note
/// This interface recreates the Clarabel problem each time solve is called;
/// the goal is ensuring correctness rather than strictly performance (the
/// problem generation is fast, and the usage of sparse matrices keeps the
/// memory impact low). Clarabel only solves minimization problems, so for
/// maximization problems the objective coefficients are negated on the way in
/// and the optimum negated on the way out.
#[derive(Clone, Debug, Default)]
pub struct ClarabelSolver {}

impl ClarabelSolver {
    pub fn new() -> Self {
        ClarabelSolver {}
    }
}

impl Solver for ClarabelSolver {
    fn solve(
        &mut self,
        problem: &Problem,
        options: &SolveOptions,
    ) -> Result<ProblemSolution, SolverError> {
        let num_variables = problem.variables().len();
        if num_variables == 0 {
            return Ok(ProblemSolution {
                status: OptimizationStatus::Optimal,
                objective_value: Some(0.),
                variable_values: Some(IndexMap::new()),
            });
        }
        let sign = match problem.sense() {
            ObjectiveSense::Maximize => -1.,
            ObjectiveSense::Minimize => 1.,
        };
        let mut linear_cost = vec![0.; num_variables];
        for (var_id, coefficient) in problem.objective() {
            let var = problem.variables().get(var_id).ok_or_else(|| {
                SolverError::Setup {
                    message: format!("objective references unknown variable {}", var_id),
                }
            })?;
            linear_cost[var.index] += sign * coefficient;
        }

        let variable_index = |term: &ConstraintTerm| -> Result<usize, SolverError> {
            problem
                .variables()
                .get(&term.variable)
                .map(|v| v.index)
                .ok_or_else(|| SolverError::Setup {
                    message: format!("constraint references unknown variable {}", term.variable),
                })
        };

        // rows for the zero cone (equalities) come first, then the rows for
        // the nonnegative cone (one-sided inequalities and variable bounds)
        let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
        let mut rhs: Vec<f64> = Vec::new();
        let mut row = 0usize;
        for constraint in problem.constraints().values() {
            if let Constraint::Equality { terms, equals } = constraint {
                for term in terms {
                    triplets.push((row, variable_index(term)?, term.coefficient));
                }
                rhs.push(*equals);
                row += 1;
            }
        }
        let num_equalities = row;
        for constraint in problem.constraints().values() {
            if let Constraint::Inequality {
                terms,
                lower_bound,
                upper_bound,
            } = constraint
            {
                if upper_bound.is_finite() {
                    for term in terms {
                        triplets.push((row, variable_index(term)?, term.coefficient));
                    }
                    rhs.push(*upper_bound);
                    row += 1;
                }
                if lower_bound.is_finite() {
                    for term in terms {
                        triplets.push((row, variable_index(term)?, -term.coefficient));
                    }
                    rhs.push(-lower_bound);
                    row += 1;
                }
            }
        }
        for var in problem.variables().values() {
            if var.upper_bound.is_finite() {
                triplets.push((row, var.index, 1.));
                rhs.push(var.upper_bound);
                row += 1;
            }
            if var.lower_bound.is_finite() {
                triplets.push((row, var.index, -1.));
                rhs.push(-var.lower_bound);
                row += 1;
            }
        }
        let num_inequalities = row - num_equalities;

        let constraint_matrix = csc_from_triplets(row, num_variables, triplets);
        let quadratic_cost: CscMatrix<f64> = CscMatrix::zeros((num_variables, num_variables));
        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
        if num_equalities > 0 {
            cones.push(ZeroConeT(num_equalities));
        }
        if num_inequalities > 0 {
            cones.push(NonnegativeConeT(num_inequalities));
        }

        let mut settings = DefaultSettings::default();
        settings.verbose = options.verbose;
        if let Some(limit) = options.time_limit {
            settings.time_limit = limit.max(0.);
        }
        let mut solver = DefaultSolver::new(
            &quadratic_cost,
            &linear_cost,
            &constraint_matrix,
            &rhs,
            &cones,
            settings,
        );
        solver.solve();

        let status = match solver.solution.status {
            SolverStatus::Solved => OptimizationStatus::Optimal,
            SolverStatus::AlmostSolved => OptimizationStatus::AlmostOptimal,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                OptimizationStatus::Infeasible
            }
            // an unbounded primal shows up as an infeasible dual
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                OptimizationStatus::Unbounded
            }
            SolverStatus::MaxIterations | SolverStatus::MaxTime => {
                OptimizationStatus::SolverHalted
            }
            _ => OptimizationStatus::NumericalError,
        };
        let (objective_value, variable_values) = match status {
            OptimizationStatus::Optimal | OptimizationStatus::AlmostOptimal => {
                let values: IndexMap<String, f64> = problem
                    .variables()
                    .iter()
                    .map(|(id, var)| (id.clone(), solver.solution.x[var.index]))
                    .collect();
                (Some(sign * solver.solution.obj_val), Some(values))
            }
            _ => (None, None),
        };
        Ok(ProblemSolution {
            status,
            objective_value,
            variable_values,
        })
    }
}

/// Assemble a compressed sparse column matrix from (row, column, value)
/// triplets, summing duplicate entries
fn csc_from_triplets(
    nrows: usize,
    ncols: usize,
    mut triplets: Vec<(usize, usize, f64)>,
) -> CscMatrix<f64> {
    triplets.sort_by_key(|&(row, col, _)| (col, row));
    let mut merged: Vec<(usize, usize, f64)> = Vec::with_capacity(triplets.len());
    for (row, col, val) in triplets {
        match merged.last_mut() {
            Some((last_row, last_col, last_val)) if *last_row == row && *last_col == col => {
                *last_val += val;
            }
            _ => merged.push((row, col, val)),
        }
    }
    let mut colptr = vec![0usize; ncols + 1];
    for &(_, col, _) in &merged {
        colptr[col + 1] += 1;
    }
    for col in 0..ncols {
        colptr[col + 1] += colptr[col];
    }
    let rowval: Vec<usize> = merged.iter().map(|&(row, _, _)| row).collect();
    let nzval: Vec<f64> = merged.iter().map(|&(_, _, val)| val).collect();
    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn maximize_single_bounded_variable() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);
        problem.add_variable("x", 0., 5.).unwrap();
        problem.set_objective_coefficient("x", 1.).unwrap();
        let mut solver = ClarabelSolver::new();
        let solution = solver.solve(&problem, &SolveOptions::default()).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        assert_relative_eq!(solution.objective_value.unwrap(), 5., epsilon = 1e-6);
        assert_relative_eq!(
            solution.variable_values.unwrap()["x"],
            5.,
            epsilon = 1e-6
        );
    }

    #[test]
    fn equality_constraint_is_respected() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);
        problem.add_variable("x", 0., 10.).unwrap();
        problem.add_variable("y", 0., 10.).unwrap();
        problem
            .add_equality_constraint(
                "tie",
                vec![
                    ConstraintTerm {
                        variable: "x".to_string(),
                        coefficient: 1.,
                    },
                    ConstraintTerm {
                        variable: "y".to_string(),
                        coefficient: -2.,
                    },
                ],
                0.,
            )
            .unwrap();
        problem.set_objective_coefficient("x", 1.).unwrap();
        let mut solver = ClarabelSolver::new();
        let solution = solver.solve(&problem, &SolveOptions::default()).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        // x = 2y, y <= 10 is not binding; x <= 10 is, so x = 10, y = 5
        let values = solution.variable_values.unwrap();
        assert_relative_eq!(values["x"], 10., epsilon = 1e-5);
        assert_relative_eq!(values["y"], 5., epsilon = 1e-5);
    }

    #[test]
    fn contradictory_constraints_are_infeasible() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);
        problem.add_variable("x", 0., 1.).unwrap();
        problem
            .add_equality_constraint(
                "impossible",
                vec![ConstraintTerm {
                    variable: "x".to_string(),
                    coefficient: 1.,
                }],
                2.,
            )
            .unwrap();
        problem.set_objective_coefficient("x", 1.).unwrap();
        let mut solver = ClarabelSolver::new();
        let solution = solver.solve(&problem, &SolveOptions::default()).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Infeasible);
        assert!(solution.objective_value.is_none());
    }

    #[test]
    fn missing_upper_bound_is_unbounded() {
        let mut problem = Problem::new(ObjectiveSense::Maximize);
        problem.add_variable("x", 0., f64::INFINITY).unwrap();
        problem.set_objective_coefficient("x", 1.).unwrap();
        let mut solver = ClarabelSolver::new();
        let solution = solver.solve(&problem, &SolveOptions::default()).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Unbounded);
    }

    #[test]
    fn empty_problem_is_trivially_optimal() {
        let problem = Problem::new(ObjectiveSense::Maximize);
        let mut solver = ClarabelSolver::new();
        let solution = solver.solve(&problem, &SolveOptions::default()).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        assert_eq!(solution.objective_value, Some(0.));
    }

    #[test]
    fn csc_assembly_merges_duplicates() {
        let matrix = csc_from_triplets(2, 2, vec![(0, 0, 1.), (0, 0, 2.), (1, 1, 4.)]);
        assert_eq!(matrix.colptr, vec![0, 1, 2]);
        assert_eq!(matrix.rowval, vec![0, 1]);
        assert_eq!(matrix.nzval, vec![3., 4.]);
    }
}
