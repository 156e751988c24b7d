//! Hit-and-run sampling of the steady-state flux polytope
//!
//! Samples are drawn from {v : S·v = 0, lb <= v <= ub} in net-flux space.
//! Directions are Gaussian combinations of a null-space basis of the
//! stoichiometric matrix restricted to the non-fixed reactions, the starting
//! point comes from a zero-objective LP solve, and the chain discards a fixed
//! warm-up prefix and keeps every `THINNING`-th state afterwards. The RNG is
//! a ChaCha12 stream seeded by the caller, so a given (model, seed) pair
//! always yields the same samples.

use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use rand_distr::StandardNormal;

use crate::metabolic_model::model::Model;
use crate::optimize::flux::{net_flux, FluxError};
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{ClarabelSolver, SolveOptions, Solver};
use crate::optimize::OptimizationStatus;

/// Chain states discarded before recording starts
const WARM_UP: usize = 100;
/// Chain states advanced between recorded samples
const THINNING: usize = 10;
/// Pivots smaller than this are treated as zero when reducing S
const PIVOT_TOLERANCE: f64 = 1e-10;

/// A matrix of sampled flux distributions, one row per sample
#[derive(Debug, Clone)]
pub struct FluxSamples {
    /// Reaction ids labelling the columns
    pub reaction_ids: Vec<String>,
    /// Sampled net fluxes, `samples[k][j]` is the flux of `reaction_ids[j]`
    /// in the k-th sample
    pub samples: Vec<Vec<f64>>,
}

impl FluxSamples {
    /// The column of sampled fluxes for one reaction
    pub fn column(&self, reaction_id: &str) -> Option<Vec<f64>> {
        let j = self.reaction_ids.iter().position(|id| id == reaction_id)?;
        Some(self.samples.iter().map(|row| row[j]).collect())
    }
}

/// Draw `n_samples` flux distributions from the model's feasible polytope
pub fn sample_fluxes(
    model: &Model,
    n_samples: usize,
    seed: u64,
    zero_threshold: f64,
) -> Result<FluxSamples, FluxError> {
    let reaction_ids: Vec<String> = model.reactions.keys().cloned().collect();
    // reactions pinned to a single flux value don't get a sampling dimension
    let free: Vec<usize> = model
        .reactions
        .values()
        .enumerate()
        .filter(|(_, r)| r.lower_bound < r.upper_bound)
        .map(|(j, _)| j)
        .collect();
    let mut fixed_fluxes: Vec<f64> = model
        .reactions
        .values()
        .map(|r| r.lower_bound)
        .collect();
    if free.is_empty() {
        let row = round_row(&fixed_fluxes, zero_threshold);
        return Ok(FluxSamples {
            reaction_ids,
            samples: vec![row; n_samples],
        });
    }

    let start = feasible_point(model)?;
    for (j, flux) in start.iter().enumerate() {
        if model.reactions[j].lower_bound == model.reactions[j].upper_bound {
            fixed_fluxes[j] = *flux;
        }
    }

    // stoichiometric matrix restricted to the free reactions
    let num_mets = model.metabolites.len();
    let mut stoich = DMatrix::<f64>::zeros(num_mets, free.len());
    for (col, &j) in free.iter().enumerate() {
        let reaction = &model.reactions[j];
        for (met_id, coef) in &reaction.metabolites {
            if let Some(row) = model.metabolites.get_index_of(met_id) {
                stoich[(row, col)] += coef;
            }
        }
    }
    let basis = null_space_basis(&stoich, PIVOT_TOLERANCE);

    let lower: Vec<f64> = free.iter().map(|&j| model.reactions[j].lower_bound).collect();
    let upper: Vec<f64> = free.iter().map(|&j| model.reactions[j].upper_bound).collect();
    let mut position: Vec<f64> = free.iter().map(|&j| start[j]).collect();
    for (x, (lo, hi)) in position.iter_mut().zip(lower.iter().zip(&upper)) {
        *x = x.clamp(*lo, *hi);
    }

    let mut rng = ChaCha12Rng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(n_samples);
    let mut recorded = 0;
    let mut step = 0;
    while recorded < n_samples {
        step += 1;
        if basis.ncols() > 0 {
            advance_chain(&mut position, &basis, &lower, &upper, &mut rng);
        }
        if step > WARM_UP && step % THINNING == 0 {
            let mut row = fixed_fluxes.clone();
            for (col, &j) in free.iter().enumerate() {
                row[j] = position[col];
            }
            samples.push(round_row(&row, zero_threshold));
            recorded += 1;
        }
    }
    Ok(FluxSamples {
        reaction_ids,
        samples,
    })
}

/// One hit-and-run step: pick a random null-space direction, find the segment
/// of the line that stays within bounds, and jump to a uniformly random point
/// on it
fn advance_chain(
    position: &mut [f64],
    basis: &DMatrix<f64>,
    lower: &[f64],
    upper: &[f64],
    rng: &mut ChaCha12Rng,
) {
    let weights: Vec<f64> = (0..basis.ncols())
        .map(|_| rng.sample(StandardNormal))
        .collect();
    let mut direction = vec![0.; position.len()];
    for (k, w) in weights.iter().enumerate() {
        for (j, d) in direction.iter_mut().enumerate() {
            *d += w * basis[(j, k)];
        }
    }
    let scale = direction.iter().fold(0., |acc: f64, d| acc.max(d.abs()));
    if scale < 1e-12 {
        return;
    }
    let mut t_low = f64::NEG_INFINITY;
    let mut t_high = f64::INFINITY;
    for ((x, d), (lo, hi)) in position
        .iter()
        .zip(&direction)
        .zip(lower.iter().zip(upper))
    {
        if d.abs() < 1e-12 {
            continue;
        }
        let to_lower = (lo - x) / d;
        let to_upper = (hi - x) / d;
        let (near, far) = if to_lower <= to_upper {
            (to_lower, to_upper)
        } else {
            (to_upper, to_lower)
        };
        t_low = t_low.max(near);
        t_high = t_high.min(far);
    }
    if !t_low.is_finite() || !t_high.is_finite() || t_high - t_low < 1e-12 {
        return;
    }
    let t = rng.gen_range(t_low..t_high);
    for ((x, d), (lo, hi)) in position
        .iter_mut()
        .zip(&direction)
        .zip(lower.iter().zip(upper))
    {
        *x = (*x + t * d).clamp(*lo, *hi);
    }
}

/// A feasible starting point from a zero-objective LP solve
///
/// An interior-point solver with nothing to optimize lands comfortably inside
/// the polytope, which is exactly what a hit-and-run chain wants.
fn feasible_point(model: &Model) -> Result<Vec<f64>, FluxError> {
    let mut working = model.cloned();
    working.clear_objective();
    let problem = Problem::from_model(&working)?;
    let mut solver = ClarabelSolver::new();
    let solution = solver.solve(&problem, &SolveOptions::default())?;
    match solution.status {
        OptimizationStatus::Optimal | OptimizationStatus::AlmostOptimal => {
            let fluxes = working
                .reactions
                .values()
                .map(|r| net_flux(&solution, r).unwrap_or(0.))
                .collect();
            Ok(fluxes)
        }
        OptimizationStatus::SolverHalted => Err(FluxError::Timeout),
        _ => {
            // fall back to the origin when it is inside the bounds
            if working
                .reactions
                .values()
                .all(|r| r.lower_bound <= 0. && r.upper_bound >= 0.)
            {
                Ok(vec![0.; working.reactions.len()])
            } else {
                Err(FluxError::from(
                    crate::optimize::solvers::SolverError::Setup {
                        message: "could not find a feasible starting point for sampling"
                            .to_string(),
                    },
                ))
            }
        }
    }
}

/// Null-space basis of a dense matrix via Gauss-Jordan elimination
///
/// Returns an n x k matrix whose columns span {x : S·x = 0}.
fn null_space_basis(matrix: &DMatrix<f64>, tolerance: f64) -> DMatrix<f64> {
    let (nrows, ncols) = matrix.shape();
    let mut reduced = matrix.clone();
    let mut pivot_cols: Vec<usize> = Vec::new();
    let mut row = 0;
    for col in 0..ncols {
        if row >= nrows {
            break;
        }
        let mut best_row = row;
        let mut best_abs = reduced[(row, col)].abs();
        for r in row + 1..nrows {
            let candidate = reduced[(r, col)].abs();
            if candidate > best_abs {
                best_row = r;
                best_abs = candidate;
            }
        }
        if best_abs <= tolerance {
            continue;
        }
        reduced.swap_rows(row, best_row);
        let pivot = reduced[(row, col)];
        for c in col..ncols {
            reduced[(row, c)] /= pivot;
        }
        for r in 0..nrows {
            if r == row {
                continue;
            }
            let factor = reduced[(r, col)];
            if factor != 0. {
                for c in col..ncols {
                    reduced[(r, c)] -= factor * reduced[(row, c)];
                }
            }
        }
        pivot_cols.push(col);
        row += 1;
    }
    let free_cols: Vec<usize> = (0..ncols).filter(|c| !pivot_cols.contains(c)).collect();
    let mut basis = DMatrix::<f64>::zeros(ncols, free_cols.len());
    for (k, &free_col) in free_cols.iter().enumerate() {
        basis[(free_col, k)] = 1.;
        for (pivot_row, &pivot_col) in pivot_cols.iter().enumerate() {
            basis[(pivot_col, k)] = -reduced[(pivot_row, free_col)];
        }
    }
    basis
}

fn round_row(row: &[f64], zero_threshold: f64) -> Vec<f64> {
    row.iter()
        .map(|v| if v.abs() < zero_threshold { 0. } else { *v })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use crate::metabolic_model::reaction::ReactionBuilder;
    use approx::assert_relative_eq;
    use indexmap::IndexMap;

    fn triangle_loop_model() -> Model {
        let mut model = Model::new_empty();
        for met in ["a", "b", "c"] {
            model.add_metabolite(
                MetaboliteBuilder::default()
                    .id(met.to_string())
                    .build()
                    .unwrap(),
            );
        }
        let reactions = [
            ("r1", ("a", "b")),
            ("r2", ("b", "c")),
            ("r3", ("c", "a")),
        ];
        for (id, (from, to)) in reactions {
            model.add_reaction(
                ReactionBuilder::default()
                    .id(id.to_string())
                    .metabolites(IndexMap::from([
                        (from.to_string(), -1.),
                        (to.to_string(), 1.),
                    ]))
                    .build()
                    .unwrap(),
            );
        }
        model
    }

    #[test]
    fn null_space_of_a_cycle_is_the_uniform_direction() {
        let matrix = DMatrix::from_row_slice(3, 3, &[-1., 0., 1., 1., -1., 0., 0., 1., -1.]);
        let basis = null_space_basis(&matrix, 1e-10);
        assert_eq!(basis.ncols(), 1);
        let (first, second, third) = (basis[(0, 0)], basis[(1, 0)], basis[(2, 0)]);
        assert_relative_eq!(first, second, epsilon = 1e-9);
        assert_relative_eq!(second, third, epsilon = 1e-9);
        assert!(first.abs() > 1e-9);
    }

    #[test]
    fn full_rank_matrix_has_empty_null_space() {
        let matrix = DMatrix::from_row_slice(2, 2, &[1., 0., 0., 1.]);
        let basis = null_space_basis(&matrix, 1e-10);
        assert_eq!(basis.ncols(), 0);
    }

    #[test]
    fn samples_satisfy_mass_balance_and_bounds() {
        let model = triangle_loop_model();
        let samples = sample_fluxes(&model, 50, 7, 1e-8).unwrap();
        assert_eq!(samples.samples.len(), 50);
        for row in &samples.samples {
            // all three reactions of the cycle must carry identical flux
            assert_relative_eq!(row[0], row[1], epsilon = 1e-6);
            assert_relative_eq!(row[1], row[2], epsilon = 1e-6);
            for flux in row {
                assert!((-1000. ..=1000.).contains(flux));
            }
        }
    }

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let model = triangle_loop_model();
        let first = sample_fluxes(&model, 20, 42, 1e-8).unwrap();
        let second = sample_fluxes(&model, 20, 42, 1e-8).unwrap();
        assert_eq!(first.samples, second.samples);
        let third = sample_fluxes(&model, 20, 43, 1e-8).unwrap();
        assert_ne!(first.samples, third.samples);
    }

    #[test]
    fn pinned_reactions_keep_their_flux_in_every_sample() {
        let mut model = triangle_loop_model();
        model.set_bounds("r1", 0., 0.).unwrap();
        model.set_bounds("r2", 0., 0.).unwrap();
        model.set_bounds("r3", 0., 0.).unwrap();
        let samples = sample_fluxes(&model, 5, 1, 1e-8).unwrap();
        for row in &samples.samples {
            assert_eq!(row, &vec![0., 0., 0.]);
        }
    }
}
