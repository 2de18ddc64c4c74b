//! Velocity and force solves over the preallocated elimination arenas.
//!
//! `M(θ)·ω = p` is reduced by Gauss-Jordan elimination on an augmented
//! `[M | p]` layout: `n` rows of `n + 1` columns in a flat buffer, with an
//! input and an output layer swapped at the top of every step. Forces need
//! `∂ω/∂θ` as well, so the force path carries a second pair of buffers
//! holding one derivative layer per angle and pushes each entry's partial
//! derivatives through the same reduction (forward-mode differentiation
//! riding the elimination). Nothing here recurses and nothing allocates per
//! call.

use crate::equations::StateEquations;
use npend_math::DVec;
use std::mem;

impl StateEquations {
    /// Angular velocities from momenta, solving `M(θ)·ω = p`.
    pub fn solve_velocities(&mut self, angles: &DVec, momenta: &DVec) -> DVec {
        let n = self.num_pendulums;
        debug_assert_eq!(angles.len(), n);
        debug_assert_eq!(momenta.len(), n);

        self.assemble(angles, momenta);
        for step in 0..n {
            mem::swap(&mut self.input_values, &mut self.output_values);
            eliminate_step(n, step, &self.input_values, &mut self.output_values);
        }

        let row_size = n + 1;
        DVec::from_fn(n, |j, _| {
            self.output_values[j * row_size + n] / self.output_values[j * row_size + j]
        })
    }

    /// Angular velocities and generalized forces in one elimination pass.
    ///
    /// With the reduced diagonal `d_i`, reduced momentum column `n_i`, and
    /// derivative layers `D_h`, the velocity sensitivities are
    /// `∂ω_i/∂θ_h = D_h[i][n]/d_i − D_h[i][i]·n_i/d_i²` and the force on
    /// angle h is `−½·Σ_i p_i·∂ω_i/∂θ_h` plus the gravity torque
    /// `sin(θ_h)·torque_coefficient[h]`, which together equal `−∂H/∂θ_h`
    /// without ever forming `M⁻¹`.
    pub fn solve_velocities_and_forces(&mut self, angles: &DVec, momenta: &DVec) -> (DVec, DVec) {
        let n = self.num_pendulums;
        debug_assert_eq!(angles.len(), n);
        debug_assert_eq!(momenta.len(), n);

        self.assemble_with_derivatives(angles, momenta);
        for step in 0..n {
            mem::swap(&mut self.input_values, &mut self.output_values);
            mem::swap(&mut self.input_derivatives, &mut self.output_derivatives);
            eliminate_step_with_derivatives(
                n,
                step,
                &self.input_values,
                &mut self.output_values,
                &self.input_derivatives,
                &mut self.output_derivatives,
                &mut self.transient_partials,
            );
        }

        let row_size = n + 1;
        let layer_size = n * row_size;
        let velocities = DVec::from_fn(n, |j, _| {
            self.output_values[j * row_size + n] / self.output_values[j * row_size + j]
        });
        let forces = DVec::from_fn(n, |h, _| {
            let layer = &self.output_derivatives[h * layer_size..(h + 1) * layer_size];
            let mut acceleration = 0.0;
            for i in 0..n {
                let diagonal = self.output_values[i * row_size + i];
                let augmented = self.output_values[i * row_size + n];
                let slope_augmented = layer[i * row_size + n];
                let slope_diagonal = layer[i * row_size + i];
                acceleration += momenta[i]
                    * (slope_augmented / diagonal
                        - slope_diagonal * augmented / (diagonal * diagonal));
            }
            -0.5 * acceleration + angles[h].sin() * self.torque_coefficient[h]
        });
        (velocities, forces)
    }

    /// Fills the output value layer with `[M(θ) | p]`.
    fn assemble(&mut self, angles: &DVec, momenta: &DVec) {
        let n = self.num_pendulums;
        let row_size = n + 1;
        self.output_values[..n * row_size].fill(0.0);
        for i in 0..n {
            self.output_values[i * row_size + i] = self.coupling[(i, i)];
            self.output_values[i * row_size + n] = momenta[i];
            for j in (i + 1)..n {
                let value = self.coupling[(i, j)] * (angles[i] - angles[j]).cos();
                self.output_values[i * row_size + j] = value;
                self.output_values[j * row_size + i] = value;
            }
        }
    }

    /// Fills `[M(θ) | p]` and seeds the derivative tensor in the same pass.
    ///
    /// Off-diagonal entries depend on two angles:
    /// `∂M_ij/∂θ_j = +coupling[i][j]·sin(θ_i − θ_j)` and `∂M_ij/∂θ_i` is its
    /// negation. Diagonal entries and the momentum column are constant in θ.
    fn assemble_with_derivatives(&mut self, angles: &DVec, momenta: &DVec) {
        let n = self.num_pendulums;
        let row_size = n + 1;
        let layer_size = n * row_size;
        self.output_values[..n * row_size].fill(0.0);
        self.output_derivatives[..n * layer_size].fill(0.0);
        for i in 0..n {
            self.output_values[i * row_size + i] = self.coupling[(i, i)];
            self.output_values[i * row_size + n] = momenta[i];
            for j in (i + 1)..n {
                let (sin, cos) = (angles[i] - angles[j]).sin_cos();
                let coupling = self.coupling[(i, j)];
                let value = coupling * cos;
                self.output_values[i * row_size + j] = value;
                self.output_values[j * row_size + i] = value;

                let slope = coupling * sin;
                self.output_derivatives[j * layer_size + i * row_size + j] = slope;
                self.output_derivatives[j * layer_size + j * row_size + i] = slope;
                self.output_derivatives[i * layer_size + i * row_size + j] = -slope;
                self.output_derivatives[i * layer_size + j * row_size + i] = -slope;
            }
        }
    }
}

/// One Gauss-Jordan step over the value layers.
///
/// Row `step` is the pivot row and is carried over unchanged. Every other
/// row j is scaled by `c1 = input[step][step]/input[j][step]` and has the
/// pivot row subtracted, which zeroes its column `step`; only the columns
/// still live after this step (`k > step`, plus the diagonal of rows already
/// reduced) are written, the rest are cleared. Rows whose column `step` has
/// already collapsed below the smallest normal magnitude are copied
/// unchanged, so a degenerate pivot never divides.
fn eliminate_step(n: usize, step: usize, input: &[f64], output: &mut [f64]) {
    let row_size = n + 1;
    for j in 0..n {
        let row = j * row_size;
        if j == step || input[row + step].abs() < f64::MIN_POSITIVE {
            output[row..row + row_size].copy_from_slice(&input[row..row + row_size]);
            continue;
        }
        let c1 = input[step * row_size + step] / input[row + step];
        for k in 0..row_size {
            output[row + k] = if k > step || (j < step && k == j) {
                input[row + k] * c1 - input[step * row_size + k]
            } else {
                0.0
            };
        }
    }
}

/// One Gauss-Jordan step that also advances the derivative tensor.
///
/// Differentiating `output[j][k] = input[j][k]·c1 − input[step][k]` with
/// `c1 = input[step][step]/input[j][step]` gives, per angle layer h,
/// `D'[j][k] = c1·D[j][k] + c2·D[step][step] − c3·D[j][step] − D[step][k]`
/// with `c2 = input[j][k]/input[j][step]` and `c3 = c1·c2`. The pivot
/// diagonal's derivatives are snapshotted into `transient` up front, one per
/// layer.
fn eliminate_step_with_derivatives(
    n: usize,
    step: usize,
    input: &[f64],
    output: &mut [f64],
    input_derivatives: &[f64],
    output_derivatives: &mut [f64],
    transient: &mut [f64],
) {
    let row_size = n + 1;
    let layer_size = n * row_size;
    let pivot_row = step * row_size;
    for h in 0..n {
        transient[h] = input_derivatives[h * layer_size + pivot_row + step];
    }
    for j in 0..n {
        let row = j * row_size;
        if j == step || input[row + step].abs() < f64::MIN_POSITIVE {
            output[row..row + row_size].copy_from_slice(&input[row..row + row_size]);
            for h in 0..n {
                let base = h * layer_size + row;
                output_derivatives[base..base + row_size]
                    .copy_from_slice(&input_derivatives[base..base + row_size]);
            }
            continue;
        }
        let pivot_column = input[row + step];
        let c1 = input[pivot_row + step] / pivot_column;
        for k in 0..row_size {
            if k > step || (j < step && k == j) {
                let cell = input[row + k];
                output[row + k] = cell * c1 - input[pivot_row + k];
                let c2 = cell / pivot_column;
                let c3 = c1 * c2;
                for h in 0..n {
                    let base = h * layer_size;
                    output_derivatives[base + row + k] = c1 * input_derivatives[base + row + k]
                        + c2 * transient[h]
                        - c3 * input_derivatives[base + row + step]
                        - input_derivatives[base + pivot_row + k];
                }
            } else {
                output[row + k] = 0.0;
                for h in 0..n {
                    output_derivatives[h * layer_size + row + k] = 0.0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use npend_math::DMat;
    use npend_model::SimulationConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn random_chain(n: usize, seed: u64) -> (StateEquations, DVec, DVec) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut config = SimulationConfig::uniform(n, 1.0, 1.0, 0.0, 0.0);
        config.masses = (0..n).map(|_| rng.gen_range(0.2..=2.0)).collect();
        config.lengths = (0..n).map(|_| rng.gen_range(0.1..=0.8)).collect();
        let angles = DVec::from_fn(n, |_, _| rng.gen_range(-PI..=PI));
        let momenta = DVec::from_fn(n, |_, _| rng.gen_range(-1.0..=1.0));
        (StateEquations::new(&config), angles, momenta)
    }

    fn coupling_matrix(equations: &StateEquations, angles: &DVec) -> DMat {
        let n = equations.num_pendulums();
        DMat::from_fn(n, n, |i, j| {
            equations.coupling[(i, j)] * (angles[i] - angles[j]).cos()
        })
    }

    #[test]
    fn elimination_agrees_with_lu_decomposition() {
        let (mut equations, angles, momenta) = random_chain(5, 11);
        let velocities = equations.solve_velocities(&angles, &momenta);

        let matrix = coupling_matrix(&equations, &angles);
        let reference = matrix
            .lu()
            .solve(&momenta)
            .expect("coupling matrix is positive definite");
        for i in 0..5 {
            assert_relative_eq!(velocities[i], reference[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn velocities_and_momenta_round_trip() {
        for seed in [1, 2, 3] {
            let (mut equations, angles, momenta) = random_chain(6, seed);
            let velocities = equations.solve_velocities(&angles, &momenta);
            let recovered = equations.solve_momenta(&angles, &velocities);
            for i in 0..6 {
                assert_relative_eq!(recovered[i], momenta[i], max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn force_path_returns_the_same_velocities() {
        let (mut equations, angles, momenta) = random_chain(4, 17);
        let plain = equations.solve_velocities(&angles, &momenta);
        let (with_forces, _) = equations.solve_velocities_and_forces(&angles, &momenta);
        for i in 0..4 {
            assert_relative_eq!(plain[i], with_forces[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn forces_match_the_hamiltonian_gradient() {
        let (mut equations, angles, momenta) = random_chain(4, 23);
        let (_, forces) = equations.solve_velocities_and_forces(&angles, &momenta);

        let mut hamiltonian = |angles: &DVec| -> f64 {
            let velocities = equations.solve_velocities(angles, &momenta);
            let (_, energy) = equations.energy_and_coords(angles, &momenta, &velocities);
            energy
        };

        let epsilon = 1e-6;
        for h in 0..4 {
            let mut plus = angles.clone();
            plus[h] += epsilon;
            let mut minus = angles.clone();
            minus[h] -= epsilon;
            let gradient = (hamiltonian(&plus) - hamiltonian(&minus)) / (2.0 * epsilon);
            assert_relative_eq!(forces[h], -gradient, epsilon = 1e-5, max_relative = 1e-5);
        }
    }

    #[test]
    fn forces_vanish_at_the_hanging_equilibrium() {
        let config = SimulationConfig::uniform(3, 1.0, 0.4, 0.0, 0.0);
        let mut equations = StateEquations::new(&config);
        let angles = DVec::zeros(3);
        let momenta = DVec::zeros(3);
        let (velocities, forces) = equations.solve_velocities_and_forces(&angles, &momenta);
        for i in 0..3 {
            assert_abs_diff_eq!(velocities[i], 0.0);
            assert_abs_diff_eq!(forces[i], 0.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn solves_stay_correct_after_capacity_growth() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut small = SimulationConfig::uniform(3, 1.0, 1.0, 0.0, 0.0);
        small.masses = (0..3).map(|_| rng.gen_range(0.2..=2.0)).collect();
        small.lengths = (0..3).map(|_| rng.gen_range(0.1..=0.8)).collect();
        let angles = DVec::from_fn(3, |_, _| rng.gen_range(-PI..=PI));
        let momenta = DVec::from_fn(3, |_, _| rng.gen_range(-1.0..=1.0));

        let mut equations = StateEquations::new(&small);
        let before = equations.solve_velocities(&angles, &momenta);

        let big = SimulationConfig::uniform(40, 1.0, 0.2, 0.3, 0.0);
        equations.set_simulation(&big);
        let big_angles = DVec::from_fn(40, |i, _| 0.3 + 0.01 * i as f64);
        let big_momenta = DVec::from_fn(40, |i, _| 0.1 * (i as f64 - 20.0) / 20.0);
        let big_velocities = equations.solve_velocities(&big_angles, &big_momenta);
        let reference = coupling_matrix(&equations, &big_angles)
            .lu()
            .solve(&big_momenta)
            .expect("coupling matrix is positive definite");
        for i in 0..40 {
            assert_relative_eq!(
                big_velocities[i],
                reference[i],
                epsilon = 1e-8,
                max_relative = 1e-6
            );
        }

        equations.set_simulation(&small);
        let after = equations.solve_velocities(&angles, &momenta);
        for i in 0..3 {
            assert_relative_eq!(before[i], after[i]);
        }
    }
}
