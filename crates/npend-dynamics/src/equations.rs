//! Coefficient tables and the dynamics entry points.

use npend_math::{DMat, DVec, Vec2};
use npend_model::{PendulumState, SimulationConfig};

/// Solver buffers are sized for at least this many links, so small chains
/// never reallocate.
pub(crate) const MIN_CAPACITY: usize = 32;

/// Dynamics of an N-link chain of point masses under gravity, in the
/// generalized coordinates (one angle per link) with conjugate momenta.
///
/// The Hamiltonian is `H(θ, p) = ½ pᵀ M(θ)⁻¹ p + V(θ)` with the coupling
/// matrix `M_ij = coupling[i][j]·cos(θ_i − θ_j)`. All coefficient tables are
/// rebuilt wholesale by [`Self::set_simulation`]; the elimination scratch
/// buffers grow by capacity doubling and are never shrunk, so steady-state
/// solves allocate nothing.
#[derive(Debug, Clone)]
pub struct StateEquations {
    pub(crate) num_pendulums: usize,
    pub(crate) gravity_half: f64,
    pub(crate) masses: Vec<f64>,
    pub(crate) lengths: Vec<f64>,
    /// `mass_sums[k]`: total mass hanging from link k, including link k.
    pub(crate) mass_sums: Vec<f64>,
    /// `coupling[(i, j)] = mass_sums[max(i, j)]·lengths[i]·lengths[j]`.
    pub(crate) coupling: DMat,
    /// `-gravity_half·mass_sums[i]·lengths[i]`, the gravity torque scale.
    pub(crate) torque_coefficient: Vec<f64>,
    /// Offset that keeps potential energy non-negative for every
    /// configuration, so energy tolerances stay comparable across runs.
    pub(crate) constant_potential: f64,

    pub(crate) capacity: usize,
    /// Ping-pong value layers, `capacity` rows of `capacity + 1` columns
    /// (the extra column carries the momenta).
    pub(crate) input_values: Vec<f64>,
    pub(crate) output_values: Vec<f64>,
    /// Ping-pong derivative tensors, one value layer per differentiated
    /// angle.
    pub(crate) input_derivatives: Vec<f64>,
    pub(crate) output_derivatives: Vec<f64>,
    /// Pivot-diagonal derivatives snapshotted at the start of each
    /// elimination step.
    pub(crate) transient_partials: Vec<f64>,
}

impl StateEquations {
    pub fn new(config: &SimulationConfig) -> Self {
        let mut equations = Self {
            num_pendulums: 0,
            gravity_half: 0.0,
            masses: Vec::new(),
            lengths: Vec::new(),
            mass_sums: Vec::new(),
            coupling: DMat::zeros(0, 0),
            torque_coefficient: Vec::new(),
            constant_potential: 0.0,
            capacity: 0,
            input_values: Vec::new(),
            output_values: Vec::new(),
            input_derivatives: Vec::new(),
            output_derivatives: Vec::new(),
            transient_partials: Vec::new(),
        };
        equations.set_simulation(config);
        equations
    }

    /// Rebuilds every coefficient table for a new configuration.
    pub fn set_simulation(&mut self, config: &SimulationConfig) {
        let n = config.num_pendulums;
        self.num_pendulums = n;
        self.gravity_half = config.gravity_half;
        self.masses.clear();
        self.masses.extend_from_slice(&config.masses);
        self.lengths.clear();
        self.lengths.extend_from_slice(&config.lengths);
        self.ensure_capacity(n);

        self.mass_sums.clear();
        self.mass_sums.resize(n, 0.0);
        let mut hanging_mass = 0.0;
        for k in (0..n).rev() {
            hanging_mass += config.masses[k];
            self.mass_sums[k] = hanging_mass;
        }

        let mass_sums = &self.mass_sums;
        let lengths = &self.lengths;
        self.coupling = DMat::from_fn(n, n, |i, j| mass_sums[i.max(j)] * lengths[i] * lengths[j]);
        self.torque_coefficient = (0..n)
            .map(|i| -config.gravity_half * mass_sums[i] * lengths[i])
            .collect();

        let mut accumulated_length = 0.0;
        let mut offset = 0.0;
        for i in 0..n {
            accumulated_length += self.lengths[i];
            offset += accumulated_length * self.masses[i];
        }
        self.constant_potential = offset * config.gravity_half;
    }

    pub fn num_pendulums(&self) -> usize {
        self.num_pendulums
    }

    pub fn gravity_half(&self) -> f64 {
        self.gravity_half
    }

    pub fn lengths(&self) -> &[f64] {
        &self.lengths
    }

    pub fn combined_length(&self) -> f64 {
        self.lengths.iter().sum()
    }

    /// Momenta from angular velocities: `p = M(θ)·ω`. A plain product, no
    /// solve; used once per reset to convert the configured initial
    /// velocities.
    pub fn solve_momenta(&self, angles: &DVec, angular_velocities: &DVec) -> DVec {
        let n = self.num_pendulums;
        debug_assert_eq!(angles.len(), n);
        let matrix = DMat::from_fn(n, n, |i, j| {
            self.coupling[(i, j)] * (angles[i] - angles[j]).cos()
        });
        &matrix * angular_velocities
    }

    /// Joint coordinates and total energy for one state.
    ///
    /// Walks the chain once: each joint hangs off the previous one by
    /// `lengths[i]·(sin θ_i, -cos θ_i)`. Potential is accumulated from the
    /// joint heights plus the constant offset; kinetic is `½·Σ p_i·ω_i`.
    pub fn energy_and_coords(
        &self,
        angles: &DVec,
        momenta: &DVec,
        angular_velocities: &DVec,
    ) -> (Vec<Vec2>, f64) {
        let n = self.num_pendulums;
        let mut coords = Vec::with_capacity(n);
        let mut joint = Vec2::new(0.0, 0.0);
        let mut weighted_height = 0.0;
        let mut kinetic = 0.0;
        for i in 0..n {
            let (sin, cos) = angles[i].sin_cos();
            joint += Vec2::new(self.lengths[i] * sin, -(self.lengths[i] * cos));
            coords.push(joint);
            weighted_height += self.masses[i] * joint.y;
            kinetic += momenta[i] * angular_velocities[i];
        }
        let energy = self.gravity_half * weighted_height + self.constant_potential + 0.5 * kinetic;
        (coords, energy)
    }

    /// Completes a state: derives whichever of momenta/angular velocities is
    /// missing, then fills coordinates and energy.
    ///
    /// Returns the generalized forces when `want_forces` is set and the
    /// state carried momenta (the velocity solve and the force computation
    /// share one elimination pass).
    pub fn process(&mut self, state: &mut PendulumState, want_forces: bool) -> Option<DVec> {
        let mut forces = None;
        if state.momenta.is_none() {
            if let Some(velocities) = &state.angular_velocities {
                state.momenta = Some(self.solve_momenta(&state.angles, velocities));
            }
        } else if state.angular_velocities.is_none() {
            if let Some(momenta) = &state.momenta {
                if want_forces {
                    let (velocities, solved) =
                        self.solve_velocities_and_forces(&state.angles, momenta);
                    state.angular_velocities = Some(velocities);
                    forces = Some(solved);
                } else {
                    state.angular_velocities = Some(self.solve_velocities(&state.angles, momenta));
                }
            }
        } else if want_forces {
            if let Some(momenta) = &state.momenta {
                let (velocities, solved) = self.solve_velocities_and_forces(&state.angles, momenta);
                state.angular_velocities = Some(velocities);
                forces = Some(solved);
            }
        }
        if let (Some(momenta), Some(velocities)) = (&state.momenta, &state.angular_velocities) {
            let (coords, energy) = self.energy_and_coords(&state.angles, momenta, velocities);
            state.coords = Some(coords);
            state.energy = Some(energy);
        }
        forces
    }

    pub(crate) fn ensure_capacity(&mut self, n: usize) {
        let required = n.next_power_of_two().max(MIN_CAPACITY);
        if required <= self.capacity {
            return;
        }
        self.capacity = required;
        let row_size = required + 1;
        let layer_size = required * row_size;
        self.input_values = vec![0.0; layer_size];
        self.output_values = vec![0.0; layer_size];
        self.input_derivatives = vec![0.0; required * layer_size];
        self.output_derivatives = vec![0.0; required * layer_size];
        self.transient_partials = vec![0.0; required];
    }
}
