//! Frame-by-frame integration with energy correction and step bisection.

use crate::reset::{ResetRequested, ResetToken};
use npend_dynamics::StateEquations;
use npend_math::{DVec, Vec2, FRAME_RATE};
use npend_model::PendulumState;

/// Dormand-Prince stage coefficients. The first stage reuses the
/// derivatives of the step's starting state.
const STAGE_COEFFICIENTS: [&[f64]; 6] = [
    &[],
    &[1.0 / 5.0],
    &[3.0 / 40.0, 9.0 / 40.0],
    &[44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0],
    &[
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
    ],
    &[
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
    ],
];

/// Fifth-order solution weights.
const WEIGHTS: [f64; 6] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
];

/// Embedded fourth-order weights. The seventh entry multiplies the
/// accumulated fifth-order increment in place of a seventh stage.
const ALTERNATE_WEIGHTS: [f64; 7] = [
    5197.0 / 57600.0,
    0.0,
    7571.0 / 16695.0,
    393.0 / 640.0,
    -92097.0 / 339200.0,
    187.0 / 2100.0,
    1.0 / 40.0,
];

/// Bisection beyond this depth abandons the run.
const MAX_RECURSION_LEVEL: u32 = 32;
/// Energy-correction attempts per trial state.
const CORRECTION_ITERATIONS: usize = 6;
/// Consecutive clamped correction multipliers tolerated before bisecting.
const MAX_SATURATED_ITERATIONS: u32 = 3;
/// Clamp bounds for the correction multiplier.
const MULTIPLIER_MIN: f64 = 0.95;
const MULTIPLIER_MAX: f64 = 1.05;

/// Allowed energy drift, as a fraction of the run's reference energy.
const ENERGY_RANGE_FACTOR: f64 = 5e-4;
/// Allowed truncation error per link, as a fraction of the combined length.
const MAX_ERROR_FACTOR: f64 = 1e-4;

/// A step's end state in the stepper's working form, every derived quantity
/// present.
#[derive(Debug, Clone)]
struct Candidate {
    frame_progress: f64,
    angles: DVec,
    momenta: DVec,
    velocities: DVec,
    forces: DVec,
    coords: Vec<Vec2>,
    energy: f64,
}

impl Candidate {
    fn into_state(self) -> PendulumState {
        PendulumState {
            frame_progress: self.frame_progress,
            angles: self.angles,
            angular_velocities: Some(self.velocities),
            momenta: Some(self.momenta),
            coords: Some(self.coords),
            energy: Some(self.energy),
        }
    }
}

/// Advances a chain state one rendered frame at a time.
///
/// Each frame is integrated with an embedded 5th/4th-order Runge-Kutta
/// scheme. A trial step is bisected into two half steps when the embedded
/// solutions' joint coordinates drift apart beyond [`Self::max_error`] or
/// when its energy lands outside the window around the run's reference
/// energy; a trial inside the window is pinned to the reference energy by
/// iteratively rescaling the step around its starting state before it is
/// accepted. Step doubling after a run of fine steps is throttled by a
/// streak-based hysteresis.
#[derive(Debug, Clone)]
pub struct TimeStepper {
    reference_energy: f64,
    /// Absolute energy drift allowed around the reference energy.
    pub energy_range: f64,
    /// Largest tolerated summed joint displacement between the embedded
    /// solutions.
    pub max_error: f64,
    last_recursion_level: u32,
    recursion_level_streak: u32,
    failed: bool,
    reset_token: ResetToken,
}

impl TimeStepper {
    pub fn new(reset_token: ResetToken) -> Self {
        Self {
            reference_energy: 0.0,
            energy_range: 0.0,
            max_error: 0.0,
            last_recursion_level: 0,
            recursion_level_streak: 0,
            failed: false,
            reset_token,
        }
    }

    /// Rearms the stepper for a new run and derives the acceptance
    /// thresholds from the run's first state.
    pub fn reset(&mut self, num_pendulums: usize, combined_length: f64, reference_energy: f64) {
        self.reference_energy = reference_energy;
        self.energy_range = ENERGY_RANGE_FACTOR * reference_energy;
        self.max_error = MAX_ERROR_FACTOR * num_pendulums as f64 * combined_length;
        self.last_recursion_level = 0;
        self.recursion_level_streak = 0;
        self.failed = false;
    }

    /// Energy of the run's first state.
    pub fn reference_energy(&self) -> f64 {
        self.reference_energy
    }

    /// Set once bisection exceeds the depth limit; cleared only by
    /// [`Self::reset`].
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn reset_token(&self) -> &ResetToken {
        &self.reset_token
    }

    /// Advances one frame from `last_state`, returning the culled states in
    /// order of increasing frame progress.
    ///
    /// Returns an empty list when the run has failed (now or previously).
    /// The final returned state has its angles normalized into `[0, 2π)`.
    /// A seed state missing one representation is completed first; one
    /// missing both is treated as at rest.
    pub fn create_frame(
        &mut self,
        equations: &mut StateEquations,
        last_state: &PendulumState,
    ) -> Result<Vec<PendulumState>, ResetRequested> {
        if self.failed {
            return Ok(Vec::new());
        }

        let seed = seed_candidate(equations, last_state);
        let frame_start = seed.frame_progress;
        let mut candidates = vec![seed];
        self.do_time_step(equations, frame_start, frame_start + 1.0, &mut candidates, 0)?;
        if self.failed || candidates.len() == 1 {
            return Ok(Vec::new());
        }

        let produced = candidates.split_off(1);
        let mut states: Vec<PendulumState> = cull(produced, equations.num_pendulums())
            .into_iter()
            .map(Candidate::into_state)
            .collect();
        if let Some(last) = states.last_mut() {
            last.normalize_angles();
        }
        Ok(states)
    }

    /// Covers `[frame_start, frame_end]` by attempting a single step and
    /// bisecting on rejection.
    fn do_time_step(
        &mut self,
        equations: &mut StateEquations,
        frame_start: f64,
        frame_end: f64,
        candidates: &mut Vec<Candidate>,
        recursion_level: u32,
    ) -> Result<(), ResetRequested> {
        if self.failed {
            return Ok(());
        }
        if recursion_level > MAX_RECURSION_LEVEL {
            self.failed = true;
            return Ok(());
        }
        self.reset_token.check()?;

        if self.should_attempt(recursion_level) {
            let accepted = match candidates.last() {
                Some(last) => self.attempt_step(equations, frame_start, frame_end, last)?,
                None => None,
            };
            if let Some(candidate) = accepted {
                self.note_accepted(recursion_level);
                candidates.push(candidate);
                return Ok(());
            }
        }

        let midpoint = 0.5 * (frame_start + frame_end);
        self.do_time_step(equations, frame_start, midpoint, candidates, recursion_level + 1)?;
        self.do_time_step(equations, midpoint, frame_end, candidates, recursion_level + 1)
    }

    /// Step-doubling hysteresis. Finer or same-level steps are always
    /// attempted; a step exactly one level coarser than the last accepted
    /// one is attempted only at scheduled points in the acceptance streak,
    /// and anything coarser than that is bisected outright.
    fn should_attempt(&self, recursion_level: u32) -> bool {
        if recursion_level >= self.last_recursion_level {
            return true;
        }
        if recursion_level + 1 != self.last_recursion_level {
            return false;
        }
        let half_streak = self.recursion_level_streak >> 1;
        match half_streak {
            0..=2 => true,
            3 => false,
            4 => true,
            5..=7 => false,
            _ => half_streak & 7 == 0,
        }
    }

    fn note_accepted(&mut self, recursion_level: u32) {
        if recursion_level == self.last_recursion_level {
            self.recursion_level_streak += 1;
        } else {
            self.last_recursion_level = recursion_level;
            self.recursion_level_streak = 1;
        }
    }

    /// Tries the interval as a single step. `Ok(None)` means the trial was
    /// rejected and the interval must be bisected.
    fn attempt_step(
        &mut self,
        equations: &mut StateEquations,
        frame_start: f64,
        frame_end: f64,
        last: &Candidate,
    ) -> Result<Option<Candidate>, ResetRequested> {
        let (mut trial, error) = self.create_state(equations, frame_start, frame_end, last)?;
        let mut energy_difference = trial.energy - self.reference_energy;
        if error > self.max_error || energy_difference.abs() > self.energy_range {
            return Ok(None);
        }

        // The trial sits inside the energy window. Before accepting it, pin
        // its energy to the run reference: each iteration takes one Newton
        // step on the energy along the step direction, whose slope is
        // Σ ω_j·Δp_j − Σ F_j·Δθ_j, rescales the whole step around its
        // starting state, and re-checks the window.
        let original_delta_angles = &trial.angles - &last.angles;
        let original_delta_momenta = &trial.momenta - &last.momenta;
        let mut multiplier = 1.0;
        let mut saturated_iterations = 0;
        for iteration in 0..CORRECTION_ITERATIONS {
            if iteration != 0 {
                self.reset_token.check()?;
                let (velocities, forces) =
                    equations.solve_velocities_and_forces(&trial.angles, &trial.momenta);
                trial.velocities = velocities;
                trial.forces = forces;
            }

            let mut force_term = 0.0;
            let mut velocity_term = 0.0;
            for j in 0..trial.angles.len() {
                force_term += trial.forces[j] * (trial.angles[j] - last.angles[j]);
                velocity_term += trial.velocities[j] * (trial.momenta[j] - last.momenta[j]);
            }
            multiplier *= 1.0 - energy_difference / (velocity_term - force_term);

            if multiplier < MULTIPLIER_MIN || multiplier > MULTIPLIER_MAX {
                multiplier = multiplier.clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
                saturated_iterations += 1;
                if saturated_iterations >= MAX_SATURATED_ITERATIONS {
                    return Ok(None);
                }
            } else {
                saturated_iterations = 0;
            }

            trial.angles = &last.angles + multiplier * &original_delta_angles;
            trial.momenta = &last.momenta + multiplier * &original_delta_momenta;
            trial.velocities = equations.solve_velocities(&trial.angles, &trial.momenta);
            let (coords, energy) =
                equations.energy_and_coords(&trial.angles, &trial.momenta, &trial.velocities);
            trial.coords = coords;
            trial.energy = energy;
            energy_difference = energy - self.reference_energy;

            if energy_difference.abs() <= self.energy_range {
                // The rescale invalidated the trial's forces; refresh them
                // so the next step's first stage starts from solved values.
                let (velocities, forces) =
                    equations.solve_velocities_and_forces(&trial.angles, &trial.momenta);
                trial.velocities = velocities;
                trial.forces = forces;
                return Ok(Some(trial));
            }
        }
        Ok(None)
    }

    /// Evaluates the embedded Runge-Kutta pair across the interval.
    ///
    /// Returns the fifth-order end state and the error estimate: the summed
    /// per-joint Euclidean distance between the fifth- and fourth-order
    /// solutions' coordinates, which scales with the chain's physical size.
    fn create_state(
        &mut self,
        equations: &mut StateEquations,
        frame_start: f64,
        frame_end: f64,
        last: &Candidate,
    ) -> Result<(Candidate, f64), ResetRequested> {
        let n = last.angles.len();
        let dt = (frame_end - frame_start) / FRAME_RATE;

        let mut stage_velocities: Vec<DVec> = Vec::with_capacity(STAGE_COEFFICIENTS.len());
        let mut stage_forces: Vec<DVec> = Vec::with_capacity(STAGE_COEFFICIENTS.len());
        stage_velocities.push(last.velocities.clone());
        stage_forces.push(last.forces.clone());

        for coefficients in STAGE_COEFFICIENTS.iter().skip(1) {
            self.reset_token.check()?;
            let mut angle_slope = DVec::zeros(n);
            let mut momentum_slope = DVec::zeros(n);
            for (k, &coefficient) in coefficients.iter().enumerate() {
                angle_slope.axpy(coefficient, &stage_velocities[k], 1.0);
                momentum_slope.axpy(coefficient, &stage_forces[k], 1.0);
            }
            let angles = dt * &angle_slope + &last.angles;
            let momenta = dt * &momentum_slope + &last.momenta;
            let (velocities, forces) = equations.solve_velocities_and_forces(&angles, &momenta);
            stage_velocities.push(velocities);
            stage_forces.push(forces);
        }

        let mut increment_angles = DVec::zeros(n);
        let mut increment_momenta = DVec::zeros(n);
        for (k, &weight) in WEIGHTS.iter().enumerate() {
            increment_angles.axpy(weight, &stage_velocities[k], 1.0);
            increment_momenta.axpy(weight, &stage_forces[k], 1.0);
        }
        let mut alternate_angles = DVec::zeros(n);
        let mut alternate_momenta = DVec::zeros(n);
        for (k, &weight) in ALTERNATE_WEIGHTS[..6].iter().enumerate() {
            alternate_angles.axpy(weight, &stage_velocities[k], 1.0);
            alternate_momenta.axpy(weight, &stage_forces[k], 1.0);
        }
        alternate_angles.axpy(ALTERNATE_WEIGHTS[6], &increment_angles, 1.0);
        alternate_momenta.axpy(ALTERNATE_WEIGHTS[6], &increment_momenta, 1.0);

        let angles = dt * &increment_angles + &last.angles;
        let momenta = dt * &increment_momenta + &last.momenta;
        let (velocities, forces) = equations.solve_velocities_and_forces(&angles, &momenta);
        let (coords, energy) = equations.energy_and_coords(&angles, &momenta, &velocities);

        let alternate_end_angles = dt * &alternate_angles + &last.angles;
        let alternate_end_momenta = dt * &alternate_momenta + &last.momenta;
        let alternate_velocities =
            equations.solve_velocities(&alternate_end_angles, &alternate_end_momenta);
        let (alternate_coords, _) = equations.energy_and_coords(
            &alternate_end_angles,
            &alternate_end_momenta,
            &alternate_velocities,
        );

        let error = coords
            .iter()
            .zip(alternate_coords.iter())
            .map(|(a, b)| (a - b).norm())
            .sum();

        let candidate = Candidate {
            frame_progress: frame_end,
            angles,
            momenta,
            velocities,
            forces,
            coords,
            energy,
        };
        Ok((candidate, error))
    }
}

/// Completes the frame's starting state into the working representation,
/// deriving whatever the caller left unfilled.
fn seed_candidate(equations: &mut StateEquations, state: &PendulumState) -> Candidate {
    let angles = state.angles.clone();
    let momenta = match (&state.momenta, &state.angular_velocities) {
        (Some(momenta), _) => momenta.clone(),
        (None, Some(velocities)) => equations.solve_momenta(&angles, velocities),
        (None, None) => DVec::zeros(angles.len()),
    };
    let (velocities, forces) = equations.solve_velocities_and_forces(&angles, &momenta);
    let (coords, energy) = equations.energy_and_coords(&angles, &momenta, &velocities);
    Candidate {
        frame_progress: state.frame_progress,
        angles,
        momenta,
        velocities,
        forces,
        coords,
        energy,
    }
}

/// Caps how many states a frame keeps. Long chains generate many substeps,
/// so the kept snapshots thin out as the chain grows: up to 2^7 per frame
/// for the shortest chains, halving with each doubling of the link count,
/// with no cap at all past 512 links. When no substep lands on the grid,
/// only the frame's final state survives.
fn cull(mut candidates: Vec<Candidate>, num_pendulums: usize) -> Vec<Candidate> {
    if num_pendulums > 512 {
        return candidates;
    }
    let bit_length = usize::BITS - (num_pendulums - 1).leading_zeros();
    let power = (9 - bit_length as i32).min(7);
    let scale = (1u64 << power) as f64;
    let on_grid = |candidate: &Candidate| (candidate.frame_progress * scale).fract() == 0.0;
    if candidates.iter().any(on_grid) {
        candidates.into_iter().filter(on_grid).collect()
    } else {
        candidates.drain(..candidates.len().saturating_sub(1));
        candidates
    }
}
