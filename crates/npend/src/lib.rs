//! npend — Adaptive multi-link pendulum chain simulation.
//!
//! This is the umbrella crate that provides the [`Simulation`] driver and
//! re-exports core types from the sub-crates.

pub mod ballistic;

pub use ballistic::{BallisticPose, FailureTrajectory};
pub use npend_dynamics::{self, StateEquations};
pub use npend_math::{self, DVec, Vec2, DEFAULT_GRAVITY, FRAME_RATE};
pub use npend_model::{
    self, AnglePolicy, AngularVelocityPolicy, ConfigError, LengthPolicy, MassPolicy,
    PendulumState, Property, SimulationConfig, SimulationPrototype,
};
pub use npend_stepper::{self, ResetRequested, ResetToken, TimeStepper};

use thiserror::Error;

/// Why a [`Simulation`] call produced no states.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The supplied configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A reset was requested while the frame was being integrated. The run
    /// resumes once [`Simulation::reset`] or [`Simulation::restart`] runs.
    #[error(transparent)]
    Reset(#[from] ResetRequested),
    /// Step bisection bottomed out. The chain now follows its
    /// [`FailureTrajectory`]; integration resumes only after a reset.
    #[error("time stepping failed; the run needs a reset")]
    IntegrationFailed,
}

/// Main simulation driver.
///
/// Owns the dynamics coefficients, the stepper, and the per-run frame
/// history. Frame 0 holds the run's processed initial state; each
/// [`Simulation::advance_frame`] call appends the group of states covering
/// the next frame. The history is what replay and scrubbing consume, so it
/// is kept until the next reset.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimulationConfig,
    equations: StateEquations,
    stepper: TimeStepper,
    frames: Vec<Vec<PendulumState>>,
    failure_trajectory: Option<FailureTrajectory>,
}

impl Simulation {
    /// Validates `config` and prepares a run positioned at frame 0.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let mut simulation = Self {
            equations: StateEquations::new(&config),
            stepper: TimeStepper::new(ResetToken::new()),
            frames: Vec::new(),
            failure_trajectory: None,
            config,
        };
        simulation.restart();
        Ok(simulation)
    }

    /// Replaces the configuration and restarts from frame 0.
    ///
    /// Solver buffers are reused; they only grow when the new chain is
    /// longer than any previous one.
    pub fn reset(&mut self, config: SimulationConfig) -> Result<(), SimulationError> {
        config.validate()?;
        self.config = config;
        self.equations.set_simulation(&self.config);
        self.restart();
        Ok(())
    }

    /// Restarts the current configuration from frame 0, discarding the
    /// history and clearing any failure. Also clears the reset token, so a
    /// requested reset ends here.
    pub fn restart(&mut self) {
        let mut first_state = self.config.initial_state();
        self.equations.process(&mut first_state, false);
        let reference_energy = first_state.energy.unwrap_or(0.0);
        self.stepper.reset(
            self.config.num_pendulums,
            self.config.combined_length(),
            reference_energy,
        );
        self.stepper.reset_token().clear();
        self.frames = vec![vec![first_state]];
        self.failure_trajectory = None;
    }

    /// Restarts from frame 0 with the chain posed as in `state`, keeping
    /// the configured masses and lengths. This is how a replay resumes from
    /// a scrubbed-to state.
    pub fn restart_from(&mut self, state: &PendulumState) -> Result<(), SimulationError> {
        if state.num_pendulums() != self.config.num_pendulums {
            return Err(ConfigError::PropertyLengthMismatch {
                name: "initial_angles",
                expected: self.config.num_pendulums,
                actual: state.num_pendulums(),
            }
            .into());
        }
        self.config.initial_angles = state.angles.iter().copied().collect();
        self.config.initial_angular_velocities = match &state.angular_velocities {
            Some(velocities) => velocities.iter().copied().collect(),
            None => vec![0.0; self.config.num_pendulums],
        };
        self.restart();
        Ok(())
    }

    /// Integrates the next frame and appends its states to the history.
    ///
    /// On stepper failure the partial frame is discarded, the ballistic
    /// fallback is captured from the last accepted state, and this call and
    /// every later one return [`SimulationError::IntegrationFailed`] until
    /// a reset.
    pub fn advance_frame(&mut self) -> Result<&[PendulumState], SimulationError> {
        if self.stepper.failed() {
            return Err(SimulationError::IntegrationFailed);
        }
        let last_state = self.last_state().clone();
        let states = self.stepper.create_frame(&mut self.equations, &last_state)?;
        if states.is_empty() {
            self.failure_trajectory = Some(FailureTrajectory::new(
                &last_state,
                self.equations.lengths(),
                self.equations.gravity_half(),
            ));
            return Err(SimulationError::IntegrationFailed);
        }
        self.frames.push(states);
        Ok(&self.frames[self.frames.len() - 1])
    }

    /// Advances `n` frames, stopping at the first failure or reset.
    pub fn advance_frames(&mut self, n: usize) -> Result<(), SimulationError> {
        for _ in 0..n {
            self.advance_frame()?;
        }
        Ok(())
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Full per-run history, indexed by frame number.
    pub fn frames(&self) -> &[Vec<PendulumState>] {
        &self.frames
    }

    /// States covering frame `frame`, if it has been integrated.
    pub fn frame(&self, frame: usize) -> Option<&[PendulumState]> {
        self.frames.get(frame).map(Vec::as_slice)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// The newest accepted state. Frame groups are never empty, so this is
    /// always available.
    pub fn last_state(&self) -> &PendulumState {
        let frame = &self.frames[self.frames.len() - 1];
        &frame[frame.len() - 1]
    }

    /// Energy of the run's first state; the conservation window is centered
    /// on it.
    pub fn reference_energy(&self) -> f64 {
        self.stepper.reference_energy()
    }

    pub fn failed(&self) -> bool {
        self.stepper.failed()
    }

    /// Present exactly when the run has failed.
    pub fn failure_trajectory(&self) -> Option<&FailureTrajectory> {
        self.failure_trajectory.as_ref()
    }

    /// Shareable handle that lets another thread abandon the frame being
    /// integrated. The next `reset`/`restart` clears it.
    pub fn reset_token(&self) -> ResetToken {
        self.stepper.reset_token().clone()
    }
}
