//! Immutable run configuration.

use crate::error::{ConfigError, Result};
use crate::state::PendulumState;
use npend_math::DVec;

/// Smallest supported chain.
pub const MIN_PENDULUMS: usize = 1;
/// Largest supported chain.
pub const MAX_PENDULUMS: usize = 1024;

/// Complete description of one simulation run.
///
/// Produced by [`crate::SimulationPrototype`] or assembled directly. A
/// configuration is validated once when a run starts and never mutated
/// afterward; changing anything means a reset with a new configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Number of links in the chain.
    pub num_pendulums: usize,
    /// Half the gravitational acceleration. The dynamics are written in
    /// terms of this constant, so it is baked once here.
    pub gravity_half: f64,
    /// Mass of each link's point mass.
    pub masses: Vec<f64>,
    /// Length of each rigid link.
    pub lengths: Vec<f64>,
    /// Starting angle of each link, radians, zero hanging straight down and
    /// growing counterclockwise.
    pub initial_angles: Vec<f64>,
    /// Starting angular velocity of each link, radians per second.
    pub initial_angular_velocities: Vec<f64>,
}

impl SimulationConfig {
    /// Configuration with every link sharing the same mass, length, angle,
    /// and angular velocity.
    pub fn uniform(
        num_pendulums: usize,
        mass: f64,
        length: f64,
        angle: f64,
        angular_velocity: f64,
    ) -> Self {
        Self {
            num_pendulums,
            gravity_half: npend_math::DEFAULT_GRAVITY * 0.5,
            masses: vec![mass; num_pendulums],
            lengths: vec![length; num_pendulums],
            initial_angles: vec![angle; num_pendulums],
            initial_angular_velocities: vec![angular_velocity; num_pendulums],
        }
    }

    /// Checks the invariants the solver depends on.
    ///
    /// Positive masses and lengths keep the coupling matrix positive
    /// definite, which is what makes the velocity solve well posed.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PENDULUMS..=MAX_PENDULUMS).contains(&self.num_pendulums) {
            return Err(ConfigError::PendulumCountOutOfRange(self.num_pendulums));
        }
        self.check_len("masses", self.masses.len())?;
        self.check_len("lengths", self.lengths.len())?;
        self.check_len("initial_angles", self.initial_angles.len())?;
        self.check_len(
            "initial_angular_velocities",
            self.initial_angular_velocities.len(),
        )?;
        for (index, &value) in self.masses.iter().enumerate() {
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::NonPositiveMass { index, value });
            }
        }
        for (index, &value) in self.lengths.iter().enumerate() {
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::NonPositiveLength { index, value });
            }
        }
        Ok(())
    }

    /// Sum of all link lengths.
    pub fn combined_length(&self) -> f64 {
        self.lengths.iter().sum()
    }

    /// The state a run starts from, at frame progress zero.
    pub fn initial_state(&self) -> PendulumState {
        PendulumState::from_angular_velocities(
            0.0,
            DVec::from_column_slice(&self.initial_angles),
            DVec::from_column_slice(&self.initial_angular_velocities),
        )
    }

    fn check_len(&self, name: &'static str, actual: usize) -> Result<()> {
        if actual != self.num_pendulums {
            return Err(ConfigError::PropertyLengthMismatch {
                name,
                expected: self.num_pendulums,
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_fills_every_property() {
        let config = SimulationConfig::uniform(3, 2.0, 0.5, 1.0, -0.25);
        assert_eq!(config.num_pendulums, 3);
        assert_eq!(config.masses, vec![2.0; 3]);
        assert_eq!(config.lengths, vec![0.5; 3]);
        assert_eq!(config.initial_angles, vec![1.0; 3]);
        assert_eq!(config.initial_angular_velocities, vec![-0.25; 3]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn combined_length_sums_links() {
        let mut config = SimulationConfig::uniform(3, 1.0, 0.25, 0.0, 0.0);
        config.lengths = vec![0.25, 0.5, 0.75];
        assert_eq!(config.combined_length(), 1.5);
    }

    #[test]
    fn validate_rejects_count_out_of_range() {
        let config = SimulationConfig::uniform(0, 1.0, 1.0, 0.0, 0.0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::PendulumCountOutOfRange(0))
        );
    }

    #[test]
    fn validate_rejects_non_positive_properties() {
        let mut config = SimulationConfig::uniform(2, 1.0, 1.0, 0.0, 0.0);
        config.masses[1] = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveMass {
                index: 1,
                value: 0.0
            })
        );

        let mut config = SimulationConfig::uniform(2, 1.0, 1.0, 0.0, 0.0);
        config.lengths[0] = -0.5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveLength {
                index: 0,
                value: -0.5
            })
        );

        let mut config = SimulationConfig::uniform(2, 1.0, 1.0, 0.0, 0.0);
        config.masses[0] = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveMass { index: 0, .. })
        ));
    }

    #[test]
    fn validate_rejects_mismatched_arrays() {
        let mut config = SimulationConfig::uniform(2, 1.0, 1.0, 0.0, 0.0);
        config.initial_angles.pop();
        assert_eq!(
            config.validate(),
            Err(ConfigError::PropertyLengthMismatch {
                name: "initial_angles",
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn initial_state_carries_velocities_not_momenta() {
        let config = SimulationConfig::uniform(2, 1.0, 1.0, 0.5, 1.5);
        let state = config.initial_state();
        assert_eq!(state.frame_progress, 0.0);
        assert_eq!(state.angles.len(), 2);
        assert!(state.momenta.is_none());
        assert!(state.angular_velocities.is_some());
        assert!(state.energy.is_none());
    }
}
