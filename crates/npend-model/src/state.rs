//! Snapshots of the chain at one instant of simulated time.

use npend_math::{positive_remainder, DVec, Vec2};
use std::f64::consts::TAU;

/// State of the chain at a point in simulated time.
///
/// `angles` are always present. Exactly one of `momenta` and
/// `angular_velocities` is populated at construction; processing a state
/// through the dynamics derives the missing one and fills `coords` and
/// `energy`. Momenta are the canonical coordinates: they are what the
/// integrator advances.
#[derive(Debug, Clone)]
pub struct PendulumState {
    /// Simulated time in units of rendered frames (60 per second).
    pub frame_progress: f64,
    /// Angle of each link, radians, zero hanging straight down.
    pub angles: DVec,
    /// Angular velocity of each link.
    pub angular_velocities: Option<DVec>,
    /// Generalized momentum conjugate to each angle.
    pub momenta: Option<DVec>,
    /// Cartesian position of each joint in the pendulum plane.
    pub coords: Option<Vec<Vec2>>,
    /// Total energy, kinetic plus offset potential.
    pub energy: Option<f64>,
}

impl PendulumState {
    /// State carrying momenta, the form the integrator produces.
    pub fn from_momenta(frame_progress: f64, angles: DVec, momenta: DVec) -> Self {
        Self {
            frame_progress,
            angles,
            angular_velocities: None,
            momenta: Some(momenta),
            coords: None,
            energy: None,
        }
    }

    /// State carrying angular velocities, the form a configuration
    /// specifies.
    pub fn from_angular_velocities(
        frame_progress: f64,
        angles: DVec,
        angular_velocities: DVec,
    ) -> Self {
        Self {
            frame_progress,
            angles,
            angular_velocities: Some(angular_velocities),
            momenta: None,
            coords: None,
            energy: None,
        }
    }

    /// Number of links in the chain.
    pub fn num_pendulums(&self) -> usize {
        self.angles.len()
    }

    /// Folds every angle into `[0, 2π)`.
    ///
    /// Applied to the last state of a completed frame to bound numerical
    /// growth of winding chains; the physical configuration is unchanged.
    pub fn normalize_angles(&mut self) {
        for angle in self.angles.iter_mut() {
            *angle = positive_remainder(*angle, TAU);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn constructors_populate_exactly_one_representation() {
        let angles = DVec::from_column_slice(&[0.1, 0.2]);

        let from_p = PendulumState::from_momenta(3.0, angles.clone(), DVec::zeros(2));
        assert!(from_p.momenta.is_some());
        assert!(from_p.angular_velocities.is_none());

        let from_v = PendulumState::from_angular_velocities(3.0, angles, DVec::zeros(2));
        assert!(from_v.momenta.is_none());
        assert!(from_v.angular_velocities.is_some());
    }

    #[test]
    fn normalize_angles_wraps_into_one_turn() {
        let angles = DVec::from_column_slice(&[-0.5, TAU + 0.25, 100.0 * TAU + 1.0]);
        let mut state = PendulumState::from_momenta(0.0, angles, DVec::zeros(3));
        state.normalize_angles();

        assert_relative_eq!(state.angles[0], TAU - 0.5);
        assert_relative_eq!(state.angles[1], 0.25, epsilon = 1e-12);
        assert_relative_eq!(state.angles[2], 1.0, epsilon = 1e-9);
        for &angle in state.angles.iter() {
            assert!((0.0..=TAU).contains(&angle));
        }
    }
}
