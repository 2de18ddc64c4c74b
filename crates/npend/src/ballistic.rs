//! Free-flight fallback for failed runs.
//!
//! When the stepper gives up on a chain, the picture should not freeze: the
//! links detach and fly. The trajectory is captured once from the last
//! accepted state and can then be evaluated at any later frame without
//! touching the solver.

use npend_math::{Vec2, FRAME_RATE};
use npend_model::PendulumState;

/// One link's extrapolated placement.
///
/// `joint` is the link's outer end; the rod extends from it along
/// `(sin angle, -cos angle)`, which at capture time points back at the
/// previous joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallisticPose {
    pub joint: Vec2,
    pub angle: f64,
}

/// Ballistic extrapolation of a chain from the moment its run failed.
///
/// Each joint leaves the capture point with the linear velocity the chain
/// was carrying it at, accumulated along the links, and falls freely from
/// there. Each rod keeps spinning at its captured angular velocity.
#[derive(Debug, Clone)]
pub struct FailureTrajectory {
    capture_progress: f64,
    gravity_half: f64,
    angles: Vec<f64>,
    angular_velocities: Vec<f64>,
    coords: Vec<Vec2>,
    linear_velocities: Vec<Vec2>,
}

impl FailureTrajectory {
    /// Captures the trajectory from `state`. A state missing derived fields
    /// is completed kinematically: coordinates follow from the angles and
    /// `lengths`, and missing angular velocities mean the chain was at rest.
    pub fn new(state: &PendulumState, lengths: &[f64], gravity_half: f64) -> Self {
        let num_pendulums = lengths.len();
        let angles: Vec<f64> = state.angles.iter().copied().collect();
        let angular_velocities: Vec<f64> = match &state.angular_velocities {
            Some(velocities) => velocities.iter().copied().collect(),
            None => vec![0.0; num_pendulums],
        };
        let coords = match &state.coords {
            Some(coords) => coords.clone(),
            None => {
                let mut joint = Vec2::new(0.0, 0.0);
                angles
                    .iter()
                    .zip(lengths)
                    .map(|(&angle, &length)| {
                        let (sin, cos) = angle.sin_cos();
                        joint += Vec2::new(length * sin, -length * cos);
                        joint
                    })
                    .collect()
            }
        };

        let mut linear_velocities = Vec::with_capacity(num_pendulums);
        let mut velocity = Vec2::new(0.0, 0.0);
        for i in 0..num_pendulums {
            let (sin, cos) = angles[i].sin_cos();
            velocity += lengths[i] * angular_velocities[i] * Vec2::new(cos, sin);
            linear_velocities.push(velocity);
        }

        Self {
            capture_progress: state.frame_progress,
            gravity_half,
            angles,
            angular_velocities,
            coords,
            linear_velocities,
        }
    }

    /// Frame progress of the captured state.
    pub fn capture_progress(&self) -> f64 {
        self.capture_progress
    }

    /// Extrapolates every link to `frame_progress`, which counts in the
    /// same frames the stepper produced before failing.
    pub fn evaluate(&self, frame_progress: f64) -> Vec<BallisticPose> {
        let time = (frame_progress - self.capture_progress) / FRAME_RATE;
        let fall = -self.gravity_half * time * time;
        (0..self.angles.len())
            .map(|i| BallisticPose {
                joint: self.coords[i]
                    + time * self.linear_velocities[i]
                    + Vec2::new(0.0, fall),
                angle: self.angles[i] + std::f64::consts::PI + self.angular_velocities[i] * time,
            })
            .collect()
    }
}
