//! Configuration validation errors.

use thiserror::Error;

/// Reasons a [`crate::SimulationConfig`] is rejected before a run starts.
///
/// A coupling matrix assembled from positive masses and lengths is positive
/// definite, so rejecting these cases here keeps the velocity solver free of
/// genuine singularities.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("pendulum count {0} outside [{min}, {max}]", min = crate::MIN_PENDULUMS, max = crate::MAX_PENDULUMS)]
    PendulumCountOutOfRange(usize),

    #[error("mass {value} at index {index} must be positive and finite")]
    NonPositiveMass { index: usize, value: f64 },

    #[error("length {value} at index {index} must be positive and finite")]
    NonPositiveLength { index: usize, value: f64 },

    #[error("{name} has {actual} elements, expected {expected}")]
    PropertyLengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
