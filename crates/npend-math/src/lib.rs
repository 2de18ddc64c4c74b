//! Math aliases and constants shared across the npend crates.
//!
//! All numerics run on `f64`. The aliases keep `nalgebra` behind a single
//! import so every crate agrees on storage types.

use nalgebra as na;

/// Dynamically sized column vector.
pub type DVec = na::DVector<f64>;

/// Dynamically sized dense matrix.
pub type DMat = na::DMatrix<f64>;

/// Point or direction in the pendulum plane.
pub type Vec2 = na::Vector2<f64>;

/// Rendered frames per second of simulated time.
pub const FRAME_RATE: f64 = 60.0;

/// Default gravitational acceleration in m/s^2.
pub const DEFAULT_GRAVITY: f64 = 9.8;

/// Remainder of `value / divisor`, shifted into `[0, divisor)` for negative
/// inputs.
#[inline]
pub fn positive_remainder(value: f64, divisor: f64) -> f64 {
    let remainder = value % divisor;
    if remainder < 0.0 {
        remainder + divisor
    } else {
        remainder
    }
}

/// Linear interpolation from `a` to `b` by `t`.
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::TAU;

    #[test]
    fn positive_remainder_wraps_negative_values() {
        assert_relative_eq!(positive_remainder(-0.5, TAU), TAU - 0.5);
        assert_relative_eq!(positive_remainder(TAU + 0.25, TAU), 0.25, epsilon = 1e-12);
        assert_relative_eq!(positive_remainder(0.75, TAU), 0.75);
    }

    #[test]
    fn positive_remainder_of_zero_is_zero() {
        assert_eq!(positive_remainder(0.0, TAU), 0.0);
    }

    #[test]
    fn lerp_hits_endpoints_and_midpoint() {
        assert_relative_eq!(lerp(2.0, 6.0, 0.0), 2.0);
        assert_relative_eq!(lerp(2.0, 6.0, 1.0), 6.0);
        assert_relative_eq!(lerp(2.0, 6.0, 0.5), 4.0);
    }
}
