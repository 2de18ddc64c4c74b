//! Generalized-coordinate dynamics for an N-link planar pendulum chain.
//!
//! [`StateEquations`] converts between the momentum and angular-velocity
//! representations of a [`npend_model::PendulumState`], computes generalized
//! forces by differentiating through its own linear solve, and evaluates
//! joint coordinates and total energy.

mod elimination;
mod equations;

pub use equations::StateEquations;
