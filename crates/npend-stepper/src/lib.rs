//! Adaptive frame stepping for pendulum chains.
//!
//! [`TimeStepper`] turns a starting [`npend_model::PendulumState`] into the
//! batch of states covering the next rendered frame, bisecting the step
//! where the embedded error estimate or the energy window demands it. A
//! [`ResetToken`] lets another thread abandon a frame mid-flight when the
//! configuration changes out from under the integrator.

mod reset;
mod stepper;

pub use reset::{ResetRequested, ResetToken};
pub use stepper::TimeStepper;
