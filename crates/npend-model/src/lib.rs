//! Run configuration, state snapshots, and the policy-driven configuration
//! builder for the npend simulation.

mod config;
mod error;
mod prototype;
mod state;

pub use config::{SimulationConfig, MAX_PENDULUMS, MIN_PENDULUMS};
pub use error::{ConfigError, Result};
pub use prototype::{
    angle_from_percent, AnglePolicy, AngularVelocityPolicy, LengthPolicy, MassPolicy, Property,
    SimulationPrototype,
};
pub use state::PendulumState;
