//! Policy-driven construction of run configurations.

use crate::config::{SimulationConfig, MAX_PENDULUMS, MIN_PENDULUMS};
use npend_math::{lerp, DEFAULT_GRAVITY};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// Per-link properties the builder synthesizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Length,
    Mass,
    /// Stored and edited in percent, converted to radians on output.
    Angle,
    AngularVelocity,
}

impl Property {
    /// All four synthesized properties.
    pub const ALL: [Property; 4] = [
        Property::Length,
        Property::Mass,
        Property::Angle,
        Property::AngularVelocity,
    ];

    /// Value given to every link when no policy overrides it.
    pub fn default_value(self) -> f64 {
        match self {
            Property::Length => 1.0,
            Property::Mass => 1.0,
            Property::Angle => 70.0,
            Property::AngularVelocity => 0.0,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// How link lengths are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthPolicy {
    #[default]
    Uniform,
    Random,
    EndIsLonger,
    EndIsShorter,
    Custom,
}

/// How link masses are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MassPolicy {
    #[default]
    Uniform,
    Random,
    EndIsHeavier,
    EndIsLighter,
    Custom,
}

/// How starting angles are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnglePolicy {
    #[default]
    Uniform,
    Random,
    /// Alternating 50 and 100 percent down the chain.
    Staircase,
    /// Winds from 51 to 500 percent along a square-root ramp.
    Spiral,
    Custom,
}

/// How starting angular velocities are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AngularVelocityPolicy {
    #[default]
    Uniform,
    Random,
    Custom,
}

/// Converts an angle in percent to radians. 100 percent is a half turn from
/// hanging straight down.
pub fn angle_from_percent(percent: f64) -> f64 {
    percent * 0.01 * PI
}

/// Interactive builder for [`SimulationConfig`].
///
/// Long lived: callers adjust policies and per-link custom values between
/// runs and ask for a fresh configuration at each reset. Random policies
/// draw fresh values per configuration and cache the draw for inspection.
#[derive(Debug, Clone)]
pub struct SimulationPrototype {
    num_pendulums: usize,
    combined_length: f64,
    gravity: f64,
    normalize_lengths: bool,
    length_policy: LengthPolicy,
    mass_policy: MassPolicy,
    angle_policy: AnglePolicy,
    angular_velocity_policy: AngularVelocityPolicy,
    custom: [Vec<f64>; 4],
    stored_random: [Vec<f64>; 4],
    rng: StdRng,
}

impl SimulationPrototype {
    /// Prototype with two links and every policy uniform.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Prototype with a seeded generator, for reproducible random policies.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut prototype = Self {
            num_pendulums: 0,
            combined_length: 0.5,
            gravity: DEFAULT_GRAVITY,
            normalize_lengths: true,
            length_policy: LengthPolicy::default(),
            mass_policy: MassPolicy::default(),
            angle_policy: AnglePolicy::default(),
            angular_velocity_policy: AngularVelocityPolicy::default(),
            custom: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
            stored_random: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
            rng,
        };
        prototype.set_num_pendulums(2);
        prototype
    }

    pub fn num_pendulums(&self) -> usize {
        self.num_pendulums
    }

    /// Sets the link count, clamped into the supported range. Custom
    /// per-link arrays are resized in place, keeping prior entries and
    /// filling new slots with the property default.
    pub fn set_num_pendulums(&mut self, count: usize) {
        self.num_pendulums = count.clamp(MIN_PENDULUMS, MAX_PENDULUMS);
        for property in Property::ALL {
            self.custom[property.index()].resize(self.num_pendulums, property.default_value());
        }
    }

    pub fn combined_length(&self) -> f64 {
        self.combined_length
    }

    /// Target total chain length used while length normalization is on.
    /// While normalization is off this field instead tracks the sum of the
    /// generated lengths.
    pub fn set_combined_length(&mut self, length: f64) {
        self.combined_length = length;
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    /// Full gravitational acceleration; halved into the configuration.
    pub fn set_gravity(&mut self, gravity: f64) {
        self.gravity = gravity;
    }

    pub fn normalize_lengths(&self) -> bool {
        self.normalize_lengths
    }

    /// When on, generated lengths are rescaled to sum to the combined
    /// length; when off, the combined length follows the generated sum.
    pub fn set_normalize_lengths(&mut self, normalize: bool) {
        self.normalize_lengths = normalize;
    }

    pub fn length_policy(&self) -> LengthPolicy {
        self.length_policy
    }

    pub fn set_length_policy(&mut self, policy: LengthPolicy) {
        self.length_policy = policy;
    }

    pub fn mass_policy(&self) -> MassPolicy {
        self.mass_policy
    }

    pub fn set_mass_policy(&mut self, policy: MassPolicy) {
        self.mass_policy = policy;
    }

    pub fn angle_policy(&self) -> AnglePolicy {
        self.angle_policy
    }

    pub fn set_angle_policy(&mut self, policy: AnglePolicy) {
        self.angle_policy = policy;
    }

    pub fn angular_velocity_policy(&self) -> AngularVelocityPolicy {
        self.angular_velocity_policy
    }

    pub fn set_angular_velocity_policy(&mut self, policy: AngularVelocityPolicy) {
        self.angular_velocity_policy = policy;
    }

    /// Per-link custom values for a property. Angles are in percent.
    pub fn custom_values(&self, property: Property) -> &[f64] {
        &self.custom[property.index()]
    }

    /// Edits one link's custom value. The index must be below the current
    /// link count.
    pub fn set_custom(&mut self, property: Property, index: usize, value: f64) {
        self.custom[property.index()][index] = value;
    }

    /// Restores a property's custom values to the default.
    pub fn reset_custom(&mut self, property: Property) {
        self.custom[property.index()].fill(property.default_value());
    }

    /// The most recent random draw for a property. Empty until the matching
    /// random policy has produced a configuration.
    pub fn stored_random(&self, property: Property) -> &[f64] {
        &self.stored_random[property.index()]
    }

    /// Synthesizes the configuration for the next run.
    ///
    /// Random policies draw fresh values on every call, so consecutive runs
    /// differ; the draw is cached and visible through
    /// [`Self::stored_random`].
    pub fn configuration(&mut self) -> SimulationConfig {
        let lengths = self.generate_lengths();
        let masses = self.generate_masses();
        let initial_angles = self.generate_angles();
        let initial_angular_velocities = self.generate_angular_velocities();
        SimulationConfig {
            num_pendulums: self.num_pendulums,
            gravity_half: self.gravity * 0.5,
            masses,
            lengths,
            initial_angles,
            initial_angular_velocities,
        }
    }

    fn generate_lengths(&mut self) -> Vec<f64> {
        let n = self.num_pendulums;
        let default = Property::Length.default_value();
        let mut lengths = match self.length_policy {
            LengthPolicy::Uniform => {
                if self.normalize_lengths {
                    return vec![self.combined_length / n as f64; n];
                }
                self.combined_length = default * n as f64;
                return vec![default; n];
            }
            LengthPolicy::Random => self.draw_random(Property::Length),
            LengthPolicy::EndIsLonger => interpolated(n, 0.1 * default, 2.0 * default, default),
            LengthPolicy::EndIsShorter => interpolated(n, 2.0 * default, 0.1 * default, default),
            LengthPolicy::Custom => self.custom[Property::Length.index()].clone(),
        };
        if self.normalize_lengths {
            let sum: f64 = lengths.iter().sum();
            if sum > 0.0 {
                let scale = self.combined_length / sum;
                for length in &mut lengths {
                    *length *= scale;
                }
            }
        } else {
            self.combined_length = lengths.iter().sum();
        }
        lengths
    }

    fn generate_masses(&mut self) -> Vec<f64> {
        let n = self.num_pendulums;
        let default = Property::Mass.default_value();
        match self.mass_policy {
            MassPolicy::Uniform => vec![default; n],
            MassPolicy::Random => self.draw_random(Property::Mass),
            MassPolicy::EndIsHeavier => interpolated(n, 0.1 * default, 2.0 * default, default),
            MassPolicy::EndIsLighter => interpolated(n, 2.0 * default, 0.1 * default, default),
            MassPolicy::Custom => self.custom[Property::Mass.index()].clone(),
        }
    }

    fn generate_angles(&mut self) -> Vec<f64> {
        let n = self.num_pendulums;
        let percents = match self.angle_policy {
            AnglePolicy::Uniform => vec![Property::Angle.default_value(); n],
            AnglePolicy::Random => self.draw_random(Property::Angle),
            AnglePolicy::Staircase => (0..n)
                .map(|i| if i % 2 == 0 { 50.0 } else { 100.0 })
                .collect(),
            AnglePolicy::Spiral => {
                if n == 1 {
                    vec![51.0]
                } else {
                    (0..n)
                        .map(|i| lerp(51.0, 500.0, (i as f64 / (n as f64 - 1.0)).sqrt()))
                        .collect()
                }
            }
            AnglePolicy::Custom => self.custom[Property::Angle.index()].clone(),
        };
        percents.into_iter().map(angle_from_percent).collect()
    }

    fn generate_angular_velocities(&mut self) -> Vec<f64> {
        let n = self.num_pendulums;
        match self.angular_velocity_policy {
            AngularVelocityPolicy::Uniform => {
                vec![Property::AngularVelocity.default_value(); n]
            }
            AngularVelocityPolicy::Random => self.draw_random(Property::AngularVelocity),
            AngularVelocityPolicy::Custom => {
                self.custom[Property::AngularVelocity.index()].clone()
            }
        }
    }

    fn draw_random(&mut self, property: Property) -> Vec<f64> {
        let n = self.num_pendulums;
        let values: Vec<f64> = match property {
            Property::Length | Property::Mass => {
                let default = property.default_value();
                (0..n)
                    .map(|_| self.rng.gen_range(0.1 * default..=2.0 * default))
                    .collect()
            }
            Property::Angle => (0..n).map(|_| self.rng.gen_range(0.0..=200.0)).collect(),
            Property::AngularVelocity => {
                (0..n).map(|_| self.rng.gen_range(-5.0..=5.0)).collect()
            }
        };
        self.stored_random[property.index()] = values.clone();
        values
    }
}

impl Default for SimulationPrototype {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear ramp from `start` to `end` across the chain. A single-link chain
/// gets the property default instead.
fn interpolated(n: usize, start: f64, end: f64, single: f64) -> Vec<f64> {
    if n == 1 {
        return vec![single];
    }
    (0..n)
        .map(|i| lerp(start, end, i as f64 / (n as f64 - 1.0)))
        .collect()
}
