//! Integration tests for the npend simulation stack.

use approx::assert_relative_eq;
use npend::{
    AnglePolicy, ConfigError, Simulation, SimulationConfig, SimulationError, SimulationPrototype,
    FRAME_RATE,
};
use std::f64::consts::PI;

/// Three equal links adding up to half a meter, swung out far enough to
/// tumble chaotically.
fn chaotic_chain() -> SimulationConfig {
    SimulationConfig::uniform(3, 1.0, 0.5 / 3.0, 2.0, 0.0)
}

#[test]
fn energy_conservation_over_two_seconds() {
    let mut sim = Simulation::new(chaotic_chain()).expect("valid configuration");
    let reference = sim.reference_energy();
    assert!(reference > 0.0);
    let window = 5e-4 * reference;

    for _ in 0..120 {
        let states = sim.advance_frame().expect("healthy run");
        assert!(!states.is_empty());
        for state in states {
            let energy = state.energy.expect("stepper output carries energy");
            assert!(
                (energy - reference).abs() <= window,
                "energy {energy:.9} drifted out of the window around {reference:.9}"
            );
        }
    }
    assert_relative_eq!(sim.last_state().frame_progress, 120.0);
}

#[test]
fn single_pendulum_period_matches_harmonic_motion() {
    // theta'' = -(gravity_half / length) * sin(theta), so at small amplitude
    // the period is 2*pi*sqrt(length / gravity_half).
    let length = 1.0;
    let config = SimulationConfig::uniform(1, 1.0, length, 0.1, 0.0);
    let gravity_half = config.gravity_half;
    let expected_period = 2.0 * PI * (length / gravity_half).sqrt();

    let mut sim = Simulation::new(config).expect("valid configuration");

    // Ten oscillations plus slack.
    let total_frames = (10.5 * expected_period * FRAME_RATE) as usize;
    let mut zero_crossings: Vec<f64> = Vec::new();
    let mut previous_angle = 0.1;
    let mut previous_time = 0.0;

    for _ in 0..total_frames {
        let states = sim.advance_frame().expect("healthy run");
        for state in states {
            // Angles are normalized at frame boundaries; recentre on zero.
            let mut angle = state.angles[0];
            if angle > PI {
                angle -= 2.0 * PI;
            }
            let time = state.frame_progress / FRAME_RATE;
            if previous_angle > 0.0 && angle <= 0.0 {
                let frac = previous_angle / (previous_angle - angle);
                zero_crossings.push(previous_time + frac * (time - previous_time));
            }
            previous_angle = angle;
            previous_time = time;
        }
    }

    assert!(
        zero_crossings.len() >= 10,
        "need at least 10 downward crossings, got {}",
        zero_crossings.len()
    );
    let first = zero_crossings[0];
    let last = zero_crossings[zero_crossings.len() - 1];
    let measured = (last - first) / (zero_crossings.len() - 1) as f64;
    let relative_error = ((measured - expected_period) / expected_period).abs();
    assert!(
        relative_error < 0.01,
        "period error {:.4}% exceeds 1% (measured={measured:.6}, expected={expected_period:.6})",
        relative_error * 100.0,
    );
}

#[test]
fn inverted_chain_stays_at_its_equilibrium() {
    let config = SimulationConfig::uniform(2, 1.0, 0.25, PI, 0.0);
    let mut sim = Simulation::new(config).expect("valid configuration");
    let reference = sim.reference_energy();

    let states = sim.advance_frame().expect("healthy run");
    let last = states.last().expect("frame produced states");
    for i in 0..2 {
        assert_relative_eq!(last.angles[i], PI, epsilon = 1e-9);
        let velocity = last.angular_velocities.as_ref().expect("derived")[i];
        assert!(velocity.abs() < 1e-9, "velocity {velocity} should stay zero");
    }
    assert_relative_eq!(last.energy.expect("derived"), reference, epsilon = 1e-6);
}

#[test]
fn frame_progress_is_strictly_increasing_and_resets_to_zero() {
    let mut sim = Simulation::new(chaotic_chain()).expect("valid configuration");
    sim.advance_frames(3).expect("healthy run");

    let mut previous = -1.0;
    for frame in sim.frames() {
        for state in frame {
            assert!(
                state.frame_progress > previous,
                "frame progress went backwards at {}",
                state.frame_progress
            );
            previous = state.frame_progress;
        }
    }
    assert_eq!(sim.frame_count(), 4);

    sim.reset(SimulationConfig::uniform(2, 1.0, 0.25, 1.0, 0.0))
        .expect("valid configuration");
    assert_eq!(sim.frame_count(), 1);
    assert_eq!(sim.last_state().frame_progress, 0.0);
    assert_eq!(sim.last_state().num_pendulums(), 2);
}

#[test]
fn history_is_indexed_by_frame_number() {
    let mut sim = Simulation::new(chaotic_chain()).expect("valid configuration");
    sim.advance_frames(4).expect("healthy run");

    let initial = sim.frame(0).expect("frame 0 exists");
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].frame_progress, 0.0);

    for frame in 1..=4 {
        let states = sim.frame(frame).expect("integrated frame exists");
        let last = states.last().expect("frame groups are never empty");
        assert_relative_eq!(last.frame_progress, frame as f64);
    }
    assert!(sim.frame(5).is_none());
}

#[test]
fn degenerate_lengths_fail_and_leave_a_ballistic_fallback() {
    // Link lengths this small underflow the coupling products to zero, so
    // the velocity solve degenerates and no step can ever be accepted.
    let config = SimulationConfig::uniform(2, 1.0, 1e-200, 0.3, 0.0);
    let mut sim = Simulation::new(config).expect("validation accepts any positive length");

    let error = sim.advance_frame().expect_err("run must fail");
    assert!(matches!(error, SimulationError::IntegrationFailed));
    assert!(sim.failed());

    // The fallback extrapolates the last accepted state, which is the
    // initial one: at rest, so it falls straight down from capture.
    let trajectory = sim.failure_trajectory().expect("captured on failure");
    assert_eq!(trajectory.capture_progress(), 0.0);
    let poses = trajectory.evaluate(60.0);
    assert_relative_eq!(poses[0].joint.y, -sim.config().gravity_half, epsilon = 1e-12);
    assert_relative_eq!(poses[1].angle, 0.3 + PI);

    // Failed runs keep failing until a reset.
    let error = sim.advance_frame().expect_err("still failed");
    assert!(matches!(error, SimulationError::IntegrationFailed));

    sim.reset(chaotic_chain()).expect("valid configuration");
    assert!(!sim.failed());
    assert!(sim.failure_trajectory().is_none());
    sim.advance_frame().expect("healthy after reset");
}

#[test]
fn requested_reset_interrupts_and_restart_recovers() {
    let mut sim = Simulation::new(chaotic_chain()).expect("valid configuration");
    sim.advance_frames(2).expect("healthy run");

    let token = sim.reset_token();
    token.request();
    let error = sim.advance_frame().expect_err("token aborts the frame");
    assert!(matches!(error, SimulationError::Reset(_)));
    // The aborted frame left no partial output behind.
    assert_eq!(sim.frame_count(), 3);

    sim.restart();
    assert_eq!(sim.frame_count(), 1);
    sim.advance_frame().expect("token cleared by restart");
}

#[test]
fn restart_from_resumes_a_scrubbed_state() {
    let mut sim = Simulation::new(chaotic_chain()).expect("valid configuration");
    sim.advance_frames(10).expect("healthy run");

    let scrubbed = sim.frame(6).expect("frame 6 integrated")[0].clone();
    sim.restart_from(&scrubbed).expect("matching chain");
    assert_eq!(sim.frame_count(), 1);
    let first = sim.last_state();
    assert_eq!(first.frame_progress, 0.0);
    for i in 0..3 {
        assert_relative_eq!(first.angles[i], scrubbed.angles[i]);
    }
    sim.advance_frame().expect("healthy after restart");

    let short = SimulationConfig::uniform(1, 1.0, 0.5, 0.0, 0.0).initial_state();
    let error = sim.restart_from(&short).expect_err("chain size must match");
    assert!(matches!(
        error,
        SimulationError::Config(ConfigError::PropertyLengthMismatch { .. })
    ));
}

#[test]
fn prototype_configurations_drive_the_simulation() {
    let mut prototype = SimulationPrototype::with_seed(17);
    prototype.set_num_pendulums(4);
    prototype.set_angle_policy(AnglePolicy::Random);

    let config = prototype.configuration();
    assert_eq!(config.num_pendulums, 4);
    config.validate().expect("prototype output always validates");

    let mut sim = Simulation::new(config).expect("valid configuration");
    sim.advance_frames(3).expect("healthy run");
    assert_relative_eq!(sim.last_state().frame_progress, 3.0);

    let window = 5e-4 * sim.reference_energy();
    let energy = sim.last_state().energy.expect("derived");
    assert!((energy - sim.reference_energy()).abs() <= window);
}
