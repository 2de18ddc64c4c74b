//! Double pendulum — adaptive stepping and energy conservation.

use npend::{Simulation, SimulationConfig, FRAME_RATE};

fn main() {
    // Two half-meter links swung out to 1.5 rad and released.
    let config = SimulationConfig::uniform(2, 1.0, 0.5, 1.5, 0.0);
    let mut sim = Simulation::new(config).expect("valid configuration");

    let e0 = sim.reference_energy();
    println!("Double Pendulum Simulation");
    println!("==========================");
    println!("Initial angles: [1.500, 1.500] rad");
    println!("Reference energy: {e0:.8}\n");

    let total_frames = 600; // ten seconds
    let mut max_drift: f64 = 0.0;
    let mut total_states = 0usize;

    println!("time(s)    th1(rad)   th2(rad)   energy       drift     states");
    println!("----------------------------------------------------------------");

    for frame in 0..total_frames {
        let states = sim.advance_frame().expect("healthy run");
        total_states += states.len();

        let last = states.last().expect("frame produced states");
        let energy = last.energy.expect("stepper output carries energy");
        let drift = ((energy - e0) / e0).abs();
        max_drift = max_drift.max(drift);

        if frame % 60 == 0 {
            println!(
                "{:8.3}   {:+7.4}    {:+7.4}    {:10.8}  {:.2e}  {:5}",
                last.frame_progress / FRAME_RATE,
                last.angles[0],
                last.angles[1],
                energy,
                drift,
                states.len(),
            );
        }
    }

    println!("\n-- Energy Conservation --");
    println!("Reference energy: {e0:.8}");
    println!("Max drift:        {max_drift:.2e}");
    println!("States produced:  {total_states} over {total_frames} frames");

    if max_drift <= 5e-4 {
        println!("PASS: Energy held within the 5e-4 correction window");
    } else {
        println!("FAIL: Energy escaped the correction window!");
    }
}
