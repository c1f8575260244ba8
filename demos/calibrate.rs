//! Walk a simulated headset through the nine-point calibration and print
//! the resulting profile as JSON.
//!
//! Usage: cargo run --example calibrate
//! The simulated tracker is offset and slightly rotated from the true
//! frame, so the fitted transform should undo that error.

use std::sync::Arc;
use trackcal::{
    profile, EngineConfig, ManualClock, PoseSource, SimulatedSource, SimulationConfig,
    TargetLayout, TrackingEngine,
};

const SAMPLES_PER_POINT: usize = 60;
const TICK: f64 = 1.0 / 90.0;

/// Tracker-frame reading of a true position: 2 degrees of yaw plus a few
/// centimetres of offset.
fn distort(p: [f64; 3]) -> [f64; 3] {
    let (s, c) = 2f64.to_radians().sin_cos();
    [
        c * p[0] + s * p[2] + 0.03,
        p[1] - 0.02,
        -s * p[0] + c * p[2] + 0.05,
    ]
}

fn main() {
    env_logger::init();

    let clock = Arc::new(ManualClock::new(0.0));
    let mut engine = match TrackingEngine::with_clock(EngineConfig::default(), clock.clone()) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Invalid engine config: {}", e);
            std::process::exit(1);
        }
    };
    let sim = SimulationConfig::stationary([0.0, 0.0, 1.5], 0.001, 7);
    let mut source = match SimulatedSource::new(sim, clock.clone()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid simulation config: {}", e);
            std::process::exit(1);
        }
    };

    let layout = TargetLayout::nine_point();
    let labels = TargetLayout::nine_point_labels();
    if let Err(e) = engine.begin_calibration(labels.as_slice()) {
        eprintln!("Failed to begin calibration: {}", e);
        std::process::exit(1);
    }

    for label in &labels {
        let Some(target) = layout.get(label) else {
            continue;
        };
        println!("Hold the headset at '{}' {:?}", label, target.position);
        source.hold_at(distort(target.position), [0.0; 3]);

        let mut collected = 0;
        while collected < SAMPLES_PER_POINT {
            clock.advance(TICK);
            match source.try_get_sample() {
                Ok(sample) => {
                    if engine.ingest(sample).is_ok() {
                        collected += 1;
                    }
                }
                Err(e) if e.is_transient() => {}
                Err(e) => {
                    eprintln!("Source error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        match engine.finish_current_point() {
            Ok(offset) => println!(
                "  offset [{:+.4}, {:+.4}, {:+.4}]",
                offset[0], offset[1], offset[2]
            ),
            Err(e) => {
                eprintln!("Failed to finish point: {}", e);
                std::process::exit(1);
            }
        }
    }

    let active = match engine.compute_global_transform() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to compute transform: {}", e);
            std::process::exit(1);
        }
    };
    println!();
    println!("Profile: {}", active.identity());
    println!("Residual RMS: {:.5} m", active.residual_rms());

    let snapshot = engine.get_snapshot();
    if let Some(accuracy) = snapshot.position_accuracy {
        println!("Position accuracy at last point: {:.5} m", accuracy);
    }

    match engine.save_profile().and_then(|record| profile::record_to_json(&record)) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode profile: {}", e),
    }
}
