//! Run the simulated headset through the poll loop and print live metrics.
//!
//! Usage: cargo run --example simulate [seconds]
//! Noise and seed come from TRACKCAL_SIM_* environment variables.

use std::sync::Arc;
use std::time::{Duration, Instant};
use trackcal::{
    EngineConfig, MonotonicClock, SimulatedSource, SimulationConfig, Tracker, TrackerConfig,
    TrackingEngine, TrackingEvent,
};

fn main() {
    env_logger::init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let clock = Arc::new(MonotonicClock::new());
    let engine = match TrackingEngine::with_clock(EngineConfig::from_env(), clock.clone()) {
        Ok(e) => e.into_shared(),
        Err(e) => {
            eprintln!("Invalid engine config: {}", e);
            std::process::exit(1);
        }
    };
    let source = match SimulatedSource::new(SimulationConfig::from_env(), clock) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid simulation config: {}", e);
            std::process::exit(1);
        }
    };
    let tracker = match Tracker::start(Box::new(source), engine.clone(), TrackerConfig::from_env()) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to start tracking: {}", e);
            std::process::exit(1);
        }
    };

    println!("Simulating for {}s...", seconds);

    let start = Instant::now();
    let mut last_report = Instant::now();
    let mut out_of_bounds: u64 = 0;

    while start.elapsed() < Duration::from_secs(seconds) {
        match tracker.recv_event_timeout(Duration::from_millis(200)) {
            Ok(TrackingEvent::OutOfBounds { axis, direction, .. }) => {
                out_of_bounds += 1;
                println!("out of bounds: {:?} {:?}", axis, direction);
            }
            Ok(TrackingEvent::Disconnected) => {
                eprintln!("Source disconnected");
                break;
            }
            Ok(_) => {}
            Err(trackcal::TrackcalError::NoSampleAvailable) => {}
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }

        // Report metrics every second
        if last_report.elapsed() >= Duration::from_secs(1) {
            let m = engine
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get_snapshot();
            println!(
                "rate={:6.1} Hz  jitter={:.5} m  drift={:.5} m/s  samples={}",
                m.sample_rate, m.jitter_rms, m.drift_rate, m.sample_count
            );
            last_report = Instant::now();
        }
    }

    let stats = tracker.stats();
    tracker.stop();

    let report = engine
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .generate_report();
    println!();
    print!("{}", report.render_text());
    println!();
    println!(
        "Polls: {} ({:.1} Hz), misses: {}, out-of-bounds events: {}",
        stats.polls, stats.poll_rate, stats.misses, out_of_bounds
    );
}
