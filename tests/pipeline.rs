//! End-to-end: pose source -> poll loop -> engine -> metrics and calibration.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use trackcal::{
    CalibrationState, CalibrationTarget, ChannelSource, EngineConfig, FittingMethod,
    MonotonicClock, PoseSample, SimulatedSource, SimulationConfig, TargetLayout, Tracker,
    TrackerConfig, TrackingEngine,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

fn fast() -> TrackerConfig {
    TrackerConfig {
        poll_hz: 500.0,
        ..TrackerConfig::default()
    }
}

#[test]
fn test_simulated_stationary_headset() {
    init_logger();
    let clock = Arc::new(MonotonicClock::new());
    let engine = TrackingEngine::with_clock(EngineConfig::default(), clock.clone())
        .unwrap()
        .into_shared();
    let sim = SimulationConfig::stationary([0.1, 0.0, 1.5], 0.0005, 11);
    let source = SimulatedSource::new(sim, clock).unwrap();
    let tracker = Tracker::start(Box::new(source), engine.clone(), fast()).unwrap();

    assert!(wait_for(|| lock(&engine).history_len() >= 100));
    let stats = tracker.stats();
    tracker.stop();

    let snapshot = lock(&engine).get_snapshot();
    assert!(snapshot.sample_count >= 100);
    // 3-axis Gaussian noise of 0.5 mm: RMS around 0.87 mm
    assert!(snapshot.jitter_rms > 0.0);
    assert!(snapshot.jitter_rms < 0.003);
    assert!(snapshot.drift_rate < 0.05);
    assert!(snapshot.position_accuracy.is_none());
    assert!(stats.samples >= 100);

    let report = lock(&engine).generate_report();
    assert_eq!(report.counters.invalid, 0);
    assert!((report.history.mean[0] - 0.1).abs() < 0.001);
}

#[test]
fn test_calibration_through_poll_loop() {
    init_logger();
    let layout = TargetLayout::new([
        CalibrationTarget::new("A", [0.0, 0.0, 1.0]),
        CalibrationTarget::new("B", [1.0, 0.0, 1.0]),
        CalibrationTarget::new("C", [0.0, 1.0, 2.0]),
    ]);
    let config = EngineConfig {
        targets: layout.clone(),
        fitting_method: FittingMethod::Rigid,
        ..EngineConfig::default()
    };
    let engine = TrackingEngine::new(config).unwrap().into_shared();
    let (tx, source) = ChannelSource::bounded(64);
    let tracker = Tracker::start(Box::new(source), engine.clone(), fast()).unwrap();

    lock(&engine).begin_calibration(&["A", "B", "C"]).unwrap();

    // Tracker reads 4 cm too far right for every target.
    let bias = [0.04, 0.0, 0.0];
    let mut t = 0.0;
    for label in ["A", "B", "C"] {
        let target = layout.get(label).unwrap().position;
        let reading = [target[0] + bias[0], target[1] + bias[1], target[2] + bias[2]];
        for _ in 0..10 {
            tx.send(PoseSample::new(reading, [0.0; 3], t)).unwrap();
            t += 0.01;
        }
        assert!(wait_for(
            || lock(&engine).calibration_progress().samples_at_current_point == 10
        ));
        lock(&engine).finish_current_point().unwrap();
    }
    assert_eq!(lock(&engine).calibration_state(), CalibrationState::AllPointsDone);

    // Stopping does not lose calibration progress.
    let source = tracker.stop();
    let profile = lock(&engine).compute_global_transform().unwrap();
    assert!(profile.residual_rms() < 1e-9);
    let corrected = profile.correct([0.54, 0.5, 1.5]);
    assert!((corrected[0] - 0.5).abs() < 1e-9);
    assert!((corrected[1] - 0.5).abs() < 1e-9);
    assert!((corrected[2] - 1.5).abs() < 1e-9);

    // Restart and measure against the new profile.
    let tracker = Tracker::start(source, engine.clone(), fast()).unwrap();
    lock(&engine).reset_history();
    let target_b = layout.get("B").unwrap().position;
    for _ in 0..5 {
        tx.send(PoseSample::new([target_b[0] + 0.04, 0.0, 1.0], [0.0; 3], t))
            .unwrap();
        t += 0.01;
    }
    assert!(wait_for(|| lock(&engine).history_len() == 5));
    tracker.stop();

    let snapshot = lock(&engine).get_snapshot();
    assert!(snapshot.position_accuracy.unwrap() < 1e-9);
    assert_eq!(snapshot.rotation_accuracy, Some(0.0));

    let record = lock(&engine).save_profile().unwrap();
    let restored = trackcal::deserialize_profile(&record).unwrap();
    assert_eq!(restored, *profile);
}
