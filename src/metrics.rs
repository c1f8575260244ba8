//! Tracking quality metrics.
//!
//! All computations are pure functions of a history snapshot. The engine
//! keeps only the last snapshot it produced so repeated reads are free.

use crate::config::{EngineConfig, MetricsWindow};
use crate::geometry::{self, Vec3};
use crate::profile::CalibrationProfile;
use crate::types::{MetricsSnapshot, PoseSample};

/// Computes [`MetricsSnapshot`]s and caches the most recent one.
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    jitter_window: MetricsWindow,
    drift_window: MetricsWindow,
    accuracy_window: MetricsWindow,
    rate_window_s: f64,
    last: Option<MetricsSnapshot>,
}

impl MetricsEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            jitter_window: config.jitter_window,
            drift_window: config.drift_window,
            accuracy_window: config.accuracy_window,
            rate_window_s: config.rate_window_s,
            last: None,
        }
    }

    /// Metrics over `samples` (oldest first) as of time `now`.
    ///
    /// Samples flagged invalid or carrying non-finite values are ignored.
    pub fn compute(
        &self,
        samples: &[PoseSample],
        profile: Option<&CalibrationProfile>,
        now: f64,
    ) -> MetricsSnapshot {
        let valid: Vec<PoseSample> = samples
            .iter()
            .filter(|s| s.valid && s.is_finite())
            .copied()
            .collect();
        if valid.is_empty() {
            return MetricsSnapshot::empty();
        }

        let jitter_set = select_window(&valid, self.jitter_window);
        let drift_set = select_window(&valid, self.drift_window);
        let accuracy_set = select_window(&valid, self.accuracy_window);

        let drift_velocity = drift_velocity(drift_set);
        let (position_accuracy, rotation_accuracy) = match profile {
            Some(profile) => accuracy(accuracy_set, profile),
            None => (None, None),
        };

        let window_start = [jitter_set, drift_set, accuracy_set]
            .iter()
            .filter_map(|set| set.first())
            .map(|s| s.timestamp)
            .fold(f64::INFINITY, f64::min);
        let window_end = valid
            .iter()
            .map(|s| s.timestamp)
            .fold(f64::NEG_INFINITY, f64::max);

        MetricsSnapshot {
            position_accuracy,
            rotation_accuracy,
            jitter_rms: jitter_rms(jitter_set),
            drift_rate: geometry::norm(drift_velocity),
            drift_velocity,
            sample_rate: sample_rate(&valid, now, self.rate_window_s),
            sample_count: valid.len(),
            window_start,
            window_end,
        }
    }

    /// Compute and cache.
    pub fn refresh(
        &mut self,
        samples: &[PoseSample],
        profile: Option<&CalibrationProfile>,
        now: f64,
    ) -> MetricsSnapshot {
        let snapshot = self.compute(samples, profile, now);
        self.last = Some(snapshot.clone());
        snapshot
    }

    /// Last snapshot produced by [`MetricsEngine::refresh`].
    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.last.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.last = None;
    }
}

/// Tail of `samples` covered by `window`.
pub fn select_window(samples: &[PoseSample], window: MetricsWindow) -> &[PoseSample] {
    match window {
        MetricsWindow::All => samples,
        MetricsWindow::Samples(n) => &samples[samples.len().saturating_sub(n)..],
        MetricsWindow::Seconds(span) => {
            let newest = match samples.last() {
                Some(s) => s.timestamp,
                None => return samples,
            };
            let cutoff = newest - span;
            let start = samples
                .iter()
                .rposition(|s| s.timestamp < cutoff)
                .map_or(0, |i| i + 1);
            &samples[start..]
        }
    }
}

/// RMS Euclidean deviation of position from the mean. 0.0 below two samples.
///
/// Deviations are taken relative to the first sample before averaging so a
/// constant stream yields exactly zero.
pub fn jitter_rms(samples: &[PoseSample]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let origin = samples[0].position;
    let deltas: Vec<Vec3> = samples
        .iter()
        .map(|s| geometry::sub(s.position, origin))
        .collect();
    let mean = match geometry::mean(deltas.iter().copied()) {
        Some(m) => m,
        None => return 0.0,
    };
    let sum_sq: f64 = deltas
        .iter()
        .map(|d| {
            let dev = geometry::sub(*d, mean);
            dev[0] * dev[0] + dev[1] * dev[1] + dev[2] * dev[2]
        })
        .sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Per-axis least-squares slope of position against time, meters/second.
/// Zero vector with fewer than two distinct timestamps.
pub fn drift_velocity(samples: &[PoseSample]) -> Vec3 {
    if samples.len() < 2 {
        return geometry::ZERO;
    }
    let n = samples.len() as f64;
    let t_mean = samples.iter().map(|s| s.timestamp).sum::<f64>() / n;
    let p_mean = match geometry::mean(samples.iter().map(|s| s.position)) {
        Some(m) => m,
        None => return geometry::ZERO,
    };

    let mut stt = 0.0;
    let mut stp = geometry::ZERO;
    for s in samples {
        let dt = s.timestamp - t_mean;
        stt += dt * dt;
        let dp = geometry::sub(s.position, p_mean);
        stp = geometry::add(stp, geometry::scale(dp, dt));
    }
    if stt <= f64::EPSILON * n * t_mean.abs().max(1.0) {
        return geometry::ZERO;
    }
    [stp[0] / stt, stp[1] / stt, stp[2] / stt]
}

/// Samples per second in the window `(now - window_s, now]`.
pub fn sample_rate(samples: &[PoseSample], now: f64, window_s: f64) -> f64 {
    if window_s <= 0.0 {
        return 0.0;
    }
    let from = now - window_s;
    let count = samples
        .iter()
        .rev()
        .filter(|s| s.timestamp > from && s.timestamp <= now)
        .count();
    count as f64 / window_s
}

/// Mean corrected-position error and mean rotation error against the nearest
/// calibration target. `(None, None)` for an empty window.
pub fn accuracy(
    samples: &[PoseSample],
    profile: &CalibrationProfile,
) -> (Option<f64>, Option<f64>) {
    let mut position_sum = 0.0;
    let mut position_n = 0usize;
    let mut rotation_sum = 0.0;
    let mut rotation_n = 0usize;

    for s in samples {
        let corrected = profile.correct(s.position);
        let point = match profile.nearest_point(corrected) {
            Some(p) => p,
            None => continue,
        };
        position_sum += geometry::distance(corrected, point.target());
        position_n += 1;

        if let Some(reference) = point.reference_rotation() {
            let err: f64 = (0..3)
                .map(|axis| geometry::wrap_degrees(s.rotation[axis] - reference[axis]).abs())
                .sum::<f64>()
                / 3.0;
            rotation_sum += err;
            rotation_n += 1;
        }
    }

    let mean = |sum: f64, n: usize| (n > 0).then(|| sum / n as f64);
    (mean(position_sum, position_n), mean(rotation_sum, rotation_n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationTarget, Calibrator, TargetLayout};
    use crate::profile::MeanOffsetFitter;

    fn at(position: Vec3, t: f64) -> PoseSample {
        PoseSample::new(position, [0.0; 3], t)
    }

    fn engine() -> MetricsEngine {
        MetricsEngine::new(&EngineConfig::default())
    }

    #[test]
    fn test_constant_stream_has_zero_jitter() {
        let samples: Vec<_> = (0..50).map(|i| at([1.0, 2.0, 3.0], i as f64 * 0.01)).collect();
        assert_eq!(jitter_rms(&samples), 0.0);
        let snap = engine().compute(&samples, None, 0.5);
        assert_eq!(snap.jitter_rms, 0.0);
    }

    #[test]
    fn test_jitter_known_value() {
        // two points 2 cm apart: each 1 cm from the mean
        let samples = vec![at([0.0, 0.0, 1.0], 0.0), at([0.02, 0.0, 1.0], 0.01)];
        assert!((jitter_rms(&samples) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_windows() {
        assert_eq!(jitter_rms(&[]), 0.0);
        assert_eq!(jitter_rms(&[at([1.0, 1.0, 1.0], 0.0)]), 0.0);
        assert_eq!(drift_velocity(&[at([1.0, 1.0, 1.0], 0.0)]), geometry::ZERO);
        // same timestamp twice: no time base for a slope
        let same_t = [at([0.0, 0.0, 1.0], 3.0), at([1.0, 0.0, 1.0], 3.0)];
        assert_eq!(drift_velocity(&same_t), geometry::ZERO);
    }

    #[test]
    fn test_linear_drift_slope() {
        let dir = [1.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0];
        let samples: Vec<_> = (0..20)
            .map(|k| {
                let t = k as f64;
                at(geometry::scale(dir, 0.1 * t), t)
            })
            .collect();
        let snap = engine().compute(&samples, None, 19.0);
        assert!((snap.drift_rate - 0.1).abs() < 1e-9);
        assert!((snap.drift_velocity[0] - 0.1 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_rate_window() {
        let samples: Vec<_> = (0..180).map(|i| at([0.0, 0.0, 1.0], i as f64 / 90.0)).collect();
        let newest = samples.last().unwrap().timestamp;
        let rate = sample_rate(&samples, newest, 1.0);
        assert!((rate - 90.0).abs() <= 1.0);

        // a real gap after the last sample empties the window
        assert_eq!(sample_rate(&samples, newest + 5.0, 1.0), 0.0);
    }

    #[test]
    fn test_select_window() {
        let samples: Vec<_> = (0..10).map(|i| at([0.0; 3], i as f64)).collect();
        assert_eq!(select_window(&samples, MetricsWindow::All).len(), 10);
        assert_eq!(select_window(&samples, MetricsWindow::Samples(3)).len(), 3);
        let recent = select_window(&samples, MetricsWindow::Seconds(2.5));
        assert_eq!(recent.first().unwrap().timestamp, 7.0);
        assert!(select_window(&[], MetricsWindow::Seconds(1.0)).is_empty());
    }

    #[test]
    fn test_invalid_samples_ignored() {
        let mut lost = PoseSample::lost(0.5);
        lost.valid = false;
        let samples = vec![at([1.0, 2.0, 3.0], 0.0), lost, at([1.0, 2.0, 3.0], 1.0)];
        let snap = engine().compute(&samples, None, 1.0);
        assert_eq!(snap.sample_count, 2);
        assert_eq!(snap.jitter_rms, 0.0);
    }

    #[test]
    fn test_accuracy_undefined_without_profile() {
        let samples = vec![at([0.0, 0.0, 1.5], 0.0)];
        let snap = engine().compute(&samples, None, 0.0);
        assert!(snap.position_accuracy.is_none());
        assert!(snap.rotation_accuracy.is_none());
    }

    fn zero_noise_profile() -> std::sync::Arc<CalibrationProfile> {
        let layout = TargetLayout::new([
            CalibrationTarget::new("A", [0.0, 0.0, 1.0]),
            CalibrationTarget::new("B", [1.0, 0.0, 1.0]),
        ]);
        let mut cal = Calibrator::new(layout, Box::new(MeanOffsetFitter));
        cal.begin_calibration(&["A", "B"]).unwrap();
        for _ in 0..3 {
            cal.record_sample_for_current_point(at([0.0, 0.0, 1.0], 0.0))
                .unwrap();
        }
        cal.finish_current_point().unwrap();
        for _ in 0..3 {
            cal.record_sample_for_current_point(at([1.0, 0.0, 1.0], 1.0))
                .unwrap();
        }
        cal.finish_current_point().unwrap();
        cal.compute_global_transform(2.0).unwrap()
    }

    #[test]
    fn test_zero_noise_calibration_keeps_raw_accuracy() {
        let profile = zero_noise_profile();
        let samples = vec![at([0.1, 0.0, 1.0], 0.0), at([0.9, 0.0, 1.0], 0.1)];

        let (calibrated, rot) = accuracy(&samples, &profile);
        let raw_error = (0.1 + 0.1) / 2.0;
        assert!((calibrated.unwrap() - raw_error).abs() < 1e-12);
        assert_eq!(rot, Some(0.0));
    }

    #[test]
    fn test_accuracy_uses_correction() {
        let layout = TargetLayout::new([CalibrationTarget::new("A", [0.0, 0.0, 1.0])]);
        let mut cal = Calibrator::new(layout, Box::new(MeanOffsetFitter));
        cal.begin_calibration(&["A"]).unwrap();
        cal.record_sample_for_current_point(PoseSample::new([0.05, 0.0, 1.0], [10.0, 0.0, 0.0], 0.0))
            .unwrap();
        cal.finish_current_point().unwrap();
        let profile = cal.compute_global_transform(1.0).unwrap();

        // raw reading with the same 5 cm bias maps onto the target
        let samples = vec![PoseSample::new([0.05, 0.0, 1.0], [13.0, 0.0, 0.0], 1.0)];
        let (pos, rot) = accuracy(&samples, &profile);
        assert!(pos.unwrap() < 1e-12);
        assert!((rot.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_refresh_caches() {
        let mut metrics = engine();
        assert!(metrics.latest().is_none());
        let samples = vec![at([0.0, 0.0, 1.0], 0.0)];
        let snap = metrics.refresh(&samples, None, 0.0);
        assert_eq!(metrics.latest(), Some(&snap));
        metrics.invalidate();
        assert!(metrics.latest().is_none());
    }
}
