//! Exportable tracking report.
//!
//! A report is built from an explicit `generated_at` timestamp and values
//! already captured by the engine, so rendering the same report twice gives
//! identical bytes.

use crate::engine::IngestCounters;
use crate::geometry::{self, Vec3};
use crate::profile::{self, CalibrationProfile, FittingMethod};
use crate::types::{MetricsSnapshot, PoseSample, TrackingBounds};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the profile a report was computed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub identity: String,
    pub fitting_method: FittingMethod,
    pub created_at: f64,
    pub residual_rms: f64,
    pub point_count: usize,
}

impl ProfileSummary {
    pub fn from_profile(profile: &CalibrationProfile) -> Self {
        Self {
            identity: profile.identity(),
            fitting_method: profile.fitting_method(),
            created_at: profile.created_at(),
            residual_rms: profile.residual_rms(),
            point_count: profile.points().len(),
        }
    }
}

/// Per-axis position statistics over the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub count: usize,
    pub mean: [f64; 3],
    pub min: [f64; 3],
    pub max: [f64; 3],
    /// Population standard deviation per axis.
    pub std: [f64; 3],
}

impl HistoryStats {
    /// Statistics over valid, finite samples only. All zeros when there are none.
    pub fn from_samples(samples: &[PoseSample]) -> Self {
        let positions: Vec<Vec3> = samples
            .iter()
            .filter(|s| s.valid && s.is_finite())
            .map(|s| s.position)
            .collect();
        let mean = match geometry::mean(positions.iter().copied()) {
            Some(m) => m,
            None => {
                return Self {
                    count: 0,
                    mean: geometry::ZERO,
                    min: geometry::ZERO,
                    max: geometry::ZERO,
                    std: geometry::ZERO,
                }
            }
        };

        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        let mut var = geometry::ZERO;
        for p in &positions {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
                let d = p[axis] - mean[axis];
                var[axis] += d * d;
            }
        }
        let n = positions.len() as f64;
        Self {
            count: positions.len(),
            mean,
            min,
            max,
            std: [
                (var[0] / n).sqrt(),
                (var[1] / n).sqrt(),
                (var[2] / n).sqrt(),
            ],
        }
    }

    pub fn range(&self) -> [f64; 3] {
        geometry::sub(self.max, self.min)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingReport {
    pub generated_at: f64,
    pub metrics: MetricsSnapshot,
    pub bounds: TrackingBounds,
    pub profile: Option<ProfileSummary>,
    pub history: HistoryStats,
    pub counters: IngestCounters,
}

impl TrackingReport {
    pub fn to_json(&self) -> Result<String> {
        profile::encode_pretty(self, "report")
    }

    /// Plain-text rendering. Fixed precision, no locale or clock input.
    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TrackingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        writeln!(f, "TRACKING REPORT")?;
        writeln!(f, "generated_at: {:.6}", self.generated_at)?;
        writeln!(f)?;

        writeln!(f, "[calibration]")?;
        match &self.profile {
            Some(p) => {
                writeln!(f, "profile: {}", p.identity)?;
                writeln!(f, "method: {}", p.fitting_method.as_str())?;
                writeln!(f, "points: {}", p.point_count)?;
                writeln!(f, "residual_rms_m: {:.6}", p.residual_rms)?;
            }
            None => writeln!(f, "profile: none")?,
        }
        writeln!(f)?;

        writeln!(f, "[metrics]")?;
        writeln!(f, "samples: {}", m.sample_count)?;
        writeln!(f, "window: {:.6} .. {:.6}", m.window_start, m.window_end)?;
        writeln!(f, "sample_rate_hz: {:.6}", m.sample_rate)?;
        writeln!(f, "jitter_rms_m: {:.6}", m.jitter_rms)?;
        writeln!(f, "drift_rate_mps: {:.6}", m.drift_rate)?;
        writeln!(f, "drift_velocity_mps: {}", fmt_vec(m.drift_velocity))?;
        writeln!(f, "position_accuracy_m: {}", fmt_opt(m.position_accuracy))?;
        writeln!(f, "rotation_accuracy_deg: {}", fmt_opt(m.rotation_accuracy))?;
        writeln!(f)?;

        let b = &self.bounds;
        writeln!(f, "[bounds]")?;
        writeln!(f, "x: {:.6} .. {:.6}", b.x_min, b.x_max)?;
        writeln!(f, "y: {:.6} .. {:.6}", b.y_min, b.y_max)?;
        writeln!(f, "z: {:.6} .. {:.6}", b.z_min, b.z_max)?;
        writeln!(f)?;

        let h = &self.history;
        writeln!(f, "[history]")?;
        writeln!(f, "count: {}", h.count)?;
        writeln!(f, "mean: {}", fmt_vec(h.mean))?;
        writeln!(f, "range: {}", fmt_vec(h.range()))?;
        writeln!(f, "std: {}", fmt_vec(h.std))?;
        writeln!(f)?;

        let c = &self.counters;
        writeln!(f, "[ingest]")?;
        writeln!(f, "accepted: {}", c.accepted)?;
        writeln!(f, "out_of_bounds: {}", c.out_of_bounds)?;
        writeln!(f, "invalid: {}", c.invalid)?;
        writeln!(f, "rejected: {}", c.rejected)
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.6}", v),
        None => "n/a".to_string(),
    }
}

fn fmt_vec(v: Vec3) -> String {
    format!("[{:.6}, {:.6}, {:.6}]", v[0], v[1], v[2])
}
