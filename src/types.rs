use crate::geometry::{self, Vec3};
use crate::{Result, TrackcalError};
use serde::{Deserialize, Serialize};

/// One timestamped 6DOF pose reading from a tracking source.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    /// Position in meters [x, y, z], Y up.
    pub position: [f64; 3],
    /// Euler angles [yaw, pitch, roll] in degrees (YXZ order).
    pub rotation: [f64; 3],
    /// Monotonic timestamp in seconds.
    pub timestamp: f64,
    /// Source-reported tracking validity.
    pub valid: bool,
}

impl PoseSample {
    pub fn new(position: Vec3, rotation: Vec3, timestamp: f64) -> Self {
        Self {
            position,
            rotation,
            timestamp,
            valid: true,
        }
    }

    /// Build a sample from a hardware quaternion `[qx, qy, qz, qw]`.
    pub fn from_quaternion(position: Vec3, quaternion: [f64; 4], timestamp: f64) -> Self {
        Self::new(position, geometry::quaternion_to_euler(quaternion), timestamp)
    }

    /// The zeroed sample a source reports when it has lost tracking.
    pub fn lost(timestamp: f64) -> Self {
        Self {
            position: geometry::ZERO,
            rotation: geometry::ZERO,
            timestamp,
            valid: false,
        }
    }

    pub fn is_finite(&self) -> bool {
        geometry::is_finite(&self.position)
            && geometry::is_finite(&self.rotation)
            && self.timestamp.is_finite()
    }

    /// True when both position and rotation are exactly zero, the sentinel
    /// hardware emits while it has no tracking.
    pub fn is_zeroed(&self) -> bool {
        self.position == geometry::ZERO && self.rotation == geometry::ZERO
    }

    /// Reject NaN/Inf coordinates.
    pub fn check_finite(&self) -> Result<()> {
        if self.is_finite() {
            Ok(())
        } else {
            Err(TrackcalError::InvalidSample(format!(
                "non-finite values in sample at t={}",
                self.timestamp
            )))
        }
    }
}

/// Spatial volume, in meters, within which tracking is expected.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl Default for TrackingBounds {
    fn default() -> Self {
        Self {
            x_min: -2.0,
            x_max: 2.0,
            y_min: -1.5,
            y_max: 1.5,
            z_min: 0.5,
            z_max: 3.0,
        }
    }
}

impl TrackingBounds {
    /// `(min, max)` limits per axis in x, y, z order.
    pub fn limits(&self) -> [(f64, f64); 3] {
        [
            (self.x_min, self.x_max),
            (self.y_min, self.y_max),
            (self.z_min, self.z_max),
        ]
    }

    /// Every limit must be finite and each min strictly below its max.
    pub fn validate(&self) -> Result<()> {
        for (axis, (min, max)) in ["x", "y", "z"].iter().zip(self.limits()) {
            if !min.is_finite() || !max.is_finite() {
                return Err(TrackcalError::InvalidBounds(format!(
                    "{} limits must be finite",
                    axis
                )));
            }
            if min >= max {
                return Err(TrackcalError::InvalidBounds(format!(
                    "{}_min ({}) must be less than {}_max ({})",
                    axis, min, axis, max
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, position: Vec3) -> bool {
        self.limits()
            .iter()
            .zip(position)
            .all(|(&(min, max), v)| v >= min && v <= max)
    }
}

/// Tracking quality metrics computed from one history snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Mean distance in meters from the nearest calibration target, after
    /// correction. `None` without an active profile.
    pub position_accuracy: Option<f64>,
    /// Mean absolute angular difference in degrees from the nearest target's
    /// reference rotation. `None` without an active profile.
    pub rotation_accuracy: Option<f64>,
    /// RMS positional deviation from the window mean, meters.
    pub jitter_rms: f64,
    /// Magnitude of the fitted drift velocity, meters per second.
    pub drift_rate: f64,
    /// Per-axis least-squares drift velocity, meters per second.
    pub drift_velocity: [f64; 3],
    /// Samples per second over the rate window ending at the query time.
    pub sample_rate: f64,
    /// Valid samples the snapshot was computed from.
    pub sample_count: usize,
    pub window_start: f64,
    pub window_end: f64,
}

impl MetricsSnapshot {
    pub fn empty() -> Self {
        Self {
            position_accuracy: None,
            rotation_accuracy: None,
            jitter_rms: 0.0,
            drift_rate: 0.0,
            drift_velocity: geometry::ZERO,
            sample_rate: 0.0,
            sample_count: 0,
            window_start: 0.0,
            window_end: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_finite_check() {
        let ok = PoseSample::new([1.0, 2.0, 3.0], [0.0; 3], 0.5);
        assert!(ok.check_finite().is_ok());

        let bad = PoseSample::new([f64::NAN, 0.0, 0.0], [0.0; 3], 0.5);
        assert!(matches!(
            bad.check_finite(),
            Err(TrackcalError::InvalidSample(_))
        ));

        let inf = PoseSample::new([0.0; 3], [0.0, f64::INFINITY, 0.0], 0.5);
        assert!(inf.check_finite().is_err());
    }

    #[test]
    fn test_lost_is_zeroed() {
        let s = PoseSample::lost(1.0);
        assert!(s.is_zeroed());
        assert!(!s.valid);
    }

    #[test]
    fn test_bounds_validate() {
        assert!(TrackingBounds::default().validate().is_ok());

        let inverted = TrackingBounds {
            y_min: 1.0,
            y_max: -1.0,
            ..TrackingBounds::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(TrackcalError::InvalidBounds(_))
        ));

        let flat = TrackingBounds {
            z_min: 1.0,
            z_max: 1.0,
            ..TrackingBounds::default()
        };
        assert!(flat.validate().is_err());

        let nan = TrackingBounds {
            x_max: f64::NAN,
            ..TrackingBounds::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_bounds_contains() {
        let b = TrackingBounds::default();
        assert!(b.contains([0.0, 0.0, 1.5]));
        assert!(b.contains([2.0, -1.5, 0.5]));
        assert!(!b.contains([0.0, 0.0, 0.2]));
    }
}
