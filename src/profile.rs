//! Calibration profiles and the transform fitting that produces them.
//!
//! A profile maps raw tracker positions into the calibrated frame:
//! `corrected = R · raw + t`. Two fitters are provided:
//!
//! - [`MeanOffsetFitter`]: translation only, `t = -mean(offset)`, `R = I`.
//! - [`RigidFitter`]: least-squares rigid fit (Kabsch) of the measured point
//!   centroids onto their nominal targets. With fewer than three points, or
//!   targets on a single line, rotation is unobservable and it falls back to
//!   the mean offset fit.
//!
//! Profiles cross the crate boundary as [`ProfileRecord`], a plain serde
//! structure. Where the bytes end up is the caller's business; the JSON
//! helpers here are a convenience.

use crate::calibration::CalibrationPoint;
use crate::geometry::{self, Vec3};
use crate::types::{PoseSample, TrackingBounds};
use crate::{Result, TrackcalError};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

pub const PROFILE_VERSION: u32 = 1;

/// Relative size of the second singular value below which the target
/// layout is treated as collinear.
const COLLINEAR_RATIO: f64 = 1e-8;

/// Tolerance for accepting a stored rotation matrix as a proper rotation.
const ROTATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FittingMethod {
    MeanOffset,
    Rigid,
}

impl FittingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            FittingMethod::MeanOffset => "mean_offset",
            FittingMethod::Rigid => "rigid",
        }
    }
}

/// Rotation + translation applied as `R · p + t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Row-major 3x3 rotation matrix.
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: geometry::ZERO,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    pub fn apply(&self, p: Vec3) -> Vec3 {
        geometry::add(geometry::mat_mul_vec(&self.rotation, p), self.translation)
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        let id = Self::identity();
        self.translation.iter().all(|v| v.abs() <= tolerance)
            && self
                .rotation
                .iter()
                .flatten()
                .zip(id.rotation.iter().flatten())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    fn is_finite(&self) -> bool {
        self.rotation.iter().flatten().all(|v| v.is_finite()) && geometry::is_finite(&self.translation)
    }

    /// Orthonormal with determinant +1, within tolerance.
    fn is_proper_rotation(&self) -> bool {
        let r = to_matrix(&self.rotation);
        let rrt = r * r.transpose();
        (rrt - Matrix3::identity()).amax() <= ROTATION_TOLERANCE
            && (r.determinant() - 1.0).abs() <= ROTATION_TOLERANCE
    }
}

/// Output of a transform fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub transform: RigidTransform,
    /// Method that actually produced the transform (after any fallback).
    pub method: FittingMethod,
    /// RMS distance between corrected centroids and their targets, meters.
    pub residual_rms: f64,
}

/// Turns finished calibration points into a global correction.
pub trait TransformFitter: Send {
    fn method(&self) -> FittingMethod;

    /// `points` are all finished (offset computed).
    fn fit(&self, points: &[CalibrationPoint]) -> Result<FitResult>;
}

pub fn fitter_for(method: FittingMethod) -> Box<dyn TransformFitter> {
    match method {
        FittingMethod::MeanOffset => Box::new(MeanOffsetFitter),
        FittingMethod::Rigid => Box::new(RigidFitter),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeanOffsetFitter;

impl TransformFitter for MeanOffsetFitter {
    fn method(&self) -> FittingMethod {
        FittingMethod::MeanOffset
    }

    fn fit(&self, points: &[CalibrationPoint]) -> Result<FitResult> {
        let pairs = point_pairs(points)?;
        let offset = geometry::mean(pairs.iter().map(|(m, t)| geometry::sub(*m, *t)))
            .ok_or(TrackcalError::NoCalibrationPoints)?;
        let transform = RigidTransform::from_translation(geometry::scale(offset, -1.0));
        Ok(FitResult {
            transform,
            method: FittingMethod::MeanOffset,
            residual_rms: residual_rms(&transform, &pairs),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RigidFitter;

impl TransformFitter for RigidFitter {
    fn method(&self) -> FittingMethod {
        FittingMethod::Rigid
    }

    fn fit(&self, points: &[CalibrationPoint]) -> Result<FitResult> {
        let pairs = point_pairs(points)?;
        match kabsch(&pairs) {
            Some(transform) => Ok(FitResult {
                transform,
                method: FittingMethod::Rigid,
                residual_rms: residual_rms(&transform, &pairs),
            }),
            None => {
                log::debug!(
                    "Rigid fit unobservable with {} point(s), using mean offset",
                    pairs.len()
                );
                MeanOffsetFitter.fit(points)
            }
        }
    }
}

/// `(measured centroid, target)` for every point.
fn point_pairs(points: &[CalibrationPoint]) -> Result<Vec<(Vec3, Vec3)>> {
    if points.is_empty() {
        return Err(TrackcalError::NoCalibrationPoints);
    }
    points
        .iter()
        .map(|p| match p.computed_offset() {
            Some(offset) => Ok((geometry::add(p.target(), offset), p.target())),
            None => Err(TrackcalError::InsufficientSamples {
                label: p.label().to_string(),
            }),
        })
        .collect()
}

fn residual_rms(transform: &RigidTransform, pairs: &[(Vec3, Vec3)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let sum: f64 = pairs
        .iter()
        .map(|(m, t)| {
            let d = geometry::distance(transform.apply(*m), *t);
            d * d
        })
        .sum();
    (sum / pairs.len() as f64).sqrt()
}

/// Least-squares rotation R and translation t with `R·m + t ≈ target`.
/// Returns `None` when the rotation is not determined by the points.
fn kabsch(pairs: &[(Vec3, Vec3)]) -> Option<RigidTransform> {
    if pairs.len() < 3 {
        return None;
    }
    let measured: Vec<Vector3<f64>> = pairs.iter().map(|(m, _)| Vector3::from(*m)).collect();
    let targets: Vec<Vector3<f64>> = pairs.iter().map(|(_, t)| Vector3::from(*t)).collect();
    let n = pairs.len() as f64;
    let mc = measured.iter().sum::<Vector3<f64>>() / n;
    let tc = targets.iter().sum::<Vector3<f64>>() / n;

    let mut h = Matrix3::zeros();
    for (m, t) in measured.iter().zip(&targets) {
        h += (m - mc) * (t - tc).transpose();
    }

    let svd = h.svd(true, true);
    let sv = svd.singular_values;
    let (u, v_t) = (svd.u?, svd.v_t?);

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| sv[b].total_cmp(&sv[a]));
    let (largest, middle, smallest) = (sv[order[0]], sv[order[1]], order[2]);
    if largest <= f64::EPSILON || middle <= largest * COLLINEAR_RATIO {
        return None;
    }

    // Flip the least significant axis if the plain solution is a reflection.
    let v = v_t.transpose();
    let ut = u.transpose();
    let mut d = Matrix3::identity();
    if (v * ut).determinant() < 0.0 {
        d[(smallest, smallest)] = -1.0;
    }
    let r = v * d * ut;
    let t = tc - r * mc;

    Some(RigidTransform {
        rotation: from_matrix(&r),
        translation: [t.x, t.y, t.z],
    })
}

fn to_matrix(m: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::new(
        m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
    )
}

fn from_matrix(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

/// A completed calibration. Immutable once built; superseded, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationProfile {
    points: Vec<CalibrationPoint>,
    global_transform: RigidTransform,
    fitting_method: FittingMethod,
    residual_rms: f64,
    created_at: f64,
}

impl CalibrationProfile {
    pub(crate) fn new(points: Vec<CalibrationPoint>, fit: FitResult, created_at: f64) -> Self {
        Self {
            points,
            global_transform: fit.transform,
            fitting_method: fit.method,
            residual_rms: fit.residual_rms,
            created_at,
        }
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn global_transform(&self) -> &RigidTransform {
        &self.global_transform
    }

    pub fn fitting_method(&self) -> FittingMethod {
        self.fitting_method
    }

    pub fn residual_rms(&self) -> f64 {
        self.residual_rms
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    /// Map a raw tracker position into the calibrated frame.
    pub fn correct(&self, raw: Vec3) -> Vec3 {
        self.global_transform.apply(raw)
    }

    /// Calibration point whose target is closest to `position`.
    pub fn nearest_point(&self, position: Vec3) -> Option<&CalibrationPoint> {
        self.points.iter().min_by(|a, b| {
            geometry::distance(a.target(), position)
                .total_cmp(&geometry::distance(b.target(), position))
        })
    }

    /// Stable human-readable identity used in reports.
    pub fn identity(&self) -> String {
        format!(
            "{}@{:.3}/{}pts",
            self.fitting_method.as_str(),
            self.created_at,
            self.points.len()
        )
    }
}

/// Structured, encoding-agnostic form of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub version: u32,
    pub created_at: f64,
    pub fitting_method: FittingMethod,
    pub residual_rms: f64,
    pub global_transform: RigidTransform,
    pub points: Vec<PointRecord>,
    /// Tracking bounds in force when the profile was saved. Records written
    /// without bounds load with the engine's bounds unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<TrackingBounds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub label: String,
    pub target: [f64; 3],
    pub computed_offset: [f64; 3],
    pub reference_rotation: [f64; 3],
    pub samples: Vec<PoseSample>,
}

pub fn serialize_profile(profile: &CalibrationProfile) -> ProfileRecord {
    ProfileRecord {
        version: PROFILE_VERSION,
        created_at: profile.created_at,
        fitting_method: profile.fitting_method,
        residual_rms: profile.residual_rms,
        global_transform: profile.global_transform,
        points: profile
            .points
            .iter()
            .map(|p| PointRecord {
                label: p.label().to_string(),
                target: p.target(),
                computed_offset: p.computed_offset().unwrap_or(geometry::ZERO),
                reference_rotation: p.reference_rotation().unwrap_or(geometry::ZERO),
                samples: p.samples().to_vec(),
            })
            .collect(),
        bounds: None,
    }
}

/// Validate a record and rebuild the profile it describes.
pub fn deserialize_profile(record: &ProfileRecord) -> Result<CalibrationProfile> {
    let malformed = |msg: String| TrackcalError::MalformedProfile(msg);

    if record.version != PROFILE_VERSION {
        return Err(malformed(format!("unsupported version {}", record.version)));
    }
    if !record.created_at.is_finite() || !record.residual_rms.is_finite() {
        return Err(malformed("non-finite profile header".into()));
    }
    if !record.global_transform.is_finite() {
        return Err(malformed("non-finite global transform".into()));
    }
    if !record.global_transform.is_proper_rotation() {
        return Err(malformed("global transform rotation is not a rotation".into()));
    }
    if record.points.is_empty() {
        return Err(malformed("profile has no points".into()));
    }

    let mut points = Vec::with_capacity(record.points.len());
    for p in &record.points {
        if p.label.is_empty() {
            return Err(malformed("point with empty label".into()));
        }
        if !geometry::is_finite(&p.target)
            || !geometry::is_finite(&p.computed_offset)
            || !geometry::is_finite(&p.reference_rotation)
        {
            return Err(malformed(format!("non-finite values at point '{}'", p.label)));
        }
        if p.samples.is_empty() {
            return Err(malformed(format!("point '{}' has no samples", p.label)));
        }
        if let Some(bad) = p.samples.iter().find(|s| !s.is_finite()) {
            return Err(malformed(format!(
                "non-finite sample at t={} in point '{}'",
                bad.timestamp, p.label
            )));
        }
        points.push(CalibrationPoint::restored(
            p.label.clone(),
            p.target,
            p.samples.clone(),
            p.computed_offset,
            p.reference_rotation,
        ));
    }

    Ok(CalibrationProfile {
        points,
        global_transform: record.global_transform,
        fitting_method: record.fitting_method,
        residual_rms: record.residual_rms,
        created_at: record.created_at,
    })
}

pub fn profile_to_json(profile: &CalibrationProfile) -> Result<String> {
    record_to_json(&serialize_profile(profile))
}

pub fn record_to_json(record: &ProfileRecord) -> Result<String> {
    encode_pretty(record, "profile")
}

pub(crate) fn encode_pretty<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| TrackcalError::Encode(format!("{}: {}", what, e)))
}

pub fn profile_from_value(value: serde_json::Value) -> Result<CalibrationProfile> {
    let record: ProfileRecord = serde_json::from_value(value)
        .map_err(|e| TrackcalError::MalformedProfile(e.to_string()))?;
    deserialize_profile(&record)
}

pub fn profile_from_json(text: &str) -> Result<CalibrationProfile> {
    let record: ProfileRecord =
        serde_json::from_str(text).map_err(|e| TrackcalError::MalformedProfile(e.to_string()))?;
    deserialize_profile(&record)
}
