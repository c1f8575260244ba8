//! Interactive multi-point calibration.
//!
//! The operator walks the headset to each nominal target in turn. Samples
//! are collected while the headset is held at the point and averaged when
//! the point is finished, so noise shrinks with the number of samples taken.
//!
//! ```text
//! Idle ─begin─▶ CollectingPoint(0) ─finish─▶ PointComplete(0) ─▶ CollectingPoint(1) …
//!                                                            └─▶ AllPointsDone
//! AllPointsDone ─compute─▶ ComputingTransform ─▶ Calibrated
//! any non-Idle ─abort─▶ Idle
//! ```

use crate::geometry::{self, Vec3};
use crate::profile::{self, CalibrationProfile, ProfileRecord, TransformFitter};
use crate::types::PoseSample;
use crate::{Result, TrackcalError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A named nominal position the operator is asked to hold the headset at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTarget {
    pub label: String,
    pub position: [f64; 3],
}

impl CalibrationTarget {
    pub fn new(label: impl Into<String>, position: Vec3) -> Self {
        Self {
            label: label.into(),
            position,
        }
    }
}

/// Label → nominal position lookup used to resolve calibration runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetLayout {
    targets: BTreeMap<String, [f64; 3]>,
}

impl TargetLayout {
    pub fn new<I>(targets: I) -> Self
    where
        I: IntoIterator<Item = CalibrationTarget>,
    {
        Self {
            targets: targets
                .into_iter()
                .map(|t| (t.label, t.position))
                .collect(),
        }
    }

    /// Nine-point layout covering the centre, four corners at two depths,
    /// and the extremes of each axis of a seated play space.
    pub fn nine_point() -> Self {
        Self::new([
            CalibrationTarget::new("center", [0.0, 0.0, 1.5]),
            CalibrationTarget::new("lower-left-near", [-1.0, -0.5, 1.0]),
            CalibrationTarget::new("lower-right-near", [1.0, -0.5, 1.0]),
            CalibrationTarget::new("upper-left-far", [-1.0, 0.5, 2.0]),
            CalibrationTarget::new("upper-right-far", [1.0, 0.5, 2.0]),
            CalibrationTarget::new("bottom", [0.0, -1.0, 1.5]),
            CalibrationTarget::new("top", [0.0, 1.0, 1.5]),
            CalibrationTarget::new("near", [0.0, 0.0, 0.8]),
            CalibrationTarget::new("far", [0.0, 0.0, 2.2]),
        ])
    }

    /// Labels of [`TargetLayout::nine_point`] in walk order.
    pub fn nine_point_labels() -> Vec<String> {
        [
            "center",
            "lower-left-near",
            "lower-right-near",
            "upper-left-far",
            "upper-right-far",
            "bottom",
            "top",
            "near",
            "far",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn insert(&mut self, target: CalibrationTarget) {
        self.targets.insert(target.label, target.position);
    }

    pub fn get(&self, label: &str) -> Option<CalibrationTarget> {
        self.targets
            .get(label)
            .map(|&position| CalibrationTarget::new(label, position))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Default for TargetLayout {
    fn default() -> Self {
        Self::nine_point()
    }
}

/// Samples gathered at one target and, once finished, the offset between
/// their centroid and the target.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPoint {
    label: String,
    target: Vec3,
    samples: Vec<PoseSample>,
    computed_offset: Option<Vec3>,
    reference_rotation: Option<Vec3>,
}

impl CalibrationPoint {
    pub fn new(target: &CalibrationTarget) -> Self {
        Self {
            label: target.label.clone(),
            target: target.position,
            samples: Vec::new(),
            computed_offset: None,
            reference_rotation: None,
        }
    }

    pub(crate) fn restored(
        label: String,
        target: Vec3,
        samples: Vec<PoseSample>,
        computed_offset: Vec3,
        reference_rotation: Vec3,
    ) -> Self {
        Self {
            label,
            target,
            samples,
            computed_offset: Some(computed_offset),
            reference_rotation: Some(reference_rotation),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn samples(&self) -> &[PoseSample] {
        &self.samples
    }

    pub fn computed_offset(&self) -> Option<Vec3> {
        self.computed_offset
    }

    /// Mean rotation of the collected samples, set when finished.
    pub fn reference_rotation(&self) -> Option<Vec3> {
        self.reference_rotation
    }

    pub fn is_finished(&self) -> bool {
        self.computed_offset.is_some()
    }

    pub fn centroid(&self) -> Option<Vec3> {
        geometry::mean(self.samples.iter().map(|s| s.position))
    }

    pub(crate) fn record(&mut self, sample: PoseSample) {
        self.samples.push(sample);
    }

    /// Compute offset = centroid - target. Only succeeds once.
    pub(crate) fn finalize(&mut self) -> Result<Vec3> {
        if let Some(offset) = self.computed_offset {
            return Ok(offset);
        }
        let centroid = self.centroid().ok_or_else(|| TrackcalError::InsufficientSamples {
            label: self.label.clone(),
        })?;
        let offset = geometry::sub(centroid, self.target);
        self.computed_offset = Some(offset);
        self.reference_rotation = geometry::mean_angles(self.samples.iter().map(|s| s.rotation));
        Ok(offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationState {
    Idle,
    CollectingPoint(usize),
    PointComplete(usize),
    AllPointsDone,
    ComputingTransform,
    Calibrated,
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationState::Idle => write!(f, "idle"),
            CalibrationState::CollectingPoint(i) => write!(f, "collecting point {}", i),
            CalibrationState::PointComplete(i) => write!(f, "point {} complete", i),
            CalibrationState::AllPointsDone => write!(f, "all points done"),
            CalibrationState::ComputingTransform => write!(f, "computing transform"),
            CalibrationState::Calibrated => write!(f, "calibrated"),
        }
    }
}

/// Operator-facing progress of the current run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationProgress {
    pub state: CalibrationState,
    pub current_point: Option<usize>,
    pub current_label: Option<String>,
    pub total_points: usize,
    pub completed_points: usize,
    pub samples_at_current_point: usize,
}

/// Calibration state machine and owner of the active profile.
///
/// Every failing operation leaves the machine exactly as it was.
pub struct Calibrator {
    layout: TargetLayout,
    fitter: Box<dyn TransformFitter>,
    state: CalibrationState,
    points: Vec<CalibrationPoint>,
    active: Option<Arc<CalibrationProfile>>,
}

impl Calibrator {
    pub fn new(layout: TargetLayout, fitter: Box<dyn TransformFitter>) -> Self {
        Self {
            layout,
            fitter,
            state: CalibrationState::Idle,
            points: Vec::new(),
            active: None,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn layout(&self) -> &TargetLayout {
        &self.layout
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// Replace the fitting strategy used by the next `compute_global_transform`.
    pub fn set_fitter(&mut self, fitter: Box<dyn TransformFitter>) {
        self.fitter = fitter;
    }

    pub fn active_profile(&self) -> Option<Arc<CalibrationProfile>> {
        self.active.clone()
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.state, CalibrationState::CollectingPoint(_))
    }

    pub fn progress(&self) -> CalibrationProgress {
        let current_point = match self.state {
            CalibrationState::CollectingPoint(i) | CalibrationState::PointComplete(i) => Some(i),
            _ => None,
        };
        let current = current_point.and_then(|i| self.points.get(i));
        CalibrationProgress {
            state: self.state,
            current_point,
            current_label: current.map(|p| p.label.clone()),
            total_points: self.points.len(),
            completed_points: self.points.iter().filter(|p| p.is_finished()).count(),
            samples_at_current_point: current.map_or(0, |p| p.samples.len()),
        }
    }

    /// Start a run over the given target labels, in order. Only from `Idle`;
    /// to recalibrate, `abort` first. The active profile stays in force until
    /// the new run completes.
    pub fn begin_calibration<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        if self.state != CalibrationState::Idle {
            return Err(TrackcalError::AlreadyInProgress);
        }
        if labels.is_empty() {
            return Err(TrackcalError::NoCalibrationPoints);
        }
        let points = labels
            .iter()
            .map(|label| {
                let label = label.as_ref();
                self.layout
                    .get(label)
                    .map(|target| CalibrationPoint::new(&target))
                    .ok_or_else(|| TrackcalError::UnknownTarget(label.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!("Calibration started with {} point(s)", points.len());
        self.points = points;
        self.state = CalibrationState::CollectingPoint(0);
        Ok(())
    }

    /// Add a sample to the point being collected. Returns the point's sample count.
    pub fn record_sample_for_current_point(&mut self, sample: PoseSample) -> Result<usize> {
        let index = self.collecting_index("record a sample")?;
        sample.check_finite()?;
        if !sample.valid || sample.is_zeroed() {
            return Err(TrackcalError::InvalidSample(format!(
                "no tracking in sample at t={}",
                sample.timestamp
            )));
        }
        let point = &mut self.points[index];
        point.record(sample);
        log::trace!("Point '{}': {} sample(s)", point.label, point.samples.len());
        Ok(point.samples.len())
    }

    /// Close the current point and advance. Returns the point's offset.
    pub fn finish_current_point(&mut self) -> Result<Vec3> {
        let index = self.collecting_index("finish a point")?;
        let offset = self.points[index].finalize()?;
        self.state = CalibrationState::PointComplete(index);
        log::info!(
            "Point '{}' finished: offset [{:+.4}, {:+.4}, {:+.4}] from {} sample(s)",
            self.points[index].label,
            offset[0],
            offset[1],
            offset[2],
            self.points[index].samples.len()
        );

        self.state = if index + 1 < self.points.len() {
            CalibrationState::CollectingPoint(index + 1)
        } else {
            CalibrationState::AllPointsDone
        };
        Ok(offset)
    }

    /// Fit the global transform over all finished points and activate the
    /// resulting profile.
    pub fn compute_global_transform(&mut self, created_at: f64) -> Result<Arc<CalibrationProfile>> {
        if self.state != CalibrationState::AllPointsDone {
            return Err(self.invalid_state("compute the transform"));
        }
        self.state = CalibrationState::ComputingTransform;

        let fit = match self.fitter.fit(&self.points) {
            Ok(fit) => fit,
            Err(e) => {
                self.state = CalibrationState::AllPointsDone;
                return Err(e);
            }
        };
        let profile = Arc::new(CalibrationProfile::new(
            std::mem::take(&mut self.points),
            fit,
            created_at,
        ));
        log::info!(
            "Calibration profile {} active (residual {:.4} m)",
            profile.identity(),
            profile.residual_rms()
        );
        self.active = Some(profile.clone());
        self.state = CalibrationState::Calibrated;
        Ok(profile)
    }

    /// Drop the in-progress run. The active profile is untouched.
    pub fn abort(&mut self) -> Result<()> {
        if self.state == CalibrationState::Idle {
            return Err(self.invalid_state("abort"));
        }
        log::info!("Calibration aborted while {}", self.state);
        self.points.clear();
        self.state = CalibrationState::Idle;
        Ok(())
    }

    pub fn save_profile(&self) -> Result<ProfileRecord> {
        match (&self.active, self.state) {
            (Some(profile), CalibrationState::Calibrated) => Ok(profile::serialize_profile(profile)),
            _ => Err(self.invalid_state("save a profile")),
        }
    }

    /// Validate and install a stored profile, replacing the active one.
    pub fn load_profile(&mut self, record: &ProfileRecord) -> Result<Arc<CalibrationProfile>> {
        let profile = Arc::new(profile::deserialize_profile(record)?);
        log::info!("Loaded calibration profile {}", profile.identity());
        self.points.clear();
        self.active = Some(profile.clone());
        self.state = CalibrationState::Calibrated;
        Ok(profile)
    }

    fn collecting_index(&self, operation: &'static str) -> Result<usize> {
        match self.state {
            CalibrationState::CollectingPoint(i) => Ok(i),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn invalid_state(&self, operation: &'static str) -> TrackcalError {
        TrackcalError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(TargetLayout::default(), Box::new(profile::RigidFitter))
    }
}
