use crate::bounds::{self, SampleClass};
use crate::buffer::SampleHistory;
use crate::calibration::{CalibrationProgress, CalibrationState, Calibrator};
use crate::config::EngineConfig;
use crate::geometry::Vec3;
use crate::metrics::MetricsEngine;
use crate::profile::{self, CalibrationProfile, ProfileRecord, TransformFitter};
use crate::report::{HistoryStats, ProfileSummary, TrackingReport};
use crate::source::{MonotonicClock, SharedClock};
use crate::types::{MetricsSnapshot, PoseSample, TrackingBounds};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Running totals of what `ingest` did with each sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCounters {
    /// Stored in the history (in or out of bounds).
    pub accepted: u64,
    /// Stored, but outside the tracking bounds.
    pub out_of_bounds: u64,
    /// Lost-tracking or zeroed samples; not stored.
    pub invalid: u64,
    /// Non-finite samples refused with an error.
    pub rejected: u64,
}

/// Single-writer owner of the history, bounds, calibration and metrics cache.
///
/// Not `Sync` by design of its callers: share it as a [`SharedEngine`] and
/// mutate it from one thread at a time.
pub struct TrackingEngine {
    config: EngineConfig,
    history: SampleHistory,
    bounds: TrackingBounds,
    calibrator: Calibrator,
    metrics: MetricsEngine,
    clock: SharedClock,
    counters: IngestCounters,
}

pub type SharedEngine = Arc<Mutex<TrackingEngine>>;

impl TrackingEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Build an engine reading query times from `clock`. Sources feeding it
    /// should stamp samples from the same clock.
    pub fn with_clock(config: EngineConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        let calibrator = Calibrator::new(
            config.targets.clone(),
            profile::fitter_for(config.fitting_method),
        );
        Ok(Self {
            history: SampleHistory::with_capacity(config.history_capacity),
            bounds: config.bounds,
            metrics: MetricsEngine::new(&config),
            calibrator,
            clock,
            counters: IngestCounters::default(),
            config,
        })
    }

    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Classify a sample and store it if it carries tracking data.
    ///
    /// Non-finite samples are refused with `InvalidSample`. Lost or zeroed
    /// samples are counted and dropped. Everything else, including
    /// out-of-bounds poses, goes into the history and, while a point is
    /// being collected, into the calibration.
    pub fn ingest(&mut self, sample: PoseSample) -> Result<SampleClass> {
        if let Err(e) = sample.check_finite() {
            self.counters.rejected += 1;
            log::warn!("Dropping sample: {}", e);
            return Err(e);
        }

        let class = bounds::classify(&sample, &self.bounds);
        match class {
            SampleClass::Invalid => {
                self.counters.invalid += 1;
                log::trace!("Sample at t={:.4} has no tracking", sample.timestamp);
                return Ok(class);
            }
            SampleClass::OutOfBounds(axis, direction) => {
                self.counters.out_of_bounds += 1;
                log::debug!(
                    "Sample at t={:.4} out of bounds: {:?} {:?}",
                    sample.timestamp,
                    axis,
                    direction
                );
            }
            SampleClass::InBounds => {}
        }

        self.history.append(sample)?;
        self.counters.accepted += 1;

        if self.config.feed_calibration && self.calibrator.is_collecting() {
            self.calibrator.record_sample_for_current_point(sample)?;
        }
        Ok(class)
    }

    pub fn history_snapshot(&self) -> Vec<PoseSample> {
        self.history.snapshot()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn latest_sample(&self) -> Option<PoseSample> {
        self.history.latest().copied()
    }

    /// Clear history, counters and the cached snapshot. Calibration is kept.
    pub fn reset_history(&mut self) {
        self.history.clear();
        self.counters = IngestCounters::default();
        self.metrics.invalidate();
        log::info!("Tracking history cleared");
    }

    /// Replace the bounds. Invalid bounds are refused and the old ones kept.
    pub fn set_bounds(&mut self, bounds: TrackingBounds) -> Result<()> {
        bounds.validate()?;
        self.bounds = bounds;
        log::info!(
            "Tracking bounds set: x [{}, {}], y [{}, {}], z [{}, {}]",
            bounds.x_min,
            bounds.x_max,
            bounds.y_min,
            bounds.y_max,
            bounds.z_min,
            bounds.z_max
        );
        Ok(())
    }

    pub fn bounds(&self) -> TrackingBounds {
        self.bounds
    }

    // Calibration

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibrator.state()
    }

    pub fn calibration_progress(&self) -> CalibrationProgress {
        self.calibrator.progress()
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn set_fitter(&mut self, fitter: Box<dyn TransformFitter>) {
        self.calibrator.set_fitter(fitter);
    }

    pub fn begin_calibration<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        self.calibrator.begin_calibration(labels)
    }

    /// Begin a run over every target in the default nine-point walk order.
    pub fn begin_default_calibration(&mut self) -> Result<()> {
        let labels = crate::calibration::TargetLayout::nine_point_labels();
        self.calibrator.begin_calibration(labels.as_slice())
    }

    pub fn record_sample_for_current_point(&mut self, sample: PoseSample) -> Result<usize> {
        self.calibrator.record_sample_for_current_point(sample)
    }

    pub fn finish_current_point(&mut self) -> Result<Vec3> {
        self.calibrator.finish_current_point()
    }

    pub fn compute_global_transform(&mut self) -> Result<Arc<CalibrationProfile>> {
        let created_at = self.clock.now();
        let profile = self.calibrator.compute_global_transform(created_at)?;
        self.metrics.invalidate();
        Ok(profile)
    }

    pub fn abort_calibration(&mut self) -> Result<()> {
        self.calibrator.abort()
    }

    /// Record of the completed calibration, carrying the current bounds.
    pub fn save_profile(&self) -> Result<ProfileRecord> {
        let mut record = self.calibrator.save_profile()?;
        record.bounds = Some(self.bounds);
        Ok(record)
    }

    /// Install a stored profile. Bounds in the record replace the current
    /// ones; a record with invalid bounds or profile data changes nothing.
    pub fn load_profile(&mut self, record: &ProfileRecord) -> Result<Arc<CalibrationProfile>> {
        if let Some(bounds) = &record.bounds {
            bounds.validate()?;
        }
        let profile = self.calibrator.load_profile(record)?;
        if let Some(bounds) = record.bounds {
            self.bounds = bounds;
            log::info!("Tracking bounds restored from profile {}", profile.identity());
        }
        self.metrics.invalidate();
        Ok(profile)
    }

    /// Serialize the active profile, whatever the calibrator is doing.
    pub fn serialize_profile(&self) -> Option<ProfileRecord> {
        self.calibrator.active_profile().map(|p| {
            let mut record = profile::serialize_profile(&p);
            record.bounds = Some(self.bounds);
            record
        })
    }

    pub fn active_profile(&self) -> Option<Arc<CalibrationProfile>> {
        self.calibrator.active_profile()
    }

    // Metrics

    /// Compute metrics over the current history and cache them.
    pub fn get_snapshot(&mut self) -> MetricsSnapshot {
        let now = self.clock.now();
        let profile = self.calibrator.active_profile();
        let samples = self.history.snapshot();
        self.metrics.refresh(&samples, profile.as_deref(), now)
    }

    /// Last snapshot from [`TrackingEngine::get_snapshot`], without recomputing.
    pub fn latest_snapshot(&self) -> Option<MetricsSnapshot> {
        self.metrics.latest().cloned()
    }

    /// Fresh metrics plus bounds, profile identity, history statistics and
    /// counters, stamped with the engine clock.
    pub fn generate_report(&mut self) -> TrackingReport {
        let metrics = self.get_snapshot();
        let samples = self.history.snapshot();
        TrackingReport {
            generated_at: self.clock.now(),
            metrics,
            bounds: self.bounds,
            profile: self
                .calibrator
                .active_profile()
                .map(|p| ProfileSummary::from_profile(&p)),
            history: HistoryStats::from_samples(&samples),
            counters: self.counters,
        }
    }

    pub fn counters(&self) -> IngestCounters {
        self.counters
    }
}
