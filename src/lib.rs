//! # trackcal - calibration and tracking-quality analysis for 6DOF headsets
//!
//! Turns a noisy stream of headset poses into a calibrated coordinate
//! mapping and live quality metrics. Provides:
//! - Bounded sample history with bounds/validity classification
//! - Multi-point interactive calibration with rigid or mean-offset fitting
//! - Jitter, drift, accuracy and sample-rate metrics plus exportable reports
//! - A background poll loop over any [`PoseSource`], including a simulator
//! - C FFI for integration with C/C++/Unity
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use trackcal::{
//!     EngineConfig, MonotonicClock, SimulatedSource, SimulationConfig, Tracker,
//!     TrackerConfig, TrackingEngine,
//! };
//!
//! let clock = Arc::new(MonotonicClock::new());
//! let engine = TrackingEngine::with_clock(EngineConfig::default(), clock.clone())
//!     .unwrap()
//!     .into_shared();
//! let source = SimulatedSource::new(SimulationConfig::default(), clock).unwrap();
//! let tracker = Tracker::start(Box::new(source), engine.clone(), TrackerConfig::default()).unwrap();
//!
//! std::thread::sleep(Duration::from_secs(2));
//! let snapshot = engine.lock().unwrap().get_snapshot();
//! println!("jitter: {:.5} m, rate: {:.1} Hz", snapshot.jitter_rms, snapshot.sample_rate);
//! tracker.stop();
//! ```

pub mod error;
pub mod geometry;
pub mod types;
pub mod buffer;
pub mod bounds;
pub mod profile;
pub mod calibration;
pub mod config;
pub mod metrics;
pub mod report;
pub mod engine;
pub mod source;
pub mod simulator;
pub mod tracker;
pub mod ffi;

pub use error::TrackcalError;
pub use types::*;
pub use buffer::SampleHistory;
pub use bounds::{classify, violations, Axis, AxisViolations, Direction, SampleClass};
pub use calibration::{
    CalibrationPoint, CalibrationProgress, CalibrationState, CalibrationTarget, Calibrator,
    TargetLayout,
};
pub use config::{EngineConfig, MetricsWindow, TrackerConfig};
pub use engine::{IngestCounters, SharedEngine, TrackingEngine};
pub use metrics::MetricsEngine;
pub use profile::{
    deserialize_profile, serialize_profile, CalibrationProfile, FittingMethod, ProfileRecord,
    RigidTransform, TransformFitter,
};
pub use report::TrackingReport;
pub use simulator::{SimulatedMotion, SimulatedSource, SimulationConfig};
pub use source::{ChannelSource, Clock, ManualClock, MonotonicClock, PoseSource, SharedClock};
pub use tracker::{Tracker, TrackerStats, TrackingEvent};

/// Result type alias for trackcal operations.
pub type Result<T> = std::result::Result<T, TrackcalError>;
