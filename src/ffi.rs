//! C FFI layer for trackcal.
//!
//! Opaque handle-based API for C/C++/Unity consumers that feed poses from
//! their own device binding. The generated C header is written to
//! `include/trackcal.h` by cbindgen.

use crate::bounds::SampleClass;
use crate::engine::TrackingEngine;
use crate::error::LastError;
use crate::types::{PoseSample, TrackingBounds};
use crate::EngineConfig;
use std::ffi::{c_char, c_int};

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque engine handle for C consumers.
pub struct TcEngine(TrackingEngine);

/// Metrics in C-compatible layout. Accuracy values are NaN when no
/// calibration profile is active.
#[repr(C)]
pub struct TcMetrics {
    pub position_accuracy: f64,
    pub rotation_accuracy: f64,
    pub jitter_rms: f64,
    pub drift_rate: f64,
    pub drift_velocity: [f64; 3],
    pub sample_rate: f64,
    pub sample_count: u64,
    pub window_start: f64,
    pub window_end: f64,
}

/// `tc_engine_ingest` result codes.
pub const TC_IN_BOUNDS: c_int = 0;
pub const TC_OUT_OF_BOUNDS: c_int = 1;
pub const TC_INVALID: c_int = 2;
pub const TC_ERROR: c_int = -1;

/// Create an engine with default configuration and `TRACKCAL_*` overrides.
/// Returns NULL on error (check tc_last_error()).
#[no_mangle]
pub extern "C" fn tc_engine_new() -> *mut TcEngine {
    match TrackingEngine::new(EngineConfig::from_env()) {
        Ok(engine) => {
            LAST_ERROR.clear();
            Box::into_raw(Box::new(TcEngine(engine)))
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// `engine` must be a pointer returned by `tc_engine_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn tc_engine_free(engine: *mut TcEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Ingest one pose. `rotation` is `[yaw, pitch, roll]` in degrees.
/// Returns `TC_IN_BOUNDS`, `TC_OUT_OF_BOUNDS`, `TC_INVALID`, or `TC_ERROR`.
///
/// # Safety
/// `engine` must be a valid engine pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn tc_engine_ingest(
    engine: *mut TcEngine,
    sample: PoseSample,
) -> c_int {
    if engine.is_null() {
        return TC_ERROR;
    }
    let engine = &mut *engine;
    match engine.0.ingest(sample) {
        Ok(SampleClass::InBounds) => TC_IN_BOUNDS,
        Ok(SampleClass::OutOfBounds(..)) => TC_OUT_OF_BOUNDS,
        Ok(SampleClass::Invalid) => TC_INVALID,
        Err(e) => {
            LAST_ERROR.set(&e);
            TC_ERROR
        }
    }
}

/// Compute metrics over the current history.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `engine` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn tc_engine_snapshot(engine: *mut TcEngine, out: *mut TcMetrics) -> c_int {
    if engine.is_null() || out.is_null() {
        return -1;
    }
    let engine = &mut *engine;
    let m = engine.0.get_snapshot();
    out.write(TcMetrics {
        position_accuracy: m.position_accuracy.unwrap_or(f64::NAN),
        rotation_accuracy: m.rotation_accuracy.unwrap_or(f64::NAN),
        jitter_rms: m.jitter_rms,
        drift_rate: m.drift_rate,
        drift_velocity: m.drift_velocity,
        sample_rate: m.sample_rate,
        sample_count: m.sample_count as u64,
        window_start: m.window_start,
        window_end: m.window_end,
    });
    0
}

/// Replace the tracking bounds. Returns 0 on success, -1 if the bounds are
/// invalid (the previous bounds stay in force).
///
/// # Safety
/// `engine` must be a valid engine pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn tc_engine_set_bounds(engine: *mut TcEngine, bounds: TrackingBounds) -> c_int {
    if engine.is_null() {
        return -1;
    }
    let engine = &mut *engine;
    match engine.0.set_bounds(bounds) {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Clear the sample history. Calibration state is kept.
///
/// # Safety
/// `engine` must be a valid engine pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn tc_engine_clear(engine: *mut TcEngine) {
    if !engine.is_null() {
        (*engine).0.reset_history();
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next trackcal API call.
#[no_mangle]
pub extern "C" fn tc_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
