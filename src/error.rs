use std::fmt;

/// Errors raised by the tracking engine.
///
/// None of these are fatal: the component that returns one is left in the
/// state it had before the call.
#[derive(Debug, thiserror::Error)]
pub enum TrackcalError {
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Calibration already in progress")]
    AlreadyInProgress,

    #[error("Point '{label}' has no recorded samples")]
    InsufficientSamples { label: String },

    #[error("Malformed calibration profile: {0}")]
    MalformedProfile(String),

    #[error("Invalid tracking bounds: {0}")]
    InvalidBounds(String),

    #[error("No sample available")]
    NoSampleAvailable,

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Unknown calibration target '{0}'")]
    UnknownTarget(String),

    #[error("Calibration needs at least one point")]
    NoCalibrationPoints,

    #[error("Pose source disconnected")]
    SourceDisconnected,

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Channel disconnected")]
    ChannelDisconnected,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding failed: {0}")]
    Encode(String),
}

impl TrackcalError {
    /// Transient conditions that the poll loop retries on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, TrackcalError::NoSampleAvailable)
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &TrackcalError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut msg) = self.message.lock() {
            msg.clear();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
