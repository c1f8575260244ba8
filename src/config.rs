//! Engine and tracker configuration.
//!
//! Every field has a default, so an empty JSON object (or no config at all)
//! is a working setup. `from_env()` layers `TRACKCAL_*` environment
//! overrides on top of the defaults:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TRACKCAL_HISTORY_CAPACITY` | `EngineConfig::history_capacity` |
//! | `TRACKCAL_JITTER_SAMPLES` | `EngineConfig::jitter_window` |
//! | `TRACKCAL_RATE_WINDOW_S` | `EngineConfig::rate_window_s` |
//! | `TRACKCAL_FEED_CALIBRATION` | `EngineConfig::feed_calibration` |
//! | `TRACKCAL_FITTING` | `EngineConfig::fitting_method` (`rigid`, `mean_offset`) |
//! | `TRACKCAL_POLL_HZ` | `TrackerConfig::poll_hz` |
//! | `TRACKCAL_EVENT_CAPACITY` | `TrackerConfig::event_capacity` |

use crate::buffer::DEFAULT_CAPACITY;
use crate::calibration::TargetLayout;
use crate::profile::FittingMethod;
use crate::types::TrackingBounds;
use crate::{Result, TrackcalError};
use serde::{Deserialize, Serialize};

/// Which part of the history a metric looks at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsWindow {
    /// The whole history.
    All,
    /// The newest N samples.
    Samples(usize),
    /// Samples within T seconds of the newest one.
    Seconds(f64),
}

impl MetricsWindow {
    fn validate(&self, name: &str) -> Result<()> {
        match *self {
            MetricsWindow::All => Ok(()),
            MetricsWindow::Samples(0) => Err(TrackcalError::InvalidConfig(format!(
                "{} must cover at least one sample",
                name
            ))),
            MetricsWindow::Seconds(t) if !(t.is_finite() && t > 0.0) => Err(
                TrackcalError::InvalidConfig(format!("{} must be a positive duration", name)),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history_capacity: usize,
    pub jitter_window: MetricsWindow,
    pub drift_window: MetricsWindow,
    pub accuracy_window: MetricsWindow,
    /// Length of the sample-rate window in seconds.
    pub rate_window_s: f64,
    pub bounds: TrackingBounds,
    /// Record ingested samples into the calibration point being collected.
    pub feed_calibration: bool,
    pub fitting_method: FittingMethod,
    pub targets: TargetLayout,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_CAPACITY,
            jitter_window: MetricsWindow::Samples(100),
            drift_window: MetricsWindow::All,
            accuracy_window: MetricsWindow::Samples(100),
            rate_window_s: 1.0,
            bounds: TrackingBounds::default(),
            feed_calibration: true,
            fitting_method: FittingMethod::Rigid,
            targets: TargetLayout::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let jitter_default = match defaults.jitter_window {
            MetricsWindow::Samples(n) => n,
            _ => 100,
        };
        let fitting = match read_env_string("TRACKCAL_FITTING", defaults.fitting_method.as_str())
            .as_str()
        {
            "mean_offset" | "mean" => FittingMethod::MeanOffset,
            "rigid" => FittingMethod::Rigid,
            other => {
                log::warn!("Unknown TRACKCAL_FITTING '{}', using rigid", other);
                FittingMethod::Rigid
            }
        };

        Self {
            history_capacity: read_env_usize("TRACKCAL_HISTORY_CAPACITY", defaults.history_capacity),
            jitter_window: MetricsWindow::Samples(read_env_usize(
                "TRACKCAL_JITTER_SAMPLES",
                jitter_default,
            )),
            rate_window_s: read_env_f64("TRACKCAL_RATE_WINDOW_S", defaults.rate_window_s),
            feed_calibration: read_env_bool("TRACKCAL_FEED_CALIBRATION", defaults.feed_calibration),
            fitting_method: fitting,
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(TrackcalError::InvalidConfig(
                "history_capacity must be positive".into(),
            ));
        }
        self.jitter_window.validate("jitter_window")?;
        self.drift_window.validate("drift_window")?;
        self.accuracy_window.validate("accuracy_window")?;
        if !(self.rate_window_s.is_finite() && self.rate_window_s > 0.0) {
            return Err(TrackcalError::InvalidConfig(
                "rate_window_s must be a positive duration".into(),
            ));
        }
        self.bounds.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Target poll rate. The loop degrades to the source's pace if slower.
    pub poll_hz: f64,
    /// Capacity of the event channel; events are dropped when it is full.
    pub event_capacity: usize,
    pub thread_name: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_hz: 90.0,
            event_capacity: 256,
            thread_name: "trackcal-poll".into(),
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_hz: read_env_f64("TRACKCAL_POLL_HZ", defaults.poll_hz),
            event_capacity: read_env_usize("TRACKCAL_EVENT_CAPACITY", defaults.event_capacity),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.poll_interval()?;
        if self.event_capacity == 0 {
            return Err(TrackcalError::InvalidConfig(
                "event_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Time between polls. Fails for rates that are not positive or so low
    /// that the interval does not fit a `Duration`.
    pub fn poll_interval(&self) -> Result<std::time::Duration> {
        if !(self.poll_hz.is_finite() && self.poll_hz > 0.0) {
            return Err(TrackcalError::InvalidConfig("poll_hz must be positive".into()));
        }
        std::time::Duration::try_from_secs_f64(1.0 / self.poll_hz).map_err(|e| {
            TrackcalError::InvalidConfig(format!("poll_hz {} out of range: {}", self.poll_hz, e))
        })
    }
}

pub(crate) fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| {
            let v = v.trim().to_ascii_lowercase();
            match v.as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            }
        })
        .unwrap_or(default)
}

pub(crate) fn read_env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

pub(crate) fn read_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn read_env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

pub(crate) fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());

        let cfg: EngineConfig =
            serde_json::from_str(r#"{"history_capacity": 50, "jitter_window": {"seconds": 2.0}}"#)
                .unwrap();
        assert_eq!(cfg.history_capacity, 50);
        assert_eq!(cfg.jitter_window, MetricsWindow::Seconds(2.0));
        assert_eq!(cfg.drift_window, MetricsWindow::All);
    }

    #[test]
    fn test_invalid_windows() {
        let cfg = EngineConfig {
            jitter_window: MetricsWindow::Samples(0),
            ..EngineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(TrackcalError::InvalidConfig(_))));

        let cfg = EngineConfig {
            drift_window: MetricsWindow::Seconds(-1.0),
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = EngineConfig {
            rate_window_s: 0.0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("TRACKCAL_HISTORY_CAPACITY", "64");
        std::env::set_var("TRACKCAL_FITTING", "mean_offset");
        let cfg = EngineConfig::from_env();
        std::env::remove_var("TRACKCAL_HISTORY_CAPACITY");
        std::env::remove_var("TRACKCAL_FITTING");

        assert_eq!(cfg.history_capacity, 64);
        assert_eq!(cfg.fitting_method, FittingMethod::MeanOffset);
    }

    #[test]
    fn test_poll_interval() {
        let cfg = TrackerConfig {
            poll_hz: 50.0,
            ..TrackerConfig::default()
        };
        assert_eq!(
            cfg.poll_interval().unwrap(),
            std::time::Duration::from_millis(20)
        );
    }

    #[test]
    fn test_poll_rate_out_of_range() {
        for poll_hz in [1e-300, 0.0, -5.0, f64::NAN] {
            let cfg = TrackerConfig {
                poll_hz,
                ..TrackerConfig::default()
            };
            assert!(matches!(cfg.validate(), Err(TrackcalError::InvalidConfig(_))));
            assert!(cfg.poll_interval().is_err());
        }
    }
}
