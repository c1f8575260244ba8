//! Synthetic pose source for running without hardware.
//!
//! Head motion follows a slow Lissajous path through the default play space
//! (x = 0.5 sin 0.5t, y = 0.3 sin 0.3t, z = 1.5 + 0.2 sin 0.7t, with a gentle
//! side-to-side yaw sway), or holds a fixed pose. On top of that the
//! generator adds Gaussian position/rotation noise, linear drift, dropped
//! polls and zeroed lost-tracking frames, matching the failure modes of
//! real optical trackers. A non-zero seed makes every run reproducible.

use crate::config::{read_env_f64, read_env_u64};
use crate::geometry::{self, Vec3};
use crate::source::{PoseSource, SharedClock};
use crate::types::PoseSample;
use crate::{Result, TrackcalError};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, StandardNormal, Uniform};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedMotion {
    Orbit,
    Hold { position: [f64; 3], rotation: [f64; 3] },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// 0 seeds from OS entropy.
    pub seed: u64,
    pub motion: SimulatedMotion,
    /// Per-axis position noise standard deviation, meters.
    pub position_noise_std: f64,
    /// Per-axis rotation noise standard deviation, degrees.
    pub rotation_noise_std: f64,
    /// Constant drift velocity, meters per second.
    pub drift_velocity: [f64; 3],
    /// Probability that a poll returns no sample.
    pub dropout_probability: f64,
    /// Probability that a poll returns a zeroed lost-tracking sample.
    pub tracking_loss_probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            motion: SimulatedMotion::Orbit,
            position_noise_std: 0.0005,
            rotation_noise_std: 0.05,
            drift_velocity: geometry::ZERO,
            dropout_probability: 0.0,
            tracking_loss_probability: 0.0,
        }
    }
}

impl SimulationConfig {
    /// Defaults with `TRACKCAL_SIM_SEED`, `TRACKCAL_SIM_POSITION_NOISE`,
    /// `TRACKCAL_SIM_ROTATION_NOISE` and `TRACKCAL_SIM_DROPOUT` overrides.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            seed: read_env_u64("TRACKCAL_SIM_SEED", defaults.seed),
            position_noise_std: read_env_f64(
                "TRACKCAL_SIM_POSITION_NOISE",
                defaults.position_noise_std,
            ),
            rotation_noise_std: read_env_f64(
                "TRACKCAL_SIM_ROTATION_NOISE",
                defaults.rotation_noise_std,
            ),
            dropout_probability: read_env_f64("TRACKCAL_SIM_DROPOUT", defaults.dropout_probability),
            ..defaults
        }
    }

    /// Stationary headset at `position` with the given noise level.
    pub fn stationary(position: Vec3, position_noise_std: f64, seed: u64) -> Self {
        Self {
            seed,
            motion: SimulatedMotion::Hold {
                position,
                rotation: geometry::ZERO,
            },
            position_noise_std,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let probability = |p: f64| (0.0..=1.0).contains(&p);
        if !probability(self.dropout_probability) || !probability(self.tracking_loss_probability) {
            return Err(TrackcalError::InvalidConfig(
                "probabilities must be within [0, 1]".into(),
            ));
        }
        if !(self.position_noise_std >= 0.0 && self.rotation_noise_std >= 0.0) {
            return Err(TrackcalError::InvalidConfig(
                "noise standard deviations must be non-negative".into(),
            ));
        }
        if !geometry::is_finite(&self.drift_velocity) {
            return Err(TrackcalError::InvalidConfig("drift must be finite".into()));
        }
        Ok(())
    }
}

/// Gaussian/uniform noise with optional deterministic seeding.
#[derive(Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    /// A seed of 0 uses OS entropy.
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    #[inline]
    pub fn gaussian(&mut self, stddev: f64) -> f64 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * stddev
    }

    pub fn gaussian3(&mut self, stddev: f64) -> Vec3 {
        [
            self.gaussian(stddev),
            self.gaussian(stddev),
            self.gaussian(stddev),
        ]
    }

    /// Uniform in [0, 1).
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        Uniform::new(0.0f64, 1.0).sample(&mut self.rng)
    }

    /// True with the given probability; never for 0.
    #[inline]
    pub fn chance(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.uniform() < probability
    }
}

pub struct SimulatedSource {
    config: SimulationConfig,
    noise: NoiseGenerator,
    clock: SharedClock,
    /// Subtracted from every generated position.
    origin: Vec3,
    /// Drift accumulates from this time.
    drift_start: f64,
    connected: bool,
}

impl SimulatedSource {
    pub fn new(config: SimulationConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        let noise = NoiseGenerator::new(config.seed);
        let drift_start = clock.now();
        Ok(Self {
            config,
            noise,
            clock,
            origin: geometry::ZERO,
            drift_start,
            connected: true,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Hold the headset still at `position` from now on.
    pub fn hold_at(&mut self, position: Vec3, rotation: Vec3) {
        self.config.motion = SimulatedMotion::Hold { position, rotation };
    }

    pub fn set_motion(&mut self, motion: SimulatedMotion) {
        self.config.motion = motion;
    }

    /// Simulate unplugging (or replugging) the tracker.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Noise-free pose at time `t`, before origin shift and drift.
    fn base_pose(&self, t: f64) -> (Vec3, Vec3) {
        match &self.config.motion {
            SimulatedMotion::Orbit => {
                let position = [
                    0.5 * (t * 0.5).sin(),
                    0.3 * (t * 0.3).sin(),
                    1.5 + 0.2 * (t * 0.7).sin(),
                ];
                let sway = [0.0, (t * 0.2).sin() * 0.1, 0.0, 1.0];
                (position, geometry::quaternion_to_euler(sway))
            }
            SimulatedMotion::Hold { position, rotation } => (*position, *rotation),
        }
    }

    fn true_position(&self, t: f64) -> Vec3 {
        let (base, _) = self.base_pose(t);
        let drift = geometry::scale(self.config.drift_velocity, t - self.drift_start);
        geometry::sub(geometry::add(base, drift), self.origin)
    }
}

impl PoseSource for SimulatedSource {
    fn try_get_sample(&mut self) -> Result<PoseSample> {
        if !self.connected {
            return Err(TrackcalError::SourceDisconnected);
        }
        if self.noise.chance(self.config.dropout_probability) {
            return Err(TrackcalError::NoSampleAvailable);
        }
        let t = self.clock.now();
        if self.noise.chance(self.config.tracking_loss_probability) {
            return Ok(PoseSample::lost(t));
        }

        let (_, rotation) = self.base_pose(t);
        let position = geometry::add(
            self.true_position(t),
            self.noise.gaussian3(self.config.position_noise_std),
        );
        let rotation = geometry::add(rotation, self.noise.gaussian3(self.config.rotation_noise_std));
        Ok(PoseSample::new(position, rotation, t))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    /// Move the origin under the current horizontal position and restart
    /// drift. Depth is left alone: it is the physical camera distance.
    fn recenter(&mut self) -> Result<()> {
        let t = self.clock.now();
        let current = self.true_position(t);
        self.origin[0] += current[0];
        self.origin[1] += current[1];
        self.drift_start = t;
        log::info!("Simulated tracking origin recentered");
        Ok(())
    }

    fn name(&self) -> &str {
        "simulator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ManualClock;
    use std::sync::Arc;

    fn manual() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(0.0))
    }

    #[test]
    fn test_deterministic_seed() {
        let mut a = NoiseGenerator::new(42);
        let mut b = NoiseGenerator::new(42);
        for _ in 0..100 {
            assert_eq!(a.gaussian(1.0), b.gaussian(1.0));
        }
    }

    #[test]
    fn test_zero_stddev() {
        let mut noise = NoiseGenerator::new(7);
        for _ in 0..10 {
            assert_eq!(noise.gaussian(0.0), 0.0);
        }
        assert!(!noise.chance(0.0));
    }

    #[test]
    fn test_noise_shape() {
        let mut noise = NoiseGenerator::new(3);
        let n = 20_000;
        let values: Vec<f64> = (0..n).map(|_| noise.gaussian(0.002)).collect();
        let mean = values.iter().sum::<f64>() / n as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 1e-4);
        assert!((var.sqrt() - 0.002).abs() < 1e-4);
    }

    #[test]
    fn test_noiseless_orbit_matches_path() {
        let clock = manual();
        let config = SimulationConfig {
            seed: 1,
            position_noise_std: 0.0,
            rotation_noise_std: 0.0,
            ..SimulationConfig::default()
        };
        let mut source = SimulatedSource::new(config, clock.clone()).unwrap();
        clock.set(2.0);
        let s = source.try_get_sample().unwrap();
        assert_eq!(s.timestamp, 2.0);
        assert!((s.position[0] - 0.5 * 1.0f64.sin()).abs() < 1e-12);
        assert!((s.position[2] - (1.5 + 0.2 * 1.4f64.sin())).abs() < 1e-12);
        assert!(s.valid);

        // Rotation is a yaw sway only.
        let expected_yaw = (2.0 * (0.1 * 0.4f64.sin()).atan()).to_degrees();
        assert!((s.rotation[0] - expected_yaw).abs() < 1e-9);
        assert!(s.rotation[0] > 4.0);
        assert!(s.rotation[1].abs() < 1e-12);
        assert!(s.rotation[2].abs() < 1e-12);
    }

    #[test]
    fn test_drift_accumulates() {
        let clock = manual();
        let mut config = SimulationConfig::stationary([0.0, 0.0, 1.5], 0.0, 5);
        config.drift_velocity = [0.01, 0.0, 0.0];
        let mut source = SimulatedSource::new(config, clock.clone()).unwrap();
        clock.set(10.0);
        let s = source.try_get_sample().unwrap();
        assert!((s.position[0] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_dropout_and_loss() {
        let clock = manual();
        let config = SimulationConfig {
            seed: 9,
            dropout_probability: 1.0,
            ..SimulationConfig::default()
        };
        let mut source = SimulatedSource::new(config, clock.clone()).unwrap();
        assert!(matches!(
            source.try_get_sample(),
            Err(TrackcalError::NoSampleAvailable)
        ));

        let config = SimulationConfig {
            seed: 9,
            tracking_loss_probability: 1.0,
            ..SimulationConfig::default()
        };
        let mut source = SimulatedSource::new(config, clock).unwrap();
        let s = source.try_get_sample().unwrap();
        assert!(s.is_zeroed());
        assert!(!s.valid);
    }

    #[test]
    fn test_disconnect() {
        let mut source = SimulatedSource::new(SimulationConfig::default(), manual()).unwrap();
        source.set_connected(false);
        assert!(!source.is_connected());
        assert!(matches!(
            source.try_get_sample(),
            Err(TrackcalError::SourceDisconnected)
        ));
    }

    #[test]
    fn test_recenter_zeroes_horizontal() {
        let clock = manual();
        let config = SimulationConfig::stationary([0.4, -0.2, 1.5], 0.0, 11);
        let mut source = SimulatedSource::new(config, clock).unwrap();
        source.recenter().unwrap();
        let s = source.try_get_sample().unwrap();
        assert!(s.position[0].abs() < 1e-12);
        assert!(s.position[1].abs() < 1e-12);
        assert!((s.position[2] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = SimulationConfig {
            dropout_probability: 1.5,
            ..SimulationConfig::default()
        };
        assert!(SimulatedSource::new(config, manual()).is_err());
    }
}
