//! Pipeline configuration
//!
//! Every field has a default, so a TOML file only needs the values it changes:
//!
//! ```toml
//! sampling_period = 0.005
//! imu = "realistic-1"
//!
//! [filter]
//! kind = "complementary-a"
//! gain = 0.02
//! ```

use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::imu::environment::STANDARD_GRAVITY;
use crate::imu::Environment;

pub use crate::filter::{ComplementaryAConfig, ComplementaryBConfig, EkfConfig, FilterConfig, FilterKind};
pub use crate::imu::ImuVariant;

/// IMU update rate of the tracker the replay was built for (Hz)
pub const DEFAULT_IMU_RATE: f64 = 366.0;

/// Where filter state comes from at each segment start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetPolicy {
    /// Seed every segment from the true orientation
    #[default]
    ResetPerSegment,
    /// Seed from the previous segment's final estimate
    CarryForward,
}

/// Orientation used to rotate accelerometer readings into the world frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrientationSource {
    /// The orientation filter's estimate
    #[default]
    Estimated,
    /// The ground-truth trajectory
    Truth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Samples averaged per calibration position
    pub sample_count: usize,
    /// Spin rate during the rotation positions (rad/s)
    pub rotational_velocity: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sample_count: 1000,
            rotational_velocity: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Gravity vector in world frame (m/s²), z up
    pub gravity: [f64; 3],
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, 0.0, -STANDARD_GRAVITY],
        }
    }
}

impl EnvironmentConfig {
    pub fn environment(&self) -> Environment {
        Environment::new(Vector3::from(self.gravity))
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// IMU sampling period (s)
    pub sampling_period: f64,
    /// Segment length (s)
    pub segment_period: f64,
    /// Simulated sensor
    pub imu: ImuVariant,
    /// Orientation filter and its parameters
    pub filter: FilterConfig,
    /// Run scale-and-offset calibration before the first segment
    pub calibrate: bool,
    pub calibration: CalibrationConfig,
    pub environment: EnvironmentConfig,
    pub reset_policy: ResetPolicy,
    pub orientation_source: OrientationSource,
    /// Remove gravity from the world-frame acceleration before integrating
    pub compensate_gravity: bool,
    /// Seed for realistic sensor errors and noise
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_period: 1.0 / DEFAULT_IMU_RATE,
            segment_period: 1.0,
            imu: ImuVariant::default(),
            filter: FilterConfig::default(),
            calibrate: false,
            calibration: CalibrationConfig::default(),
            environment: EnvironmentConfig::default(),
            reset_policy: ResetPolicy::default(),
            orientation_source: OrientationSource::default(),
            compensate_gravity: true,
            seed: 0,
        }
    }
}

impl PipelineConfig {
    /// Parse from a TOML string. The result is not validated.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        config.validate()?;
        info!(?path, "Loaded config");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn environment(&self) -> Environment {
        self.environment.environment()
    }

    /// Check every setting; runs before any work is done
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sampling_period.is_finite() || self.sampling_period <= 0.0 {
            return Err(ConfigError::InvalidSamplingPeriod(self.sampling_period));
        }
        if !self.segment_period.is_finite() || self.segment_period <= 0.0 {
            return Err(ConfigError::InvalidPeriod(self.segment_period));
        }
        if !self.environment.gravity.iter().all(|g| g.is_finite()) {
            return Err(ConfigError::InvalidGravity(self.environment.gravity));
        }
        self.filter.validate()?;

        if self.calibrate {
            if self.calibration.sample_count == 0 {
                return Err(ConfigError::InvalidCalibration {
                    name: "sample_count",
                    value: 0.0,
                });
            }
            let rv = self.calibration.rotational_velocity;
            if !rv.is_finite() || rv <= 0.0 {
                return Err(ConfigError::InvalidCalibration {
                    name: "rotational_velocity",
                    value: rv,
                });
            }
            // Static calibration poses need a gravity direction
            if self.environment().gravity_magnitude() <= 0.0 {
                return Err(ConfigError::InvalidGravity(self.environment.gravity));
            }
        }
        Ok(())
    }
}
