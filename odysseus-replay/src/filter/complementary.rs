//! Complementary orientation filters
//!
//! Both variants propagate with the gyroscope and pull the estimate toward the
//! gravity-aligned orientation derived from the accelerometer. They differ in how the
//! pull is applied:
//! - A blends orientations by slerp with a fixed weight, skipping readings whose
//!   magnitude is far from gravity
//! - B feeds the quaternion difference back as a rate, scaled by Δt

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{causal_step, check_finite, gravity_aligned, propagate, OrientationFilter, OrientationHistory};
use crate::error::{ConfigError, FilterError};
use crate::imu::{Environment, ImuMeasurement};
use crate::math::{align_hemisphere, slerp};

fn validate_gain(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidGain { name, value })
    }
}

/// Complementary A parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplementaryAConfig {
    /// Slerp weight toward the gravity-aligned orientation, in (0, 1]
    pub gain: f64,
    /// Corrections are skipped when | |a| − |g| | exceeds this (m/s²)
    pub acceleration_threshold: f64,
}

impl Default for ComplementaryAConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            acceleration_threshold: 1.0,
        }
    }
}

impl ComplementaryAConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gain("gain", self.gain)?;
        if !self.acceleration_threshold.is_finite() || self.acceleration_threshold < 0.0 {
            return Err(ConfigError::InvalidAccelerationThreshold(
                self.acceleration_threshold,
            ));
        }
        Ok(())
    }
}

/// Complementary B parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplementaryBConfig {
    /// Feedback rate toward the gravity-aligned orientation, in (0, 1]
    pub gain: f64,
}

impl Default for ComplementaryBConfig {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

impl ComplementaryBConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gain("gain", self.gain)
    }
}

/// Orientation-blend complementary filter with an acceleration gate
#[derive(Debug, Clone)]
pub struct ComplementaryA {
    config: ComplementaryAConfig,
    up: Option<Vector3<f64>>,
    gravity_magnitude: f64,
    orientation: UnitQuaternion<f64>,
    last_time: f64,
    last_gyro: Vector3<f64>,
    history: OrientationHistory,
}

impl ComplementaryA {
    pub fn new(
        config: ComplementaryAConfig,
        environment: &Environment,
        first: &ImuMeasurement,
        initial_orientation: UnitQuaternion<f64>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            up: environment.up(),
            gravity_magnitude: environment.gravity_magnitude(),
            orientation: initial_orientation,
            last_time: first.timestamp,
            last_gyro: first.gyro,
            history: OrientationHistory::new(first.timestamp, initial_orientation),
        })
    }

    /// Whether the accelerometer reading is close enough to gravity to trust
    fn accepts(&self, accel: &Vector3<f64>) -> bool {
        (accel.norm() - self.gravity_magnitude).abs() <= self.config.acceleration_threshold
    }
}

impl OrientationFilter for ComplementaryA {
    fn update(&mut self, measurement: &ImuMeasurement) -> Result<(), FilterError> {
        let time = measurement.timestamp;
        let dt = causal_step(self.last_time, time)?;

        let predicted = propagate(&self.orientation, &self.last_gyro, dt);

        let corrected = if self.accepts(&measurement.accel) {
            let target = self
                .up
                .and_then(|up| gravity_aligned(&predicted, &measurement.accel, &up));
            match target {
                Some(target) => slerp(&predicted, &target, self.config.gain),
                None => predicted,
            }
        } else {
            trace!(
                time,
                accel_norm = measurement.accel.norm(),
                "Accelerometer gated out"
            );
            predicted
        };
        check_finite(time, &corrected)?;

        self.orientation = corrected;
        self.last_time = time;
        self.last_gyro = measurement.gyro;
        self.history.push(time, corrected);
        Ok(())
    }

    fn current_orientation(&self) -> UnitQuaternion<f64> {
        self.orientation
    }

    fn orientation_history(&self) -> &OrientationHistory {
        &self.history
    }

    fn finish(self) -> OrientationHistory {
        self.history
    }
}

/// Quaternion-rate feedback complementary filter
#[derive(Debug, Clone)]
pub struct ComplementaryB {
    config: ComplementaryBConfig,
    up: Option<Vector3<f64>>,
    orientation: UnitQuaternion<f64>,
    last_time: f64,
    last_gyro: Vector3<f64>,
    history: OrientationHistory,
}

impl ComplementaryB {
    pub fn new(
        config: ComplementaryBConfig,
        environment: &Environment,
        first: &ImuMeasurement,
        initial_orientation: UnitQuaternion<f64>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            up: environment.up(),
            orientation: initial_orientation,
            last_time: first.timestamp,
            last_gyro: first.gyro,
            history: OrientationHistory::new(first.timestamp, initial_orientation),
        })
    }
}

impl OrientationFilter for ComplementaryB {
    fn update(&mut self, measurement: &ImuMeasurement) -> Result<(), FilterError> {
        let time = measurement.timestamp;
        let dt = causal_step(self.last_time, time)?;

        let predicted = propagate(&self.orientation, &self.last_gyro, dt);

        let target = self
            .up
            .and_then(|up| gravity_aligned(&predicted, &measurement.accel, &up));
        let corrected = match target {
            Some(target) => {
                // q and -q are the same rotation; feed back along the short way
                let target = align_hemisphere(&predicted, &target);
                let step = (self.config.gain * dt).min(1.0);
                let q = predicted.into_inner() + (target.into_inner() - predicted.into_inner()) * step;
                UnitQuaternion::new_normalize(q)
            }
            None => predicted,
        };
        check_finite(time, &corrected)?;

        self.orientation = corrected;
        self.last_time = time;
        self.last_gyro = measurement.gyro;
        self.history.push(time, corrected);
        Ok(())
    }

    fn current_orientation(&self) -> UnitQuaternion<f64> {
        self.orientation
    }

    fn orientation_history(&self) -> &OrientationHistory {
        &self.history
    }

    fn finish(self) -> OrientationHistory {
        self.history
    }
}
