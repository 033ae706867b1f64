//! Orientation filters
//!
//! Every filter follows the same life cycle:
//! - constructed from the segment's first measurement and a seed orientation
//! - updated once per later measurement, timestamps strictly increasing
//! - finished, which consumes the filter and returns its orientation history
//!
//! The history always holds one orientation per measurement, seed included.
//!
//! Variants:
//! - `GyroIntegrator`: gyro propagation only, drift is reproduced
//! - `ComplementaryA`: slerp toward the gravity-aligned orientation, gated on |a|
//! - `ComplementaryB`: quaternion-rate feedback toward the gravity-aligned orientation
//! - `QuaternionEkf`: angular velocity + quaternion EKF

pub mod complementary;
pub mod ekf;
pub mod integrator;

use std::fmt;
use std::str::FromStr;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FilterError};
use crate::imu::{Environment, ImuMeasurement};

pub use complementary::{ComplementaryA, ComplementaryAConfig, ComplementaryB, ComplementaryBConfig};
pub use ekf::{EkfConfig, QuaternionEkf};
pub use integrator::GyroIntegrator;

/// Timestamped orientation estimates, one per processed measurement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrientationHistory {
    pub timestamps: Vec<f64>,
    pub orientations: Vec<UnitQuaternion<f64>>,
}

impl OrientationHistory {
    pub fn new(t0: f64, q0: UnitQuaternion<f64>) -> Self {
        Self {
            timestamps: vec![t0],
            orientations: vec![q0],
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(capacity),
            orientations: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, t: f64, q: UnitQuaternion<f64>) {
        self.timestamps.push(t);
        self.orientations.push(q);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn last(&self) -> Option<(f64, UnitQuaternion<f64>)> {
        Some((*self.timestamps.last()?, *self.orientations.last()?))
    }
}

/// Common interface of the orientation filter family
pub trait OrientationFilter {
    /// Process the next measurement
    ///
    /// Fails with `NonCausal` unless `measurement.timestamp` is strictly later than the
    /// previous one.
    fn update(&mut self, measurement: &ImuMeasurement) -> Result<(), FilterError>;

    fn current_orientation(&self) -> UnitQuaternion<f64>;

    fn orientation_history(&self) -> &OrientationHistory;

    /// Consume the filter, returning its history
    fn finish(self) -> OrientationHistory
    where
        Self: Sized;

    /// Run every measurement in order
    fn run<'a, I>(&mut self, measurements: I) -> Result<(), FilterError>
    where
        I: IntoIterator<Item = &'a ImuMeasurement>,
    {
        for measurement in measurements {
            self.update(measurement)?;
        }
        Ok(())
    }
}

/// Time step to `time`, or `NonCausal` if it does not move forward
pub(crate) fn causal_step(last: f64, time: f64) -> Result<f64, FilterError> {
    let dt = time - last;
    if dt.is_finite() && dt > 0.0 {
        Ok(dt)
    } else {
        Err(FilterError::NonCausal { time, last })
    }
}

/// Reject non-finite orientations before they reach the history
pub(crate) fn check_finite(time: f64, q: &UnitQuaternion<f64>) -> Result<(), FilterError> {
    if q.coords.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(FilterError::Diverged {
            time,
            reason: "non-finite orientation",
        })
    }
}

/// Gyro propagation: q ⊗ exp(ω Δt)
pub(crate) fn propagate(q: &UnitQuaternion<f64>, gyro: &Vector3<f64>, dt: f64) -> UnitQuaternion<f64> {
    let q = q * crate::math::exp(&(gyro * dt));
    UnitQuaternion::new_normalize(q.into_inner())
}

/// Orientation whose body-frame specific force points straight up
///
/// Built from `q` by the smallest rotation that aligns `q · accel` with `up`, so the
/// heading of `q` is kept. None when the reading carries no direction.
pub(crate) fn gravity_aligned(
    q: &UnitQuaternion<f64>,
    accel: &Vector3<f64>,
    up: &Vector3<f64>,
) -> Option<UnitQuaternion<f64>> {
    if accel.norm() < 1e-9 {
        return None;
    }
    let measured_up = q * accel;
    let correction = UnitQuaternion::rotation_between(&measured_up, up)?;
    Some(correction * q)
}

/// Filter selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Integrator,
    ComplementaryA,
    ComplementaryB,
    Ekf,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Integrator => "integrator",
            FilterKind::ComplementaryA => "complementary-a",
            FilterKind::ComplementaryB => "complementary-b",
            FilterKind::Ekf => "ekf",
        }
    }

    /// Configuration of this kind with default parameters
    pub fn default_config(&self) -> FilterConfig {
        match self {
            FilterKind::Integrator => FilterConfig::Integrator,
            FilterKind::ComplementaryA => FilterConfig::ComplementaryA(ComplementaryAConfig::default()),
            FilterKind::ComplementaryB => FilterConfig::ComplementaryB(ComplementaryBConfig::default()),
            FilterKind::Ekf => FilterConfig::Ekf(EkfConfig::default()),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integrator" => Ok(FilterKind::Integrator),
            "complementary-a" => Ok(FilterKind::ComplementaryA),
            "complementary-b" => Ok(FilterKind::ComplementaryB),
            "ekf" => Ok(FilterKind::Ekf),
            other => Err(ConfigError::UnknownFilter(other.to_string())),
        }
    }
}

/// Filter selection with parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FilterConfig {
    #[default]
    Integrator,
    ComplementaryA(ComplementaryAConfig),
    ComplementaryB(ComplementaryBConfig),
    Ekf(EkfConfig),
}

impl FilterConfig {
    pub fn kind(&self) -> FilterKind {
        match self {
            FilterConfig::Integrator => FilterKind::Integrator,
            FilterConfig::ComplementaryA(_) => FilterKind::ComplementaryA,
            FilterConfig::ComplementaryB(_) => FilterKind::ComplementaryB,
            FilterConfig::Ekf(_) => FilterKind::Ekf,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            FilterConfig::Integrator => Ok(()),
            FilterConfig::ComplementaryA(config) => config.validate(),
            FilterConfig::ComplementaryB(config) => config.validate(),
            FilterConfig::Ekf(config) => config.validate(),
        }
    }
}

/// Closed set of orientation filters selected at run time
#[derive(Debug, Clone)]
pub enum OrientationEstimator {
    Integrator(GyroIntegrator),
    ComplementaryA(ComplementaryA),
    ComplementaryB(ComplementaryB),
    Ekf(QuaternionEkf),
}

impl OrientationEstimator {
    /// Build a fresh filter seeded with `initial_orientation` at the first measurement
    pub fn new(
        config: &FilterConfig,
        environment: &Environment,
        first: &ImuMeasurement,
        initial_orientation: UnitQuaternion<f64>,
    ) -> Result<Self, ConfigError> {
        Ok(match config {
            FilterConfig::Integrator => {
                OrientationEstimator::Integrator(GyroIntegrator::new(first, initial_orientation))
            }
            FilterConfig::ComplementaryA(params) => OrientationEstimator::ComplementaryA(
                ComplementaryA::new(params.clone(), environment, first, initial_orientation)?,
            ),
            FilterConfig::ComplementaryB(params) => OrientationEstimator::ComplementaryB(
                ComplementaryB::new(params.clone(), environment, first, initial_orientation)?,
            ),
            FilterConfig::Ekf(params) => OrientationEstimator::Ekf(QuaternionEkf::new(
                params.clone(),
                environment,
                first,
                initial_orientation,
            )?),
        })
    }
}

impl OrientationFilter for OrientationEstimator {
    fn update(&mut self, measurement: &ImuMeasurement) -> Result<(), FilterError> {
        match self {
            OrientationEstimator::Integrator(f) => f.update(measurement),
            OrientationEstimator::ComplementaryA(f) => f.update(measurement),
            OrientationEstimator::ComplementaryB(f) => f.update(measurement),
            OrientationEstimator::Ekf(f) => f.update(measurement),
        }
    }

    fn current_orientation(&self) -> UnitQuaternion<f64> {
        match self {
            OrientationEstimator::Integrator(f) => f.current_orientation(),
            OrientationEstimator::ComplementaryA(f) => f.current_orientation(),
            OrientationEstimator::ComplementaryB(f) => f.current_orientation(),
            OrientationEstimator::Ekf(f) => f.current_orientation(),
        }
    }

    fn orientation_history(&self) -> &OrientationHistory {
        match self {
            OrientationEstimator::Integrator(f) => f.orientation_history(),
            OrientationEstimator::ComplementaryA(f) => f.orientation_history(),
            OrientationEstimator::ComplementaryB(f) => f.orientation_history(),
            OrientationEstimator::Ekf(f) => f.orientation_history(),
        }
    }

    fn finish(self) -> OrientationHistory {
        match self {
            OrientationEstimator::Integrator(f) => f.finish(),
            OrientationEstimator::ComplementaryA(f) => f.finish(),
            OrientationEstimator::ComplementaryB(f) => f.finish(),
            OrientationEstimator::Ekf(f) => f.finish(),
        }
    }
}
