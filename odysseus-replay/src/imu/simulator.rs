//! IMU Simulator
//!
//! Samples a continuous ground-truth trajectory at a fixed rate and turns the true
//! body-frame angular velocity and specific force into sensor readings through a
//! [`SensorModel`]. The ideal model passes truth through; the realistic models add
//! per-device constant errors and per-segment noise.

use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::environment::Environment;
use super::types::{MeasurementStream, SimulatedImu};
use crate::error::{ConfigError, SegmentError};
use crate::math::quaternion::rotate_vector;
use crate::trajectory::ContinuousTrajectory;

/// Relative tolerance when deciding whether the sampling grid lands on a segment end
const GRID_TOLERANCE: f64 = 1e-9;

/// Mixed into the device seed so noise never replays the constant-error draws
const NOISE_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Which sensor model to simulate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImuVariant {
    /// Noise-free, error-free sensor
    #[default]
    #[serde(rename = "ideal")]
    Ideal,
    /// Consumer-grade MEMS sensor
    #[serde(rename = "realistic-1")]
    Realistic1,
    /// Low-cost MEMS sensor with larger errors
    #[serde(rename = "realistic-2")]
    Realistic2,
}

impl ImuVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImuVariant::Ideal => "ideal",
            ImuVariant::Realistic1 => "realistic-1",
            ImuVariant::Realistic2 => "realistic-2",
        }
    }

    /// Noise parameters for this variant
    pub fn noise_params(&self) -> ImuNoiseParams {
        match self {
            ImuVariant::Ideal => ImuNoiseParams::zero(),
            ImuVariant::Realistic1 => ImuNoiseParams::consumer_grade(),
            ImuVariant::Realistic2 => ImuNoiseParams::low_cost(),
        }
    }

    /// Build a sensor instance
    ///
    /// # Arguments
    /// * `device_seed` - Seed for the per-device constant errors (same device every segment)
    /// * `stream` - Noise stream; use a different stream per segment
    pub fn build_sensor(&self, device_seed: u64, stream: u64) -> Box<dyn SensorModel> {
        match self {
            ImuVariant::Ideal => Box::new(IdealSensor),
            _ => Box::new(NoisySensor::new(self.noise_params(), device_seed, stream)),
        }
    }
}

impl fmt::Display for ImuVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImuVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ideal" => Ok(ImuVariant::Ideal),
            "realistic-1" => Ok(ImuVariant::Realistic1),
            "realistic-2" => Ok(ImuVariant::Realistic2),
            other => Err(ConfigError::UnknownImuVariant(other.to_string())),
        }
    }
}

/// Converts true motion into raw sensor readings
pub trait SensorModel {
    /// One reading
    ///
    /// # Arguments
    /// * `dt` - Sampling period (s), used to scale white noise and bias random walk
    /// * `angular_velocity` - True body-frame angular velocity (rad/s)
    /// * `specific_force` - True body-frame specific force (m/s²)
    ///
    /// # Returns
    /// (gyroscope, accelerometer) readings
    fn measure(
        &mut self,
        dt: f64,
        angular_velocity: &Vector3<f64>,
        specific_force: &Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>);
}

/// Sensor that reports the truth
#[derive(Debug, Clone, Copy, Default)]
pub struct IdealSensor;

impl SensorModel for IdealSensor {
    fn measure(
        &mut self,
        _dt: f64,
        angular_velocity: &Vector3<f64>,
        specific_force: &Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>) {
        (*angular_velocity, *specific_force)
    }
}

/// IMU noise parameters
///
/// White noise and bias random walk follow the usual continuous-time densities.
/// The constant terms are standard deviations of errors drawn once per device.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuNoiseParams {
    /// Gyroscope white noise density (rad/s/√Hz)
    pub gyro_noise_density: f64,
    /// Accelerometer white noise density (m/s²/√Hz)
    pub accel_noise_density: f64,
    /// Gyroscope bias random walk (rad/s²/√Hz)
    pub gyro_bias_random_walk: f64,
    /// Accelerometer bias random walk (m/s³/√Hz)
    pub accel_bias_random_walk: f64,
    /// Gyroscope turn-on bias (rad/s)
    pub gyro_turn_on_bias: f64,
    /// Accelerometer turn-on bias (m/s²)
    pub accel_turn_on_bias: f64,
    /// Per-axis scale factor error (fraction)
    pub scale_error: f64,
    /// Axis non-orthogonality (rad)
    pub misalignment: f64,
}

impl ImuNoiseParams {
    /// Noise-free IMU (for testing)
    pub fn zero() -> Self {
        Self {
            gyro_noise_density: 0.0,
            accel_noise_density: 0.0,
            gyro_bias_random_walk: 0.0,
            accel_bias_random_walk: 0.0,
            gyro_turn_on_bias: 0.0,
            accel_turn_on_bias: 0.0,
            scale_error: 0.0,
            misalignment: 0.0,
        }
    }

    /// ICM-20602 class IMU
    /// Gyro noise density: 7e-5
    /// Accel noise density: 1e-3
    /// estimated safe bias random walk:
    /// gyro: 4e-6
    /// accel: 4e-4
    pub fn consumer_grade() -> Self {
        Self {
            gyro_noise_density: 7e-5,
            accel_noise_density: 1e-3,
            gyro_bias_random_walk: 4e-6,
            accel_bias_random_walk: 4e-4,
            gyro_turn_on_bias: 2e-3,
            accel_turn_on_bias: 2e-2,
            scale_error: 3e-3,
            misalignment: 1e-3,
        }
    }

    /// BMI055 class IMU
    /// - gyro_noise_density: 0.004 rad/s/√Hz
    /// - accel_noise_density: 0.08 m/s²/√Hz
    /// - gyro_bias_random_walk: 0.0002 rad/s²/√Hz
    /// - accel_bias_random_walk: 0.003 m/s³/√Hz
    pub fn low_cost() -> Self {
        Self {
            gyro_noise_density: 4e-3,
            accel_noise_density: 8e-2,
            gyro_bias_random_walk: 2e-4,
            accel_bias_random_walk: 3e-3,
            gyro_turn_on_bias: 1e-2,
            accel_turn_on_bias: 1e-1,
            scale_error: 1e-2,
            misalignment: 5e-3,
        }
    }
}

impl Default for ImuNoiseParams {
    fn default() -> Self {
        Self::consumer_grade()
    }
}

/// Constant errors of one sensor triad
#[derive(Debug, Clone, PartialEq)]
struct TriadErrors {
    /// Scale and misalignment
    transform: Matrix3<f64>,
    /// Turn-on bias
    bias: Vector3<f64>,
}

impl TriadErrors {
    fn draw<R: Rng>(rng: &mut R, scale_error: f64, misalignment: f64, bias: f64) -> Self {
        let scale = Matrix3::from_diagonal(&Vector3::from_fn(|_, _| {
            1.0 + scale_error * standard_normal(rng)
        }));
        let skew = Matrix3::from_fn(|r, c| {
            if r == c {
                1.0
            } else {
                misalignment * standard_normal(rng)
            }
        });
        Self {
            transform: scale * skew,
            bias: gaussian_vector(rng, bias),
        }
    }
}

/// Sensor with constant device errors, white noise and bias random walk
pub struct NoisySensor {
    params: ImuNoiseParams,
    gyro_errors: TriadErrors,
    accel_errors: TriadErrors,
    /// Current bias random walk state
    gyro_walk: Vector3<f64>,
    accel_walk: Vector3<f64>,
    rng: ChaCha8Rng,
}

impl NoisySensor {
    /// Create a sensor
    ///
    /// Constant errors depend only on `device_seed`; noise depends on both the seed and `stream`.
    pub fn new(params: ImuNoiseParams, device_seed: u64, stream: u64) -> Self {
        let mut device_rng = ChaCha8Rng::seed_from_u64(device_seed);
        let gyro_errors = TriadErrors::draw(
            &mut device_rng,
            params.scale_error,
            params.misalignment,
            params.gyro_turn_on_bias,
        );
        let accel_errors = TriadErrors::draw(
            &mut device_rng,
            params.scale_error,
            params.misalignment,
            params.accel_turn_on_bias,
        );

        let mut rng = ChaCha8Rng::seed_from_u64(device_seed ^ NOISE_SEED_SALT);
        rng.set_stream(stream);

        Self {
            params,
            gyro_errors,
            accel_errors,
            gyro_walk: Vector3::zeros(),
            accel_walk: Vector3::zeros(),
            rng,
        }
    }
}

impl SensorModel for NoisySensor {
    fn measure(
        &mut self,
        dt: f64,
        angular_velocity: &Vector3<f64>,
        specific_force: &Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>) {
        let white_scale = 1.0 / dt.sqrt();
        let gyro_noise = gaussian_vector(&mut self.rng, self.params.gyro_noise_density * white_scale);
        let accel_noise = gaussian_vector(&mut self.rng, self.params.accel_noise_density * white_scale);

        self.gyro_walk += gaussian_vector(&mut self.rng, self.params.gyro_bias_random_walk * dt.sqrt());
        self.accel_walk += gaussian_vector(&mut self.rng, self.params.accel_bias_random_walk * dt.sqrt());

        let gyro = self.gyro_errors.transform * angular_velocity
            + self.gyro_errors.bias
            + self.gyro_walk
            + gyro_noise;
        let accel = self.accel_errors.transform * specific_force
            + self.accel_errors.bias
            + self.accel_walk
            + accel_noise;

        (gyro, accel)
    }
}

fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    rng.sample(StandardNormal)
}

/// Zero-mean Gaussian vector, skipped entirely when sigma is negligible
fn gaussian_vector<R: Rng>(rng: &mut R, sigma: f64) -> Vector3<f64> {
    if sigma < 1e-15 {
        return Vector3::zeros();
    }
    Vector3::new(
        sigma * standard_normal(rng),
        sigma * standard_normal(rng),
        sigma * standard_normal(rng),
    )
}

/// Sample times `start + k * period` within a segment
///
/// The end point is included only when `closed_end` is set and the grid lands on it
/// (within a small tolerance), in which case the sample is placed exactly at `end`.
pub fn sample_times(start: f64, end: f64, period: f64, closed_end: bool) -> Vec<f64> {
    let span = (end - start) / period;
    let steps = (span + GRID_TOLERANCE).floor().max(0.0) as usize;
    let lands_on_end = (span - steps as f64).abs() < GRID_TOLERANCE;

    let mut times = Vec::with_capacity(steps + 1);
    for k in 0..=steps {
        if k == steps && lands_on_end {
            if closed_end {
                times.push(end);
            }
        } else {
            times.push(start + k as f64 * period);
        }
    }
    times
}

/// IMU Simulator
///
/// Generates synthetic IMU measurements from a continuous trajectory for one segment.
pub struct ImuSimulator {
    sensor: Box<dyn SensorModel>,
    /// Sampling period (s)
    sampling_period: f64,
}

impl ImuSimulator {
    pub fn new(sensor: Box<dyn SensorModel>, sampling_period: f64) -> Self {
        Self {
            sensor,
            sampling_period,
        }
    }

    /// Create a noise-free simulator for testing
    pub fn ideal(sampling_period: f64) -> Self {
        Self::new(Box::new(IdealSensor), sampling_period)
    }

    /// Simulate gyroscope and accelerometer streams over `[start, end)` or `[start, end]`
    ///
    /// The accelerometer reports specific force `R(t)ᵀ (a(t) − g)`.
    pub fn simulate<T: ContinuousTrajectory + ?Sized>(
        &mut self,
        trajectory: &T,
        environment: &Environment,
        start: f64,
        end: f64,
        closed_end: bool,
    ) -> Result<SimulatedImu, SegmentError> {
        if end.is_nan() || start.is_nan() || end <= start {
            return Err(SegmentError::EmptySegment { start, end });
        }

        let times = sample_times(start, end, self.sampling_period, closed_end);
        if times.is_empty() {
            return Err(SegmentError::EmptySegment { start, end });
        }

        let gravity = environment.gravity();
        let mut gyroscope = MeasurementStream::with_capacity(times.len());
        let mut accelerometer = MeasurementStream::with_capacity(times.len());

        for t in times {
            let omega = trajectory.angular_velocity(t)?;
            let accel_world = trajectory.acceleration(t)?;
            let world_from_body = trajectory.orientation(t)?;

            let specific_force = rotate_vector(&world_from_body.inverse(), &(accel_world - gravity));
            let (gyro, accel) = self
                .sensor
                .measure(self.sampling_period, &omega, &specific_force);

            gyroscope.push(t, gyro);
            accelerometer.push(t, accel);
        }

        Ok(SimulatedImu {
            gyroscope,
            accelerometer,
        })
    }
}
