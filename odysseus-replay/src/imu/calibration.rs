//! Scale-and-offset calibration of a simulated IMU
//!
//! The sensor is put through a fixed set of positions with known true readings:
//! - six static poses with gravity along ±x, ±y and ±z of the sensor
//! - six spins at ±rotational_velocity about each sensor axis, spin axis held vertical
//!
//! Each position is sampled `sample_count` times and averaged. For each channel an affine
//! map `true ≈ scale · raw + offset` is then fitted by least squares.

use nalgebra::{Matrix3, Matrix4, Matrix4x3, Vector3, Vector4};
use tracing::{debug, info};

use super::environment::Environment;
use super::simulator::SensorModel;
use super::types::{ImuMeasurement, SimulatedImu};
use crate::error::{CalibrationError, ConfigError};

/// Smallest acceptable eigenvalue ratio of the normal equations
const MIN_CONDITION: f64 = 1e-12;

/// Affine correction of one sensor triad
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCalibration {
    pub scale: Matrix3<f64>,
    pub offset: Vector3<f64>,
}

impl ChannelCalibration {
    pub fn identity() -> Self {
        Self {
            scale: Matrix3::identity(),
            offset: Vector3::zeros(),
        }
    }

    /// Corrected reading: scale · raw + offset
    pub fn apply(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        self.scale * raw + self.offset
    }
}

impl Default for ChannelCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

/// Calibration of both channels, computed once per run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationParameters {
    pub gyroscope: ChannelCalibration,
    pub accelerometer: ChannelCalibration,
}

impl CalibrationParameters {
    pub fn apply(&self, raw: &ImuMeasurement) -> ImuMeasurement {
        ImuMeasurement::new(
            raw.timestamp,
            self.gyroscope.apply(&raw.gyro),
            self.accelerometer.apply(&raw.accel),
        )
    }

    /// Correct both streams of a simulated segment in place
    pub fn apply_to(&self, imu: &mut SimulatedImu) {
        imu.gyroscope.map_values(|v| self.gyroscope.apply(v));
        imu.accelerometer.map_values(|v| self.accelerometer.apply(v));
    }
}

/// Accumulates the normal equations of one channel's affine fit
struct AffineFit {
    xtx: Matrix4<f64>,
    xty: Matrix4x3<f64>,
}

impl AffineFit {
    fn new() -> Self {
        Self {
            xtx: Matrix4::zeros(),
            xty: Matrix4x3::zeros(),
        }
    }

    fn add(&mut self, raw: &Vector3<f64>, truth: &Vector3<f64>) {
        let x = Vector4::new(raw.x, raw.y, raw.z, 1.0);
        self.xtx += x * x.transpose();
        self.xty += x * truth.transpose();
    }

    fn solve(self, channel: &'static str) -> Result<ChannelCalibration, CalibrationError> {
        let singular = CalibrationError::SingularFit { channel };

        let eigenvalues = self.xtx.symmetric_eigenvalues();
        let max = eigenvalues.amax();
        let min = eigenvalues.min();
        if max.is_nan() || max <= 0.0 || min <= max * MIN_CONDITION {
            return Err(singular);
        }

        let cholesky = self.xtx.cholesky().ok_or_else(|| singular.clone())?;
        let coefficients = cholesky.solve(&self.xty);
        if !coefficients.iter().all(|c| c.is_finite()) {
            return Err(singular);
        }

        // Rows 0..3 hold scaleᵀ, row 3 holds offsetᵀ
        let scale = coefficients.fixed_view::<3, 3>(0, 0).transpose();
        let offset = coefficients.fixed_view::<1, 3>(3, 0).transpose();

        Ok(ChannelCalibration { scale, offset })
    }
}

/// Scale and offset calibrator
#[derive(Debug, Clone)]
pub struct ScaleAndOffsetCalibrator {
    environment: Environment,
    sample_count: usize,
    sampling_period: f64,
    /// Spin rate (rad/s)
    rotational_velocity: f64,
}

impl ScaleAndOffsetCalibrator {
    /// Create a calibrator
    ///
    /// # Arguments
    /// * `environment` - Supplies the gravity magnitude for the static poses
    /// * `sample_count` - Samples averaged per position (at least 1)
    /// * `sampling_period` - Sampling period (s)
    /// * `rotational_velocity` - Spin rate (rad/s)
    pub fn new(
        environment: Environment,
        sample_count: usize,
        sampling_period: f64,
        rotational_velocity: f64,
    ) -> Result<Self, ConfigError> {
        if sample_count == 0 {
            return Err(ConfigError::InvalidCalibration {
                name: "sample_count",
                value: 0.0,
            });
        }
        if !sampling_period.is_finite() || sampling_period <= 0.0 {
            return Err(ConfigError::InvalidSamplingPeriod(sampling_period));
        }
        if !rotational_velocity.is_finite() || rotational_velocity <= 0.0 {
            return Err(ConfigError::InvalidCalibration {
                name: "rotational_velocity",
                value: rotational_velocity,
            });
        }
        if environment.gravity_magnitude() <= 0.0 {
            let g = environment.gravity();
            return Err(ConfigError::InvalidGravity([g.x, g.y, g.z]));
        }

        Ok(Self {
            environment,
            sample_count,
            sampling_period,
            rotational_velocity,
        })
    }

    /// (true angular velocity, true specific force) for every calibration position
    fn positions(&self) -> Vec<(Vector3<f64>, Vector3<f64>)> {
        let g = self.environment.gravity_magnitude();
        let mut positions = Vec::with_capacity(12);

        for axis in 0..3 {
            for sign in [1.0, -1.0] {
                let unit = Vector3::ith(axis, sign);
                positions.push((Vector3::zeros(), unit * g));
            }
        }
        for axis in 0..3 {
            let up = Vector3::ith(axis, g);
            for sign in [1.0, -1.0] {
                positions.push((Vector3::ith(axis, sign * self.rotational_velocity), up));
            }
        }

        positions
    }

    /// Run the procedure against `sensor` and fit both channels
    pub fn calibrate(
        &self,
        sensor: &mut dyn SensorModel,
    ) -> Result<CalibrationParameters, CalibrationError> {
        let mut gyro_fit = AffineFit::new();
        let mut accel_fit = AffineFit::new();
        let n = self.sample_count as f64;

        for (omega, force) in self.positions() {
            let (mut gyro_sum, mut accel_sum) = (Vector3::zeros(), Vector3::zeros());
            for _ in 0..self.sample_count {
                let (gyro, accel) = sensor.measure(self.sampling_period, &omega, &force);
                gyro_sum += gyro;
                accel_sum += accel;
            }
            gyro_fit.add(&(gyro_sum / n), &omega);
            accel_fit.add(&(accel_sum / n), &force);
        }

        let params = CalibrationParameters {
            gyroscope: gyro_fit.solve("gyroscope")?,
            accelerometer: accel_fit.solve("accelerometer")?,
        };

        debug!(
            gyro_offset = ?params.gyroscope.offset,
            accel_offset = ?params.accelerometer.offset,
            "Calibration offsets"
        );
        info!(
            positions = 12,
            samples_per_position = self.sample_count,
            "IMU calibration complete"
        );

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imu::simulator::{IdealSensor, ImuVariant};
    use approx::assert_abs_diff_eq;

    /// Sensor with a known affine error and no noise
    struct BiasedSensor {
        scale: Matrix3<f64>,
        bias: Vector3<f64>,
    }

    impl SensorModel for BiasedSensor {
        fn measure(
            &mut self,
            _dt: f64,
            angular_velocity: &Vector3<f64>,
            specific_force: &Vector3<f64>,
        ) -> (Vector3<f64>, Vector3<f64>) {
            (
                self.scale * angular_velocity + self.bias,
                self.scale * specific_force - self.bias,
            )
        }
    }

    /// Sensor stuck at one reading
    struct StuckSensor;

    impl SensorModel for StuckSensor {
        fn measure(
            &mut self,
            _dt: f64,
            _angular_velocity: &Vector3<f64>,
            _specific_force: &Vector3<f64>,
        ) -> (Vector3<f64>, Vector3<f64>) {
            (Vector3::new(0.1, 0.2, 0.3), Vector3::new(0.0, 0.0, 9.81))
        }
    }

    fn calibrator(sample_count: usize) -> ScaleAndOffsetCalibrator {
        ScaleAndOffsetCalibrator::new(Environment::default(), sample_count, 1.0 / 366.0, 20.0)
            .unwrap()
    }

    #[test]
    fn test_ideal_sensor_gives_identity() {
        let params = calibrator(10).calibrate(&mut IdealSensor).unwrap();

        assert_abs_diff_eq!(params.gyroscope.scale, Matrix3::identity(), epsilon = 1e-9);
        assert_abs_diff_eq!(params.gyroscope.offset, Vector3::zeros(), epsilon = 1e-9);
        assert_abs_diff_eq!(params.accelerometer.scale, Matrix3::identity(), epsilon = 1e-9);
        assert_abs_diff_eq!(params.accelerometer.offset, Vector3::zeros(), epsilon = 1e-9);
    }

    #[test]
    fn test_recovers_known_affine_error() {
        let scale = Matrix3::new(1.02, 0.01, 0.0, -0.005, 0.97, 0.002, 0.0, 0.003, 1.01);
        let bias = Vector3::new(0.05, -0.02, 0.1);
        let mut sensor = BiasedSensor { scale, bias };

        let params = calibrator(5).calibrate(&mut sensor).unwrap();

        let truth = Vector3::new(0.3, -1.2, 2.0);
        let (raw_gyro, raw_accel) = sensor.measure(0.01, &truth, &truth);
        assert_abs_diff_eq!(params.gyroscope.apply(&raw_gyro), truth, epsilon = 1e-9);
        assert_abs_diff_eq!(params.accelerometer.apply(&raw_accel), truth, epsilon = 1e-9);
    }

    #[test]
    fn test_realistic_sensor_is_corrected() {
        let mut sensor = ImuVariant::Realistic1.build_sensor(3, u64::MAX);
        let params = calibrator(1000).calibrate(sensor.as_mut()).unwrap();

        // Same device, different noise stream; average to suppress white noise
        let mut check = ImuVariant::Realistic1.build_sensor(3, 0);
        let force = Vector3::new(0.0, 0.0, 9.81);
        let n = 200;
        let mut mean_raw = Vector3::zeros();
        for _ in 0..n {
            let (_, accel) = check.measure(1.0 / 366.0, &Vector3::zeros(), &force);
            mean_raw += accel / n as f64;
        }

        let raw_error = (mean_raw - force).norm();
        let corrected_error = (params.accelerometer.apply(&mean_raw) - force).norm();
        assert!(corrected_error < raw_error);
        assert!(corrected_error < 0.02, "corrected error {corrected_error}");
    }

    #[test]
    fn test_stuck_sensor_is_singular() {
        let err = calibrator(3).calibrate(&mut StuckSensor).unwrap_err();
        assert_eq!(err, CalibrationError::SingularFit { channel: "gyroscope" });
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let env = Environment::default();
        assert!(matches!(
            ScaleAndOffsetCalibrator::new(env, 0, 0.01, 20.0),
            Err(ConfigError::InvalidCalibration { name: "sample_count", .. })
        ));
        assert!(matches!(
            ScaleAndOffsetCalibrator::new(env, 10, 0.01, -1.0),
            Err(ConfigError::InvalidCalibration { name: "rotational_velocity", .. })
        ));
        assert!(matches!(
            ScaleAndOffsetCalibrator::new(env, 10, 0.0, 20.0),
            Err(ConfigError::InvalidSamplingPeriod(_))
        ));
    }

    #[test]
    fn test_apply_corrects_whole_segment() {
        let params = CalibrationParameters {
            gyroscope: ChannelCalibration {
                scale: Matrix3::identity() * 2.0,
                offset: Vector3::zeros(),
            },
            accelerometer: ChannelCalibration {
                scale: Matrix3::identity(),
                offset: Vector3::new(0.0, 0.0, -1.0),
            },
        };
        let mut imu = SimulatedImu {
            gyroscope: [(0.0, Vector3::x())].into_iter().collect(),
            accelerometer: [(0.0, Vector3::z())].into_iter().collect(),
        };

        params.apply_to(&mut imu);
        let m: Vec<_> = imu.measurements().collect();
        assert_eq!(m[0].gyro, Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(m[0].accel, Vector3::zeros());
    }
}
