//! Quaternion Extended Kalman Filter for IMU attitude estimation
//!
//! # State Vector (7 elements)
//! - ωx, ωy, ωz: Body angular velocity (rad/s), modelled as a first-order Gauss-Markov process
//! - qw, qx, qy, qz: Orientation quaternion
//!
//! # Model
//! Predict:
//! - ω ← e^{−Δt/τ} ω
//! - q ← q + ½ Δt q ⊗ (0, ω), renormalized after the update
//! - P ← Φ P Φᵀ + Q, with Q_ω = D/(2τ) (1 − e^{−2Δt/τ}) on the rate block
//!
//! Update against z = [ω_gyro, q_meas] with H = I₇, where q_meas is the gravity-aligned
//! orientation built from the accelerometer and the predicted heading.

use nalgebra::{Matrix3, Matrix4, Matrix4x3, SMatrix, SVector, UnitQuaternion, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use super::{causal_step, gravity_aligned, OrientationFilter, OrientationHistory};
use crate::error::{ConfigError, FilterError};
use crate::imu::{Environment, ImuMeasurement};
use crate::math::align_hemisphere;

type Vector7 = SVector<f64, 7>;
type Matrix7 = SMatrix<f64, 7, 7>;

/// EKF Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EkfConfig {
    /// Diagonal of the initial state covariance [ω (3), q (4)]
    pub initial_covariance: [f64; 7],
    /// Diagonal of the measurement covariance [gyro (3), q_meas (4)]
    pub measurement_covariance: [f64; 7],
    /// Diagonal process covariance added on top of the angular velocity noise
    pub process_covariance: [f64; 7],
    /// Angular velocity process noise intensity
    pub d: f64,
    /// Angular velocity correlation time constant (s)
    pub tau: f64,
}

const DEFAULT_COVARIANCE: [f64; 7] = [0.01, 0.01, 0.01, 0.0001, 0.0001, 0.0001, 0.0001];

impl Default for EkfConfig {
    fn default() -> Self {
        Self {
            initial_covariance: DEFAULT_COVARIANCE,
            measurement_covariance: DEFAULT_COVARIANCE,
            process_covariance: [0.0; 7],
            d: 50.0,
            tau: 0.5,
        }
    }
}

impl EkfConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The measurement covariance keeps P + R invertible once P collapses
        for (name, diagonal, positive) in [
            ("initial_covariance", &self.initial_covariance, false),
            ("measurement_covariance", &self.measurement_covariance, true),
            ("process_covariance", &self.process_covariance, false),
        ] {
            if let Some((index, &value)) = diagonal
                .iter()
                .enumerate()
                .find(|&(_, &v)| !v.is_finite() || v < 0.0 || (positive && v == 0.0))
            {
                return Err(ConfigError::InvalidCovariance { name, index, value });
            }
        }
        if !self.d.is_finite() || self.d < 0.0 {
            return Err(ConfigError::InvalidEkfParameter {
                name: "d",
                value: self.d,
            });
        }
        if !self.tau.is_finite() || self.tau <= 0.0 {
            return Err(ConfigError::InvalidEkfParameter {
                name: "tau",
                value: self.tau,
            });
        }
        Ok(())
    }
}

/// Ω(ω) such that q ⊗ (0, ω) = Ω(ω) q, quaternion as [w, x, y, z]
fn omega_matrix(omega: &Vector3<f64>) -> Matrix4<f64> {
    let (x, y, z) = (omega.x, omega.y, omega.z);
    Matrix4::new(
        0.0, -x, -y, -z, //
        x, 0.0, z, -y, //
        y, -z, 0.0, x, //
        z, y, -x, 0.0,
    )
}

/// Ξ(q) such that q ⊗ (0, ω) = Ξ(q) ω, quaternion as [w, x, y, z]
fn xi_matrix(q: &Vector4<f64>) -> Matrix4x3<f64> {
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);
    Matrix4x3::new(
        -x, -y, -z, //
        w, -z, y, //
        z, w, -x, //
        -y, x, w,
    )
}

fn wxyz(q: &UnitQuaternion<f64>) -> Vector4<f64> {
    Vector4::new(q.w, q.i, q.j, q.k)
}

/// Angular velocity + quaternion EKF
#[derive(Debug, Clone)]
pub struct QuaternionEkf {
    config: EkfConfig,
    up: Option<Vector3<f64>>,
    state: Vector7,
    covariance: Matrix7,
    measurement_noise: Matrix7,
    last_time: f64,
    history: OrientationHistory,
}

impl QuaternionEkf {
    pub fn new(
        config: EkfConfig,
        environment: &Environment,
        first: &ImuMeasurement,
        initial_orientation: UnitQuaternion<f64>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let q0 = wxyz(&initial_orientation);
        let state = Vector7::from_fn(|i, _| if i < 3 { 0.0 } else { q0[i - 3] });

        Ok(Self {
            covariance: Matrix7::from_diagonal(&Vector7::from(config.initial_covariance)),
            measurement_noise: Matrix7::from_diagonal(&Vector7::from(config.measurement_covariance)),
            up: environment.up(),
            state,
            last_time: first.timestamp,
            history: OrientationHistory::new(first.timestamp, initial_orientation),
            config,
        })
    }

    /// Current angular velocity estimate
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(0).into_owned()
    }

    pub fn covariance(&self) -> &Matrix7 {
        &self.covariance
    }

    fn quaternion(&self) -> Vector4<f64> {
        self.state.fixed_rows::<4>(3).into_owned()
    }

    fn orientation(&self) -> UnitQuaternion<f64> {
        let q = self.quaternion();
        UnitQuaternion::new_normalize(nalgebra::Quaternion::new(q[0], q[1], q[2], q[3]))
    }

    fn predict(&mut self, dt: f64) {
        let tau = self.config.tau;
        let decay = (-dt / tau).exp();
        let omega = self.angular_velocity();
        let q = self.quaternion();
        let omega_q = omega_matrix(&omega);

        let mut phi = Matrix7::zeros();
        phi.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(Matrix3::identity() * decay));
        phi.fixed_view_mut::<4, 3>(3, 0)
            .copy_from(&(xi_matrix(&q) * (0.5 * dt)));
        phi.fixed_view_mut::<4, 4>(3, 3)
            .copy_from(&(Matrix4::identity() + omega_q * (0.5 * dt)));

        let predicted_q = q + omega_q * q * (0.5 * dt);
        self.state.fixed_rows_mut::<3>(0).copy_from(&(omega * decay));
        self.state.fixed_rows_mut::<4>(3).copy_from(&predicted_q);

        let rate_noise = self.config.d / (2.0 * tau) * (1.0 - (-2.0 * dt / tau).exp());
        let mut process = Vector7::from(self.config.process_covariance);
        for i in 0..3 {
            process[i] += rate_noise;
        }

        self.covariance = phi * self.covariance * phi.transpose() + Matrix7::from_diagonal(&process);
    }

    fn correct(&mut self, measurement: &ImuMeasurement) -> Result<(), FilterError> {
        let time = measurement.timestamp;
        let predicted = self.orientation();

        // Without a usable accelerometer direction the quaternion part carries no information
        let q_meas = self
            .up
            .and_then(|up| gravity_aligned(&predicted, &measurement.accel, &up))
            .unwrap_or(predicted);
        let q_meas = wxyz(&align_hemisphere(&predicted, &q_meas));

        let z = Vector7::from_fn(|i, _| {
            if i < 3 {
                measurement.gyro[i]
            } else {
                q_meas[i - 3]
            }
        });

        let innovation = z - self.state;
        let s = self.covariance + self.measurement_noise;
        let s_inv = s.try_inverse().ok_or(FilterError::Diverged {
            time,
            reason: "singular innovation covariance",
        })?;
        let gain = self.covariance * s_inv;

        self.state += gain * innovation;
        let p = (Matrix7::identity() - gain) * self.covariance;
        self.covariance = (p + p.transpose()) * 0.5;

        let q = self.quaternion();
        let norm = q.norm();
        if !norm.is_finite() || norm < 1e-12 {
            return Err(FilterError::Diverged {
                time,
                reason: "degenerate quaternion",
            });
        }
        self.state.fixed_rows_mut::<4>(3).copy_from(&(q / norm));

        if !self.state.iter().all(|v| v.is_finite()) || !self.covariance.iter().all(|v| v.is_finite()) {
            return Err(FilterError::Diverged {
                time,
                reason: "non-finite state",
            });
        }
        Ok(())
    }
}

impl OrientationFilter for QuaternionEkf {
    fn update(&mut self, measurement: &ImuMeasurement) -> Result<(), FilterError> {
        let dt = causal_step(self.last_time, measurement.timestamp)?;

        self.predict(dt);
        self.correct(measurement)?;

        self.last_time = measurement.timestamp;
        self.history
            .push(measurement.timestamp, self.orientation());
        Ok(())
    }

    fn current_orientation(&self) -> UnitQuaternion<f64> {
        self.orientation()
    }

    fn orientation_history(&self) -> &OrientationHistory {
        &self.history
    }

    fn finish(self) -> OrientationHistory {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::{at_rest, constant_motion};
    use approx::assert_abs_diff_eq;
    use nalgebra::Quaternion;

    fn ekf(first: &ImuMeasurement, q0: UnitQuaternion<f64>) -> QuaternionEkf {
        QuaternionEkf::new(EkfConfig::default(), &Environment::default(), first, q0).unwrap()
    }

    #[test]
    fn test_omega_and_xi_agree_with_quaternion_product() {
        let q = UnitQuaternion::from_euler_angles(0.3, -0.4, 1.1);
        let omega = Vector3::new(0.2, -0.7, 0.5);

        let product = q.into_inner() * Quaternion::from_imag(omega);
        let expected = Vector4::new(product.w, product.i, product.j, product.k);

        let qv = wxyz(&q);
        assert_abs_diff_eq!(omega_matrix(&omega) * qv, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(xi_matrix(&qv) * omega, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let env = Environment::default();
        let first = ImuMeasurement::new(0.0, Vector3::zeros(), Vector3::z());
        let q0 = UnitQuaternion::identity();

        let mut config = EkfConfig::default();
        config.measurement_covariance[5] = -1.0;
        assert!(matches!(
            QuaternionEkf::new(config, &env, &first, q0),
            Err(ConfigError::InvalidCovariance {
                name: "measurement_covariance",
                index: 5,
                ..
            })
        ));

        let config = EkfConfig {
            measurement_covariance: [0.0; 7],
            ..Default::default()
        };
        assert!(matches!(
            QuaternionEkf::new(config, &env, &first, q0),
            Err(ConfigError::InvalidCovariance {
                name: "measurement_covariance",
                index: 0,
                value,
            }) if value == 0.0
        ));

        let mut config = EkfConfig::default();
        config.initial_covariance[4] = 0.0;
        assert!(config.validate().is_ok());

        let config = EkfConfig {
            tau: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            QuaternionEkf::new(config, &env, &first, q0),
            Err(ConfigError::InvalidEkfParameter { name: "tau", .. })
        ));

        let config = EkfConfig {
            d: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            QuaternionEkf::new(config, &env, &first, q0),
            Err(ConfigError::InvalidEkfParameter { name: "d", .. })
        ));
    }

    #[test]
    fn test_tracks_constant_yaw_rate() {
        let omega = Vector3::new(0.0, 0.0, 1.0);
        let measurements = constant_motion(omega, Vector3::new(0.0, 0.0, 9.81), 0.01, 101);

        let mut filter = ekf(&measurements[0], UnitQuaternion::identity());
        filter.run(&measurements[1..]).unwrap();

        assert_abs_diff_eq!(filter.angular_velocity(), omega, epsilon = 1e-2);
        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.0);
        assert!(filter.current_orientation().angle_to(&expected) < 0.03);
    }

    #[test]
    fn test_corrects_tilt_from_accelerometer() {
        let truth = UnitQuaternion::from_euler_angles(0.2, 0.1, 0.0);
        let measurements = constant_motion(Vector3::zeros(), at_rest(&truth), 0.01, 300);

        let mut filter = ekf(&measurements[0], UnitQuaternion::identity());
        filter.run(&measurements[1..]).unwrap();

        // Gravity fixes tilt only; heading is unobservable but must not wander off
        let q = filter.current_orientation();
        let tilt_error = (q * measurements[0].accel).angle(&Vector3::z());
        assert!(tilt_error < 1e-6);
        assert!(q.angle_to(&truth) < 0.05);
    }

    #[test]
    fn test_covariance_stays_symmetric_and_finite() {
        let measurements = constant_motion(
            Vector3::new(0.3, -0.2, 0.5),
            Vector3::new(0.5, 0.0, 9.7),
            1.0 / 366.0,
            400,
        );
        let mut filter = ekf(&measurements[0], UnitQuaternion::identity());
        filter.run(&measurements[1..]).unwrap();

        let p = filter.covariance();
        assert!(p.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(*p, p.transpose(), epsilon = 1e-12);
        assert_abs_diff_eq!(filter.current_orientation().norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_measurement_diverges() {
        let first = ImuMeasurement::new(0.0, Vector3::zeros(), Vector3::new(0.0, 0.0, 9.81));
        let mut filter = ekf(&first, UnitQuaternion::identity());

        let bad = ImuMeasurement::new(0.01, Vector3::new(f64::INFINITY, 0.0, 0.0), first.accel);
        assert!(matches!(
            filter.update(&bad),
            Err(FilterError::Diverged { .. })
        ));
    }
}
