//! Pure gyroscope integration

use nalgebra::{UnitQuaternion, Vector3};

use super::{causal_step, check_finite, propagate, OrientationFilter, OrientationHistory};
use crate::error::FilterError;
use crate::imu::ImuMeasurement;

/// Integrates the gyroscope with no correction: q_{k+1} = q_k ⊗ exp(ω_k Δt)
///
/// Any gyro error accumulates as drift.
#[derive(Debug, Clone)]
pub struct GyroIntegrator {
    orientation: UnitQuaternion<f64>,
    last_time: f64,
    /// Held until the next sample
    last_gyro: Vector3<f64>,
    history: OrientationHistory,
}

impl GyroIntegrator {
    pub fn new(first: &ImuMeasurement, initial_orientation: UnitQuaternion<f64>) -> Self {
        Self {
            orientation: initial_orientation,
            last_time: first.timestamp,
            last_gyro: first.gyro,
            history: OrientationHistory::new(first.timestamp, initial_orientation),
        }
    }
}

impl OrientationFilter for GyroIntegrator {
    fn update(&mut self, measurement: &ImuMeasurement) -> Result<(), FilterError> {
        let dt = causal_step(self.last_time, measurement.timestamp)?;

        let q = propagate(&self.orientation, &self.last_gyro, dt);
        check_finite(measurement.timestamp, &q)?;

        self.orientation = q;
        self.last_time = measurement.timestamp;
        self.last_gyro = measurement.gyro;
        self.history.push(measurement.timestamp, q);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::constant_motion;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_constant_rate_is_exact() {
        let omega = Vector3::new(0.5, 0.0, 0.0);
        let measurements = constant_motion(omega, Vector3::zeros(), 0.01, 201);

        let mut filter = GyroIntegrator::new(&measurements[0], UnitQuaternion::identity());
        filter.run(&measurements[1..]).unwrap();

        let expected = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 1.0);
        assert_abs_diff_eq!(filter.current_orientation().angle_to(&expected), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_uses_rate_held_from_previous_sample() {
        let first = ImuMeasurement::new(0.0, Vector3::new(0.0, 0.0, 1.0), Vector3::zeros());
        let second = ImuMeasurement::new(0.1, Vector3::zeros(), Vector3::zeros());

        let mut filter = GyroIntegrator::new(&first, UnitQuaternion::identity());
        filter.update(&second).unwrap();

        assert_abs_diff_eq!(filter.current_orientation().angle(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_reproduces_gyro_bias_drift() {
        let bias = Vector3::new(0.0, 0.0, 0.01);
        let measurements = constant_motion(bias, Vector3::new(0.0, 0.0, 9.81), 0.01, 1001);

        let mut filter = GyroIntegrator::new(&measurements[0], UnitQuaternion::identity());
        filter.run(&measurements[1..]).unwrap();

        // 10 s of uncorrected bias
        assert_abs_diff_eq!(filter.current_orientation().angle(), 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_non_finite_rate_diverges() {
        let first = ImuMeasurement::new(0.0, Vector3::new(f64::NAN, 0.0, 0.0), Vector3::zeros());
        let second = ImuMeasurement::new(0.1, Vector3::zeros(), Vector3::zeros());

        let mut filter = GyroIntegrator::new(&first, UnitQuaternion::identity());
        assert!(matches!(
            filter.update(&second),
            Err(FilterError::Diverged { .. })
        ));
    }
}
