//! Ground-truth trajectories built from sparse pose samples
//!
//! Two representations share one query interface:
//! - [`SampledTrajectory`]: piecewise-linear position, exact at the samples
//! - [`SplinedTrajectory`]: natural cubic spline position with analytic derivatives
//!
//! Both interpolate orientation with shortest-arc slerp between neighbouring samples,
//! so orientations are always unit quaternions.

use nalgebra::{UnitQuaternion, Vector3};

use crate::error::TrajectoryError;
use crate::math::quaternion::{self, from_xyzw};
use crate::spline::VectorSpline;

/// Fewest samples a spline can be built from
pub const MIN_SAMPLES: usize = 2;

/// A single ground-truth pose at a point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    /// Timestamp in seconds
    pub timestamp: f64,
    /// Position in the world frame (m)
    pub position: Vector3<f64>,
    /// Orientation (body to world)
    pub orientation: UnitQuaternion<f64>,
}

impl PoseSample {
    pub fn new(timestamp: f64, position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            timestamp,
            position,
            orientation,
        }
    }

    /// Build a sample from plain arrays
    ///
    /// `orientation_xyzw` is in (x, y, z, w) order and is normalized here.
    /// `index` is only used for error reporting.
    pub fn from_arrays(
        index: usize,
        timestamp: f64,
        position: [f64; 3],
        orientation_xyzw: [f64; 4],
    ) -> Result<Self, TrajectoryError> {
        let orientation =
            from_xyzw(orientation_xyzw).ok_or(TrajectoryError::DegenerateOrientation { index })?;
        Ok(Self::new(timestamp, Vector3::from(position), orientation))
    }
}

/// Continuous trajectory queried at absolute time in seconds
pub trait ContinuousTrajectory {
    fn start_time(&self) -> f64;

    fn end_time(&self) -> f64;

    /// Position in the world frame
    fn position(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError>;

    /// Linear velocity in the world frame
    fn velocity(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError>;

    /// Linear acceleration in the world frame
    fn acceleration(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError>;

    /// Orientation (body to world), unit length
    fn orientation(&self, t: f64) -> Result<UnitQuaternion<f64>, TrajectoryError>;

    /// Angular velocity in the body frame
    fn angular_velocity(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError>;

    /// Check that t lies in [start_time, end_time]
    fn check_range(&self, t: f64) -> Result<(), TrajectoryError> {
        let (start, end) = (self.start_time(), self.end_time());
        if t.is_finite() && t >= start && t <= end {
            Ok(())
        } else {
            Err(TrajectoryError::OutOfRange { t, start, end })
        }
    }
}

/// Validate pose samples before building a trajectory
fn validate_samples(samples: &[PoseSample]) -> Result<(), TrajectoryError> {
    if samples.len() < MIN_SAMPLES {
        return Err(TrajectoryError::InsufficientSamples {
            count: samples.len(),
            required: MIN_SAMPLES,
        });
    }

    for (index, sample) in samples.iter().enumerate() {
        if !sample.timestamp.is_finite() || !sample.position.iter().all(|c| c.is_finite()) {
            return Err(TrajectoryError::NonFiniteSample { index });
        }
        if !sample.orientation.coords.iter().all(|c| c.is_finite()) {
            return Err(TrajectoryError::DegenerateOrientation { index });
        }
    }

    for (index, pair) in samples.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(TrajectoryError::NonMonotonicTime {
                index: index + 1,
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }

    Ok(())
}

/// Piecewise trajectory that is exact at every sample
#[derive(Debug, Clone)]
pub struct SampledTrajectory {
    timestamps: Vec<f64>,
    positions: Vec<Vector3<f64>>,
    orientations: Vec<UnitQuaternion<f64>>,
}

impl SampledTrajectory {
    pub fn new(samples: &[PoseSample]) -> Result<Self, TrajectoryError> {
        validate_samples(samples)?;

        // Keep consecutive quaternions in the same hemisphere
        let mut orientations: Vec<UnitQuaternion<f64>> = Vec::with_capacity(samples.len());
        for sample in samples {
            let q = UnitQuaternion::new_normalize(sample.orientation.into_inner());
            let q = match orientations.last() {
                Some(prev) => quaternion::align_hemisphere(prev, &q),
                None => q,
            };
            orientations.push(q);
        }

        Ok(Self {
            timestamps: samples.iter().map(|s| s.timestamp).collect(),
            positions: samples.iter().map(|s| s.position).collect(),
            orientations,
        })
    }

    /// Index i such that timestamps[i] <= t <= timestamps[i + 1]
    fn interval(&self, t: f64) -> usize {
        let upper = self.timestamps.partition_point(|&k| k <= t);
        upper.saturating_sub(1).min(self.timestamps.len() - 2)
    }

    /// Interval index and normalized position within it
    fn locate(&self, t: f64) -> Result<(usize, f64, f64), TrajectoryError> {
        self.check_range(t)?;
        let i = self.interval(t);
        let h = self.timestamps[i + 1] - self.timestamps[i];
        Ok((i, (t - self.timestamps[i]) / h, h))
    }
}

impl ContinuousTrajectory for SampledTrajectory {
    fn start_time(&self) -> f64 {
        self.timestamps[0]
    }

    fn end_time(&self) -> f64 {
        self.timestamps[self.timestamps.len() - 1]
    }

    fn position(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError> {
        let (i, s, _) = self.locate(t)?;
        Ok(self.positions[i].lerp(&self.positions[i + 1], s))
    }

    fn velocity(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError> {
        let (i, _, h) = self.locate(t)?;
        Ok((self.positions[i + 1] - self.positions[i]) / h)
    }

    fn acceleration(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError> {
        self.check_range(t)?;
        Ok(Vector3::zeros())
    }

    fn orientation(&self, t: f64) -> Result<UnitQuaternion<f64>, TrajectoryError> {
        let (i, s, _) = self.locate(t)?;
        Ok(quaternion::slerp(
            &self.orientations[i],
            &self.orientations[i + 1],
            s,
        ))
    }

    fn angular_velocity(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError> {
        // Slerp rotates at a constant body rate across each interval
        let (i, _, h) = self.locate(t)?;
        let relative = self.orientations[i].inverse() * self.orientations[i + 1];
        Ok(quaternion::log(&relative) / h)
    }
}

/// Smooth trajectory: cubic spline positions, slerp orientations
#[derive(Debug, Clone)]
pub struct SplinedTrajectory {
    sampled: SampledTrajectory,
    position_spline: VectorSpline,
}

impl SplinedTrajectory {
    pub fn new(sampled: SampledTrajectory) -> Self {
        let position_spline = VectorSpline::new(&sampled.timestamps, &sampled.positions);
        Self {
            sampled,
            position_spline,
        }
    }
}

impl ContinuousTrajectory for SplinedTrajectory {
    fn start_time(&self) -> f64 {
        self.sampled.start_time()
    }

    fn end_time(&self) -> f64 {
        self.sampled.end_time()
    }

    fn position(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError> {
        self.check_range(t)?;
        Ok(self.position_spline.evaluate(t))
    }

    fn velocity(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError> {
        self.check_range(t)?;
        Ok(self.position_spline.derivative(t))
    }

    fn acceleration(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError> {
        self.check_range(t)?;
        Ok(self.position_spline.second_derivative(t))
    }

    fn orientation(&self, t: f64) -> Result<UnitQuaternion<f64>, TrajectoryError> {
        self.sampled.orientation(t)
    }

    fn angular_velocity(&self, t: f64) -> Result<Vector3<f64>, TrajectoryError> {
        self.sampled.angular_velocity(t)
    }
}

/// Build the splined trajectory used by the replay pipeline
pub fn build_trajectory(samples: &[PoseSample]) -> Result<SplinedTrajectory, TrajectoryError> {
    Ok(SplinedTrajectory::new(SampledTrajectory::new(samples)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    /// Helical samples with a yaw that follows the motion
    fn helix_samples(n: usize, duration: f64) -> Vec<PoseSample> {
        (0..n)
            .map(|i| {
                let t = duration * i as f64 / (n - 1) as f64;
                let theta = 2.0 * PI * t / duration;
                PoseSample::new(
                    t,
                    Vector3::new(2.0 * theta.cos(), 2.0 * theta.sin(), 0.3 * t),
                    UnitQuaternion::from_euler_angles(0.1 * theta.sin(), 0.0, theta),
                )
            })
            .collect()
    }

    #[test]
    fn test_rejects_insufficient_samples() {
        let samples = helix_samples(2, 1.0);
        let err = build_trajectory(&samples[..1]).unwrap_err();
        assert_eq!(
            err,
            TrajectoryError::InsufficientSamples {
                count: 1,
                required: 2
            }
        );
    }

    #[test]
    fn test_rejects_non_monotonic_time() {
        let mut samples = helix_samples(4, 3.0);
        samples[2].timestamp = samples[1].timestamp;
        let err = build_trajectory(&samples).unwrap_err();
        assert!(matches!(
            err,
            TrajectoryError::NonMonotonicTime { index: 2, .. }
        ));
    }

    #[test]
    fn test_rejects_degenerate_orientation() {
        let err = PoseSample::from_arrays(7, 0.0, [0.0; 3], [0.0; 4]).unwrap_err();
        assert_eq!(err, TrajectoryError::DegenerateOrientation { index: 7 });
    }

    #[test]
    fn test_out_of_range_queries_fail() {
        let traj = build_trajectory(&helix_samples(5, 2.0)).unwrap();
        assert!(traj.position(-0.01).is_err());
        assert!(traj.velocity(2.01).is_err());
        assert!(traj.orientation(f64::NAN).is_err());
        assert!(traj.position(0.0).is_ok());
        assert!(traj.position(2.0).is_ok());
    }

    #[test]
    fn test_splined_reproduces_samples() {
        let samples = helix_samples(12, 4.0);
        let traj = build_trajectory(&samples).unwrap();

        for sample in &samples {
            let p = traj.position(sample.timestamp).unwrap();
            assert_abs_diff_eq!(p, sample.position, epsilon = 1e-9);

            // q and -q are the same rotation
            let q = traj.orientation(sample.timestamp).unwrap();
            let dot = q.coords.dot(&sample.orientation.coords).abs();
            assert_abs_diff_eq!(dot, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_orientation_stays_unit_length() {
        let traj = build_trajectory(&helix_samples(7, 3.0)).unwrap();
        for i in 0..=300 {
            let t = 3.0 * i as f64 / 300.0;
            assert_abs_diff_eq!(traj.orientation(t).unwrap().norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_velocity_is_analytic_derivative() {
        let traj = build_trajectory(&helix_samples(20, 5.0)).unwrap();
        let dt = 1e-6;
        for t in [0.4, 1.3, 2.9, 4.1] {
            let numeric = (traj.position(t + dt).unwrap() - traj.position(t - dt).unwrap()) / (2.0 * dt);
            assert_abs_diff_eq!(traj.velocity(t).unwrap(), numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_angular_velocity_matches_orientation_rate() {
        let traj = build_trajectory(&helix_samples(9, 4.0)).unwrap();
        let dt = 1e-6;
        for t in [0.3, 1.6, 3.2] {
            let q0 = traj.orientation(t).unwrap();
            let q1 = traj.orientation(t + dt).unwrap();
            let numeric = quaternion::log(&(q0.inverse() * q1)) / dt;
            assert_abs_diff_eq!(traj.angular_velocity(t).unwrap(), numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_sampled_is_exact_and_piecewise_linear() {
        let samples = vec![
            PoseSample::new(0.0, Vector3::new(0.0, 0.0, 0.0), UnitQuaternion::identity()),
            PoseSample::new(1.0, Vector3::new(2.0, 0.0, 0.0), UnitQuaternion::identity()),
            PoseSample::new(3.0, Vector3::new(2.0, 4.0, 0.0), UnitQuaternion::identity()),
        ];
        let traj = SampledTrajectory::new(&samples).unwrap();

        assert_abs_diff_eq!(traj.position(0.5).unwrap(), Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(traj.velocity(2.0).unwrap(), Vector3::new(0.0, 2.0, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(traj.position(3.0).unwrap(), samples[2].position, epsilon = 1e-12);
    }

    #[test]
    fn test_two_sample_spline_is_linear() {
        let samples = vec![
            PoseSample::new(0.0, Vector3::zeros(), UnitQuaternion::identity()),
            PoseSample::new(2.0, Vector3::new(4.0, -2.0, 1.0), UnitQuaternion::identity()),
        ];
        let traj = build_trajectory(&samples).unwrap();

        assert_abs_diff_eq!(traj.velocity(1.3).unwrap(), Vector3::new(2.0, -1.0, 0.5), epsilon = 1e-12);
        assert_abs_diff_eq!(traj.acceleration(0.7).unwrap(), Vector3::zeros(), epsilon = 1e-12);
    }
}
