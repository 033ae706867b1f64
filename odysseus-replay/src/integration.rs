//! Dead-reckoning of position from the accelerometer
//!
//! Each body-frame reading is rotated into the world frame with the orientation
//! estimate for the same sample, optionally gravity-compensated, then double-integrated
//! with the rectangle rule:
//!
//! v_k = v_{k−1} + a_g(k−1) Δt,  p_k = p_{k−1} + v_k Δt
//!
//! so p_0 equals the seed exactly.

use nalgebra::Vector3;

use crate::error::IntegrationError;
use crate::filter::OrientationHistory;
use crate::imu::MeasurementStream;
use crate::math::rotate_vector;

/// Accelerometer and orientation timestamps must agree to this tolerance (s)
const TIMESTAMP_TOLERANCE: f64 = 1e-9;

/// Integrate an accelerometer stream into one position per sample
///
/// # Arguments
/// * `accel` - Body-frame specific force readings
/// * `orientations` - Orientation for every accelerometer sample, same timestamps
/// * `initial_position` - Position at the first sample
/// * `initial_velocity` - Velocity at the first sample
/// * `sampling_period` - Integration step Δt (s)
/// * `gravity` - World-frame gravity vector (m/s²)
/// * `compensate_gravity` - Add `gravity.z` to the vertical world acceleration
pub fn integrate_acceleration(
    accel: &MeasurementStream,
    orientations: &OrientationHistory,
    initial_position: Vector3<f64>,
    initial_velocity: Vector3<f64>,
    sampling_period: f64,
    gravity: &Vector3<f64>,
    compensate_gravity: bool,
) -> Result<Vec<Vector3<f64>>, IntegrationError> {
    if accel.is_empty() {
        return Err(IntegrationError::EmptyStream);
    }
    if accel.len() != orientations.len() {
        return Err(IntegrationError::LengthMismatch {
            accel: accel.len(),
            orientations: orientations.len(),
        });
    }

    let mut positions = Vec::with_capacity(accel.len());
    let mut position = initial_position;
    let mut velocity = initial_velocity;
    positions.push(position);

    // World-frame acceleration of the previous sample drives the current step
    let mut previous: Option<Vector3<f64>> = None;

    for (index, ((t, reading), (t_q, q))) in accel
        .iter()
        .zip(orientations.timestamps.iter().zip(orientations.orientations.iter()))
        .enumerate()
    {
        if (t - t_q).abs() > TIMESTAMP_TOLERANCE {
            return Err(IntegrationError::TimestampMismatch {
                index,
                accel: *t,
                orientation: *t_q,
            });
        }

        if let Some(a_world) = previous {
            velocity += a_world * sampling_period;
            position += velocity * sampling_period;
            positions.push(position);
        }

        let mut a_world = rotate_vector(q, reading);
        if compensate_gravity {
            a_world.z += gravity.z;
        }
        previous = Some(a_world);
    }

    Ok(positions)
}
