//! Unit quaternion helpers
//!
//! Thin layer over nalgebra's `UnitQuaternion` providing the exact operations the
//! replay pipeline relies on: closed-form vector rotation, the exponential and
//! logarithm maps, and shortest-arc spherical interpolation.
//!
//! Component order at the crate boundary is (x, y, z, w); nalgebra stores
//! quaternions as `coords = [i, j, k, w]`, which matches.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Below this squared angle the exp/log maps switch to their Taylor series.
const SMALL_ANGLE_SQ: f64 = 1e-12;

/// Rotate a vector by a unit quaternion without building a rotation matrix
///
/// With q = (x, y, z, w) and q_v = (x, y, z):
///
/// v' = 2(q_v · v) q_v + (w² − |q_v|²) v + 2w (q_v × v)
pub fn rotate_vector(q: &UnitQuaternion<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    let q_v = Vector3::new(q.i, q.j, q.k);
    let w = q.w;

    let dot = q_v.dot(v);
    let cross = q_v.cross(v);

    q_v * (2.0 * dot) + v * (w * w - q_v.norm_squared()) + cross * (2.0 * w)
}

/// Exponential map: rotation vector (axis × angle) to unit quaternion
///
/// q = (sin(θ/2) · axis, cos(θ/2)) with θ = |rvec|
pub fn exp(rvec: &Vector3<f64>) -> UnitQuaternion<f64> {
    let theta_sq = rvec.norm_squared();

    let (w, sinc_half) = if theta_sq < SMALL_ANGLE_SQ {
        // sin(θ/2)/θ ≈ 1/2 − θ²/48
        (1.0 - theta_sq / 8.0, 0.5 - theta_sq / 48.0)
    } else {
        let theta = theta_sq.sqrt();
        let half = 0.5 * theta;
        (half.cos(), half.sin() / theta)
    };

    UnitQuaternion::new_normalize(Quaternion::new(
        w,
        sinc_half * rvec.x,
        sinc_half * rvec.y,
        sinc_half * rvec.z,
    ))
}

/// Logarithm map: unit quaternion to rotation vector
///
/// Always returns the shortest rotation (|θ| ≤ π), so q and −q map to the same vector.
pub fn log(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let (w, v) = if q.w < 0.0 {
        (-q.w, -Vector3::new(q.i, q.j, q.k))
    } else {
        (q.w, Vector3::new(q.i, q.j, q.k))
    };

    let v_norm_sq = v.norm_squared();
    if v_norm_sq < SMALL_ANGLE_SQ {
        // θ / sin(θ/2) ≈ 2 + θ²/12, and θ ≈ 2|v| here
        return v * (2.0 + v_norm_sq / 3.0);
    }

    let v_norm = v_norm_sq.sqrt();
    let theta = 2.0 * v_norm.atan2(w);
    v * (theta / v_norm)
}

/// Flip `q` into the same hemisphere as `reference` (q and −q are the same rotation)
pub fn align_hemisphere(reference: &UnitQuaternion<f64>, q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    if reference.coords.dot(&q.coords) < 0.0 {
        UnitQuaternion::new_unchecked(-q.into_inner())
    } else {
        *q
    }
}

/// Shortest-arc spherical linear interpolation, renormalized
///
/// `s = 0` returns `q0`, `s = 1` returns `q1` (up to sign).
pub fn slerp(q0: &UnitQuaternion<f64>, q1: &UnitQuaternion<f64>, s: f64) -> UnitQuaternion<f64> {
    let q1 = align_hemisphere(q0, q1);
    let delta = log(&(q0.inverse() * q1));
    let q = q0 * exp(&(delta * s));
    UnitQuaternion::new_normalize(q.into_inner())
}

/// Build a unit quaternion from (x, y, z, w) components
///
/// Returns `None` when the components are non-finite or have zero norm.
pub fn from_xyzw(xyzw: [f64; 4]) -> Option<UnitQuaternion<f64>> {
    let [x, y, z, w] = xyzw;
    let q = Quaternion::new(w, x, y, z);
    let norm = q.norm();
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    Some(UnitQuaternion::new_normalize(q))
}

/// (x, y, z, w) components of a unit quaternion
pub fn to_xyzw(q: &UnitQuaternion<f64>) -> [f64; 4] {
    [q.i, q.j, q.k, q.w]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_rotate_quarter_turn_about_z() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let rotated = rotate_vector(&q, &Vector3::new(1.0, 0.0, 0.0));

        assert_abs_diff_eq!(rotated.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rotated.y, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rotated.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_matches_nalgebra() {
        let q = UnitQuaternion::from_euler_angles(0.3, -1.1, 2.4);
        let v = Vector3::new(0.5, -2.0, 3.0);

        let ours = rotate_vector(&q, &v);
        let reference = q * v;

        assert_abs_diff_eq!(ours, reference, epsilon = 1e-12);
    }

    #[test]
    fn test_exp_log_roundtrip() {
        for rvec in [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1e-8, -2e-8, 0.0),
            Vector3::new(0.1, 0.2, -0.3),
            Vector3::new(0.0, 0.0, PI - 1e-6),
        ] {
            let back = log(&exp(&rvec));
            assert_abs_diff_eq!(back, rvec, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_exp_matches_scaled_axis() {
        let rvec = Vector3::new(0.4, -0.2, 0.9);
        let ours = exp(&rvec);
        let reference = UnitQuaternion::from_scaled_axis(rvec);
        assert_abs_diff_eq!(ours.coords, reference.coords, epsilon = 1e-12);
    }

    #[test]
    fn test_log_is_sign_invariant() {
        let q = UnitQuaternion::from_euler_angles(0.2, 0.3, -0.4);
        let neg = UnitQuaternion::new_unchecked(-q.into_inner());
        assert_abs_diff_eq!(log(&q), log(&neg), epsilon = 1e-12);
    }

    #[test]
    fn test_slerp_endpoints_and_midpoint() {
        let q0 = UnitQuaternion::identity();
        let q1 = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);

        assert_abs_diff_eq!(slerp(&q0, &q1, 0.0).angle_to(&q0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(slerp(&q0, &q1, 1.0).angle_to(&q1), 0.0, epsilon = 1e-12);

        let mid = slerp(&q0, &q1, 0.5);
        assert_abs_diff_eq!(mid.angle(), FRAC_PI_2 / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mid.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_slerp_takes_shortest_arc() {
        let q0 = UnitQuaternion::identity();
        let q1 = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.2);
        let flipped = UnitQuaternion::new_unchecked(-q1.into_inner());

        let mid = slerp(&q0, &flipped, 0.5);
        assert_abs_diff_eq!(mid.angle(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_xyzw_roundtrip() {
        let q = from_xyzw([0.0, 0.0, 2.0, 0.0]).unwrap();
        assert_eq!(to_xyzw(&q), [0.0, 0.0, 1.0, 0.0]);
        assert!(from_xyzw([0.0; 4]).is_none());
        assert!(from_xyzw([f64::NAN, 0.0, 0.0, 1.0]).is_none());
    }
}
