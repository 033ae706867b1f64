//! Physical environment the simulated IMU lives in

use nalgebra::Vector3;

/// Standard gravity (m/s²)
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Environment model
///
/// World frame is z-up, so gravity defaults to [0, 0, -9.81].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    gravity: Vector3<f64>,
}

impl Environment {
    pub fn new(gravity: Vector3<f64>) -> Self {
        Self { gravity }
    }

    /// Gravity vector in world frame (m/s²)
    pub fn gravity(&self) -> Vector3<f64> {
        self.gravity
    }

    pub fn gravity_magnitude(&self) -> f64 {
        self.gravity.norm()
    }

    /// Unit vector opposite to gravity, or None in zero gravity
    pub fn up(&self) -> Option<Vector3<f64>> {
        let norm = self.gravity.norm();
        (norm > 1e-12).then(|| -self.gravity / norm)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(Vector3::new(0.0, 0.0, -STANDARD_GRAVITY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gravity_points_down() {
        let env = Environment::default();
        assert_eq!(env.gravity(), Vector3::new(0.0, 0.0, -9.81));
        assert_eq!(env.up(), Some(Vector3::z()));
    }

    #[test]
    fn test_zero_gravity_has_no_up() {
        assert!(Environment::new(Vector3::zeros()).up().is_none());
    }
}
