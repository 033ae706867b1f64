//! IMU data types

use nalgebra::Vector3;

/// A single IMU measurement (gyroscope + accelerometer)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuMeasurement {
    /// Timestamp in seconds
    pub timestamp: f64,
    /// Angular velocity from gyroscope (rad/s) in body frame
    pub gyro: Vector3<f64>,
    /// Specific force from accelerometer (m/s²) in body frame
    /// Note: Includes gravity! A stationary IMU measures +g upward.
    pub accel: Vector3<f64>,
}

impl ImuMeasurement {
    /// Create a new IMU measurement
    pub fn new(timestamp: f64, gyro: Vector3<f64>, accel: Vector3<f64>) -> Self {
        Self {
            timestamp,
            gyro,
            accel,
        }
    }
}

/// Fixed-rate stream of timestamped 3-vectors for one segment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementStream {
    samples: Vec<(f64, Vector3<f64>)>,
}

impl MeasurementStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, timestamp: f64, value: Vector3<f64>) {
        self.samples.push((timestamp, value));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, Vector3<f64>)> + '_ {
        self.samples.iter()
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.samples.first().map(|(t, _)| *t)
    }

    pub fn get(&self, index: usize) -> Option<&(f64, Vector3<f64>)> {
        self.samples.get(index)
    }

    /// Apply `f` to every value in place, keeping timestamps
    pub fn map_values(&mut self, f: impl Fn(&Vector3<f64>) -> Vector3<f64>) {
        for (_, value) in &mut self.samples {
            *value = f(value);
        }
    }
}

impl FromIterator<(f64, Vector3<f64>)> for MeasurementStream {
    fn from_iter<I: IntoIterator<Item = (f64, Vector3<f64>)>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

/// Output of one simulator invocation: parallel gyroscope and accelerometer streams
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatedImu {
    pub gyroscope: MeasurementStream,
    pub accelerometer: MeasurementStream,
}

impl SimulatedImu {
    pub fn len(&self) -> usize {
        self.accelerometer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accelerometer.is_empty()
    }

    /// Paired measurements in time order
    pub fn measurements(&self) -> impl Iterator<Item = ImuMeasurement> + '_ {
        self.gyroscope
            .iter()
            .zip(self.accelerometer.iter())
            .map(|((t, gyro), (_, accel))| ImuMeasurement::new(*t, *gyro, *accel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurements_pair_streams() {
        let imu = SimulatedImu {
            gyroscope: [(0.0, Vector3::x()), (0.1, Vector3::y())].into_iter().collect(),
            accelerometer: [(0.0, Vector3::z()), (0.1, Vector3::x())].into_iter().collect(),
        };

        let paired: Vec<_> = imu.measurements().collect();
        assert_eq!(paired.len(), 2);
        assert_eq!(paired[1], ImuMeasurement::new(0.1, Vector3::y(), Vector3::x()));
    }

    #[test]
    fn test_map_values_keeps_timestamps() {
        let mut stream: MeasurementStream = [(0.5, Vector3::new(1.0, 2.0, 3.0))].into_iter().collect();
        stream.map_values(|v| v * 2.0);

        assert_eq!(stream.first_timestamp(), Some(0.5));
        assert_eq!(stream.get(0).map(|(_, v)| *v), Some(Vector3::new(2.0, 4.0, 6.0)));
    }
}
