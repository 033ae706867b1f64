//! Error taxonomy for the replay pipeline
//!
//! Each stage has its own error enum; [`ReplayError`] is the single failure
//! value a caller receives from a run. No partial results are ever returned
//! alongside an error.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid configuration. Always raised before any segment runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Sampling period must be positive and finite, got {0}")]
    InvalidSamplingPeriod(f64),
    #[error("Segment period must be positive and finite, got {0}")]
    InvalidPeriod(f64),
    #[error("Unknown orientation filter selector '{0}' (expected integrator, complementary-a, complementary-b or ekf)")]
    UnknownFilter(String),
    #[error("Unknown IMU variant selector '{0}' (expected ideal, realistic-1 or realistic-2)")]
    UnknownImuVariant(String),
    #[error("Filter gain '{name}' must lie in (0, 1], got {value}")]
    InvalidGain { name: &'static str, value: f64 },
    #[error("Covariance '{name}' entry {index} must be finite and non-negative, got {value}")]
    InvalidCovariance {
        name: &'static str,
        index: usize,
        value: f64,
    },
    #[error("EKF parameter '{name}' is out of range: {value}")]
    InvalidEkfParameter { name: &'static str, value: f64 },
    #[error("Complementary filter acceleration threshold must be non-negative, got {0}")]
    InvalidAccelerationThreshold(f64),
    #[error("Calibration parameter '{name}' is out of range: {value}")]
    InvalidCalibration { name: &'static str, value: f64 },
    #[error("Gravity vector must be finite, got {0:?}")]
    InvalidGravity([f64; 3]),
    #[error("Failed to read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config")]
    Parse(#[from] toml::de::Error),
}

/// Failure to build or query a trajectory.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrajectoryError {
    #[error("Trajectory needs at least {required} pose samples, got {count}")]
    InsufficientSamples { count: usize, required: usize },
    #[error("Pose sample timestamps must be strictly increasing: sample {index} has t={current} after t={previous}")]
    NonMonotonicTime {
        index: usize,
        previous: f64,
        current: f64,
    },
    #[error("Pose sample {index} has a non-finite timestamp or position")]
    NonFiniteSample { index: usize },
    #[error("Pose sample {index} has a degenerate orientation quaternion")]
    DegenerateOrientation { index: usize },
    #[error("Time {t} is outside the trajectory range [{start}, {end}]")]
    OutOfRange { t: f64, start: f64, end: f64 },
}

/// Failure inside an orientation filter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("Measurement at t={time} does not follow the previous update at t={last}")]
    NonCausal { time: f64, last: f64 },
    #[error("Filter diverged at t={time}: {reason}")]
    Diverged { time: f64, reason: &'static str },
}

/// Failure inside the acceleration integrator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("Accelerometer stream is empty")]
    EmptyStream,
    #[error("Accelerometer stream has {accel} samples but orientation source has {orientations}")]
    LengthMismatch { accel: usize, orientations: usize },
    #[error("Orientation timestamp {orientation} does not match accelerometer timestamp {accel} at sample {index}")]
    TimestampMismatch {
        index: usize,
        accel: f64,
        orientation: f64,
    },
}

/// Failure of the calibration procedure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Calibration fit for the {channel} channel is rank deficient")]
    SingularFit { channel: &'static str },
}

/// Failure while processing a single segment.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Segment [{start}, {end}] is empty")]
    EmptySegment { start: f64, end: f64 },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
}

/// The single failure indicator of a replay run.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Could not build trajectory: {0}")]
    Trajectory(#[from] TrajectoryError),
    #[error("IMU calibration failed: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("Segment {index} [{start}, {end}] failed: {source}")]
    Segment {
        index: usize,
        start: f64,
        end: f64,
        #[source]
        source: SegmentError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_error_carries_context() {
        let err = ReplayError::Segment {
            index: 3,
            start: 9.0,
            end: 10.0,
            source: SegmentError::Filter(FilterError::Diverged {
                time: 9.5,
                reason: "non-finite covariance",
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("Segment 3"));
        assert!(msg.contains("[9, 10]"));
        assert!(msg.contains("non-finite covariance"));
    }

    #[test]
    fn test_config_error_names_parameter() {
        let err = ReplayError::from(ConfigError::InvalidGain {
            name: "gain",
            value: 1.5,
        });
        assert!(err.to_string().contains("1.5"));
    }
}
