//! Odysseus Replay: dense motion reconstruction from sparse pose samples
//!
//! Sparse ground-truth poses are turned into a continuous trajectory, a simulated IMU
//! is flown along it, and a selectable orientation filter plus accelerometer
//! double-integration rebuild orientation and position at the IMU rate. Work proceeds
//! in fixed-length segments that are stitched into one series.

pub mod config;
pub mod error;
pub mod filter;
pub mod imu;
pub mod integration;
pub mod math;
pub mod pipeline;
pub mod spline;
pub mod trajectory;

// Re-export key types
pub use config::{OrientationSource, PipelineConfig, ResetPolicy};
pub use error::{
    CalibrationError, ConfigError, FilterError, IntegrationError, ReplayError, SegmentError, TrajectoryError,
};
pub use filter::{FilterConfig, FilterKind, OrientationEstimator, OrientationFilter, OrientationHistory};
pub use imu::{CalibrationParameters, Environment, ImuMeasurement, ImuSimulator, ImuVariant, SensorModel};
pub use integration::integrate_acceleration;
pub use pipeline::{reconstruct, segment_boundaries, ReconstructedMotion, SegmentScheduler};
pub use trajectory::{build_trajectory, ContinuousTrajectory, PoseSample, SampledTrajectory, SplinedTrajectory};
