//! Simulated IMU
//!
//! Key components:
//! - `Environment`: gravity model shared by simulator, calibrator and integrator
//! - `ImuSimulator`: synthetic gyroscope/accelerometer streams from a trajectory
//! - `SensorModel`: seam between true motion and sensor readings (ideal or noisy)
//! - `ScaleAndOffsetCalibrator`: affine correction fitted once per run

pub mod calibration;
pub mod environment;
pub mod simulator;
pub mod types;

pub use calibration::{CalibrationParameters, ChannelCalibration, ScaleAndOffsetCalibrator};
pub use environment::Environment;
pub use simulator::{sample_times, IdealSensor, ImuNoiseParams, ImuSimulator, ImuVariant, NoisySensor, SensorModel};
pub use types::{ImuMeasurement, MeasurementStream, SimulatedImu};
