//! Segment scheduler
//!
//! Splits the trajectory into fixed-length segments and, for each one in order:
//! 1. simulates the IMU (and applies the run's calibration, if any)
//! 2. builds a fresh orientation filter seeded per the reset policy and runs it
//! 3. integrates the accelerometer from the true position and velocity at the segment start
//!
//! The per-segment results are concatenated into one [`ReconstructedMotion`]. Any failure
//! aborts the whole run. Resetting from ground truth at each segment start bounds drift
//! artificially; `ResetPolicy::CarryForward` keeps the filter estimate instead.

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, info};

use crate::config::{OrientationSource, PipelineConfig, ResetPolicy};
use crate::error::{ConfigError, ReplayError, SegmentError};
use crate::filter::{OrientationEstimator, OrientationFilter, OrientationHistory};
use crate::imu::{
    CalibrationParameters, Environment, ImuMeasurement, ImuSimulator, ScaleAndOffsetCalibrator,
};
use crate::integration::integrate_acceleration;
use crate::math::quaternion::to_xyzw;
use crate::trajectory::{build_trajectory, ContinuousTrajectory, PoseSample};

/// Relative tolerance when the last full period lands on the end time
const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Noise stream of the calibration run; segments use their index
const CALIBRATION_STREAM: u64 = u64::MAX;

/// Segment boundaries `[start, start + period, …, end]`
///
/// The last boundary is always `end`, so the final segment may be shorter than `period`.
pub fn segment_boundaries(start: f64, end: f64, period: f64) -> Result<Vec<f64>, ConfigError> {
    if !period.is_finite() || period <= 0.0 {
        return Err(ConfigError::InvalidPeriod(period));
    }

    let mut boundaries = vec![start];
    let mut k = 1;
    loop {
        let t = start + k as f64 * period;
        if t >= end - BOUNDARY_TOLERANCE * period {
            break;
        }
        boundaries.push(t);
        k += 1;
    }
    boundaries.push(end);
    Ok(boundaries)
}

/// Dense motion estimate: three parallel series of equal length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructedMotion {
    pub timestamps: Vec<f64>,
    pub orientations: Vec<UnitQuaternion<f64>>,
    pub positions: Vec<Vector3<f64>>,
}

impl ReconstructedMotion {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Orientations as (x, y, z, w)
    pub fn orientation_arrays(&self) -> Vec<[f64; 4]> {
        self.orientations.iter().map(to_xyzw).collect()
    }

    pub fn position_arrays(&self) -> Vec<[f64; 3]> {
        self.positions.iter().map(|p| [p.x, p.y, p.z]).collect()
    }

    fn append(&mut self, segment: SegmentOutput) {
        self.timestamps.extend(segment.history.timestamps);
        self.orientations.extend(segment.history.orientations);
        self.positions.extend(segment.positions);
    }
}

/// Result of one segment
struct SegmentOutput {
    history: OrientationHistory,
    positions: Vec<Vector3<f64>>,
}

impl SegmentOutput {
    fn final_orientation(&self) -> Option<UnitQuaternion<f64>> {
        self.history.last().map(|(_, q)| q)
    }
}

/// Runs the replay pipeline over a trajectory
#[derive(Debug, Clone)]
pub struct SegmentScheduler {
    config: PipelineConfig,
    environment: Environment,
}

impl SegmentScheduler {
    /// Validate `config` and build a scheduler
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let environment = config.environment();
        Ok(Self {
            config,
            environment,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Calibrate a fresh instance of the configured sensor, once per run
    fn calibrate(&self) -> Result<Option<CalibrationParameters>, ReplayError> {
        if !self.config.calibrate {
            return Ok(None);
        }

        let calibrator = ScaleAndOffsetCalibrator::new(
            self.environment,
            self.config.calibration.sample_count,
            self.config.sampling_period,
            self.config.calibration.rotational_velocity,
        )?;
        let mut sensor = self
            .config
            .imu
            .build_sensor(self.config.seed, CALIBRATION_STREAM);
        Ok(Some(calibrator.calibrate(sensor.as_mut())?))
    }

    /// Process every segment of `trajectory` in order and stitch the results
    pub fn run<T: ContinuousTrajectory + ?Sized>(
        &self,
        trajectory: &T,
    ) -> Result<ReconstructedMotion, ReplayError> {
        let (start, end) = (trajectory.start_time(), trajectory.end_time());
        let boundaries = segment_boundaries(start, end, self.config.segment_period)?;
        let segment_count = boundaries.len() - 1;

        info!(
            start,
            end,
            segments = segment_count,
            imu = %self.config.imu,
            filter = %self.config.filter.kind(),
            "Starting replay"
        );

        let calibration = self.calibrate()?;

        let mut motion = ReconstructedMotion::default();
        let mut carried: Option<UnitQuaternion<f64>> = None;

        for (index, window) in boundaries.windows(2).enumerate() {
            let (seg_start, seg_end) = (window[0], window[1]);
            let closed_end = index + 1 == segment_count;

            let segment = self
                .run_segment(
                    trajectory,
                    index,
                    seg_start,
                    seg_end,
                    closed_end,
                    carried,
                    calibration.as_ref(),
                )
                .map_err(|source| ReplayError::Segment {
                    index,
                    start: seg_start,
                    end: seg_end,
                    source,
                })?;

            debug!(
                index,
                start = seg_start,
                end = seg_end,
                samples = segment.positions.len(),
                "Segment complete"
            );

            carried = segment.final_orientation();
            motion.append(segment);
        }

        info!(samples = motion.len(), "Replay complete");
        Ok(motion)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_segment<T: ContinuousTrajectory + ?Sized>(
        &self,
        trajectory: &T,
        index: usize,
        start: f64,
        end: f64,
        closed_end: bool,
        carried: Option<UnitQuaternion<f64>>,
        calibration: Option<&CalibrationParameters>,
    ) -> Result<SegmentOutput, SegmentError> {
        let config = &self.config;

        let sensor = config.imu.build_sensor(config.seed, index as u64);
        let mut simulator = ImuSimulator::new(sensor, config.sampling_period);
        let mut imu = simulator.simulate(trajectory, &self.environment, start, end, closed_end)?;
        if let Some(calibration) = calibration {
            calibration.apply_to(&mut imu);
        }

        let measurements: Vec<ImuMeasurement> = imu.measurements().collect();
        let (first, rest) = measurements
            .split_first()
            .ok_or(SegmentError::EmptySegment { start, end })?;

        let initial_orientation = match (config.reset_policy, carried) {
            (ResetPolicy::CarryForward, Some(q)) => q,
            _ => trajectory.orientation(first.timestamp)?,
        };

        let mut filter =
            OrientationEstimator::new(&config.filter, &self.environment, first, initial_orientation)?;
        filter.run(rest)?;
        let history = filter.finish();

        let truth;
        let rotation_source = match config.orientation_source {
            OrientationSource::Estimated => &history,
            OrientationSource::Truth => {
                let mut true_history = OrientationHistory::with_capacity(history.len());
                for &t in &history.timestamps {
                    true_history.push(t, trajectory.orientation(t)?);
                }
                truth = true_history;
                &truth
            }
        };

        let positions = integrate_acceleration(
            &imu.accelerometer,
            rotation_source,
            trajectory.position(first.timestamp)?,
            trajectory.velocity(first.timestamp)?,
            config.sampling_period,
            &self.environment.gravity(),
            config.compensate_gravity,
        )?;

        Ok(SegmentOutput { history, positions })
    }
}

/// Reconstruct dense motion from sparse pose samples
///
/// Configuration errors are reported before the trajectory is built, and trajectory
/// errors before any simulation.
pub fn reconstruct(
    samples: &[PoseSample],
    config: &PipelineConfig,
) -> Result<ReconstructedMotion, ReplayError> {
    let scheduler = SegmentScheduler::new(config.clone())?;
    let trajectory = build_trajectory(samples)?;
    info!(samples = samples.len(), "Built trajectory");
    scheduler.run(&trajectory)
}
