//! Dense motion replay demo
//!
//! This example:
//! - Samples a sparse set of poses on a horizontal circle with a yaw oscillation
//! - Replays a simulated IMU along the splined trajectory
//! - Reconstructs orientation and position with the selected filter
//! - Reports the error against the ground-truth trajectory

use std::f64::consts::PI;
use std::path::PathBuf;

use clap::Parser;
use nalgebra::{UnitQuaternion, Vector3};
use tracing_subscriber::EnvFilter;

use odysseus_replay::{
    build_trajectory, ContinuousTrajectory, FilterKind, ImuVariant, PipelineConfig, PoseSample, SegmentScheduler,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Pipeline config file (TOML); command line selectors override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ground-truth pose samples
    #[arg(long, default_value_t = 40)]
    num_samples: usize,

    /// Trajectory duration in seconds
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Circle radius in meters
    #[arg(long, default_value_t = 2.0)]
    radius: f64,

    /// IMU rate in Hz
    #[arg(long)]
    imu_rate: Option<f64>,

    /// Orientation filter: integrator, complementary-a, complementary-b or ekf
    #[arg(long)]
    filter: Option<String>,

    /// IMU variant: ideal, realistic-1 or realistic-2
    #[arg(long)]
    imu: Option<String>,

    /// Calibrate the IMU before replaying
    #[arg(long, default_value_t = false)]
    calibrate: bool,

    /// Random seed for sensor errors (random if not specified)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(rate) = args.imu_rate {
        config.sampling_period = 1.0 / rate;
    }
    if let Some(filter) = &args.filter {
        config.filter = filter.parse::<FilterKind>()?.default_config();
    }
    if let Some(imu) = &args.imu {
        config.imu = imu.parse::<ImuVariant>()?;
    }
    config.calibrate |= args.calibrate;
    config.seed = args.seed.unwrap_or_else(rand::random);

    let scheduler = SegmentScheduler::new(config)?;
    let config = scheduler.config();

    println!("=== Dense Motion Replay Demo ===");
    println!(
        "Samples: {}, Duration: {}s, IMU Rate: {:.1}Hz",
        args.num_samples,
        args.duration,
        1.0 / config.sampling_period
    );
    println!(
        "Filter: {}, IMU: {}, Calibrate: {}, Seed: {}",
        config.filter.kind(),
        config.imu,
        config.calibrate,
        config.seed
    );

    let samples = circle_samples(args.radius, args.duration, args.num_samples);
    let truth = build_trajectory(&samples)?;
    let motion = scheduler.run(&truth)?;
    println!(
        "\nReconstructed {} samples from {} poses",
        motion.len(),
        samples.len()
    );

    let mut position_sq = 0.0;
    let mut max_position: f64 = 0.0;
    let mut angle_sq = 0.0;
    let mut max_angle: f64 = 0.0;
    for ((t, q), p) in motion
        .timestamps
        .iter()
        .zip(&motion.orientations)
        .zip(&motion.positions)
    {
        let position_error = (p - truth.position(*t)?).norm();
        let angle_error = q.angle_to(&truth.orientation(*t)?);
        position_sq += position_error * position_error;
        angle_sq += angle_error * angle_error;
        max_position = max_position.max(position_error);
        max_angle = max_angle.max(angle_error);
    }
    let n = motion.len().max(1) as f64;

    println!("\nPosition error: RMS {:.4} m, max {:.4} m", (position_sq / n).sqrt(), max_position);
    println!(
        "Orientation error: RMS {:.3}°, max {:.3}°",
        (angle_sq / n).sqrt().to_degrees(),
        max_angle.to_degrees()
    );

    if let (Some(last), Some(p), Some(q)) = (
        motion.timestamps.last(),
        motion.positions.last(),
        motion.orientations.last(),
    ) {
        let (roll, pitch, yaw) = q.euler_angles();
        println!(
            "Final t={:.3}s  p=[{:.3}, {:.3}, {:.3}]  rpy=[{:.2}°, {:.2}°, {:.2}°]",
            last,
            p.x,
            p.y,
            p.z,
            roll.to_degrees(),
            pitch.to_degrees(),
            yaw.to_degrees()
        );
    }

    Ok(())
}

/// Sparse poses on a circle, facing the direction of travel with a 0.3 rad yaw wobble
fn circle_samples(radius: f64, duration: f64, count: usize) -> Vec<PoseSample> {
    let count = count.max(2);
    (0..count)
        .map(|i| {
            let t = duration * i as f64 / (count - 1) as f64;
            let theta = 2.0 * PI * t / duration;
            let position = Vector3::new(radius * theta.cos(), radius * theta.sin(), 1.5);
            let yaw = theta + 0.5 * PI + 0.3 * (4.0 * theta).sin();
            PoseSample::new(t, position, UnitQuaternion::from_euler_angles(0.0, 0.0, yaw))
        })
        .collect()
}
