//! Rotation math

pub mod quaternion;

pub use quaternion::{align_hemisphere, exp, log, rotate_vector, slerp};
