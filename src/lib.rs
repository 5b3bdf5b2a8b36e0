//! Stereo Decalibration Library
//!
//! Models the decalibration of a stereo camera rig and searches for the pose
//! correction that restores it. The library provides:
//! - a pinhole camera with an optional radial-tangential distortion term
//! - Z-Y-X Euler angle conversions
//! - linear triangulation and reprojection errors
//! - a penalized error metric and a multi-start Nelder-Mead search over the
//!   6-parameter pose correction of one camera

pub mod camera;
pub mod geometry;
pub mod optimization;
pub mod util;

// Re-export commonly used types
pub use camera::{
    CameraConfig, CameraModel, CameraModelError, RadTanDistortion, Resolution, SensorSize,
};

pub use geometry::{
    euler_angles_to_rotation_matrix, flat_surface_points, reprojection_error_2d,
    reprojection_error_3d, rotation_matrix_to_euler_angles, standard_deviation, triangulate,
    GeometryError, SurfaceConfig,
};

pub use optimization::{
    optimize_pose_correction, score_correction, CorrectionMode, NelderMeadConfig,
    OptimizationError, PoseCorrection, PoseParams,
};
