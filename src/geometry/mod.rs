//! Geometry shared by the stereo pipeline: Euler-angle conversions,
//! triangulation, reprojection errors and synthetic surfaces.

pub mod rotation;
pub mod surface;
pub mod triangulation;

pub use rotation::{euler_angles_to_rotation_matrix, rotation_matrix_to_euler_angles};
pub use surface::{flat_surface_points, SurfaceConfig};
pub use triangulation::{reprojection_error_2d, reprojection_error_3d, triangulate};

use crate::camera::CameraModelError;

#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    #[error("Point set length mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Camera(#[from] CameraModelError),
}

/// Standard deviation normalized by `n + 1`.
///
/// The mean is the true mean; only the variance divisor is `n + 1` rather
/// than `n` or `n - 1`. An empty slice yields `0.0`.
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_squares: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();
    (sum_squares / (n + 1.0)).sqrt()
}
