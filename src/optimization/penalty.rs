//! Penalized reprojection error used to score pose corrections.

use nalgebra::Matrix2xX;

use crate::geometry::triangulation::ensure_same_len;
use crate::geometry::GeometryError;
use crate::optimization::{PoseParams, BOUND_PENALTY, ROTATION_BOUND, TRANSLATION_BOUND};

/// Scores a recalibrated pair of observation sets against the observed pair.
///
/// The base error is
///
/// ```text
/// sqrt( mean_i[ (x1_before[i] - x1_after[i])² + (y2_before[i] - y2_after[i])² ] )
/// ```
///
/// i.e. the horizontal residual of the first camera and the vertical residual
/// of the second camera. [`BOUND_PENALTY`] is added once for every parameter
/// of `new_params` deviating from `old_params` by more than its bound
/// ([`TRANSLATION_BOUND`] for the first three, [`ROTATION_BOUND`] for the last
/// three).
///
/// # Errors
///
/// * [`GeometryError::DimensionMismatch`]: the four observation sets do not
///   share a length.
pub fn score_correction(
    obs1_before: &Matrix2xX<f64>,
    obs2_before: &Matrix2xX<f64>,
    obs1_after: &Matrix2xX<f64>,
    obs2_after: &Matrix2xX<f64>,
    old_params: &PoseParams,
    new_params: &PoseParams,
) -> Result<f64, GeometryError> {
    let n = obs1_before.ncols();
    ensure_same_len(n, obs2_before.ncols())?;
    ensure_same_len(n, obs1_after.ncols())?;
    ensure_same_len(n, obs2_after.ncols())?;

    Ok(base_error(obs1_before, obs2_before, obs1_after, obs2_after)
        + bound_penalty(old_params, new_params))
}

fn base_error(
    obs1_before: &Matrix2xX<f64>,
    obs2_before: &Matrix2xX<f64>,
    obs1_after: &Matrix2xX<f64>,
    obs2_after: &Matrix2xX<f64>,
) -> f64 {
    let n = obs1_before.ncols();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = (0..n)
        .map(|i| {
            let dx = obs1_before[(0, i)] - obs1_after[(0, i)];
            let dy = obs2_before[(1, i)] - obs2_after[(1, i)];
            dx * dx + dy * dy
        })
        .sum();
    (sum / n as f64).sqrt()
}

/// Total penalty for the parameters of `new_params` outside their bounds.
pub fn bound_penalty(old_params: &PoseParams, new_params: &PoseParams) -> f64 {
    old_params
        .iter()
        .zip(new_params.iter())
        .enumerate()
        .filter(|(k, (old, new))| {
            let bound = if *k < 3 {
                TRANSLATION_BOUND
            } else {
                ROTATION_BOUND
            };
            (*old - *new).abs() > bound
        })
        .count() as f64
        * BOUND_PENALTY
}
