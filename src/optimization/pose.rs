use log::debug;
use nalgebra::{Matrix2xX, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::geometry::triangulation::ensure_same_len;
use crate::geometry::{euler_angles_to_rotation_matrix, triangulate};
use crate::optimization::nelder_mead::{NelderMead, NelderMeadConfig, PoseCorrection};
use crate::optimization::penalty::score_correction;
use crate::optimization::{Objective, OptimizationError, PoseParams};

/// Which half of the parameter vector is applied to the corrected camera.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionMode {
    /// Only the translation delta moves the camera; the rotation entries are
    /// still optimized (and penalized) but have no geometric effect.
    #[default]
    TranslationOnly,
    /// Translation and rotation deltas are both applied.
    Full,
}

/// Cost of a pose correction applied to the first camera of a stereo pair.
///
/// For a candidate correction the observations are re-triangulated with the
/// corrected camera, projected back through both cameras and compared with
/// the observations by [`score_correction`]. The input cameras are never
/// modified; every evaluation works on its own corrected copy.
#[derive(Debug, Clone)]
pub struct PoseCorrectionCost {
    camera1: CameraModel,
    camera2: CameraModel,
    points_2d_1: Matrix2xX<f64>,
    points_2d_2: Matrix2xX<f64>,
    reference: PoseParams,
    mode: CorrectionMode,
}

impl PoseCorrectionCost {
    /// # Errors
    ///
    /// * [`crate::geometry::GeometryError::DimensionMismatch`]: the observation
    ///   sets differ in length.
    /// * [`crate::camera::CameraModelError`]: either camera is misconfigured.
    pub fn new(
        camera1: &CameraModel,
        camera2: &CameraModel,
        points_2d_1: &Matrix2xX<f64>,
        points_2d_2: &Matrix2xX<f64>,
        reference: PoseParams,
        mode: CorrectionMode,
    ) -> Result<Self, OptimizationError> {
        ensure_same_len(points_2d_1.ncols(), points_2d_2.ncols())?;
        camera1.validate_params()?;
        camera2.validate_params()?;
        // Derive once so every clone starts with a cached intrinsic matrix.
        camera1.intrinsic_matrix()?;
        camera2.intrinsic_matrix()?;

        Ok(PoseCorrectionCost {
            camera1: camera1.clone(),
            camera2: camera2.clone(),
            points_2d_1: points_2d_1.clone(),
            points_2d_2: points_2d_2.clone(),
            reference,
            mode,
        })
    }

    pub fn mode(&self) -> CorrectionMode {
        self.mode
    }

    /// Returns a copy of the first camera with the correction applied.
    ///
    /// The translation delta is added to the base translation. In
    /// [`CorrectionMode::Full`] the base rotation is pre-multiplied by the
    /// rotation of the Euler angles `[params[5], params[4], params[3]]`.
    pub fn corrected_camera(&self, params: &PoseParams) -> CameraModel {
        let mut camera = self.camera1.clone();
        camera.translation += params.fixed_rows::<3>(0);
        if self.mode == CorrectionMode::Full {
            let angles = Vector3::new(params[5], params[4], params[3]);
            camera.rotation = euler_angles_to_rotation_matrix(&angles) * camera.rotation;
        }
        camera
    }
}

impl Objective for PoseCorrectionCost {
    fn evaluate(&self, params: &PoseParams) -> Result<f64, OptimizationError> {
        let camera1 = self.corrected_camera(params);
        let points_3d = triangulate(&camera1, &self.camera2, &self.points_2d_1, &self.points_2d_2)?;
        let reprojected_1 = camera1.project_points(&points_3d)?;
        let reprojected_2 = self.camera2.project_points(&points_3d)?;

        Ok(score_correction(
            &self.points_2d_1,
            &self.points_2d_2,
            &reprojected_1,
            &reprojected_2,
            &self.reference,
            params,
        )?)
    }
}

/// Searches the correction of `camera1` that best explains the matched
/// observations of the stereo pair.
///
/// Candidates deviating from `initial_guess` beyond the translation or
/// rotation bound are penalized, not rejected.
pub fn optimize_pose_correction(
    camera1: &CameraModel,
    camera2: &CameraModel,
    points_2d_1: &Matrix2xX<f64>,
    points_2d_2: &Matrix2xX<f64>,
    initial_guess: &PoseParams,
    config: &NelderMeadConfig,
) -> Result<PoseCorrection, OptimizationError> {
    let cost = PoseCorrectionCost::new(
        camera1,
        camera2,
        points_2d_1,
        points_2d_2,
        *initial_guess,
        config.correction_mode,
    )?;
    debug!(
        "optimizing pose correction over {} correspondences ({:?})",
        points_2d_1.ncols(),
        config.correction_mode
    );
    NelderMead::new(config.clone()).minimize(&cost, initial_guess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConfig, Resolution, SensorSize};
    use crate::geometry::{flat_surface_points, GeometryError, SurfaceConfig};
    use crate::optimization::BOUND_PENALTY;
    use approx::assert_relative_eq;

    fn config() -> CameraConfig {
        CameraConfig {
            focal_length: 15.0,
            sensor_size: SensorSize {
                width: 7.2,
                height: 5.3,
            },
            resolution: Resolution {
                width: 2048,
                height: 1536,
            },
        }
    }

    /// True rig plus its observations of a small tilted grid.
    fn observed_rig() -> (CameraModel, CameraModel, Matrix2xX<f64>, Matrix2xX<f64>) {
        let camera1 = CameraModel::new(config());
        let rotation = euler_angles_to_rotation_matrix(&Vector3::new(0.0, 12f64.to_radians(), 0.0));
        let camera2 = CameraModel::new(config()).with_pose(rotation, Vector3::new(-350.0, 0.0, 0.0));
        let surface = SurfaceConfig {
            width: 270,
            height: 180,
            step_x: 30,
            step_y: 20,
            ..SurfaceConfig::default()
        };
        let points_3d = flat_surface_points(&surface);
        let points_2d_1 = camera1.project_points(&points_3d).unwrap();
        let points_2d_2 = camera2.project_points(&points_3d).unwrap();
        (camera1, camera2, points_2d_1, points_2d_2)
    }

    #[test]
    fn test_corrected_camera_translation_only() {
        let (camera1, camera2, p1, p2) = observed_rig();
        let cost = PoseCorrectionCost::new(
            &camera1,
            &camera2,
            &p1,
            &p2,
            PoseParams::zeros(),
            CorrectionMode::TranslationOnly,
        )
        .unwrap();

        let params = PoseParams::new(1.0, -2.0, 3.0, 0.1, 0.2, 0.3);
        let corrected = cost.corrected_camera(&params);
        assert_eq!(corrected.translation, Vector3::new(1.0, -2.0, 3.0));
        assert_eq!(corrected.rotation, camera1.rotation);
        // The input camera is untouched.
        assert_eq!(camera1.translation, Vector3::zeros());
    }

    #[test]
    fn test_corrected_camera_full_applies_reversed_angles() {
        let (camera1, camera2, p1, p2) = observed_rig();
        let cost = PoseCorrectionCost::new(
            &camera1,
            &camera2,
            &p1,
            &p2,
            PoseParams::zeros(),
            CorrectionMode::Full,
        )
        .unwrap();

        let params = PoseParams::new(0.0, 0.0, 0.0, 0.01, 0.02, 0.03);
        let corrected = cost.corrected_camera(&params);
        let expected = euler_angles_to_rotation_matrix(&Vector3::new(0.03, 0.02, 0.01));
        assert_relative_eq!(corrected.rotation, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_consistent_rig_scores_zero() {
        let (camera1, camera2, p1, p2) = observed_rig();
        let cost = PoseCorrectionCost::new(
            &camera1,
            &camera2,
            &p1,
            &p2,
            PoseParams::zeros(),
            CorrectionMode::TranslationOnly,
        )
        .unwrap();
        assert!(cost.evaluate(&PoseParams::zeros()).unwrap() < 1e-6);
    }

    #[test]
    fn test_cancelling_the_drift_scores_zero() {
        let (mut camera1, camera2, p1, p2) = observed_rig();
        camera1.translation += Vector3::new(5.0, 0.0, 0.0);

        let cost = PoseCorrectionCost::new(
            &camera1,
            &camera2,
            &p1,
            &p2,
            PoseParams::zeros(),
            CorrectionMode::TranslationOnly,
        )
        .unwrap();

        let drifted = cost.evaluate(&PoseParams::zeros()).unwrap();
        let cancelled = cost
            .evaluate(&PoseParams::new(-5.0, 0.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();
        assert!(drifted > 1e-3, "drifted score {drifted}");
        assert!(cancelled < 1e-6, "cancelled score {cancelled}");

        let far = cost
            .evaluate(&PoseParams::new(-11.0, 0.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();
        assert!(far > BOUND_PENALTY);
    }

    #[test]
    fn test_mismatched_observations_are_rejected() {
        let (camera1, camera2, p1, _) = observed_rig();
        let short = p1.columns(0, 5).into_owned();
        let result = PoseCorrectionCost::new(
            &camera1,
            &camera2,
            &p1,
            &short,
            PoseParams::zeros(),
            CorrectionMode::TranslationOnly,
        );
        assert!(matches!(
            result,
            Err(OptimizationError::Geometry(
                GeometryError::DimensionMismatch { .. }
            ))
        ));
    }

    #[test]
    fn test_optimize_reduces_score() {
        let (mut camera1, camera2, p1, p2) = observed_rig();
        camera1.translation += Vector3::new(0.0, 3.0, 0.0);

        let config = NelderMeadConfig {
            random_seed: Some(11),
            ..NelderMeadConfig::default()
        };
        let result =
            optimize_pose_correction(&camera1, &camera2, &p1, &p2, &PoseParams::zeros(), &config)
                .unwrap();

        assert!(result.score < result.initial_score);
        assert!(result.score < BOUND_PENALTY);
        assert!(result.params[1] < 0.0);
        assert_eq!(camera1.translation, Vector3::new(0.0, 3.0, 0.0));
    }
}
