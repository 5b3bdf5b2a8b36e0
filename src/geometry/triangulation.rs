//! Stereo triangulation and reprojection errors.
//!
//! Triangulation uses the linear (DLT) formulation on the projection matrices
//! of the two cameras: for every correspondence the homogeneous point is the
//! right singular vector of the smallest singular value of
//!
//! ```text
//! | u1 · P1[2] - P1[0] |
//! | v1 · P1[2] - P1[1] |
//! | u2 · P2[2] - P2[0] |
//! | v2 · P2[2] - P2[1] |
//! ```

use nalgebra::{Matrix2xX, Matrix3x4, Matrix3xX, Matrix4, Vector3, Vector4};

use crate::camera::CameraModel;
use crate::geometry::GeometryError;

/// Reconstructs 3D points from matched observations of two cameras.
///
/// Column `i` of the result is triangulated from column `i` of both
/// observation sets, using the current pose of each camera.
///
/// # Errors
///
/// * [`GeometryError::DimensionMismatch`]: the observation sets differ in length.
/// * [`GeometryError::Camera`]: a camera cannot derive its intrinsic matrix.
pub fn triangulate(
    camera1: &CameraModel,
    camera2: &CameraModel,
    points_2d_1: &Matrix2xX<f64>,
    points_2d_2: &Matrix2xX<f64>,
) -> Result<Matrix3xX<f64>, GeometryError> {
    ensure_same_len(points_2d_1.ncols(), points_2d_2.ncols())?;

    let p1 = camera1.projection_matrix()?;
    let p2 = camera2.projection_matrix()?;

    let mut points_3d = Matrix3xX::zeros(points_2d_1.ncols());
    for (i, (x1, x2)) in points_2d_1
        .column_iter()
        .zip(points_2d_2.column_iter())
        .enumerate()
    {
        let homogeneous = triangulate_homogeneous(&p1, &p2, x1[0], x1[1], x2[0], x2[1]);
        points_3d.set_column(i, &from_homogeneous(&homogeneous));
    }

    Ok(points_3d)
}

fn triangulate_homogeneous(
    p1: &Matrix3x4<f64>,
    p2: &Matrix3x4<f64>,
    u1: f64,
    v1: f64,
    u2: f64,
    v2: f64,
) -> Vector4<f64> {
    let mut a = Matrix4::zeros();
    a.row_mut(0).copy_from(&(u1 * p1.row(2) - p1.row(0)));
    a.row_mut(1).copy_from(&(v1 * p1.row(2) - p1.row(1)));
    a.row_mut(2).copy_from(&(u2 * p2.row(2) - p2.row(0)));
    a.row_mut(3).copy_from(&(v2 * p2.row(2) - p2.row(1)));

    let svd = a.svd(false, true);
    let smallest = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(3);

    match svd.v_t {
        Some(v_t) => v_t.row(smallest).transpose(),
        None => Vector4::zeros(),
    }
}

/// Drops the scale coordinate. A zero scale is treated as one, leaving the
/// first three coordinates as they are.
fn from_homogeneous(x: &Vector4<f64>) -> Vector3<f64> {
    let w = x[3];
    let scale = if w.abs() > f64::EPSILON { 1.0 / w } else { 1.0 };
    Vector3::new(x[0] * scale, x[1] * scale, x[2] * scale)
}

/// Per-point Euclidean distance between two 3D point sets.
///
/// # Errors
///
/// * [`GeometryError::DimensionMismatch`]: the sets differ in length.
pub fn reprojection_error_3d(
    reference: &Matrix3xX<f64>,
    measured: &Matrix3xX<f64>,
) -> Result<Vec<f64>, GeometryError> {
    ensure_same_len(reference.ncols(), measured.ncols())?;

    Ok(reference
        .column_iter()
        .zip(measured.column_iter())
        .map(|(r, m)| (r - m).norm())
        .collect())
}

/// Re-projects `points_3d` through both cameras and returns the per-point
/// pixel distance to the observed points, one vector per camera.
///
/// # Errors
///
/// * [`GeometryError::DimensionMismatch`]: the three sets do not share a length.
/// * [`GeometryError::Camera`]: a camera cannot derive its intrinsic matrix.
pub fn reprojection_error_2d(
    points_3d: &Matrix3xX<f64>,
    observed_1: &Matrix2xX<f64>,
    observed_2: &Matrix2xX<f64>,
    camera1: &CameraModel,
    camera2: &CameraModel,
) -> Result<(Vec<f64>, Vec<f64>), GeometryError> {
    ensure_same_len(points_3d.ncols(), observed_1.ncols())?;
    ensure_same_len(points_3d.ncols(), observed_2.ncols())?;

    let projected_1 = camera1.project_points(points_3d)?;
    let projected_2 = camera2.project_points(points_3d)?;

    Ok((
        pixel_distances(&projected_1, observed_1),
        pixel_distances(&projected_2, observed_2),
    ))
}

fn pixel_distances(projected: &Matrix2xX<f64>, observed: &Matrix2xX<f64>) -> Vec<f64> {
    projected
        .column_iter()
        .zip(observed.column_iter())
        .map(|(p, o)| (p - o).norm())
        .collect()
}

pub(crate) fn ensure_same_len(expected: usize, actual: usize) -> Result<(), GeometryError> {
    if expected != actual {
        return Err(GeometryError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConfig, CameraModelError, Resolution, SensorSize};
    use crate::geometry::rotation::euler_angles_to_rotation_matrix;
    use crate::geometry::surface::{flat_surface_points, SurfaceConfig};

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

    fn stereo_pair() -> (CameraModel, CameraModel) {
        let camera1 = CameraModel::new(config());
        let rotation = euler_angles_to_rotation_matrix(&Vector3::new(0.0, 12f64.to_radians(), 0.0));
        let camera2 = CameraModel::new(config()).with_pose(rotation, Vector3::new(-350.0, 0.0, 0.0));
        (camera1, camera2)
    }

    fn points(n: usize) -> Matrix3xX<f64> {
        Matrix3xX::from_fn(n, |r, c| match r {
            0 => c as f64 * 10.0 - 20.0,
            1 => c as f64 * 5.0,
            _ => 1500.0 + c as f64,
        })
    }

    #[test]
    fn test_triangulate_recovers_points() {
        let (camera1, camera2) = stereo_pair();
        let points_3d = flat_surface_points(&SurfaceConfig::default());

        let points_2d_1 = camera1.project_points(&points_3d).unwrap();
        let points_2d_2 = camera2.project_points(&points_3d).unwrap();
        let triangulated = triangulate(&camera1, &camera2, &points_2d_1, &points_2d_2).unwrap();

        assert_eq!(triangulated.ncols(), points_3d.ncols());
        let errors = reprojection_error_3d(&points_3d, &triangulated).unwrap();
        for (i, e) in errors.iter().enumerate() {
            assert!(*e <= 1e-6, "point {i} triangulated with error {e}");
        }
    }

    #[test]
    fn test_triangulate_sample_rig() {
        let camera1 = CameraModel::load_from_yaml("samples/stereo_rig.yaml", "cam0").unwrap();
        let camera2 = CameraModel::load_from_yaml("samples/stereo_rig.yaml", "cam1").unwrap();
        let points_3d = flat_surface_points(&SurfaceConfig::default());

        let points_2d_1 = camera1.project_points(&points_3d).unwrap();
        let points_2d_2 = camera2.project_points(&points_3d).unwrap();
        let triangulated = triangulate(&camera1, &camera2, &points_2d_1, &points_2d_2).unwrap();

        let (errors_1, errors_2) =
            reprojection_error_2d(&triangulated, &points_2d_1, &points_2d_2, &camera1, &camera2)
                .unwrap();
        assert!(errors_1.iter().chain(errors_2.iter()).all(|e| *e < 1e-6));
    }

    #[test]
    fn test_triangulate_dimension_mismatch() {
        let (camera1, camera2) = stereo_pair();
        let result = triangulate(
            &camera1,
            &camera2,
            &Matrix2xX::zeros(3),
            &Matrix2xX::zeros(4),
        );
        assert!(matches!(
            result,
            Err(GeometryError::DimensionMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_triangulate_invalid_camera() {
        let (mut camera1, camera2) = stereo_pair();
        camera1.set_focal_length(0.0);
        let result = triangulate(
            &camera1,
            &camera2,
            &Matrix2xX::zeros(2),
            &Matrix2xX::zeros(2),
        );
        assert!(matches!(
            result,
            Err(GeometryError::Camera(CameraModelError::InvalidConfiguration(_)))
        ));
    }

    #[test]
    fn test_reprojection_error_3d_properties() {
        let reference = points(4);
        let mut measured = reference.clone();
        measured[(0, 1)] += 3.0;
        measured[(1, 1)] += 4.0;
        measured[(2, 3)] -= 2.0;

        let forward = reprojection_error_3d(&reference, &measured).unwrap();
        let backward = reprojection_error_3d(&measured, &reference).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward, vec![0.0, 5.0, 0.0, 2.0]);
        assert!(forward.iter().all(|e| *e >= 0.0));

        let identical = reprojection_error_3d(&reference, &reference).unwrap();
        assert!(identical.iter().all(|e| *e == 0.0));
    }

    #[test]
    fn test_reprojection_error_3d_dimension_mismatch() {
        assert!(matches!(
            reprojection_error_3d(&points(3), &points(4)),
            Err(GeometryError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_reprojection_error_2d_measures_offsets() {
        let (camera1, camera2) = stereo_pair();
        let points_3d = points(3);
        let mut observed_1 = camera1.project_points(&points_3d).unwrap();
        let observed_2 = camera2.project_points(&points_3d).unwrap();
        observed_1[(0, 2)] += 6.0;
        observed_1[(1, 2)] -= 8.0;

        let (errors_1, errors_2) =
            reprojection_error_2d(&points_3d, &observed_1, &observed_2, &camera1, &camera2)
                .unwrap();
        assert_eq!(errors_1.len(), 3);
        assert!(errors_1[0] < 1e-9 && errors_1[1] < 1e-9);
        assert!((errors_1[2] - 10.0).abs() < 1e-9);
        assert!(errors_2.iter().all(|e| *e < 1e-9));
    }

    #[test]
    fn test_reprojection_error_2d_dimension_mismatch() {
        let (camera1, camera2) = stereo_pair();
        let result = reprojection_error_2d(
            &points(3),
            &Matrix2xX::zeros(3),
            &Matrix2xX::zeros(4),
            &camera1,
            &camera2,
        );
        assert!(matches!(
            result,
            Err(GeometryError::DimensionMismatch { .. })
        ));

        let result = reprojection_error_2d(
            &points(4),
            &Matrix2xX::zeros(3),
            &Matrix2xX::zeros(4),
            &camera1,
            &camera2,
        );
        assert!(matches!(
            result,
            Err(GeometryError::DimensionMismatch { .. })
        ));
    }
}
