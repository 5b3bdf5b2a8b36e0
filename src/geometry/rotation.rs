//! Conversions between rotation matrices and Z-Y-X Euler angles.
//!
//! Angles are stored as `[a0, a1, a2]` = `[yaw (Z), pitch (Y), roll (X)]`
//! and compose as `R = Rz(a0) · Ry(a1) · Rx(a2)`.

use nalgebra::{Matrix3, Vector3};

/// Below this value of `sqrt(R00² + R10²)` the decomposition is in gimbal lock.
pub const SINGULARITY_THRESHOLD: f64 = 1e-6;

/// Extracts Z-Y-X Euler angles from a rotation matrix.
///
/// In gimbal lock the yaw is fixed to zero and the remaining rotation is
/// attributed to the roll angle.
pub fn rotation_matrix_to_euler_angles(r: &Matrix3<f64>) -> Vector3<f64> {
    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();

    if sy >= SINGULARITY_THRESHOLD {
        Vector3::new(
            r[(1, 0)].atan2(r[(0, 0)]),
            (-r[(2, 0)]).atan2(sy),
            r[(2, 1)].atan2(r[(2, 2)]),
        )
    } else {
        Vector3::new(
            0.0,
            (-r[(2, 0)]).atan2(sy),
            (-r[(1, 2)]).atan2(r[(1, 1)]),
        )
    }
}

/// Builds `Rz(a0) · Ry(a1) · Rx(a2)` from Z-Y-X Euler angles.
pub fn euler_angles_to_rotation_matrix(angles: &Vector3<f64>) -> Matrix3<f64> {
    let (sz, cz) = angles[0].sin_cos();
    let (sy, cy) = angles[1].sin_cos();
    let (sx, cx) = angles[2].sin_cos();

    let rx = Matrix3::new(1.0, 0.0, 0.0, 0.0, cx, -sx, 0.0, sx, cx);
    let ry = Matrix3::new(cy, 0.0, sy, 0.0, 1.0, 0.0, -sy, 0.0, cy);
    let rz = Matrix3::new(cz, -sz, 0.0, sz, cz, 0.0, 0.0, 0.0, 1.0);

    rz * ry * rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_identity() {
        let r = euler_angles_to_rotation_matrix(&Vector3::zeros());
        assert_eq!(r, Matrix3::identity());
        assert_eq!(rotation_matrix_to_euler_angles(&r), Vector3::zeros());
    }

    #[test]
    fn test_round_trip_non_singular() {
        let samples = [
            Vector3::new(0.1, -0.2, 0.3),
            Vector3::new(-2.5, 1.2, -3.0),
            Vector3::new(12f64.to_radians(), 0.0, 0.0),
            Vector3::new(0.0, -1.5, 0.0),
            Vector3::new(3.0, 0.7, 2.9),
        ];
        for angles in samples {
            let r = euler_angles_to_rotation_matrix(&angles);
            let recovered = rotation_matrix_to_euler_angles(&r);
            assert_relative_eq!(recovered, angles, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_matches_nalgebra_composition() {
        let angles = Vector3::new(0.4, -0.3, 1.1);
        let r = euler_angles_to_rotation_matrix(&angles);
        let expected = Rotation3::from_euler_angles(angles[2], angles[1], angles[0]);
        assert_relative_eq!(r, *expected.matrix(), epsilon = 1e-12);
    }

    #[test]
    fn test_result_is_orthonormal() {
        let r = euler_angles_to_rotation_matrix(&Vector3::new(0.8, 0.25, -1.9));
        assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gimbal_lock() {
        // Pitch of +90 degrees: only the difference of yaw and roll is observable.
        let r = euler_angles_to_rotation_matrix(&Vector3::new(0.3, FRAC_PI_2, 0.5));
        let angles = rotation_matrix_to_euler_angles(&r);

        assert_eq!(angles[0], 0.0);
        assert_relative_eq!(angles[1], FRAC_PI_2, epsilon = 1e-6);
        let rebuilt = euler_angles_to_rotation_matrix(&angles);
        assert_relative_eq!(rebuilt, r, epsilon = 1e-6);
    }
}
