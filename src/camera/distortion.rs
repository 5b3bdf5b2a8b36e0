//! Radial-tangential lens distortion.
//!
//! Five coefficients in the usual `[k1, k2, p1, p2, k3]` order. The model is
//! applied to normalized image coordinates (after the perspective division
//! and before the intrinsic matrix).

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// The 5 distortion coefficients: `[k1, k2, p1, p2, k3]`.
/// * `k1`, `k2`, `k3`: Radial distortion coefficients.
/// * `p1`, `p2`: Tangential distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RadTanDistortion {
    pub coefficients: [f64; 5],
}

impl RadTanDistortion {
    pub fn new(coefficients: [f64; 5]) -> Self {
        RadTanDistortion { coefficients }
    }

    /// `true` when every coefficient is zero.
    pub fn is_zero(&self) -> bool {
        self.coefficients.iter().all(|&c| c == 0.0)
    }

    /// Distorts a normalized image point `(x', y')`.
    pub fn distort(&self, x_prime: f64, y_prime: f64) -> Vector2<f64> {
        let [k1, k2, p1, p2, k3] = self.coefficients;

        let r2 = x_prime * x_prime + y_prime * y_prime;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;

        let x_distorted = x_prime * radial
            + 2.0 * p1 * x_prime * y_prime
            + p2 * (r2 + 2.0 * x_prime * x_prime);

        let y_distorted = y_prime * radial
            + p1 * (r2 + 2.0 * y_prime * y_prime)
            + 2.0 * p2 * x_prime * y_prime;

        Vector2::new(x_distorted, y_distorted)
    }
}

impl From<[f64; 5]> for RadTanDistortion {
    fn from(coefficients: [f64; 5]) -> Self {
        RadTanDistortion::new(coefficients)
    }
}
