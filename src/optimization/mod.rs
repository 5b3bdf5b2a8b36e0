//! The `optimization` module searches for the pose correction of a drifted
//! stereo rig.
//!
//! The search space is a 6-vector: a translation delta `[tx, ty, tz]`
//! followed by three Euler-angle deltas. Each candidate is scored by
//! re-triangulating the observed points with the corrected camera,
//! re-projecting them through both cameras and comparing against the
//! observations ([`penalty::score_correction`]). Candidates that move further
//! than the allowed deviation from the initial guess are penalized rather
//! than rejected.
//!
//! The search itself is a multi-start Nelder-Mead simplex
//! ([`nelder_mead::NelderMead`]) working on any [`Objective`].

use nalgebra::Vector6;

use crate::camera::CameraModelError;
use crate::geometry::GeometryError;

pub mod nelder_mead;
pub mod penalty;
pub mod pose;

pub use nelder_mead::{NelderMead, NelderMeadConfig, PoseCorrection, RestartSummary};
pub use penalty::score_correction;
pub use pose::{optimize_pose_correction, CorrectionMode, PoseCorrectionCost};

/// Number of optimized parameters.
pub const N_PARAMS: usize = 6;

/// Translation delta (3) followed by Euler-angle delta (3).
pub type PoseParams = Vector6<f64>;

/// Largest translation deviation from the initial guess before the penalty applies, in mm.
pub const TRANSLATION_BOUND: f64 = 10.0;

/// Largest rotation deviation from the initial guess before the penalty applies: 2 degrees.
pub const ROTATION_BOUND: f64 = 2.0 * std::f64::consts::PI / 180.0;

/// Added to the score once per parameter outside its bound.
pub const BOUND_PENALTY: f64 = 10000.0;

#[derive(thiserror::Error, Debug)]
pub enum OptimizationError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Camera(#[from] CameraModelError),
}

/// A scalar function of the pose parameters to be minimized.
pub trait Objective {
    /// Evaluates the objective at `params`. Lower is better.
    fn evaluate(&self, params: &PoseParams) -> Result<f64, OptimizationError>;
}
