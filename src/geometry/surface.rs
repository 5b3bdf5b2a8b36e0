//! Synthetic flat tilted surface used to feed the stereo pipeline.

use nalgebra::{Matrix3xX, Vector3};
use serde::{Deserialize, Serialize};

/// A rectangular planar patch in front of the rig, tilted about the X axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Distance from the rig to the surface centre along Z, in mm.
    pub z0: f64,
    /// Extent along X, in mm.
    pub width: u32,
    /// Extent along Y, in mm.
    pub height: u32,
    /// Tilt of the surface, in degrees. Z grows with Y by `tan(tilt)`.
    pub tilt_deg: f64,
    /// Grid spacing along X, in mm.
    pub step_x: u32,
    /// Grid spacing along Y, in mm.
    pub step_y: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        SurfaceConfig {
            z0: 1500.0,
            width: 300,
            height: 200,
            tilt_deg: 45.0,
            step_x: 30,
            step_y: 30,
        }
    }
}

impl SurfaceConfig {
    /// Number of grid points along X and along Y.
    pub fn grid_size(&self) -> (usize, usize) {
        (
            (self.width / self.step_x.max(1)) as usize + 1,
            (self.height / self.step_y.max(1)) as usize + 1,
        )
    }
}

/// Generates the grid of points of a flat tilted surface.
///
/// The grid has `width / step_x + 1` columns and `height / step_y + 1` rows
/// (integer division), evenly spread over the full extent and centred on the
/// optical axis. Points are ordered column by column: all Y values for the
/// first X, then the next X.
pub fn flat_surface_points(config: &SurfaceConfig) -> Matrix3xX<f64> {
    let (nx, ny) = config.grid_size();
    let width = config.width as f64;
    let height = config.height as f64;
    let slope = config.tilt_deg.to_radians().tan();

    // A single row or column collapses onto the centre line.
    let spread = |index: usize, count: usize, extent: f64| {
        if count > 1 {
            index as f64 * extent / (count as f64 - 1.0) - extent / 2.0
        } else {
            0.0
        }
    };

    let mut points = Matrix3xX::zeros(nx * ny);
    let mut p = 0;
    for i in 0..nx {
        for j in 0..ny {
            let x = spread(i, nx, width);
            let y = spread(j, ny, height);
            points.set_column(p, &Vector3::new(x, y, slope * y + config.z0));
            p += 1;
        }
    }

    points
}
