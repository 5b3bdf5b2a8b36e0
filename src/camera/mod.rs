//! The `camera` module holds the pinhole camera used by both sides of the
//! stereo rig, together with the configuration types and errors shared by
//! the rest of the crate.
//!
//! A [`CameraModel`] combines the physical sensor description
//! ([`CameraConfig`]: focal length, sensor size in millimetres, resolution in
//! pixels) with the extrinsic pose of the camera (rotation matrix and
//! translation vector) and five radial-tangential distortion coefficients.

use serde::{Deserialize, Serialize};

pub mod distortion;
pub mod pinhole;

pub use distortion::RadTanDistortion;
pub use pinhole::CameraModel;

/// Physical size of the sensor, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSize {
    pub width: f64,
    pub height: f64,
}

/// Size of the sensor, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Intrinsic configuration of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Lens focal length, in millimetres.
    pub focal_length: f64,
    pub sensor_size: SensorSize,
    pub resolution: Resolution,
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("Invalid camera configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraModelError {
    fn from(err: std::io::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for CameraModelError {
    fn from(err: yaml_rust::ScanError) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    /// Checks the divisors used when deriving the intrinsic matrix.
    pub fn validate_config(config: &CameraConfig) -> Result<(), CameraModelError> {
        if config.focal_length == 0.0
            || config.sensor_size.width == 0.0
            || config.sensor_size.height == 0.0
        {
            return Err(CameraModelError::InvalidConfiguration(
                "cannot derive the intrinsic matrix: focal length or sensor size is zero"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_finite(name: &str, values: &[f64]) -> Result<(), CameraModelError> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CameraModelError::InvalidParams(format!(
                "{name} must contain only finite values"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::validation::*;
    use super::*;

    fn config(focal_length: f64, width_mm: f64, height_mm: f64) -> CameraConfig {
        CameraConfig {
            focal_length,
            sensor_size: SensorSize {
                width: width_mm,
                height: height_mm,
            },
            resolution: Resolution {
                width: 2048,
                height: 1536,
            },
        }
    }

    #[test]
    fn test_validate_config_accepts_nonzero() {
        assert!(validate_config(&config(15.0, 7.2, 5.3)).is_ok());
    }

    #[test]
    fn test_validate_config_rejects_zero_divisors() {
        for bad in [
            config(0.0, 7.2, 5.3),
            config(15.0, 0.0, 5.3),
            config(15.0, 7.2, 0.0),
        ] {
            assert!(matches!(
                validate_config(&bad),
                Err(CameraModelError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_validate_finite() {
        assert!(validate_finite("translation", &[0.0, 1.0, -2.0]).is_ok());
        assert!(matches!(
            validate_finite("translation", &[0.0, f64::NAN, 1.0]),
            Err(CameraModelError::InvalidParams(_))
        ));
    }
}
