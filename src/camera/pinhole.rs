//! Implements the pinhole camera of the stereo rig.
//!
//! This module provides the [`CameraModel`] struct: the intrinsic matrix is
//! derived from the physical sensor description ([`CameraConfig`]) and the
//! extrinsic pose is kept as a rotation matrix and translation vector.
//! Projection follows the classic pipeline: rigid transform, perspective
//! division, radial-tangential distortion, intrinsic matrix.

use crate::camera::{
    validation, CameraConfig, CameraModelError, RadTanDistortion, Resolution, SensorSize,
};
use nalgebra::{Matrix2xX, Matrix3, Matrix3x4, Matrix3xX, Vector2, Vector3};
use std::fs;
use std::io::Write;
use std::sync::OnceLock;
use yaml_rust::{Yaml, YamlLoader};

/// A pinhole camera with a derived intrinsic matrix and a mutable pose.
///
/// The intrinsic matrix is computed on first use and memoized until the
/// configuration changes or it is overwritten with
/// [`CameraModel::set_intrinsic_matrix`]. Rotation, translation and
/// distortion are plain fields; every derived quantity that depends on them
/// (projection matrix, projected points) is recomputed on each call.
///
/// # Examples
///
/// ```rust
/// use stereo_decalibration::camera::{CameraConfig, CameraModel, Resolution, SensorSize};
///
/// let camera = CameraModel::new(CameraConfig {
///     focal_length: 15.0,
///     sensor_size: SensorSize { width: 7.2, height: 5.3 },
///     resolution: Resolution { width: 2048, height: 1536 },
/// });
///
/// let k = camera.intrinsic_matrix().unwrap();
/// assert_eq!(k[(0, 2)], 1024.0);
/// assert_eq!(k[(2, 2)], 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct CameraModel {
    config: CameraConfig,
    intrinsic_matrix: OnceLock<Matrix3<f64>>,
    /// Orientation of the camera relative to the world frame.
    pub rotation: Matrix3<f64>,
    /// Translation of the world origin into the camera frame.
    pub translation: Vector3<f64>,
    pub distortion: RadTanDistortion,
}

impl CameraModel {
    /// Creates a camera at the world origin (identity rotation, zero
    /// translation, no distortion).
    ///
    /// The configuration is not validated here; an invalid one surfaces as
    /// [`CameraModelError::InvalidConfiguration`] the first time the
    /// intrinsic matrix is needed.
    pub fn new(config: CameraConfig) -> Self {
        CameraModel {
            config,
            intrinsic_matrix: OnceLock::new(),
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
            distortion: RadTanDistortion::default(),
        }
    }

    pub fn with_pose(mut self, rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        self.rotation = rotation;
        self.translation = translation;
        self
    }

    pub fn with_distortion(mut self, distortion: RadTanDistortion) -> Self {
        self.distortion = distortion;
        self
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn focal_length(&self) -> f64 {
        self.config.focal_length
    }

    pub fn sensor_size(&self) -> SensorSize {
        self.config.sensor_size
    }

    pub fn resolution(&self) -> Resolution {
        self.config.resolution
    }

    pub fn set_focal_length(&mut self, focal_length: f64) {
        self.config.focal_length = focal_length;
        self.intrinsic_matrix = OnceLock::new();
    }

    pub fn set_sensor_size(&mut self, sensor_size: SensorSize) {
        self.config.sensor_size = sensor_size;
        self.intrinsic_matrix = OnceLock::new();
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.config.resolution = resolution;
        self.intrinsic_matrix = OnceLock::new();
    }

    /// Returns the 3x3 intrinsic matrix
    ///
    /// ```text
    /// | fx  0  cx |
    /// |  0 fy  cy |
    /// |  0  0   1 |
    /// ```
    ///
    /// with `fx = width_px / width_mm * f`, `fy = height_px / height_mm * f`
    /// and the principal point at the integer half of the pixel resolution.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidConfiguration`]: the focal length or one of
    ///   the sensor dimensions is zero.
    pub fn intrinsic_matrix(&self) -> Result<Matrix3<f64>, CameraModelError> {
        if let Some(k) = self.intrinsic_matrix.get() {
            return Ok(*k);
        }
        let k = self.derive_intrinsic_matrix()?;
        // A concurrent reader may have filled the cell first; both values are identical.
        let _ = self.intrinsic_matrix.set(k);
        Ok(k)
    }

    /// Overrides the derived intrinsic matrix. Later reads return `k`
    /// unchanged until it is overwritten again or the configuration changes.
    pub fn set_intrinsic_matrix(&mut self, k: Matrix3<f64>) {
        self.intrinsic_matrix = OnceLock::from(k);
    }

    fn derive_intrinsic_matrix(&self) -> Result<Matrix3<f64>, CameraModelError> {
        validation::validate_config(&self.config)?;

        let CameraConfig {
            focal_length,
            sensor_size,
            resolution,
        } = self.config;

        let fx = resolution.width as f64 / sensor_size.width * focal_length;
        let fy = resolution.height as f64 / sensor_size.height * focal_length;
        let cx = (resolution.width / 2) as f64;
        let cy = (resolution.height / 2) as f64;

        Ok(Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0))
    }

    /// The 3x4 rigid transform `[R | t]`.
    pub fn extrinsic_matrix(&self) -> Matrix3x4<f64> {
        let mut rt = Matrix3x4::zeros();
        rt.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        rt.set_column(3, &self.translation);
        rt
    }

    /// The 3x4 projection matrix `K · [R | t]`, rebuilt from the current pose
    /// on every call.
    pub fn projection_matrix(&self) -> Result<Matrix3x4<f64>, CameraModelError> {
        Ok(self.intrinsic_matrix()? * self.extrinsic_matrix())
    }

    /// Projects a single world point to pixel coordinates.
    ///
    /// A point with zero depth in the camera frame is divided by one instead
    /// of zero, so the result stays finite.
    pub fn project_point(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        let k = self.intrinsic_matrix()?;
        Ok(self.project_with(&k, point_3d))
    }

    /// Projects every column of `points_3d`; column `i` of the result is the
    /// image of column `i` of the input.
    pub fn project_points(
        &self,
        points_3d: &Matrix3xX<f64>,
    ) -> Result<Matrix2xX<f64>, CameraModelError> {
        let k = self.intrinsic_matrix()?;
        let mut points_2d = Matrix2xX::zeros(points_3d.ncols());
        for (i, point_3d) in points_3d.column_iter().enumerate() {
            let projected = self.project_with(&k, &point_3d.into_owned());
            points_2d.set_column(i, &projected);
        }
        Ok(points_2d)
    }

    fn project_with(&self, k: &Matrix3<f64>, point_3d: &Vector3<f64>) -> Vector2<f64> {
        let point_cam = self.rotation * point_3d + self.translation;

        let inv_z = if point_cam.z != 0.0 {
            1.0 / point_cam.z
        } else {
            1.0
        };
        let normalized = self
            .distortion
            .distort(point_cam.x * inv_z, point_cam.y * inv_z);

        let pixel = k * Vector3::new(normalized.x, normalized.y, 1.0);
        let inv_w = if pixel.z != 0.0 { 1.0 / pixel.z } else { 1.0 };
        Vector2::new(pixel.x * inv_w, pixel.y * inv_w)
    }

    /// Validates the configuration and the pose.
    pub fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_config(&self.config)?;
        validation::validate_finite("rotation", self.rotation.as_slice())?;
        validation::validate_finite("translation", self.translation.as_slice())?;
        validation::validate_finite("distortion", &self.distortion.coefficients)?;
        Ok(())
    }

    /// Loads a camera from the mapping stored under `key` in a YAML file.
    ///
    /// Expected layout:
    ///
    /// ```yaml
    /// cam0:
    ///   focal_length: 15.0
    ///   sensor_size: [7.2, 5.3]
    ///   resolution: [2048, 1536]
    ///   rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]  # optional, row-major
    ///   translation: [0.0, 0.0, 0.0]                             # optional
    ///   distortion: [0.0, 0.0, 0.0, 0.0, 0.0]                    # optional
    /// ```
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::IOError`]: the file cannot be read.
    /// * [`CameraModelError::YamlError`]: the content is not valid YAML.
    /// * [`CameraModelError::InvalidParams`]: a field is missing, has the wrong
    ///   type or the wrong number of elements.
    /// * [`CameraModelError::InvalidConfiguration`]: the loaded configuration
    ///   cannot produce an intrinsic matrix.
    pub fn load_from_yaml(path: &str, key: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;
        let doc = docs
            .first()
            .ok_or_else(|| CameraModelError::YamlError(format!("{path} is empty")))?;

        let node = &doc[key];
        if node.is_badvalue() {
            return Err(CameraModelError::InvalidParams(format!(
                "YAML missing camera '{key}'"
            )));
        }

        let focal_length = yaml_f64(&node["focal_length"]).ok_or_else(|| {
            CameraModelError::InvalidParams("Invalid focal_length: not a number".to_string())
        })?;
        let sensor_size = yaml_f64_array::<2>(node, "sensor_size")?.ok_or_else(|| {
            CameraModelError::InvalidParams("YAML missing 'sensor_size'".to_string())
        })?;
        let resolution = node["resolution"].as_vec().ok_or_else(|| {
            CameraModelError::InvalidParams("YAML missing 'resolution' or not an array".to_string())
        })?;
        if resolution.len() != 2 {
            return Err(CameraModelError::InvalidParams(
                "'resolution' must have 2 elements".to_string(),
            ));
        }
        let pixels = |i: usize, name: &str| {
            resolution[i]
                .as_i64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    CameraModelError::InvalidParams(format!(
                        "Invalid {name}: not an integer in 0..=u32::MAX"
                    ))
                })
        };

        let config = CameraConfig {
            focal_length,
            sensor_size: SensorSize {
                width: sensor_size[0],
                height: sensor_size[1],
            },
            resolution: Resolution {
                width: pixels(0, "width")?,
                height: pixels(1, "height")?,
            },
        };

        let mut model = CameraModel::new(config);
        if let Some(r) = yaml_f64_array::<9>(node, "rotation")? {
            model.rotation = Matrix3::from_row_slice(&r);
        }
        if let Some(t) = yaml_f64_array::<3>(node, "translation")? {
            model.translation = Vector3::from(t);
        }
        if let Some(d) = yaml_f64_array::<5>(node, "distortion")? {
            model.distortion = RadTanDistortion::new(d);
        }

        model.validate_params()?;

        Ok(model)
    }

    /// Saves the camera under `key` in a new YAML file, in the layout read by
    /// [`CameraModel::load_from_yaml`].
    pub fn save_to_yaml(&self, path: &str, key: &str) -> Result<(), CameraModelError> {
        let to_yaml = |value: serde_yaml::Result<serde_yaml::Value>| {
            value.map_err(|e| CameraModelError::YamlError(e.to_string()))
        };
        let rotation: Vec<f64> = self.rotation.transpose().as_slice().to_vec();

        let camera = serde_yaml::Mapping::from_iter([
            (
                serde_yaml::Value::String("focal_length".to_string()),
                serde_yaml::Value::from(self.config.focal_length),
            ),
            (
                serde_yaml::Value::String("sensor_size".to_string()),
                to_yaml(serde_yaml::to_value(vec![
                    self.config.sensor_size.width,
                    self.config.sensor_size.height,
                ]))?,
            ),
            (
                serde_yaml::Value::String("resolution".to_string()),
                to_yaml(serde_yaml::to_value(vec![
                    self.config.resolution.width,
                    self.config.resolution.height,
                ]))?,
            ),
            (
                serde_yaml::Value::String("rotation".to_string()),
                to_yaml(serde_yaml::to_value(rotation))?,
            ),
            (
                serde_yaml::Value::String("translation".to_string()),
                to_yaml(serde_yaml::to_value(self.translation.as_slice().to_vec()))?,
            ),
            (
                serde_yaml::Value::String("distortion".to_string()),
                to_yaml(serde_yaml::to_value(self.distortion.coefficients.to_vec()))?,
            ),
        ]);
        let yaml = serde_yaml::Mapping::from_iter([(
            serde_yaml::Value::String(key.to_string()),
            serde_yaml::Value::Mapping(camera),
        )]);

        let yaml_string =
            serde_yaml::to_string(&yaml).map_err(|e| CameraModelError::YamlError(e.to_string()))?;

        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;

        Ok(())
    }
}

/// YAML numbers written without a fractional part parse as integers.
fn yaml_f64(value: &Yaml) -> Option<f64> {
    value.as_f64().or_else(|| value.as_i64().map(|v| v as f64))
}

fn yaml_f64_array<const N: usize>(
    node: &Yaml,
    field: &str,
) -> Result<Option<[f64; N]>, CameraModelError> {
    let value = &node[field];
    if value.is_badvalue() {
        return Ok(None);
    }
    let items = value.as_vec().ok_or_else(|| {
        CameraModelError::InvalidParams(format!("'{field}' is not an array"))
    })?;
    if items.len() != N {
        return Err(CameraModelError::InvalidParams(format!(
            "'{field}' must have {N} elements, found {}",
            items.len()
        )));
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = yaml_f64(item).ok_or_else(|| {
            CameraModelError::InvalidParams(format!("'{field}' contains a non-numeric value"))
        })?;
    }
    Ok(Some(out))
}
