use crate::geometry::standard_deviation;
use crate::optimization::PoseCorrection;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

/// Ensure the output directory exists
pub fn ensure_output_dir() -> Result<(), UtilError> {
    let output_dir = Path::new("output");
    if !output_dir.exists() {
        fs::create_dir_all(output_dir)?;
    }
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum UtilError {
    #[error("No values to summarize")]
    EmptyInput,
    #[error("I/O error: {0}")]
    IOError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Summary of a set of per-point errors.
///
/// `stddev` uses the same `n + 1` normalization as the optimizer.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ErrorStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error Statistics [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

impl ErrorStatistics {
    pub fn from_errors(errors: &[f64]) -> Result<Self, UtilError> {
        if errors.is_empty() {
            return Err(UtilError::EmptyInput);
        }

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;
        let stddev = standard_deviation(errors);

        let sum_squared: f64 = errors.iter().map(|x| x.powi(2)).sum();
        let rmse = (sum_squared / n).sqrt();

        let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        let mut sorted = errors.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Ok(ErrorStatistics {
            rmse,
            min,
            max,
            mean,
            stddev,
            median,
        })
    }
}

#[derive(Serialize)]
struct PointErrorRecord {
    index: usize,
    error_3d: Option<f64>,
    error_cam1: f64,
    error_cam2: f64,
}

/// Writes per-point errors to `output/<filename_prefix>.csv`.
///
/// `errors_3d` may be empty when no 3D reference is available; otherwise all
/// slices must share a length. Returns the path written.
pub fn export_point_errors(
    errors_3d: &[f64],
    errors_cam1: &[f64],
    errors_cam2: &[f64],
    filename_prefix: &str,
) -> Result<String, UtilError> {
    if errors_cam1.len() != errors_cam2.len()
        || (!errors_3d.is_empty() && errors_3d.len() != errors_cam1.len())
    {
        return Err(UtilError::SerializationError(format!(
            "Per-point error lengths differ: 3d {}, cam1 {}, cam2 {}",
            errors_3d.len(),
            errors_cam1.len(),
            errors_cam2.len()
        )));
    }

    ensure_output_dir()?;
    let filename = format!("output/{filename_prefix}.csv");
    let mut writer = csv::Writer::from_path(&filename)?;
    for (index, (&error_cam1, &error_cam2)) in errors_cam1.iter().zip(errors_cam2).enumerate() {
        writer.serialize(PointErrorRecord {
            index,
            error_3d: errors_3d.get(index).copied(),
            error_cam1,
            error_cam2,
        })?;
    }
    writer.flush()?;

    info!("Exported {} point errors to {filename}", errors_cam1.len());
    Ok(filename)
}

/// Writes the optimizer report as pretty JSON to `output/<filename_prefix>.json`.
pub fn export_correction_report(
    correction: &PoseCorrection,
    filename_prefix: &str,
) -> Result<String, UtilError> {
    ensure_output_dir()?;
    let filename = format!("output/{filename_prefix}.json");
    let writer = BufWriter::new(File::create(&filename)?);
    serde_json::to_writer_pretty(writer, correction)?;

    info!("Exported correction report to {filename}");
    Ok(filename)
}

impl From<std::io::Error> for UtilError {
    fn from(err: std::io::Error) -> Self {
        UtilError::IOError(err.to_string())
    }
}

impl From<csv::Error> for UtilError {
    fn from(err: csv::Error) -> Self {
        UtilError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for UtilError {
    fn from(err: serde_json::Error) -> Self {
        UtilError::SerializationError(err.to_string())
    }
}
