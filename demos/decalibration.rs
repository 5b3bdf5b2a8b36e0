//! Stereo Decalibration Example
//!
//! Loads a stereo rig, observes a synthetic tilted surface with it, shifts
//! the first camera to simulate decalibration and searches for the pose
//! correction that explains the observations again.
//!
//! Usage:
//! ```bash
//! cargo run --example decalibration -- \
//!   --rig-path samples/stereo_rig.yaml \
//!   --drift 5.0 0.0 0.0 \
//!   --seed 42
//! ```

use clap::Parser;
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::info;
use nalgebra::Vector3;
use std::path::PathBuf;
use stereo_decalibration::geometry::{
    flat_surface_points, reprojection_error_2d, reprojection_error_3d, triangulate, SurfaceConfig,
};
use stereo_decalibration::optimization::{
    optimize_pose_correction, CorrectionMode, NelderMeadConfig, PoseCorrectionCost, PoseParams,
};
use stereo_decalibration::util::{export_correction_report, export_point_errors, ErrorStatistics};
use stereo_decalibration::CameraModel;

/// Stereo decalibration modelling tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the stereo rig file
    #[arg(short = 'p', long, default_value = "samples/stereo_rig.yaml")]
    rig_path: PathBuf,

    /// Translation drift applied to the first camera, in mm
    #[arg(short = 'd', long, num_args = 3, default_values_t = [5.0, 0.0, 0.0], allow_negative_numbers = true)]
    drift: Vec<f64>,

    /// Seed for the restart jitter
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// Also optimize the rotation of the first camera
    #[arg(long)]
    full: bool,

    /// Run the restarts in parallel
    #[arg(long)]
    parallel: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Logger::try_with_str("info")?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .suppress_timestamp()
                .suffix("log"),
        )
        .duplicate_to_stdout(Duplicate::All)
        .format_for_files(detailed_format)
        .format_for_stdout(colored_detailed_format)
        // error;warn;info;debug;trace
        .set_palette("196;208;76;39;178".to_string())
        .start()?;

    let cli = Cli::parse();
    info!("Rig Path: {:?}", cli.rig_path);
    info!("Drift: {:?}", cli.drift);

    let rig_path = cli.rig_path.to_str().ok_or("Invalid rig path string")?;
    let camera1 = CameraModel::load_from_yaml(rig_path, "cam0")?;
    let camera2 = CameraModel::load_from_yaml(rig_path, "cam1")?;

    let surface = SurfaceConfig::default();
    let points_3d = flat_surface_points(&surface);
    info!("Surface: {:?} ({} points)", surface, points_3d.ncols());

    let points_2d_1 = camera1.project_points(&points_3d)?;
    let points_2d_2 = camera2.project_points(&points_3d)?;

    let baseline = triangulate(&camera1, &camera2, &points_2d_1, &points_2d_2)?;
    let errors_3d = reprojection_error_3d(&points_3d, &baseline)?;
    info!(
        "Calibrated rig, 3D error: {:?}",
        ErrorStatistics::from_errors(&errors_3d)?
    );

    let mut drifted = camera1.clone();
    drifted.translation += Vector3::new(cli.drift[0], cli.drift[1], cli.drift[2]);

    let decalibrated = triangulate(&drifted, &camera2, &points_2d_1, &points_2d_2)?;
    let errors_3d = reprojection_error_3d(&points_3d, &decalibrated)?;
    let (errors_cam1, errors_cam2) =
        reprojection_error_2d(&decalibrated, &points_2d_1, &points_2d_2, &drifted, &camera2)?;
    info!(
        "Decalibrated rig, 3D error: {:?}",
        ErrorStatistics::from_errors(&errors_3d)?
    );
    info!(
        "Decalibrated rig, camera 1 pixel error: {:?}",
        ErrorStatistics::from_errors(&errors_cam1)?
    );
    info!(
        "Decalibrated rig, camera 2 pixel error: {:?}",
        ErrorStatistics::from_errors(&errors_cam2)?
    );
    export_point_errors(&errors_3d, &errors_cam1, &errors_cam2, "decalibrated_point_errors")?;

    let config = NelderMeadConfig {
        correction_mode: if cli.full {
            CorrectionMode::Full
        } else {
            CorrectionMode::TranslationOnly
        },
        random_seed: cli.seed,
        parallel: cli.parallel,
        ..NelderMeadConfig::default()
    };
    let correction = optimize_pose_correction(
        &drifted,
        &camera2,
        &points_2d_1,
        &points_2d_2,
        &PoseParams::zeros(),
        &config,
    )?;

    info!(
        "Correction: translation [{:.4}, {:.4}, {:.4}] mm, rotation [{:.6}, {:.6}, {:.6}] rad",
        correction.params[0],
        correction.params[1],
        correction.params[2],
        correction.params[3],
        correction.params[4],
        correction.params[5]
    );
    info!(
        "Score: {:.6e} (initial {:.6e})",
        correction.score, correction.initial_score
    );

    let corrected = PoseCorrectionCost::new(
        &drifted,
        &camera2,
        &points_2d_1,
        &points_2d_2,
        PoseParams::zeros(),
        config.correction_mode,
    )?
    .corrected_camera(&correction.params);
    let recovered = triangulate(&corrected, &camera2, &points_2d_1, &points_2d_2)?;
    let errors_3d = reprojection_error_3d(&points_3d, &recovered)?;
    info!(
        "Corrected rig, 3D error: {:?}",
        ErrorStatistics::from_errors(&errors_3d)?
    );

    export_correction_report(&correction, "pose_correction")?;
    Ok(())
}
