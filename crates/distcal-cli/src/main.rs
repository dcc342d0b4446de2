use std::{error::Error, path::Path};

use clap::Parser;
use distcal_pipeline::{io, CalibrationSummary, DistortionCalibrationConfig, DistortionCalibrator};
use log::info;

/// Lens distortion calibration from checkerboard detections.
#[derive(Debug, Parser)]
#[command(author, version, about = "Checkerboard line-based lens distortion calibration")]
struct Args {
    /// Path to the input data set (JSON).
    #[arg(short, long)]
    input: String,

    /// Directory containing `checkers_<viewId>.json` detection files.
    #[arg(long)]
    checkerboards: String,

    /// Path of the output data set (JSON).
    #[arg(short, long)]
    output: String,

    /// Undistortion model to calibrate. Overrides the config file; defaults to
    /// `3deanamorphic4` when neither sets it.
    #[arg(long)]
    undistortion_model_name: Option<String>,

    /// Optional path to a JSON DistortionCalibrationConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Log filter, e.g. `info` or `distcal_pipeline=debug`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

struct RunOutcome {
    summary_json: String,
    all_succeeded: bool,
}

fn run_calibration_from_files(
    input_path: &str,
    checkerboards_dir: &str,
    output_path: &str,
    model_name: Option<&str>,
    config_path: Option<&str>,
) -> Result<RunOutcome, Box<dyn Error>> {
    let mut config = if let Some(cfg_path) = config_path {
        io::load_json_file::<DistortionCalibrationConfig>(Path::new(cfg_path))?
    } else {
        DistortionCalibrationConfig::default()
    };
    if let Some(name) = model_name {
        config.undistortion_model = name.to_string();
    }

    let mut sfm = io::load_sfm_data(Path::new(input_path))?;
    let detections = io::load_detections(Path::new(checkerboards_dir), &sfm)?;
    info!(
        "loaded {} views, {} intrinsics, {} detection files",
        sfm.views.len(),
        sfm.intrinsics.len(),
        detections.len()
    );

    let summary: CalibrationSummary =
        DistortionCalibrator::new(config).calibrate(&mut sfm, &detections)?;
    io::save_sfm_data(Path::new(output_path), &sfm)?;
    info!("wrote {}", output_path);

    Ok(RunOutcome {
        summary_json: serde_json::to_string_pretty(&summary)?,
        all_succeeded: summary.all_succeeded(),
    })
}

fn main() {
    match try_main() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn try_main() -> Result<bool, Box<dyn Error>> {
    let args = Args::parse();
    env_logger::Builder::new()
        .parse_filters(&args.log_level)
        .init();

    let outcome = run_calibration_from_files(
        &args.input,
        &args.checkerboards,
        &args.output,
        args.undistortion_model_name.as_deref(),
        args.config.as_deref(),
    )?;
    println!("{}", outcome.summary_json);
    Ok(outcome.all_succeeded)
}
