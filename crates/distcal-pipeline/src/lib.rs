//! Checkerboard line-based distortion calibration pipeline.
//!
//! The pipeline turns per-view checkerboard detections into staged
//! non-linear fits of an undistortion model:
//!
//! 1. [`lines`] walks each board grid and emits straight-line candidates.
//! 2. [`constraints`] pairs consecutive row and column lines into spacing
//!    constraints and aggregates all views of one intrinsic.
//! 3. [`schedule`] runs an estimator over progressively unlocked parameters.
//! 4. [`intrinsic`] validates each intrinsic and commits the fitted model.
//!
//! ```no_run
//! use std::path::Path;
//! use distcal_pipeline::{io, DistortionCalibrationConfig, DistortionCalibrator};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut sfm = io::load_sfm_data(Path::new("sfm.json"))?;
//! let detections = io::load_detections(Path::new("checkers"), &sfm)?;
//! let calibrator = DistortionCalibrator::new(DistortionCalibrationConfig::default());
//! let summary = calibrator.calibrate(&mut sfm, &detections)?;
//! println!("{}", serde_json::to_string_pretty(&summary)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constraints;
pub mod error;
pub mod intrinsic;
pub mod io;
pub mod lines;
pub mod schedule;

pub use config::{
    DistortionCalibrationConfig, FailurePolicy, LineExtractionConfig, DEFAULT_UNDISTORTION_MODEL,
};
pub use constraints::{
    consecutive_pairs, size_constraints, GroupScope, LineSet, LineSetBuilder, SpacingCheck, ViewContribution,
};
pub use error::{CalibrationError, ScheduleError};
pub use intrinsic::{
    CalibrationSummary, DistortionCalibrator, IntrinsicCalibration, IntrinsicReport,
    IntrinsicStatus,
};
pub use lines::{
    create_lines, DiagonalRemap, FamilyRole, GridLineFamilies, GridTraversal, LineFamily,
    LineFamilyGenerator, TraversalOrder,
};
pub use schedule::{
    estimate_distortion_multistep, CalibrationSchedule, ConstraintUsage, MinimizationStep,
    ScheduleOutcome,
};
