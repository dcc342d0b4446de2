//! High-level entry crate for checkerboard line-based lens distortion
//! self-calibration.
//!
//! Corners detected on checkerboards lie on straight lines in the scene. The
//! calibration walks each board grid into row and column lines, ties the
//! spacing of neighbouring lines together and fits an undistortion model that
//! makes every line straight again, unlocking its parameters stage by stage.
//!
//! ```no_run
//! use distcal::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sfm: SfmData = /* load the data set */
//! # SfmData::default();
//! let detections: ViewDetections = /* load checkerboard detections */
//! # ViewDetections::new();
//!
//! let calibrator = DistortionCalibrator::new(DistortionCalibrationConfig::default());
//! let summary = calibrator.calibrate(&mut sfm, &detections)?;
//! for report in summary.failed() {
//!     eprintln!("intrinsic {} failed", report.intrinsic_id);
//! }
//! # Ok(())
//! # }
//! ```

/// Data model: boards, lines, undistortion models and the data set.
pub mod core {
    pub use distcal_core::*;
}

/// Problem IR, tiny-solver backend and the line-fit estimator.
pub mod optim {
    pub use distcal_optim::*;
}

/// Line extraction, constraints, schedules and per-intrinsic calibration.
pub mod pipeline {
    pub use distcal_pipeline::*;
}

/// Convenient re-exports for common use cases.
///
/// Import with `use distcal::prelude::*;`.
pub mod prelude {
    pub use crate::core::{
        CameraIntrinsic, CheckerDetection, LockMask, ParamRole, PinholeIntrinsic, Pt2, SfmData,
        Statistics, Undistortion, UndistortionKind, ViewDetections,
    };
    pub use crate::optim::{DistortionEstimator, LineDistortionEstimator, LineFitOptions};
    pub use crate::pipeline::{
        io, CalibrationError, CalibrationSummary, DistortionCalibrationConfig,
        DistortionCalibrator, FailurePolicy,
    };
}
