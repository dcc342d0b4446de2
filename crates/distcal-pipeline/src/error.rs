use distcal_core::{IntrinsicId, ModelError, Real, UndistortionKind};
use thiserror::Error;

/// Failure of a staged estimation run.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("calibration schedule has no steps")]
    EmptySchedule,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("failed to calibrate at step {index} ({label})")]
    StageFailed {
        index: usize,
        label: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Failure to calibrate one intrinsic.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("intrinsic {0} is not in the data set")]
    UnknownIntrinsic(IntrinsicId),
    #[error("intrinsic {0} is not referenced by any view")]
    NoViews(IntrinsicId),
    #[error("intrinsic {intrinsic_id}: views disagree on pixel aspect ratio {values:?}")]
    InconsistentPixelAspectRatio {
        intrinsic_id: IntrinsicId,
        values: Vec<Real>,
    },
    #[error("intrinsic {intrinsic_id}: {model} camera is not a pinhole camera")]
    NotPinhole {
        intrinsic_id: IntrinsicId,
        model: &'static str,
    },
    #[error("intrinsic {intrinsic_id}: undistortion model {kind} has no undistortion")]
    NoUndistortion {
        intrinsic_id: IntrinsicId,
        kind: UndistortionKind,
    },
    #[error("unsupported undistortion model {0}")]
    UnsupportedModel(UndistortionKind),
    #[error("intrinsic {0}: no usable lines in any view")]
    NotEnoughLines(IntrinsicId),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("intrinsic {intrinsic_id}: calibration failed")]
    Schedule {
        intrinsic_id: IntrinsicId,
        #[source]
        source: ScheduleError,
    },
}
