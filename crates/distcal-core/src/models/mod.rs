//! Camera and undistortion models.

mod intrinsic;
mod undistortion;

pub use intrinsic::{CameraIntrinsic, EquidistantIntrinsic, InitMode, PinholeIntrinsic};
pub use undistortion::{
    anamorphic4_undistort, undistort_normalized, LockMask, NormalizedFrame, ParamGroup, ParamRole,
    Undistortion, UndistortionKind,
};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("unsupported undistortion model `{0}`")]
    UnknownUndistortionModel(String),
    #[error("parameter {role:?} is not part of undistortion model {kind}")]
    RoleNotInModel {
        role: ParamRole,
        kind: UndistortionKind,
    },
    #[error("undistortion model {kind} expects {expected} parameters, got {got}")]
    ParameterCount {
        kind: UndistortionKind,
        expected: usize,
        got: usize,
    },
}
