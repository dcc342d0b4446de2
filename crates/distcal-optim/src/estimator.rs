//! Estimator seam used by the calibration scheduler.

use anyhow::Result;
use distcal_core::{LineWithPoints, LockMask, SizeConstraint, Statistics, Undistortion};

/// Inputs of one estimation call besides the mutable model and lines.
#[derive(Debug, Clone, Copy)]
pub struct EstimationRequest<'a> {
    /// Spacing constraints over the line array.
    pub constraints: &'a [SizeConstraint],
    /// Whether `constraints` contribute residuals in this call.
    pub use_constraints: bool,
    /// Freeze line angle parameters; line offsets stay free.
    pub lock_line_angles: bool,
    /// Undistortion parameters frozen in this call.
    pub locks: &'a LockMask,
}

/// Nonlinear least-squares fit of undistortion parameters to lines.
///
/// On success the implementation refines `undistortion` and the line angles
/// and offsets in place, and returns residual statistics in pixels. On error
/// neither the undistortion nor the lines are modified.
pub trait DistortionEstimator {
    fn estimate(
        &self,
        undistortion: &mut Undistortion,
        lines: &mut [LineWithPoints],
        request: &EstimationRequest<'_>,
    ) -> Result<Statistics>;
}

impl<E: DistortionEstimator + ?Sized> DistortionEstimator for &E {
    fn estimate(
        &self,
        undistortion: &mut Undistortion,
        lines: &mut [LineWithPoints],
        request: &EstimationRequest<'_>,
    ) -> Result<Statistics> {
        (**self).estimate(undistortion, lines, request)
    }
}
