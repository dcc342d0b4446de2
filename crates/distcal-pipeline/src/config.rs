//! Serializable configuration of a calibration run.

use distcal_core::MIN_POINTS_PER_LINE;
use distcal_optim::LineFitOptions;
use serde::{Deserialize, Serialize};

use crate::constraints::{GroupScope, SpacingCheck};

/// Model selected when no name is given.
pub const DEFAULT_UNDISTORTION_MODEL: &str = "3deanamorphic4";

/// Line extraction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineExtractionConfig {
    /// Lines with fewer points are dropped.
    pub min_points_per_line: usize,
    /// Also extract the four diagonal families.
    pub diagonals: bool,
    /// Angle grouping of row and column lines.
    pub group_scope: GroupScope,
}

impl Default for LineExtractionConfig {
    fn default() -> Self {
        Self {
            min_points_per_line: MIN_POINTS_PER_LINE,
            diagonals: false,
            group_scope: GroupScope::Intrinsic,
        }
    }
}

/// What to do when one intrinsic fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and continue with the next intrinsic.
    #[default]
    ContinueOnError,
    /// Stop the batch at the first failure.
    AbortBatch,
}

/// Configuration of a distortion calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionCalibrationConfig {
    pub undistortion_model: String,
    pub lines: LineExtractionConfig,
    pub spacing_check: SpacingCheck,
    pub estimator: LineFitOptions,
    pub failure_policy: FailurePolicy,
}

impl Default for DistortionCalibrationConfig {
    fn default() -> Self {
        Self {
            undistortion_model: DEFAULT_UNDISTORTION_MODEL.to_string(),
            lines: LineExtractionConfig::default(),
            spacing_check: SpacingCheck::default(),
            estimator: LineFitOptions::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}
