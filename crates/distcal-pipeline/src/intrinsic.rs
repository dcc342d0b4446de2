//! Per-intrinsic orchestration.
//!
//! For every intrinsic the calibrator validates its views and camera model,
//! builds a fresh pinhole model carrying the requested undistortion, gathers
//! lines from all of its views and runs the model's staged schedule.

use distcal_core::{
    CameraIntrinsic, InitMode, IntrinsicId, PinholeIntrinsic, Real, SfmData, Statistics,
    Undistortion, UndistortionKind, ViewDetections,
};
use distcal_optim::{DistortionEstimator, LineDistortionEstimator};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{DistortionCalibrationConfig, FailurePolicy};
use crate::constraints::{LineSetBuilder, ViewContribution};
use crate::error::CalibrationError;
use crate::lines::{GridLineFamilies, LineFamilyGenerator};
use crate::schedule::{estimate_distortion_multistep, CalibrationSchedule};

/// Result of calibrating one intrinsic.
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicCalibration {
    pub intrinsic_id: IntrinsicId,
    /// Replacement camera model carrying the fitted undistortion.
    pub intrinsic: PinholeIntrinsic,
    pub statistics: Statistics,
    pub stages: Vec<Statistics>,
    pub lines: usize,
    pub constraints: usize,
    pub views_used: usize,
    pub views_skipped: usize,
}

/// Outcome of one intrinsic in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IntrinsicStatus {
    Calibrated {
        statistics: Statistics,
        lines: usize,
        constraints: usize,
        views_used: usize,
        views_skipped: usize,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicReport {
    pub intrinsic_id: IntrinsicId,
    #[serde(flatten)]
    pub status: IntrinsicStatus,
}

/// Per-intrinsic results of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSummary {
    pub undistortion_model: String,
    pub intrinsics: Vec<IntrinsicReport>,
}

impl CalibrationSummary {
    pub fn all_succeeded(&self) -> bool {
        self.intrinsics
            .iter()
            .all(|r| matches!(r.status, IntrinsicStatus::Calibrated { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &IntrinsicReport> {
        self.intrinsics
            .iter()
            .filter(|r| matches!(r.status, IntrinsicStatus::Failed { .. }))
    }
}

/// Distortion calibration over an estimator and a line family generator.
#[derive(Debug, Clone)]
pub struct DistortionCalibrator<E = LineDistortionEstimator, G = GridLineFamilies> {
    pub config: DistortionCalibrationConfig,
    estimator: E,
    generator: G,
}

impl DistortionCalibrator {
    /// Calibrator with the tiny-solver line estimator and grid line families.
    pub fn new(config: DistortionCalibrationConfig) -> Self {
        let estimator = LineDistortionEstimator::new(config.estimator.clone());
        let generator = GridLineFamilies::from(&config.lines);
        Self {
            config,
            estimator,
            generator,
        }
    }
}

impl<E: DistortionEstimator, G: LineFamilyGenerator> DistortionCalibrator<E, G> {
    pub fn with_parts(config: DistortionCalibrationConfig, estimator: E, generator: G) -> Self {
        Self {
            config,
            estimator,
            generator,
        }
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Calibrate one intrinsic without modifying `sfm`.
    pub fn calibrate_intrinsic(
        &self,
        sfm: &SfmData,
        detections: &ViewDetections,
        intrinsic_id: IntrinsicId,
    ) -> Result<IntrinsicCalibration, CalibrationError> {
        let kind = UndistortionKind::from_name(&self.config.undistortion_model)?;
        let source = sfm
            .intrinsics
            .get(&intrinsic_id)
            .ok_or(CalibrationError::UnknownIntrinsic(intrinsic_id))?;

        let pixel_aspect_ratio = unique_pixel_aspect_ratio(sfm, intrinsic_id)?;

        let pinhole = source
            .as_pinhole()
            .ok_or_else(|| CalibrationError::NotPinhole {
                intrinsic_id,
                model: source.model_name(),
            })?;
        let mut output = calibrated_model(pinhole, kind);
        let mut undistortion = output
            .undistortion
            .take()
            .ok_or(CalibrationError::NoUndistortion { intrinsic_id, kind })?;
        undistortion.pixel_aspect_ratio = pixel_aspect_ratio;

        let mut builder = LineSetBuilder::new(self.config.spacing_check)
            .with_group_scope(self.config.lines.group_scope);
        let mut views_used = 0;
        let mut views_skipped = 0;
        for view in sfm.views_of(intrinsic_id) {
            let Some(detection) = detections.get(&view.view_id) else {
                debug!("view {}: no checkerboard detections", view.view_id);
                views_skipped += 1;
                continue;
            };
            match builder.add_detection(detection, &self.generator) {
                ViewContribution::Added { lines, constraints } => {
                    debug!(
                        "view {}: {} lines, {} constraints",
                        view.view_id, lines, constraints
                    );
                    views_used += 1;
                }
                ViewContribution::Skipped { lines } => {
                    warn!(
                        "view {}: only {} usable line(s), skipping",
                        view.view_id, lines
                    );
                    views_skipped += 1;
                }
            }
        }

        let mut line_set = builder.finish();
        if line_set.lines.is_empty() {
            return Err(CalibrationError::NotEnoughLines(intrinsic_id));
        }
        info!(
            "intrinsic {}: {} lines and {} constraints from {} view(s)",
            intrinsic_id,
            line_set.lines.len(),
            line_set.constraints.len(),
            views_used
        );

        let schedule = CalibrationSchedule::for_kind(kind)?;
        let outcome = estimate_distortion_multistep(
            &self.estimator,
            &mut undistortion,
            &mut line_set,
            &schedule,
        )
        .map_err(|source| CalibrationError::Schedule {
            intrinsic_id,
            source,
        })?;

        output.undistortion = Some(undistortion);
        Ok(IntrinsicCalibration {
            intrinsic_id,
            intrinsic: output,
            statistics: outcome.statistics,
            stages: outcome.stages,
            lines: line_set.lines.len(),
            constraints: line_set.constraints.len(),
            views_used,
            views_skipped,
        })
    }

    /// Calibrate every intrinsic of `sfm` in id order and replace each
    /// successfully calibrated intrinsic in place.
    ///
    /// With [`FailurePolicy::AbortBatch`] the first failure is returned as an
    /// error; intrinsics calibrated before it have already been replaced.
    pub fn calibrate(
        &self,
        sfm: &mut SfmData,
        detections: &ViewDetections,
    ) -> Result<CalibrationSummary, CalibrationError> {
        let mut summary = CalibrationSummary {
            undistortion_model: self.config.undistortion_model.clone(),
            intrinsics: Vec::new(),
        };

        for intrinsic_id in sfm.intrinsic_ids() {
            info!("calibrating intrinsic {}", intrinsic_id);
            match self.calibrate_intrinsic(sfm, detections, intrinsic_id) {
                Ok(result) => {
                    let stats = result.statistics;
                    info!(
                        "Result quality of intrinsic {}: mean {:.4} px, stddev {:.4} px, median {:.4} px",
                        intrinsic_id, stats.mean, stats.stddev, stats.median
                    );
                    sfm.intrinsics
                        .insert(intrinsic_id, CameraIntrinsic::Pinhole(result.intrinsic));
                    summary.intrinsics.push(IntrinsicReport {
                        intrinsic_id,
                        status: IntrinsicStatus::Calibrated {
                            statistics: stats,
                            lines: result.lines,
                            constraints: result.constraints,
                            views_used: result.views_used,
                            views_skipped: result.views_skipped,
                        },
                    });
                }
                Err(err) => {
                    error!("intrinsic {}: {}", intrinsic_id, error_chain(&err));
                    if self.config.failure_policy == FailurePolicy::AbortBatch {
                        return Err(err);
                    }
                    summary.intrinsics.push(IntrinsicReport {
                        intrinsic_id,
                        status: IntrinsicStatus::Failed {
                            error: error_chain(&err),
                        },
                    });
                }
            }
        }
        Ok(summary)
    }
}

/// The single pixel aspect ratio shared by every view of `intrinsic_id`.
fn unique_pixel_aspect_ratio(
    sfm: &SfmData,
    intrinsic_id: IntrinsicId,
) -> Result<Real, CalibrationError> {
    let mut values: Vec<Real> = Vec::new();
    for view in sfm.views_of(intrinsic_id) {
        let par = view.pixel_aspect_ratio();
        if !values.contains(&par) {
            values.push(par);
        }
    }
    match values.as_slice() {
        [] => Err(CalibrationError::NoViews(intrinsic_id)),
        [par] => Ok(*par),
        _ => Err(CalibrationError::InconsistentPixelAspectRatio {
            intrinsic_id,
            values,
        }),
    }
}

/// New pinhole model with the requested undistortion, carrying over the
/// physical attributes of `source`.
fn calibrated_model(source: &PinholeIntrinsic, kind: UndistortionKind) -> PinholeIntrinsic {
    let undistortion = kind
        .has_undistortion()
        .then(|| Undistortion::new(kind, source.width, source.height));
    PinholeIntrinsic {
        width: source.width,
        height: source.height,
        sensor_width: source.sensor_width,
        sensor_height: source.sensor_height,
        serial_number: source.serial_number.clone(),
        scale: source.scale,
        offset: source.offset,
        distortion_init_mode: InitMode::Calibrated,
        undistortion,
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
