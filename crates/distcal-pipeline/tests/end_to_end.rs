use std::cell::Cell;

use anyhow::Result;
use distcal_core::test_utils::{grid_detection, pinhole, single_intrinsic_scene, warped_grid_detection};
use distcal_core::{
    CameraIntrinsic, InitMode, LineWithPoints, ParamRole, Pt2, SfmData, Statistics, Undistortion,
    UndistortionKind, ViewDetections,
};
use distcal_optim::{DistortionEstimator, EstimationRequest};
use distcal_pipeline::{
    CalibrationError, DistortionCalibrationConfig, DistortionCalibrator, FailurePolicy,
    GridLineFamilies, IntrinsicStatus, ScheduleError,
};

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 800;

/// Moves every free parameter by a fixed amount derived from the lines.
#[derive(Default)]
struct NudgeEstimator {
    calls: Cell<usize>,
    fail_at: Option<usize>,
}

impl DistortionEstimator for NudgeEstimator {
    fn estimate(
        &self,
        undistortion: &mut Undistortion,
        lines: &mut [LineWithPoints],
        request: &EstimationRequest<'_>,
    ) -> Result<Statistics> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        anyhow::ensure!(self.fail_at != Some(call), "solver diverged");

        let spread: f64 = lines.iter().map(|l| l.points[0].x).sum::<f64>() * 1e-6;
        let mut params = undistortion.params().to_vec();
        for (i, p) in params.iter_mut().enumerate() {
            if !request.locks.is_locked(i) {
                *p += spread;
            }
        }
        undistortion.set_params(&params)?;
        Ok(Statistics {
            mean: spread,
            median: spread,
            stddev: 0.0,
            count: lines.len(),
            final_cost: spread * spread,
        })
    }
}

fn board_scene() -> (SfmData, ViewDetections) {
    let sfm = single_intrinsic_scene(0, pinhole(WIDTH, HEIGHT), &[1.0]);
    let mut detections = ViewDetections::new();
    detections.insert(1, grid_detection(10, 10, Pt2::new(200.0, 100.0), 60.0));
    (sfm, detections)
}

fn nudge_calibrator(fail_at: Option<usize>) -> DistortionCalibrator<NudgeEstimator, GridLineFamilies> {
    DistortionCalibrator::with_parts(
        DistortionCalibrationConfig::default(),
        NudgeEstimator {
            fail_at,
            ..NudgeEstimator::default()
        },
        GridLineFamilies::default(),
    )
}

#[test]
fn ten_by_ten_board_runs_the_full_schedule() {
    let (sfm, detections) = board_scene();
    let calibrator = nudge_calibrator(None);
    let result = calibrator.calibrate_intrinsic(&sfm, &detections, 0).unwrap();

    assert_eq!(result.lines, 20);
    assert_eq!(result.constraints, 81);
    assert_eq!(result.stages.len(), 4);
    assert_eq!(calibrator.estimator().calls.get(), 4);
    let undistortion = result.intrinsic.undistortion.unwrap();
    assert_eq!(undistortion.params().len(), 13);
    // Never unlocked by any stage.
    assert_eq!(undistortion.param(ParamRole::Sqy), Some(1.0));
}

#[test]
fn repeated_runs_are_identical() {
    let (sfm, detections) = board_scene();
    let first = nudge_calibrator(None)
        .calibrate_intrinsic(&sfm, &detections, 0)
        .unwrap();
    let second = nudge_calibrator(None)
        .calibrate_intrinsic(&sfm, &detections, 0)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn stage_failure_is_reported_with_its_index() {
    let (mut sfm, detections) = board_scene();
    let calibrator = nudge_calibrator(Some(2));
    let err = calibrator.calibrate_intrinsic(&sfm, &detections, 0).unwrap_err();
    match err {
        CalibrationError::Schedule {
            intrinsic_id: 0,
            source: ScheduleError::StageFailed { index, .. },
        } => assert_eq!(index, 2),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(calibrator.estimator().calls.get(), 3);

    let batch = nudge_calibrator(Some(2));
    let summary = batch.calibrate(&mut sfm, &detections).unwrap();
    assert_eq!(batch.estimator().calls.get(), 3);
    assert!(!summary.all_succeeded());
    match &summary.intrinsics[0].status {
        IntrinsicStatus::Failed { error } => assert!(error.contains("solver diverged")),
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(sfm.intrinsics[&0], pinhole(WIDTH, HEIGHT));
}

#[test]
fn batch_policies_differ_on_failure() {
    let (mut sfm, mut detections) = board_scene();
    sfm.intrinsics.insert(1, pinhole(WIDTH, HEIGHT));
    sfm.add_view(distcal_core::View::new(2, 1).with_pixel_aspect_ratio(1.0));
    sfm.add_view(distcal_core::View::new(3, 1).with_pixel_aspect_ratio(1.25));
    sfm.intrinsics.insert(2, pinhole(WIDTH, HEIGHT));
    sfm.add_view(distcal_core::View::new(4, 2));
    detections.insert(4, grid_detection(10, 10, Pt2::new(200.0, 100.0), 60.0));

    let mut continued = sfm.clone();
    let summary = nudge_calibrator(None)
        .calibrate(&mut continued, &detections)
        .unwrap();
    let calibrated: Vec<u32> = summary
        .intrinsics
        .iter()
        .filter(|r| matches!(r.status, IntrinsicStatus::Calibrated { .. }))
        .map(|r| r.intrinsic_id)
        .collect();
    assert_eq!(calibrated, vec![0, 2]);
    assert!(continued.intrinsics[&2].supports_undistortion());

    let mut aborted = sfm.clone();
    let mut strict = nudge_calibrator(None);
    strict.config.failure_policy = FailurePolicy::AbortBatch;
    let err = strict.calibrate(&mut aborted, &detections).unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::InconsistentPixelAspectRatio { intrinsic_id: 1, .. }
    ));
    assert!(aborted.intrinsics[&0].supports_undistortion());
    assert!(!aborted.intrinsics[&2].supports_undistortion());

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["intrinsics"][1]["status"], "failed");
}

/// One view of a 12×12 board seen through a barrel distortion.
fn barrel_scene() -> (SfmData, ViewDetections) {
    let frame = Undistortion::new(UndistortionKind::Anamorphic4, WIDTH, HEIGHT).frame();
    let warp = |p: Pt2| {
        let q = frame.to_normalized(&p);
        frame.to_pixel(&(q * (1.0 - 0.15 * q.norm_squared())))
    };
    let sfm = single_intrinsic_scene(0, pinhole(WIDTH, HEIGHT), &[1.0]);
    let mut detections = ViewDetections::new();
    detections.insert(
        1,
        warped_grid_detection(12, 12, Pt2::new(170.0, 70.0), 60.0, warp),
    );
    (sfm, detections)
}

#[test]
fn solver_runs_repeat_within_rounding() {
    let (sfm, detections) = barrel_scene();
    let calibrator = DistortionCalibrator::new(DistortionCalibrationConfig::default());
    let runs: Vec<_> = (0..3)
        .map(|_| calibrator.calibrate_intrinsic(&sfm, &detections, 0).unwrap())
        .collect();

    let params = |i: usize| runs[i].intrinsic.undistortion.as_ref().unwrap().params().to_vec();
    for i in 1..runs.len() {
        for (a, b) in params(0).iter().zip(params(i)) {
            assert!((a - b).abs() < 1e-10, "parameter differs: {a} vs {b}");
        }
        assert!((runs[0].statistics.mean - runs[i].statistics.mean).abs() < 1e-10);
        assert!((runs[0].statistics.median - runs[i].statistics.median).abs() < 1e-10);
    }
}

#[test]
fn barrel_distortion_is_reduced_by_the_solver() {
    let (mut sfm, detections) = barrel_scene();

    let calibrator = DistortionCalibrator::new(DistortionCalibrationConfig::default());
    let result = calibrator.calibrate_intrinsic(&sfm, &detections, 0).unwrap();
    assert_eq!(result.stages.len(), 4);
    assert!(
        result.statistics.mean < result.stages[0].mean,
        "final mean {} not below lines-only mean {}",
        result.statistics.mean,
        result.stages[0].mean
    );

    let summary = calibrator.calibrate(&mut sfm, &detections).unwrap();
    assert!(summary.all_succeeded());
    let CameraIntrinsic::Pinhole(out) = &sfm.intrinsics[&0] else {
        panic!("expected a pinhole intrinsic");
    };
    assert_eq!(out.distortion_init_mode, InitMode::Calibrated);
    assert_eq!(out.undistortion.as_ref().map(|u| u.params().len()), Some(13));
}
