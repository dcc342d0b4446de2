//! Staged estimation with progressively unlocked parameters.

use distcal_core::{
    LockMask, ModelError, ParamGroup, ParamRole, Real, Statistics, Undistortion,
    UndistortionKind,
};
use distcal_optim::{DistortionEstimator, EstimationRequest};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::constraints::LineSet;
use crate::error::{CalibrationError, ScheduleError};

/// Which spacing constraints a step uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintUsage {
    Disabled,
    All,
}

/// One estimation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimizationStep {
    pub label: String,
    pub locks: LockMask,
    pub constraints: ConstraintUsage,
    pub lock_line_angles: bool,
}

/// Initial parameters and ordered stages for one undistortion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSchedule {
    pub initial_params: Vec<Real>,
    pub steps: Vec<MinimizationStep>,
}

impl CalibrationSchedule {
    pub fn for_kind(kind: UndistortionKind) -> Result<Self, CalibrationError> {
        match kind {
            UndistortionKind::Anamorphic4 => Ok(Self::anamorphic4()?),
            UndistortionKind::None => Err(CalibrationError::UnsupportedModel(kind)),
        }
    }

    /// Lines first, then rotation and squeeze, then the degree-2 terms, then
    /// everything but the vertical squeeze.
    pub fn anamorphic4() -> Result<Self, ModelError> {
        let kind = UndistortionKind::Anamorphic4;
        let all_locked = LockMask::all_locked(kind);
        let rotation_squeeze = all_locked
            .clone()
            .unlock_group(ParamGroup::Rotation)?
            .unlock(ParamRole::Sqx)?;
        let degree2 = rotation_squeeze.clone().unlock_group(ParamGroup::Degree2)?;
        let full = degree2.clone().unlock_group(ParamGroup::Degree4)?;

        Ok(Self {
            initial_params: kind.identity_params(),
            steps: vec![
                MinimizationStep {
                    label: "lines".into(),
                    locks: all_locked,
                    constraints: ConstraintUsage::Disabled,
                    lock_line_angles: true,
                },
                MinimizationStep {
                    label: "rotation_squeeze".into(),
                    locks: rotation_squeeze,
                    constraints: ConstraintUsage::All,
                    lock_line_angles: false,
                },
                MinimizationStep {
                    label: "degree2".into(),
                    locks: degree2,
                    constraints: ConstraintUsage::All,
                    lock_line_angles: false,
                },
                MinimizationStep {
                    label: "full".into(),
                    locks: full,
                    constraints: ConstraintUsage::All,
                    lock_line_angles: false,
                },
            ],
        })
    }
}

/// Statistics of a completed schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    /// Statistics of the last step.
    pub statistics: Statistics,
    /// Statistics of every step, in order.
    pub stages: Vec<Statistics>,
}

/// Seed `undistortion` with the schedule's initial parameters and run every
/// step in order.
///
/// Parameters and line estimates carry over from step to step. The first
/// failing step aborts the run; later steps are not attempted and the
/// undistortion keeps the values of the last successful step.
pub fn estimate_distortion_multistep<E: DistortionEstimator + ?Sized>(
    estimator: &E,
    undistortion: &mut Undistortion,
    line_set: &mut LineSet,
    schedule: &CalibrationSchedule,
) -> Result<ScheduleOutcome, ScheduleError> {
    if schedule.steps.is_empty() {
        return Err(ScheduleError::EmptySchedule);
    }
    undistortion.set_params(&schedule.initial_params)?;

    let mut stages = Vec::with_capacity(schedule.steps.len());
    for (index, step) in schedule.steps.iter().enumerate() {
        let request = EstimationRequest {
            constraints: &line_set.constraints,
            use_constraints: step.constraints == ConstraintUsage::All,
            lock_line_angles: step.lock_line_angles,
            locks: &step.locks,
        };
        debug!(
            "step {} ({}): {} free parameters, constraints {:?}",
            index,
            step.label,
            step.locks.len() - step.locks.locked_indices().len(),
            step.constraints
        );
        match estimator.estimate(undistortion, &mut line_set.lines, &request) {
            Ok(stats) => {
                debug!(
                    "step {} ({}): mean {:.4} px, median {:.4} px",
                    index, step.label, stats.mean, stats.median
                );
                stages.push(stats);
            }
            Err(source) => {
                error!("Failed to calibrate at step {}: {:#}", index, source);
                return Err(ScheduleError::StageFailed {
                    index,
                    label: step.label.clone(),
                    source,
                });
            }
        }
    }

    Ok(ScheduleOutcome {
        statistics: stages.last().copied().unwrap_or_default(),
        stages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use distcal_core::LineWithPoints;
    use std::cell::RefCell;

    /// Records each call and bumps `cx02` by one, failing on `fail_at`.
    struct ScriptedEstimator {
        fail_at: Option<usize>,
        calls: RefCell<Vec<(bool, bool, Vec<usize>)>>,
    }

    impl ScriptedEstimator {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                fail_at,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl DistortionEstimator for ScriptedEstimator {
        fn estimate(
            &self,
            undistortion: &mut Undistortion,
            _lines: &mut [LineWithPoints],
            request: &EstimationRequest<'_>,
        ) -> Result<Statistics> {
            let call = self.calls.borrow().len();
            self.calls.borrow_mut().push((
                request.use_constraints,
                request.lock_line_angles,
                request.locks.locked_indices(),
            ));
            if self.fail_at == Some(call) {
                bail!("diverged");
            }
            let mut params = undistortion.params().to_vec();
            params[0] += 1.0;
            undistortion.set_params(&params)?;
            Ok(Statistics {
                mean: call as f64,
                ..Statistics::default()
            })
        }
    }

    fn undistortion() -> Undistortion {
        Undistortion::new(UndistortionKind::Anamorphic4, 640, 480)
    }

    #[test]
    fn anamorphic4_schedule_unlocks_progressively() {
        let schedule = CalibrationSchedule::anamorphic4().unwrap();
        assert_eq!(schedule.initial_params.len(), 13);
        assert_eq!(&schedule.initial_params[10..], &[0.0, 1.0, 1.0]);

        let locked: Vec<Vec<usize>> = schedule
            .steps
            .iter()
            .map(|s| s.locks.locked_indices())
            .collect();
        assert_eq!(locked[0], (0..13).collect::<Vec<_>>());
        assert_eq!(locked[1], vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 12]);
        assert_eq!(locked[2], vec![4, 5, 6, 7, 8, 9, 12]);
        assert_eq!(locked[3], vec![12]);

        assert_eq!(schedule.steps[0].constraints, ConstraintUsage::Disabled);
        assert!(schedule.steps[0].lock_line_angles);
        assert!(schedule.steps[1..]
            .iter()
            .all(|s| s.constraints == ConstraintUsage::All && !s.lock_line_angles));
        assert!(schedule.steps.iter().all(|s| s.locks.len() == 13));
    }

    #[test]
    fn none_model_has_no_schedule() {
        assert!(matches!(
            CalibrationSchedule::for_kind(UndistortionKind::None),
            Err(CalibrationError::UnsupportedModel(UndistortionKind::None))
        ));
    }

    #[test]
    fn all_steps_run_in_order() {
        let schedule = CalibrationSchedule::anamorphic4().unwrap();
        let estimator = ScriptedEstimator::new(None);
        let mut u = undistortion();
        let mut set = LineSet::default();

        let outcome =
            estimate_distortion_multistep(&estimator, &mut u, &mut set, &schedule).unwrap();

        let calls = estimator.calls.borrow();
        assert_eq!(calls.len(), 4);
        for (call, step) in calls.iter().zip(&schedule.steps) {
            assert_eq!(call.0, step.constraints == ConstraintUsage::All);
            assert_eq!(call.1, step.lock_line_angles);
            assert_eq!(call.2, step.locks.locked_indices());
        }
        assert_eq!(u.params()[0], 4.0);
        assert_eq!(outcome.stages.len(), 4);
        assert_eq!(outcome.statistics.mean, 3.0);
    }

    #[test]
    fn failure_stops_later_steps() {
        let schedule = CalibrationSchedule::anamorphic4().unwrap();
        for fail_at in 0..4 {
            let estimator = ScriptedEstimator::new(Some(fail_at));
            let mut u = undistortion();
            let mut set = LineSet::default();

            let err =
                estimate_distortion_multistep(&estimator, &mut u, &mut set, &schedule).unwrap_err();
            match err {
                ScheduleError::StageFailed { index, .. } => assert_eq!(index, fail_at),
                other => panic!("unexpected error {other:?}"),
            }
            assert_eq!(estimator.calls.borrow().len(), fail_at + 1);
            assert_eq!(u.params()[0], fail_at as f64);
        }
    }

    #[test]
    fn run_reseeds_initial_parameters() {
        let schedule = CalibrationSchedule::anamorphic4().unwrap();
        let mut u = undistortion();
        u.set_params(&[9.0; 13]).unwrap();
        let mut set = LineSet::default();
        estimate_distortion_multistep(&ScriptedEstimator::new(None), &mut u, &mut set, &schedule)
            .unwrap();
        assert_eq!(u.params()[0], 4.0);
        assert_eq!(u.params()[12], 1.0);
    }

    #[test]
    fn empty_schedule_and_wrong_length_are_errors() {
        let mut u = undistortion();
        let mut set = LineSet::default();
        let estimator = ScriptedEstimator::new(None);

        let empty = CalibrationSchedule {
            initial_params: vec![0.0; 13],
            steps: Vec::new(),
        };
        assert!(matches!(
            estimate_distortion_multistep(&estimator, &mut u, &mut set, &empty),
            Err(ScheduleError::EmptySchedule)
        ));

        let mut short = CalibrationSchedule::anamorphic4().unwrap();
        short.initial_params.pop();
        assert!(matches!(
            estimate_distortion_multistep(&estimator, &mut u, &mut set, &short),
            Err(ScheduleError::Model(ModelError::ParameterCount { .. }))
        ));
        assert!(estimator.calls.borrow().is_empty());
    }
}
