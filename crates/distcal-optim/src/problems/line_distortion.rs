//! Undistortion estimation from straight lines.
//!
//! Every line point contributes a one-dimensional residual block: the distance
//! of the undistorted point to its line. Lines carrying an angle offset share
//! a per-group angle parameter, so row and column lines of one board stay
//! perpendicular. Spacing constraints add one residual block each.

use crate::backend::{BackendSolveOptions, OptimBackend, ParamValues, TinySolverBackend};
use crate::estimator::{DistortionEstimator, EstimationRequest};
use crate::factors::line::{line_point_residual_generic, LinePointData};
use crate::ir::{Bound, FactorKind, FixedMask, ParamId, ProblemIR, RobustLoss};
use anyhow::{anyhow, ensure, Context, Result};
use distcal_core::{LineWithPoints, ParamRole, Real, Statistics, Undistortion};
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const UNDISTORTION_PARAM: &str = "undistortion";

/// Options of the line-fit estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFitOptions {
    /// Loss applied to every point residual.
    pub robust_loss: RobustLoss,
    /// Weight of spacing-consistency residuals.
    pub spacing_weight: f64,
    /// `[lower, upper]` bounds of the squeeze parameters.
    pub squeeze_bounds: Option<[f64; 2]>,
    pub backend: BackendSolveOptions,
}

impl Default for LineFitOptions {
    fn default() -> Self {
        Self {
            robust_loss: RobustLoss::None,
            spacing_weight: 1.0,
            squeeze_bounds: Some([0.5, 2.0]),
            backend: BackendSolveOptions::default(),
        }
    }
}

/// Parameter blocks of one line.
#[derive(Debug, Clone, Copy)]
struct LineParams {
    angle: ParamId,
    dist: ParamId,
}

/// IR and initial values of a line distortion problem.
#[derive(Debug, Clone)]
pub struct LineDistortionProblem {
    pub ir: ProblemIR,
    pub initial: ParamValues,
    line_params: Vec<LineParams>,
}

impl LineDistortionProblem {
    /// Name of the angle block used by line `idx`.
    pub fn angle_param(&self, idx: usize) -> Option<&str> {
        self.line_params
            .get(idx)
            .map(|p| self.ir.param(p.angle).name.as_str())
    }
}

/// Build the IR for one estimation call.
pub fn build_line_distortion_problem(
    undistortion: &Undistortion,
    lines: &[LineWithPoints],
    request: &EstimationRequest<'_>,
    opts: &LineFitOptions,
) -> Result<LineDistortionProblem> {
    let kind = undistortion.kind();
    ensure!(
        kind.has_undistortion(),
        "undistortion model {} has no parameters to estimate",
        kind
    );
    ensure!(
        request.locks.kind() == kind && request.locks.len() == undistortion.params().len(),
        "lock mask for {} with {} entries does not match undistortion {} with {} parameters",
        request.locks.kind(),
        request.locks.len(),
        kind,
        undistortion.params().len()
    );
    ensure!(!lines.is_empty(), "no lines to fit");
    if request.use_constraints {
        for (i, c) in request.constraints.iter().enumerate() {
            ensure!(
                c.is_valid_for(lines.len()),
                "constraint {} references a line outside 0..{}",
                i,
                lines.len()
            );
        }
    }

    let mut ir = ProblemIR::new();
    let mut initial = ParamValues::new();

    let bounds = opts.squeeze_bounds.map(|[lower, upper]| {
        [ParamRole::Sqx, ParamRole::Sqy]
            .iter()
            .filter_map(|role| kind.index_of(*role))
            .map(|idx| Bound { idx, lower, upper })
            .collect::<Vec<_>>()
    });
    let undist_id = ir.add_param_block(
        UNDISTORTION_PARAM,
        kind.param_count(),
        FixedMask::fix_indices(&request.locks.locked_indices()),
        bounds.filter(|b| !b.is_empty()),
    );
    initial.insert(
        UNDISTORTION_PARAM.to_string(),
        DVector::from_column_slice(undistortion.params()),
    );

    let angle_mask = || {
        if request.lock_line_angles {
            FixedMask::all_fixed(1)
        } else {
            FixedMask::all_free()
        }
    };

    let frame = undistortion.frame();
    let mut groups: BTreeMap<usize, ParamId> = BTreeMap::new();
    let mut line_params = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        ensure!(!line.is_empty(), "line {} has no points", i);

        let angle = match line.angle_offset {
            Some(_) => *groups.entry(line.group_id).or_insert_with(|| {
                let name = format!("group_angle/{}", line.group_id);
                initial.insert(name.clone(), DVector::from_element(1, line.angle));
                ir.add_param_block(name, 1, angle_mask(), None)
            }),
            None => {
                let name = format!("line_angle/{}", i);
                initial.insert(name.clone(), DVector::from_element(1, line.angle));
                ir.add_param_block(name, 1, angle_mask(), None)
            }
        };

        let dist_name = format!("line_dist/{}", i);
        initial.insert(dist_name.clone(), DVector::from_element(1, line.dist));
        let dist = ir.add_param_block(dist_name, 1, FixedMask::all_free(), None);

        for p in &line.points {
            ir.add_residual(
                vec![undist_id, angle, dist],
                FactorKind::LinePoint {
                    pixel: [p.x, p.y],
                    frame,
                    model: kind,
                    angle_offset: line.angle_offset.unwrap_or(0.0),
                    w: 1.0,
                },
                opts.robust_loss,
            );
        }
        line_params.push(LineParams { angle, dist });
    }

    if request.use_constraints {
        for c in request.constraints {
            let params = c.indices().iter().map(|&i| line_params[i].dist).collect();
            ir.add_residual(
                params,
                FactorKind::SpacingConsistency {
                    w: opts.spacing_weight,
                },
                RobustLoss::None,
            );
        }
    }

    Ok(LineDistortionProblem {
        ir,
        initial,
        line_params,
    })
}

/// Absolute point-to-line distances in pixels, summarized.
pub fn residual_statistics(undistortion: &Undistortion, lines: &[LineWithPoints]) -> Statistics {
    let frame = undistortion.frame();
    let mut residuals = Vec::with_capacity(lines.iter().map(LineWithPoints::len).sum());
    for line in lines {
        for p in &line.points {
            let data = LinePointData {
                pixel: [p.x, p.y],
                frame,
                model: undistortion.kind(),
                angle_offset: line.angle_offset.unwrap_or(0.0),
                w: 1.0,
            };
            let r = line_point_residual_generic(
                undistortion.params(),
                line.angle,
                line.dist,
                &data,
            );
            residuals.push(r * frame.scale);
        }
    }
    Statistics::from_residuals(&residuals)
}

/// Line-fit estimator over a pluggable optimization backend.
#[derive(Debug, Clone, Default)]
pub struct LineDistortionEstimator<B = TinySolverBackend> {
    pub options: LineFitOptions,
    backend: B,
}

impl LineDistortionEstimator<TinySolverBackend> {
    pub fn new(options: LineFitOptions) -> Self {
        Self {
            options,
            backend: TinySolverBackend,
        }
    }
}

impl<B: OptimBackend> LineDistortionEstimator<B> {
    pub fn with_backend(options: LineFitOptions, backend: B) -> Self {
        Self { options, backend }
    }
}

impl<B: OptimBackend> DistortionEstimator for LineDistortionEstimator<B> {
    fn estimate(
        &self,
        undistortion: &mut Undistortion,
        lines: &mut [LineWithPoints],
        request: &EstimationRequest<'_>,
    ) -> Result<Statistics> {
        let problem = build_line_distortion_problem(undistortion, lines, request, &self.options)?;
        debug!(
            "line fit: {} lines, {} residual blocks, constraints {}, angles {}",
            lines.len(),
            problem.ir.residuals.len(),
            if request.use_constraints { "on" } else { "off" },
            if request.lock_line_angles {
                "locked"
            } else {
                "free"
            }
        );

        let solution = self
            .backend
            .solve(&problem.ir, &problem.initial, &self.options.backend)
            .context("line distortion solve failed")?;

        let value = |id: ParamId| -> Result<&DVector<f64>> {
            let name = &problem.ir.param(id).name;
            solution
                .params
                .get(name)
                .ok_or_else(|| anyhow!("missing {} in solution", name))
        };

        let params = solution
            .params
            .get(UNDISTORTION_PARAM)
            .ok_or_else(|| anyhow!("missing {} in solution", UNDISTORTION_PARAM))?;
        ensure!(
            params.iter().all(|v| v.is_finite()),
            "solver returned non-finite undistortion parameters"
        );

        let mut refined: Vec<(Real, Real)> = Vec::with_capacity(lines.len());
        for lp in &problem.line_params {
            let angle = value(lp.angle)?[0];
            let dist = value(lp.dist)?[0];
            ensure!(
                angle.is_finite() && dist.is_finite(),
                "solver returned non-finite line parameters"
            );
            refined.push((angle, dist));
        }

        undistortion.set_params(params.as_slice())?;
        for (line, (angle, dist)) in lines.iter_mut().zip(refined) {
            line.angle = angle;
            line.dist = dist;
        }

        let stats = residual_statistics(undistortion, lines).with_final_cost(solution.final_cost);
        debug!(
            "line fit done: mean {:.4} px, median {:.4} px, cost {:.3e} -> {:.3e}",
            stats.mean, stats.median, solution.initial_cost, stats.final_cost
        );
        Ok(stats)
    }
}
