use crate::backend::{BackendSolution, BackendSolveOptions, LinearSolverKind, OptimBackend, ParamValues};
use crate::factors::line::{line_point_residual_generic, spacing_residual_generic, LinePointData};
use crate::ir::{FactorKind, ParamBlock, ProblemIR, ResidualBlock, RobustLoss};
use anyhow::{anyhow, ensure, Context, Result};
use log::trace;
use nalgebra::DVector;
use tiny_solver::factors::{Factor, FactorImpl};
use tiny_solver::loss_functions::{ArctanLoss, CauchyLoss, HuberLoss, Loss};
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::{linear::sparse::LinearSolverType, LevenbergMarquardtOptimizer};

type BoxedFactor = Box<dyn FactorImpl + Send>;
type BoxedLoss = Option<Box<dyn Loss + Send>>;

/// Levenberg–Marquardt through `tiny-solver`, with autodiff factors.
///
/// Repeated solves of one problem agree to rounding (well below 1e-10), not
/// bit for bit: tiny-solver orders variables through a `HashMap`, so the
/// summation order of the normal equations varies between runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TinySolverBackend;

impl TinySolverBackend {
    fn compile(&self, ir: &ProblemIR, initial: &ParamValues) -> Result<Problem> {
        ir.validate()?;
        ensure!(!ir.residuals.is_empty(), "problem has no residual blocks");

        let mut problem = Problem::new();
        for block in &ir.params {
            check_initial(block, initial)?;
            constrain_block(&mut problem, block);
        }

        for (i, residual) in ir.residuals.iter().enumerate() {
            let names: Vec<&str> = residual
                .params
                .iter()
                .map(|&id| ir.param(id).name.as_str())
                .collect();
            let factor = native_factor(&residual.factor);
            let loss = native_loss(residual).with_context(|| format!("residual block {i}"))?;
            problem.add_residual_block(residual.residual_dim, &names, factor, loss);
        }
        trace!(
            "compiled {} parameter blocks and {} residual blocks",
            ir.params.len(),
            ir.residuals.len()
        );
        Ok(problem)
    }
}

fn check_initial(block: &ParamBlock, initial: &ParamValues) -> Result<()> {
    let value = initial
        .get(&block.name)
        .ok_or_else(|| anyhow!("no initial value for block {}", block.name))?;
    ensure!(
        value.len() == block.dim,
        "block {} has {} initial values, expected {}",
        block.name,
        value.len(),
        block.dim
    );
    ensure!(
        value.iter().all(|v| v.is_finite()),
        "block {} has non-finite initial values",
        block.name
    );
    Ok(())
}

/// Fixed indices and bounds. Bounds on fixed indices are dropped.
fn constrain_block(problem: &mut Problem, block: &ParamBlock) {
    for idx in block.fixed.iter() {
        problem.fix_variable(&block.name, idx);
    }
    for bound in block.bounds.iter().flatten() {
        if !block.fixed.is_fixed(bound.idx) {
            problem.set_variable_bounds(&block.name, bound.idx, bound.lower, bound.upper);
        }
    }
}

/// `½·Σ ρ(r²)` at `values`.
fn robust_cost(problem: &Problem, values: &ParamValues) -> f64 {
    let blocks = problem.initialize_parameter_blocks(values);
    let residuals = problem.compute_residuals(&blocks, true);
    0.5 * residuals.as_ref().squared_norm_l2()
}

impl OptimBackend for TinySolverBackend {
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &ParamValues,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution> {
        let problem = self.compile(ir, initial)?;
        let initial_cost = robust_cost(&problem, initial);

        let params = LevenbergMarquardtOptimizer::default()
            .optimize(&problem, initial, Some(optimizer_options(opts)))
            .ok_or_else(|| anyhow!("Levenberg-Marquardt did not return a solution"))?;

        let final_cost = robust_cost(&problem, &params);
        ensure!(
            final_cost.is_finite(),
            "solve ended with a non-finite cost (started at {initial_cost:.3e})"
        );
        Ok(BackendSolution {
            params,
            initial_cost,
            final_cost,
        })
    }
}

fn optimizer_options(opts: &BackendSolveOptions) -> OptimizerOptions {
    let mut options = OptimizerOptions {
        max_iteration: opts.max_iters,
        verbosity_level: opts.verbosity,
        ..OptimizerOptions::default()
    };
    if let Some(kind) = opts.linear_solver {
        options.linear_solver_type = match kind {
            LinearSolverKind::SparseCholesky => LinearSolverType::SparseCholesky,
            LinearSolverKind::SparseQR => LinearSolverType::SparseQR,
        };
    }
    options.min_abs_error_decrease_threshold = opts
        .min_abs_decrease
        .unwrap_or(options.min_abs_error_decrease_threshold);
    options.min_rel_error_decrease_threshold = opts
        .min_rel_decrease
        .unwrap_or(options.min_rel_error_decrease_threshold);
    options.min_error_threshold = opts.min_error.unwrap_or(options.min_error_threshold);
    options
}

fn native_loss(residual: &ResidualBlock) -> Result<BoxedLoss> {
    let loss: BoxedLoss = match residual.loss {
        RobustLoss::None => None,
        RobustLoss::Huber { scale } => Some(Box::new(HuberLoss::new(positive(scale)?))),
        RobustLoss::Cauchy { scale } => Some(Box::new(CauchyLoss::new(positive(scale)?))),
        RobustLoss::Arctan { scale } => Some(Box::new(ArctanLoss::new(positive(scale)?))),
    };
    Ok(loss)
}

fn positive(scale: f64) -> Result<f64> {
    ensure!(
        scale.is_finite() && scale > 0.0,
        "robust loss scale must be positive, got {scale}"
    );
    Ok(scale)
}

fn native_factor(kind: &FactorKind) -> BoxedFactor {
    match *kind {
        FactorKind::LinePoint {
            pixel,
            frame,
            model,
            angle_offset,
            w,
        } => Box::new(LinePointFactor(LinePointData {
            pixel,
            frame,
            model,
            angle_offset,
            w,
        })),
        FactorKind::SpacingConsistency { w } => Box::new(SpacingFactor(w)),
    }
}

/// Blocks: `[undistortion, angle, dist]`.
#[derive(Debug, Clone)]
struct LinePointFactor(LinePointData);

impl<T: nalgebra::RealField> Factor<T> for LinePointFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let r = line_point_residual_generic(
            params[0].as_slice(),
            params[1][0].clone(),
            params[2][0].clone(),
            &self.0,
        );
        DVector::from_element(1, r)
    }
}

/// Blocks: the dists of `[a1, b1, a2, b2]`.
#[derive(Debug, Clone)]
struct SpacingFactor(f64);

impl<T: nalgebra::RealField> Factor<T> for SpacingFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let d = |i: usize| params[i][0].clone();
        DVector::from_element(1, spacing_residual_generic(d(0), d(1), d(2), d(3), self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FixedMask;

    fn spacing_problem(b2: f64) -> (ProblemIR, ParamValues) {
        // Only b2 is free; the residual pulls b2 - a2 towards b1 - a1 = 1.
        let mut ir = ProblemIR::new();
        let a1 = ir.add_param_block("a1", 1, FixedMask::all_fixed(1), None);
        let b1 = ir.add_param_block("b1", 1, FixedMask::all_fixed(1), None);
        let a2 = ir.add_param_block("a2", 1, FixedMask::all_fixed(1), None);
        let b2_id = ir.add_param_block("b2", 1, FixedMask::all_free(), None);
        ir.add_residual(
            vec![a1, b1, a2, b2_id],
            FactorKind::SpacingConsistency { w: 1.0 },
            RobustLoss::None,
        );
        let initial = [("a1", 0.0), ("b1", 1.0), ("a2", 5.0), ("b2", b2)]
            .into_iter()
            .map(|(n, v)| (n.to_string(), DVector::from_element(1, v)))
            .collect();
        (ir, initial)
    }

    #[test]
    fn spacing_residual_is_minimized() {
        let (ir, initial) = spacing_problem(9.0);
        let solution = TinySolverBackend
            .solve(&ir, &initial, &BackendSolveOptions::default())
            .unwrap();
        assert!(solution.initial_cost > 1.0);
        assert!(solution.final_cost < 1e-8);
        assert!((solution.params["b2"][0] - 6.0).abs() < 1e-4);
        assert_eq!(solution.params["a2"][0], 5.0);
    }

    #[test]
    fn missing_or_short_initial_values_are_rejected() {
        let (ir, mut initial) = spacing_problem(9.0);
        initial.insert("b2".into(), DVector::zeros(2));
        let err = TinySolverBackend
            .solve(&ir, &initial, &BackendSolveOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("b2"));

        initial.remove("b2");
        assert!(TinySolverBackend
            .solve(&ir, &initial, &BackendSolveOptions::default())
            .is_err());
    }

    #[test]
    fn non_positive_loss_scale_is_rejected() {
        let (mut ir, initial) = spacing_problem(9.0);
        ir.residuals[0].loss = RobustLoss::Huber { scale: 0.0 };
        assert!(TinySolverBackend
            .solve(&ir, &initial, &BackendSolveOptions::default())
            .is_err());
    }
}
